use crate::{common, write};

use aws_sdk_dynamodb::{Client, error, operation};

#[derive(Debug, PartialEq)]
struct PutItemInput {
    item: common::Item,
    write_operation: write::common::WriteInput,
}

/// Put item request.
///
/// The item is already in wire form: the model layer packs attributes through
/// their casts, which may produce set types serde cannot express.
///
/// ```rust,no_run
/// use aws_sdk_dynamodb::{Client, types::AttributeValue};
/// use dynamodb_model::{common, write};
///
/// # async fn example(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
/// let put_item = write::put_item::PutItem {
///     item: common::Item::from([
///         ("pk".to_string(), AttributeValue::S("USER#1".to_string())),
///         ("sk".to_string(), AttributeValue::S("USER".to_string())),
///     ]),
///     write_args: write::common::WriteArgs {
///         table_name: "users".to_string(),
///     },
/// };
/// put_item.send(client).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutItem {
    /// The item to put into the table.
    pub item: common::Item,
    /// Target table.
    pub write_args: write::common::WriteArgs,
}

impl From<PutItem> for PutItemInput {
    fn from(put_item: PutItem) -> Self {
        Self {
            item: put_item.item,
            write_operation: put_item.write_args.into(),
        }
    }
}

impl PutItem {
    /// Execute the put item request.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_model.put_item", skip(client), err)
    )]
    pub async fn send(
        self,
        client: &Client,
    ) -> Result<
        operation::put_item::PutItemOutput,
        error::SdkError<operation::put_item::PutItemError>,
    > {
        let put_item: PutItemInput = self.into();
        let builder = client.put_item().set_item(Some(put_item.item));
        crate::apply_write_operation!(builder, put_item.write_operation)
            .send()
            .await
    }
}
