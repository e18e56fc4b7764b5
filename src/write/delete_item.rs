use crate::{common, write};

use aws_sdk_dynamodb::{Client, error, operation};
use serde_dynamo::{Error, Result};
use serde_json::Value;

#[derive(Debug, PartialEq)]
struct DeleteItemInput {
    keys: common::Item,
    write_operation: write::common::WriteInput,
}

/// Delete item request.
///
/// ```rust,no_run
/// use aws_sdk_dynamodb::Client;
/// use dynamodb_model::{common, write};
///
/// # async fn example(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
/// let delete_item = write::delete_item::DeleteItem {
///     keys: common::key::Keys::composite(
///         common::key::Key::new("pk", "USER#1"),
///         common::key::Key::new("sk", "USER"),
///     ),
///     write_args: write::common::WriteArgs {
///         table_name: "users".to_string(),
///     },
/// };
/// delete_item.send(client).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteItem {
    /// The primary key of the item to delete.
    pub keys: common::key::Keys<Value>,
    /// Target table.
    pub write_args: write::common::WriteArgs,
}

impl TryFrom<DeleteItem> for DeleteItemInput {
    type Error = Error;

    fn try_from(delete_item: DeleteItem) -> Result<Self> {
        let keys = delete_item.keys.try_into()?;
        let operation = Self {
            keys,
            write_operation: delete_item.write_args.into(),
        };
        Ok(operation)
    }
}

impl DeleteItem {
    /// Execute the delete item request.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_model.delete_item", skip(client), err)
    )]
    pub async fn send(
        self,
        client: &Client,
    ) -> Result<
        operation::delete_item::DeleteItemOutput,
        error::SdkError<operation::delete_item::DeleteItemError>,
    > {
        let delete_item: DeleteItemInput = self.try_into().map_err(error::BuildError::other)?;
        let builder = client.delete_item().set_key(Some(delete_item.keys));
        crate::apply_write_operation!(builder, delete_item.write_operation)
            .send()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::types;
    use rstest::rstest;

    #[rstest]
    #[case::composite(
        DeleteItem {
            keys: common::key::Keys::composite(
                common::key::Key::new("a", "b"),
                common::key::Key::new("c", 1),
            ),
            write_args: write::common::WriteArgs {
                table_name: "d".to_string(),
            },
        },
        DeleteItemInput {
            keys: common::Item::from(
                [
                    (
                        "a".to_string(),
                        types::AttributeValue::S(
                            "b".to_string()
                        )
                    ),
                    (
                        "c".to_string(),
                        types::AttributeValue::N(
                            "1".to_string()
                        )
                    ),
                ]
            ),
            write_operation: write::common::WriteInput {
                table_name: "d".to_string(),
                ..Default::default()
            },
        }
    )]
    fn test_delete_item(#[case] args: DeleteItem, #[case] expected: DeleteItemInput) {
        let actual: DeleteItemInput = args.try_into().unwrap();
        assert_eq!(actual, expected);
    }
}
