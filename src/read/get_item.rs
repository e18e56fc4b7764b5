use crate::{common, read};

use aws_sdk_dynamodb::{Client, error, operation};
use serde_dynamo::{Error, Result};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq)]
struct GetItemInput {
    keys: common::Item,
    single_read_operation: read::common::SingleReadInput,
}

/// Get item request.
///
/// ```rust,no_run
/// use aws_sdk_dynamodb::Client;
/// use dynamodb_model::{common, read};
///
/// # async fn example(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
/// let get_item = read::get_item::GetItem {
///     keys: common::key::Keys::composite(
///         common::key::Key::new("pk", "USER#1"),
///         common::key::Key::new("sk", "USER"),
///     ),
///     single_read_args: read::common::SingleReadArgs {
///         consistent_read: Some(true),
///         table_name: "users".to_string(),
///     },
/// };
/// get_item.send(client).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetItem {
    /// The primary key of the item to retrieve.
    pub keys: common::key::Keys<Value>,
    /// Table name and read consistency.
    pub single_read_args: read::common::SingleReadArgs,
}

impl TryFrom<GetItem> for GetItemInput {
    type Error = Error;

    fn try_from(get_item: GetItem) -> Result<Self> {
        let single_read_operation = get_item.single_read_args.into();
        let keys = get_item.keys.try_into()?;
        let operation = Self {
            keys,
            single_read_operation,
        };
        Ok(operation)
    }
}

impl GetItem {
    /// Execute the get item request.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_model.get_item", skip(client), err)
    )]
    pub async fn send(
        self,
        client: &Client,
    ) -> Result<
        operation::get_item::GetItemOutput,
        error::SdkError<operation::get_item::GetItemError>,
    > {
        let get_item: GetItemInput = self.try_into().map_err(error::BuildError::other)?;
        let builder = client.get_item().set_key(Some(get_item.keys));
        crate::apply_single_read_operation!(builder, get_item.single_read_operation)
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
    #[case::partition_key_only(
        GetItem {
            keys: common::key::Keys {
                partition_key: common::key::Key::new("a", "b"),
                ..Default::default()
            },
            single_read_args: read::common::SingleReadArgs {
                table_name: "c".to_string(),
                ..Default::default()
            },
        },
        GetItemInput {
            keys: common::Item::from(
                [
                    (
                        "a".to_string(),
                        types::AttributeValue::S(
                            "b".to_string()
                        )
                    ),
                ]
            ),
            single_read_operation: read::common::SingleReadInput {
                table_name: "c".to_string(),
                ..Default::default()
            },
        }
    )]
    #[case::composite_consistent(
        GetItem {
            keys: common::key::Keys::composite(
                common::key::Key::new("a", "b"),
                common::key::Key::new("c", "d"),
            ),
            single_read_args: read::common::SingleReadArgs {
                consistent_read: Some(true),
                table_name: "e".to_string(),
            },
        },
        GetItemInput {
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
                        types::AttributeValue::S(
                            "d".to_string()
                        )
                    ),
                ]
            ),
            single_read_operation: read::common::SingleReadInput {
                consistent_read: Some(true),
                table_name: "e".to_string(),
            },
        }
    )]
    fn test_get_item(#[case] args: GetItem, #[case] expected: GetItemInput) {
        let actual: GetItemInput = args.try_into().unwrap();
        assert_eq!(actual, expected);
    }
}
