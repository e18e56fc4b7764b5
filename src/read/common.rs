use crate::common;

use serde_dynamo::{Result, to_attribute_value};
use serde_json::Value;
use std::collections;

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct SingleReadInput {
    pub(crate) consistent_read: Option<bool>,
    pub(crate) table_name: String,
}

/// Arguments for single-item reads (GetItem).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct SingleReadArgs {
    /// Whether to use a strongly consistent read.
    ///
    /// `None` leaves the choice to DynamoDB, which defaults to eventually consistent.
    pub consistent_read: Option<bool>,
    /// The name of the table to read from.
    pub table_name: String,
}

impl From<SingleReadArgs> for SingleReadInput {
    fn from(single_read_args: SingleReadArgs) -> Self {
        Self {
            consistent_read: single_read_args.consistent_read,
            table_name: single_read_args.table_name,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MultipleReadInput {
    pub(crate) consistent_read: Option<bool>,
    pub(crate) exclusive_start_key: Option<common::Item>,
    pub(crate) index_name: Option<String>,
    pub(crate) limit: Option<i32>,
    pub(crate) table_name: String,
}

/// Arguments for multiple-item reads (Query).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipleReadArgs {
    /// Whether to use a strongly consistent read.
    ///
    /// Only meaningful against the base table; secondary indexes reject it.
    pub consistent_read: Option<bool>,
    /// Key of the last item evaluated by a previous page.
    pub exclusive_start_key: Option<collections::HashMap<String, Value>>,
    /// Secondary index to query instead of the base table.
    pub index_name: Option<String>,
    /// Maximum number of items to evaluate in this page.
    pub limit: Option<i32>,
    /// The name of the table to read from.
    pub table_name: String,
}

impl TryFrom<MultipleReadArgs> for MultipleReadInput {
    type Error = serde_dynamo::Error;

    fn try_from(multiple_read_args: MultipleReadArgs) -> Result<Self> {
        let exclusive_start_key = match multiple_read_args.exclusive_start_key {
            Some(exclusive_start_key) => {
                let mut serialized_exclusive_start_key =
                    collections::HashMap::with_capacity(exclusive_start_key.len());
                for (key, value) in exclusive_start_key {
                    let value = to_attribute_value(value)?;
                    serialized_exclusive_start_key.insert(key, value);
                }
                Some(serialized_exclusive_start_key)
            }
            None => None,
        };
        let operation = Self {
            consistent_read: multiple_read_args.consistent_read,
            exclusive_start_key,
            index_name: multiple_read_args.index_name,
            limit: multiple_read_args.limit,
            table_name: multiple_read_args.table_name,
        };
        Ok(operation)
    }
}

/// apply common single read operation settings to a builder
#[macro_export]
macro_rules! apply_single_read_operation {
    ($builder:expr, $single_read_operation:expr) => {
        $builder
            .set_consistent_read($single_read_operation.consistent_read)
            .table_name($single_read_operation.table_name)
    };
}

/// apply common multiple read operation settings to a builder
#[macro_export]
macro_rules! apply_multiple_read_operation {
    ($builder:expr, $multiple_read_operation:expr) => {
        $builder
            .set_consistent_read($multiple_read_operation.consistent_read)
            .set_exclusive_start_key($multiple_read_operation.exclusive_start_key)
            .set_index_name($multiple_read_operation.index_name)
            .set_limit($multiple_read_operation.limit)
            .table_name($multiple_read_operation.table_name)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::types;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::empty(
        MultipleReadArgs {
            table_name: "a".to_string(),
            ..Default::default()
        },
        MultipleReadInput {
            table_name: "a".to_string(),
            ..Default::default()
        }
    )]
    #[case::full(
        MultipleReadArgs {
            consistent_read: Some(true),
            exclusive_start_key: Some(
                collections::HashMap::from(
                    [
                        ("pk".to_string(), json!("A")),
                        ("sk".to_string(), json!(2)),
                    ]
                )
            ),
            index_name: Some("gsi1".to_string()),
            limit: Some(10),
            table_name: "b".to_string(),
        },
        MultipleReadInput {
            consistent_read: Some(true),
            exclusive_start_key: Some(
                collections::HashMap::from(
                    [
                        (
                            "pk".to_string(),
                            types::AttributeValue::S(
                                "A".to_string()
                            )
                        ),
                        (
                            "sk".to_string(),
                            types::AttributeValue::N(
                                "2".to_string()
                            )
                        ),
                    ]
                )
            ),
            index_name: Some("gsi1".to_string()),
            limit: Some(10),
            table_name: "b".to_string(),
        }
    )]
    fn test_multiple_read_args(
        #[case] args: MultipleReadArgs,
        #[case] expected: MultipleReadInput,
    ) {
        let actual: MultipleReadInput = args.try_into().unwrap();
        assert_eq!(actual, expected);
    }
}
