use crate::{common, read};

use aws_sdk_dynamodb::{Client, error, operation};
use serde_dynamo::{Error, Result};
use std::collections;

#[derive(Clone, Debug, Default, PartialEq)]
struct QueryInput {
    expression_attribute_names: collections::HashMap<String, String>,
    expression_attribute_values: common::Item,
    key_condition_expression: String,
    multiple_read_operation: read::common::MultipleReadInput,
    scan_index_forward: Option<bool>,
}

/// Query request for a single page of results.
///
/// ```rust,no_run
/// use aws_sdk_dynamodb::Client;
/// use dynamodb_model::{common, read};
///
/// # async fn example(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
/// use common::condition::{Comparison, Condition};
///
/// let query = read::query::Query {
///     key_conditions: vec![
///         Comparison::new("pk", Condition::Equals("USER#1".into())),
///         Comparison::new("sk", Condition::BeginsWith("ORDER#".into())),
///     ],
///     multiple_read_args: read::common::MultipleReadArgs {
///         limit: Some(25),
///         table_name: "users".to_string(),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// query.send(client).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// Comparisons on the partition key and, optionally, the sort key.
    pub key_conditions: Vec<common::condition::Comparison>,
    /// Table, index, consistency and pagination arguments.
    pub multiple_read_args: read::common::MultipleReadArgs,
    /// Whether to read the index forward (ascending) or backward (descending).
    pub scan_index_forward: Option<bool>,
}

impl TryFrom<Query> for QueryInput {
    type Error = Error;

    fn try_from(query: Query) -> Result<Self> {
        let multiple_read_operation: read::common::MultipleReadInput =
            query.multiple_read_args.try_into()?;
        let key_condition_operation =
            common::condition::Comparison::get_expression_operation(&query.key_conditions)?;
        let operation = Self {
            expression_attribute_names: key_condition_operation.expression_attribute_names,
            expression_attribute_values: key_condition_operation.expression_attribute_values,
            key_condition_expression: key_condition_operation.expression,
            multiple_read_operation,
            scan_index_forward: query.scan_index_forward,
        };
        Ok(operation)
    }
}

impl Query {
    /// Execute the query request, returning one page.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_model.query", skip(client), err)
    )]
    pub async fn send(
        self,
        client: &Client,
    ) -> Result<operation::query::QueryOutput, error::SdkError<operation::query::QueryError>> {
        let query: QueryInput = self.try_into().map_err(error::BuildError::other)?;
        let builder = client
            .query()
            .key_condition_expression(query.key_condition_expression)
            .set_expression_attribute_names(Some(query.expression_attribute_names))
            .set_expression_attribute_values(Some(query.expression_attribute_values))
            .set_scan_index_forward(query.scan_index_forward);
        crate::apply_multiple_read_operation!(builder, query.multiple_read_operation)
            .send()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::types;
    use common::condition::{Comparison, Condition};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::partition_key_only(
        Query {
            key_conditions: vec![
                Comparison::new("b", Condition::Equals(json!("c"))),
            ],
            multiple_read_args: read::common::MultipleReadArgs {
                table_name: "a".to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        QueryInput {
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#b".to_string(), "b".to_string()),
                ]
            ),
            expression_attribute_values: common::Item::from(
                [
                    (
                        ":b".to_string(),
                        types::AttributeValue::S(
                            "c".to_string()
                        )
                    ),
                ]
            ),
            key_condition_expression: "#b = :b".to_string(),
            multiple_read_operation: read::common::MultipleReadInput {
                table_name: "a".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    )]
    #[case::full(
        Query {
            key_conditions: vec![
                Comparison::new("gsi1_pk", Condition::Equals(json!("d"))),
                Comparison::new("gsi1_sk", Condition::Between(json!(1), json!(9))),
            ],
            multiple_read_args: read::common::MultipleReadArgs {
                index_name: Some("gsi1".to_string()),
                limit: Some(5),
                table_name: "a".to_string(),
                ..Default::default()
            },
            scan_index_forward: Some(false),
        },
        QueryInput {
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#gsi1_pk".to_string(), "gsi1_pk".to_string()),
                    ("#gsi1_sk".to_string(), "gsi1_sk".to_string()),
                ]
            ),
            expression_attribute_values: common::Item::from(
                [
                    (
                        ":gsi1_pk".to_string(),
                        types::AttributeValue::S(
                            "d".to_string()
                        )
                    ),
                    (
                        ":gsi1_sk1".to_string(),
                        types::AttributeValue::N(
                            "1".to_string()
                        )
                    ),
                    (
                        ":gsi1_sk2".to_string(),
                        types::AttributeValue::N(
                            "9".to_string()
                        )
                    ),
                ]
            ),
            key_condition_expression: "#gsi1_pk = :gsi1_pk AND #gsi1_sk BETWEEN :gsi1_sk1 AND :gsi1_sk2".to_string(),
            multiple_read_operation: read::common::MultipleReadInput {
                index_name: Some("gsi1".to_string()),
                limit: Some(5),
                table_name: "a".to_string(),
                ..Default::default()
            },
            scan_index_forward: Some(false),
        }
    )]
    fn test_query(#[case] args: Query, #[case] expected: QueryInput) {
        let actual: QueryInput = args.try_into().unwrap();
        assert_eq!(actual, expected);
    }
}
