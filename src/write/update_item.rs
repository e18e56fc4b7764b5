use crate::{common, write};

use aws_sdk_dynamodb::{Client, error, operation, types};
use serde_dynamo::{Error, Result};
use serde_json::Value;
use std::collections;

/// Separator for attribute path components.
const PATH_SEPARATOR: &str = ".";

/// Separator between SET actions.
const ACTION_SEPARATOR: &str = ", ";

/// Assignment of a value to an attribute path.
///
/// Each path component is aliased with a `#name` placeholder, and the value is
/// bound to a `:name` placeholder built from the last component. Placeholders
/// are unique within one request.
///
/// ```rust
/// use aws_sdk_dynamodb::types::AttributeValue;
/// use dynamodb_model::write::update_item::SetAction;
///
/// let action = SetAction::new(["map", "child-1", "name"], AttributeValue::S("x".to_string()));
/// assert_eq!(action.path.len(), 3);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SetAction {
    /// Attribute path from the top-level attribute down to the assigned one.
    pub path: Vec<String>,
    /// Value to assign.
    pub value: types::AttributeValue,
}

impl SetAction {
    /// Assign `value` at `path`.
    pub fn new<I, S>(path: I, value: types::AttributeValue) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            value,
        }
    }

    pub(crate) fn get_update_expression(actions: Vec<Self>) -> common::ExpressionInput {
        let mut placeholders = common::Placeholders::default();
        let mut assignments = Vec::with_capacity(actions.len());
        for action in actions {
            let path: Vec<String> = action
                .path
                .iter()
                .map(|component| placeholders.name(component))
                .collect();
            let hint = action.path.last().map(String::as_str).unwrap_or_default();
            let value = placeholders.value(hint, action.value);
            assignments.push(format!("{} = {value}", path.join(PATH_SEPARATOR)));
        }
        placeholders.into_expression(format!("SET {}", assignments.join(ACTION_SEPARATOR)))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct UpdateItemInput {
    keys: common::Item,
    update_expression: String,
    write_operation: write::common::WriteInput,
}

/// Update item request made of SET actions.
///
/// ```rust,no_run
/// use aws_sdk_dynamodb::{Client, types::AttributeValue};
/// use dynamodb_model::{common, write};
///
/// # async fn example(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
/// let update_item = write::update_item::UpdateItem {
///     keys: common::key::Keys::composite(
///         common::key::Key::new("pk", "USER#1"),
///         common::key::Key::new("sk", "USER"),
///     ),
///     set: vec![write::update_item::SetAction::new(
///         ["name"],
///         AttributeValue::S("Jane".to_string()),
///     )],
///     write_args: write::common::WriteArgs {
///         table_name: "users".to_string(),
///     },
/// };
/// // SET #name = :name
/// update_item.send(client).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateItem {
    /// The primary key of the item to update.
    pub keys: common::key::Keys<Value>,
    /// Assignments, rendered in order.
    pub set: Vec<SetAction>,
    /// Target table.
    pub write_args: write::common::WriteArgs,
}

impl TryFrom<UpdateItem> for UpdateItemInput {
    type Error = Error;

    fn try_from(update_item: UpdateItem) -> Result<Self> {
        let keys = update_item.keys.try_into()?;
        let mut write_operation: write::common::WriteInput = update_item.write_args.into();
        let operation = SetAction::get_update_expression(update_item.set);
        let update_expression = write_operation.merge_expression(operation);
        let operation = Self {
            keys,
            update_expression,
            write_operation,
        };
        Ok(operation)
    }
}

impl UpdateItem {
    /// Execute the update item request.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_model.update_item", skip(client), err)
    )]
    pub async fn send(
        self,
        client: &Client,
    ) -> Result<
        operation::update_item::UpdateItemOutput,
        error::SdkError<operation::update_item::UpdateItemError>,
    > {
        let update_item: UpdateItemInput = self.try_into().map_err(error::BuildError::other)?;
        let builder = client
            .update_item()
            .set_key(Some(update_item.keys))
            .update_expression(update_item.update_expression);
        crate::apply_write_operation!(builder, update_item.write_operation)
            .send()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn string(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    #[rstest]
    #[case::single_attribute(
        vec![SetAction::new(["test"], string("y"))],
        common::ExpressionInput {
            expression: "SET #test = :test".to_string(),
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#test".to_string(), "test".to_string()),
                ]
            ),
            expression_attribute_values: collections::HashMap::from(
                [
                    (":test".to_string(), string("y")),
                ]
            ),
        }
    )]
    #[case::several_attributes(
        vec![
            SetAction::new(["a"], string("b")),
            SetAction::new(["c"], types::AttributeValue::N("1".to_string())),
        ],
        common::ExpressionInput {
            expression: "SET #a = :a, #c = :c".to_string(),
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#a".to_string(), "a".to_string()),
                    ("#c".to_string(), "c".to_string()),
                ]
            ),
            expression_attribute_values: collections::HashMap::from(
                [
                    (":a".to_string(), string("b")),
                    (":c".to_string(), types::AttributeValue::N("1".to_string())),
                ]
            ),
        }
    )]
    #[case::nested_child(
        vec![SetAction::new(["map", "child-1"], types::AttributeValue::M(
            collections::HashMap::from([("name".to_string(), string("x"))])
        ))],
        common::ExpressionInput {
            expression: "SET #map.#child_1 = :child_1".to_string(),
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#map".to_string(), "map".to_string()),
                    ("#child_1".to_string(), "child-1".to_string()),
                ]
            ),
            expression_attribute_values: collections::HashMap::from(
                [
                    (
                        ":child_1".to_string(),
                        types::AttributeValue::M(
                            collections::HashMap::from([("name".to_string(), string("x"))])
                        )
                    ),
                ]
            ),
        }
    )]
    #[case::nested_attributes(
        vec![
            SetAction::new(["map", "c1", "name"], string("x")),
            SetAction::new(["map", "c1", "rank"], types::AttributeValue::N("2".to_string())),
        ],
        common::ExpressionInput {
            expression: "SET #map.#c1.#name = :name, #map.#c1.#rank = :rank".to_string(),
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#map".to_string(), "map".to_string()),
                    ("#c1".to_string(), "c1".to_string()),
                    ("#name".to_string(), "name".to_string()),
                    ("#rank".to_string(), "rank".to_string()),
                ]
            ),
            expression_attribute_values: collections::HashMap::from(
                [
                    (":name".to_string(), string("x")),
                    (":rank".to_string(), types::AttributeValue::N("2".to_string())),
                ]
            ),
        }
    )]
    #[case::folded_names(
        vec![
            SetAction::new(["first-name"], string("Ann")),
            SetAction::new(["first_name"], string("Bob")),
        ],
        common::ExpressionInput {
            expression: "SET #first_name = :first_name, #first_name_1 = :first_name_1".to_string(),
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#first_name".to_string(), "first-name".to_string()),
                    ("#first_name_1".to_string(), "first_name".to_string()),
                ]
            ),
            expression_attribute_values: collections::HashMap::from(
                [
                    (":first_name".to_string(), string("Ann")),
                    (":first_name_1".to_string(), string("Bob")),
                ]
            ),
        }
    )]
    #[case::same_leaf_in_two_children(
        vec![
            SetAction::new(["map", "child-1", "name"], string("x")),
            SetAction::new(["map", "child_1", "name"], string("y")),
        ],
        common::ExpressionInput {
            expression: "SET #map.#child_1.#name = :name, #map.#child_1_1.#name = :name_1"
                .to_string(),
            expression_attribute_names: collections::HashMap::from(
                [
                    ("#map".to_string(), "map".to_string()),
                    ("#child_1".to_string(), "child-1".to_string()),
                    ("#child_1_1".to_string(), "child_1".to_string()),
                    ("#name".to_string(), "name".to_string()),
                ]
            ),
            expression_attribute_values: collections::HashMap::from(
                [
                    (":name".to_string(), string("x")),
                    (":name_1".to_string(), string("y")),
                ]
            ),
        }
    )]
    fn test_update_expression(
        #[case] actions: Vec<SetAction>,
        #[case] expected: common::ExpressionInput,
    ) {
        assert_eq!(SetAction::get_update_expression(actions), expected);
    }

    #[test]
    fn test_update_item() {
        let update_item = UpdateItem {
            keys: common::key::Keys::composite(
                common::key::Key::new("pk", "A"),
                common::key::Key::new("sk", "1"),
            ),
            set: vec![SetAction::new(["test"], string("y"))],
            write_args: write::common::WriteArgs {
                table_name: "t".to_string(),
            },
        };
        let actual: UpdateItemInput = update_item.try_into().unwrap();
        assert_eq!(
            actual,
            UpdateItemInput {
                keys: common::Item::from([
                    ("pk".to_string(), string("A")),
                    ("sk".to_string(), string("1")),
                ]),
                update_expression: "SET #test = :test".to_string(),
                write_operation: write::common::WriteInput {
                    expression_attribute_names: Some(collections::HashMap::from([(
                        "#test".to_string(),
                        "test".to_string()
                    )])),
                    expression_attribute_values: Some(common::Item::from([(
                        ":test".to_string(),
                        string("y")
                    )])),
                    table_name: "t".to_string(),
                },
            }
        );
    }
}
