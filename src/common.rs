//! Common building blocks for DynamoDB requests.
//!
//! This module holds the pieces shared by read and write requests: key
//! handling, key-condition comparisons, and the expression fragments that
//! get merged into a final request.

/// Key-condition comparisons and the positional filter parser.
pub mod condition;

/// Key types for addressing items in DynamoDB tables.
pub mod key;

use aws_sdk_dynamodb::types;
use std::collections;

/// Item as stored by DynamoDB.
pub type Item = collections::HashMap<String, types::AttributeValue>;

/// Logical operator used to combine key conditions.
pub(crate) const AND: &str = " AND ";

/// Build the placeholder identifier for an attribute name.
///
/// Expression placeholders may only contain alphanumerics and underscores, so
/// every other character is folded into an underscore.
pub(crate) fn placeholder_identifier(name: &str) -> String {
    name.chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' {
                character
            } else {
                '_'
            }
        })
        .collect()
}

fn first_free(base: String, taken: impl Fn(&str) -> bool) -> String {
    if !taken(&base) {
        return base;
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Placeholder bindings of one request.
///
/// Each distinct attribute name gets one `#` placeholder and each bound value
/// its own `:` placeholder. Names folding to the same identifier get a numeric
/// suffix, so no binding overwrites another.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Placeholders {
    aliases: collections::HashMap<String, String>,
    names: collections::HashMap<String, String>,
    values: collections::HashMap<String, types::AttributeValue>,
}

impl Placeholders {
    /// `#` placeholder aliasing `name`.
    pub(crate) fn name(&mut self, name: &str) -> String {
        if let Some(placeholder) = self.aliases.get(name) {
            return placeholder.clone();
        }
        let base = format!("#{}", placeholder_identifier(name));
        let placeholder = first_free(base, |candidate| self.names.contains_key(candidate));
        self.names.insert(placeholder.clone(), name.to_string());
        self.aliases.insert(name.to_string(), placeholder.clone());
        placeholder
    }

    /// `:` placeholder binding `value`, named after `hint`.
    pub(crate) fn value(&mut self, hint: &str, value: types::AttributeValue) -> String {
        let base = format!(":{}", placeholder_identifier(hint));
        let placeholder = first_free(base, |candidate| self.values.contains_key(candidate));
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Bindings together with the expression that uses them.
    pub(crate) fn into_expression(self, expression: String) -> ExpressionInput {
        ExpressionInput {
            expression,
            expression_attribute_names: self.names,
            expression_attribute_values: self.values,
        }
    }
}

/// Rendered expression with its attribute name and value bindings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionInput {
    /// Rendered expression text.
    pub expression: String,
    /// Placeholder to attribute name bindings.
    pub expression_attribute_names: collections::HashMap<String, String>,
    /// Placeholder to attribute value bindings.
    pub expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
}
