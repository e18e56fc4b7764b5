use crate::{error::FieldErrors, model::attributes::Attributes};

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Checks attribute values before an entity is written.
pub trait SchemaValidator: fmt::Debug + Send + Sync {
    /// Validate a full attribute set.
    fn validate(&self, attributes: &Attributes) -> Result<(), FieldErrors>;

    /// Validate a single attribute value.
    fn validate_attribute(&self, name: &str, value: Option<&Value>) -> Result<(), FieldErrors>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Rule {
    Required,
    String,
    Numeric,
    Boolean,
    Array,
    Max(f64),
    Min(f64),
}

impl Rule {
    fn parse(rule: &str) -> Result<Self, String> {
        let (name, argument) = match rule.split_once(':') {
            Some((name, argument)) => (name, Some(argument)),
            None => (rule, None),
        };
        let bound = || {
            argument
                .and_then(|argument| argument.trim().parse::<f64>().ok())
                .ok_or_else(|| format!("rule `{name}` needs a numeric argument"))
        };
        match name.trim() {
            "required" => Ok(Self::Required),
            "string" => Ok(Self::String),
            "number" | "numeric" | "integer" => Ok(Self::Numeric),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "max" => bound().map(Self::Max),
            "min" => bound().map(Self::Min),
            other => Err(format!("unknown rule `{other}`")),
        }
    }

    fn size(value: &Value) -> Option<f64> {
        match value {
            Value::String(text) => Some(text.chars().count() as f64),
            Value::Number(number) => number.as_f64(),
            Value::Array(items) => Some(items.len() as f64),
            Value::Object(entries) => Some(entries.len() as f64),
            Value::Null | Value::Bool(_) => None,
        }
    }

    fn check(self, value: Option<&Value>) -> Option<String> {
        let Some(value) = value else {
            return (self == Self::Required).then(|| "is required".to_string());
        };
        let failed = match self {
            Self::Required => match value {
                Value::Null => true,
                Value::String(text) => text.trim().is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            },
            Self::String => !value.is_string(),
            Self::Numeric => !value.is_number(),
            Self::Boolean => !value.is_boolean(),
            Self::Array => !(value.is_array() || value.is_object()),
            Self::Max(max) => Self::size(value).is_some_and(|size| size > max),
            Self::Min(min) => Self::size(value).is_some_and(|size| size < min),
        };
        failed.then(|| match self {
            Self::Required => "is required".to_string(),
            Self::String => "must be a string".to_string(),
            Self::Numeric => "must be a number".to_string(),
            Self::Boolean => "must be a boolean".to_string(),
            Self::Array => "must be an array".to_string(),
            Self::Max(max) => format!("must not be greater than {max}"),
            Self::Min(min) => format!("must be at least {min}"),
        })
    }
}

/// [`SchemaValidator`] driven by `|` separated rule strings such as `required|string|max:255`.
///
/// Supported rules: `required`, `string`, `number` (or `numeric`, `integer`), `boolean`,
/// `array`, `max:<n>` and `min:<n>`. Sizes are character counts for strings,
/// lengths for arrays and maps, and the value itself for numbers.
///
/// ```rust
/// use dynamodb_model::model::{attributes::Attributes, validation::{RuleValidator, SchemaValidator}};
///
/// let mut validator = RuleValidator::default();
/// validator.add_rules("name", "required|string|max:5").unwrap();
///
/// let attributes = Attributes::from([("name".to_string(), "Frederick".into())]);
/// let errors = validator.validate(&attributes).unwrap_err();
/// assert_eq!(errors.get("name").unwrap(), ["must not be greater than 5"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RuleValidator {
    rules: IndexMap<String, Vec<Rule>>,
}

impl RuleValidator {
    /// Parse and append the rules for `name`.
    pub fn add_rules(&mut self, name: &str, rules: &str) -> Result<(), String> {
        let parsed = rules
            .split('|')
            .filter(|rule| !rule.trim().is_empty())
            .map(Rule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        self.rules.entry(name.to_string()).or_default().extend(parsed);
        Ok(())
    }

    fn check(&self, name: &str, value: Option<&Value>, errors: &mut FieldErrors) {
        let Some(rules) = self.rules.get(name) else {
            return;
        };
        for rule in rules {
            if let Some(message) = rule.check(value) {
                errors.push(name, message);
            }
        }
    }
}

impl SchemaValidator for RuleValidator {
    fn validate(&self, attributes: &Attributes) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        for name in self.rules.keys() {
            self.check(name, attributes.get(name), &mut errors);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_attribute(&self, name: &str, value: Option<&Value>) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        self.check(name, value, &mut errors);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use serde_json::json;

    fn validator() -> RuleValidator {
        let mut validator = RuleValidator::default();
        validator.add_rules("name", "required|string|max:255").unwrap();
        validator.add_rules("age", "numeric|min:18").unwrap();
        validator
    }

    #[rstest]
    #[case::valid(Some(json!("Fred")), None)]
    #[case::missing(None, Some(vec!["is required"]))]
    #[case::null(Some(Value::Null), Some(vec!["is required", "must be a string"]))]
    #[case::blank(Some(json!("  ")), Some(vec!["is required"]))]
    #[case::number(Some(json!(12)), Some(vec!["must be a string"]))]
    #[case::too_long(Some(json!("x".repeat(256))), Some(vec!["must not be greater than 255"]))]
    fn test_validate_attribute(#[case] value: Option<Value>, #[case] expected: Option<Vec<&str>>) {
        let result = validator().validate_attribute("name", value.as_ref());
        match expected {
            None => assert!(result.is_ok()),
            Some(messages) => assert_eq!(result.unwrap_err().get("name").unwrap(), messages),
        }
    }

    #[test]
    fn test_validate_collects_every_attribute() {
        let attributes = Attributes::from([("age".to_string(), json!(12))]);
        let errors = validator().validate(&attributes).unwrap_err();
        assert_eq!(errors.get("name").unwrap(), ["is required"]);
        assert_eq!(errors.get("age").unwrap(), ["must be at least 18"]);
    }

    #[test]
    fn test_optional_attribute_skipped_when_absent() {
        let attributes = Attributes::from([("name".to_string(), json!("Fred"))]);
        assert!(validator().validate(&attributes).is_ok());
    }

    #[rstest]
    #[case::unknown("shiny")]
    #[case::max_without_bound("max")]
    #[case::max_with_text("max:lots")]
    fn test_invalid_rules(#[case] rules: &str) {
        assert!(RuleValidator::default().add_rules("name", rules).is_err());
    }
}
