use crate::{common, error};

use serde_dynamo::{Result, to_attribute_value};
use serde_json::Value;
use std::{cmp, collections, fmt};

/// Key-condition operators supported by DynamoDB queries.
///
/// ```rust
/// use dynamodb_model::common::condition;
///
/// let prefix = condition::Condition::BeginsWith("ORDER#".into());
/// let range = condition::Condition::Between(1.into(), 10.into());
/// assert_eq!(range.operator(), "between");
/// # let _ = prefix;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Checks if an attribute begins with a specified prefix.
    BeginsWith(Value),
    /// Checks if an attribute value is between two values (inclusive).
    Between(Value, Value),
    /// Checks if an attribute value equals a specified value.
    Equals(Value),
    /// Checks if an attribute value is greater than a specified value.
    GreaterThan(Value),
    /// Checks if an attribute value is greater than or equal to a specified value.
    GreaterThanOrEqual(Value),
    /// Checks if an attribute value is less than a specified value.
    LessThan(Value),
    /// Checks if an attribute value is less than or equal to a specified value.
    LessThanOrEqual(Value),
}

impl Condition {
    /// Operator token as accepted by [`ComparisonBuilder`].
    pub fn operator(&self) -> &'static str {
        match self {
            Self::BeginsWith(_) => "begins_with",
            Self::Between(..) => "between",
            Self::Equals(_) => "=",
            Self::GreaterThan(_) => ">",
            Self::GreaterThanOrEqual(_) => ">=",
            Self::LessThan(_) => "<",
            Self::LessThanOrEqual(_) => "<=",
        }
    }

    /// Values the condition compares against.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Self::Between(lower, upper) => vec![lower, upper],
            Self::BeginsWith(value)
            | Self::Equals(value)
            | Self::GreaterThan(value)
            | Self::GreaterThanOrEqual(value)
            | Self::LessThan(value)
            | Self::LessThanOrEqual(value) => vec![value],
        }
    }

    fn arity(&self) -> usize {
        self.operands().len() + 1
    }
}

/// Order two scalars the way DynamoDB orders key attributes.
///
/// Strings compare by code point and numbers numerically; anything else is unordered.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<cmp::Ordering> {
    match (left, right) {
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        _ => None,
    }
}

/// Condition applied to a key attribute.
///
/// Renders with a `#name` / `:name` placeholder convention, so a partition key
/// comparison and a sort key comparison can be joined with `AND` in one request.
///
/// ```rust
/// use dynamodb_model::common::condition;
///
/// let comparison = condition::Comparison::new(
///     "sk",
///     condition::Condition::Between("A".into(), "M".into()),
/// );
/// assert_eq!(comparison.to_string(), "#sk BETWEEN :sk1 AND :sk2");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    /// The condition to apply to the attribute.
    pub condition: Condition,
    /// The name of the attribute to apply the condition to.
    pub name: String,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identifier = common::placeholder_identifier(&self.name);
        let (name, value) = (format!("#{identifier}"), format!(":{identifier}"));
        match &self.condition {
            Condition::BeginsWith(_) => write!(f, "begins_with({name}, {value})"),
            Condition::Between(..) => write!(f, "{name} BETWEEN {value}1 AND {value}2"),
            Condition::Equals(_) => write!(f, "{name} = {value}"),
            Condition::GreaterThan(_) => write!(f, "{name} > {value}"),
            Condition::GreaterThanOrEqual(_) => write!(f, "{name} >= {value}"),
            Condition::LessThan(_) => write!(f, "{name} < {value}"),
            Condition::LessThanOrEqual(_) => write!(f, "{name} <= {value}"),
        }
    }
}

impl Comparison {
    /// Build a comparison on `name`.
    pub fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            condition,
            name: name.into(),
        }
    }

    /// Placeholder to attribute name binding.
    pub fn expression_attribute_name(&self) -> (String, String) {
        let identifier = common::placeholder_identifier(&self.name);
        (format!("#{identifier}"), self.name.clone())
    }

    /// Placeholder to attribute value bindings, marshalled for the wire.
    pub fn expression_attribute_values(
        &self,
    ) -> Result<collections::HashMap<String, aws_sdk_dynamodb::types::AttributeValue>> {
        let placeholder = format!(":{}", common::placeholder_identifier(&self.name));
        let mut values = collections::HashMap::new();
        match &self.condition {
            Condition::Between(lower, upper) => {
                values.insert(format!("{placeholder}1"), to_attribute_value(lower)?);
                values.insert(format!("{placeholder}2"), to_attribute_value(upper)?);
            }
            Condition::BeginsWith(value)
            | Condition::Equals(value)
            | Condition::GreaterThan(value)
            | Condition::GreaterThanOrEqual(value)
            | Condition::LessThan(value)
            | Condition::LessThanOrEqual(value) => {
                values.insert(placeholder, to_attribute_value(value)?);
            }
        }
        Ok(values)
    }

    /// Evaluate the predicate against concrete values.
    ///
    /// `values[0]` is the value under test, followed by the operands: two values
    /// in total for every operator except `between`, which takes three.
    pub fn compare(&self, values: &[Value]) -> error::Result<bool> {
        let expected = self.condition.arity();
        if values.len() != expected {
            return Err(error::Error::Arity {
                comparison: self.condition.operator(),
                expected,
                actual: values.len(),
            });
        }
        let candidate = &values[0];
        let ordering = |operand: &Value| compare_values(candidate, operand);
        let matched = match &self.condition {
            Condition::Equals(_) => candidate == &values[1],
            Condition::BeginsWith(_) => match (candidate, &values[1]) {
                (Value::String(candidate), Value::String(prefix)) => candidate.starts_with(prefix),
                _ => false,
            },
            Condition::Between(..) => {
                matches!(ordering(&values[1]), Some(cmp::Ordering::Greater | cmp::Ordering::Equal))
                    && matches!(ordering(&values[2]), Some(cmp::Ordering::Less | cmp::Ordering::Equal))
            }
            Condition::GreaterThan(_) => ordering(&values[1]) == Some(cmp::Ordering::Greater),
            Condition::GreaterThanOrEqual(_) => {
                matches!(ordering(&values[1]), Some(cmp::Ordering::Greater | cmp::Ordering::Equal))
            }
            Condition::LessThan(_) => ordering(&values[1]) == Some(cmp::Ordering::Less),
            Condition::LessThanOrEqual(_) => {
                matches!(ordering(&values[1]), Some(cmp::Ordering::Less | cmp::Ordering::Equal))
            }
        };
        Ok(matched)
    }

    /// Evaluate the predicate against `candidate` using the comparison's own operands.
    pub fn matches(&self, candidate: &Value) -> bool {
        let mut values = Vec::with_capacity(self.condition.arity());
        values.push(candidate.clone());
        values.extend(self.condition.operands().into_iter().cloned());
        self.compare(&values).unwrap_or(false)
    }

    fn render(&self, placeholders: &mut common::Placeholders) -> Result<String> {
        let name = placeholders.name(&self.name);
        let mut bind = |suffix: &str, value: &Value| -> Result<String> {
            let hint = format!("{}{suffix}", self.name);
            Ok(placeholders.value(&hint, to_attribute_value(value)?))
        };
        let rendered = match &self.condition {
            Condition::BeginsWith(value) => format!("begins_with({name}, {})", bind("", value)?),
            Condition::Between(lower, upper) => {
                let lower = bind("1", lower)?;
                let upper = bind("2", upper)?;
                format!("{name} BETWEEN {lower} AND {upper}")
            }
            Condition::Equals(value) => format!("{name} = {}", bind("", value)?),
            Condition::GreaterThan(value) => format!("{name} > {}", bind("", value)?),
            Condition::GreaterThanOrEqual(value) => format!("{name} >= {}", bind("", value)?),
            Condition::LessThan(value) => format!("{name} < {}", bind("", value)?),
            Condition::LessThanOrEqual(value) => format!("{name} <= {}", bind("", value)?),
        };
        Ok(rendered)
    }

    pub(crate) fn get_expression_operation(
        comparisons: &[Self],
    ) -> Result<common::ExpressionInput> {
        let mut placeholders = common::Placeholders::default();
        let mut expressions = Vec::with_capacity(comparisons.len());
        for comparison in comparisons {
            expressions.push(comparison.render(&mut placeholders)?);
        }
        Ok(placeholders.into_expression(expressions.join(common::AND)))
    }
}

/// Positional filter tuple: `(field, value)`, `(field, operator, value)` or
/// `(field, "between", lower, upper)`.
///
/// ```rust
/// use dynamodb_model::common::condition::Filter;
///
/// let equals = Filter::from(("pk", "USER#1"));
/// let prefix = Filter::from(("sk", "begins_with", "ORDER#"));
/// let range = Filter::from(("sk", "between", 1, 5));
/// assert_eq!(range.len(), 4);
/// # let _ = (equals, prefix);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(pub Vec<Value>);

impl Filter {
    /// Field the filter targets, when the first element is a string.
    pub fn field(&self) -> Option<&str> {
        self.0.first().and_then(Value::as_str)
    }

    /// Copy of the filter targeting another field.
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        let mut values = self.0.clone();
        match values.first_mut() {
            Some(first) => *first = Value::String(field.into()),
            None => values.push(Value::String(field.into())),
        }
        Self(values)
    }

    /// Number of positional elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tuple is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Operands after the field and operator, as used for in-memory matching.
    pub fn operands(&self) -> &[Value] {
        self.0.get(2..).unwrap_or_default()
    }
}

impl From<Vec<Value>> for Filter {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl<F: Into<String>, V: Into<Value>> From<(F, V)> for Filter {
    fn from((field, value): (F, V)) -> Self {
        Self(vec![Value::String(field.into()), value.into()])
    }
}

impl<F: Into<String>, O: Into<String>, V: Into<Value>> From<(F, O, V)> for Filter {
    fn from((field, operator, value): (F, O, V)) -> Self {
        Self(vec![
            Value::String(field.into()),
            Value::String(operator.into()),
            value.into(),
        ])
    }
}

impl<F: Into<String>, O: Into<String>, V: Into<Value>, W: Into<Value>> From<(F, O, V, W)>
    for Filter
{
    fn from((field, operator, lower, upper): (F, O, V, W)) -> Self {
        Self(vec![
            Value::String(field.into()),
            Value::String(operator.into()),
            lower.into(),
            upper.into(),
        ])
    }
}

/// Parses positional filter tuples into [`Comparison`]s.
pub struct ComparisonBuilder;

impl ComparisonBuilder {
    /// Parse a positional filter tuple.
    ///
    /// ```rust
    /// use dynamodb_model::common::condition::{ComparisonBuilder, Condition, Filter};
    ///
    /// let filter = Filter::from(("sk", "begins_with", "ORDER#"));
    /// let comparison = ComparisonBuilder::from_array(&filter.0).unwrap();
    /// assert_eq!(comparison.condition, Condition::BeginsWith("ORDER#".into()));
    /// ```
    pub fn from_array(props: &[Value]) -> error::Result<Comparison> {
        let invalid = || {
            error::Error::InvalidQuery(
                "invalid comparison values passed to query builder".to_string(),
            )
        };
        let Some(Value::String(field)) = props.first() else {
            return Err(invalid());
        };
        let condition = match props {
            [_, value] => Condition::Equals(value.clone()),
            [_, Value::String(operator), lower, upper] if operator == "between" => {
                Condition::Between(lower.clone(), upper.clone())
            }
            [_, Value::String(operator), value] => {
                let value = value.clone();
                match operator.as_str() {
                    "begins_with" => Condition::BeginsWith(value),
                    "<" => Condition::LessThan(value),
                    "<=" => Condition::LessThanOrEqual(value),
                    ">" => Condition::GreaterThan(value),
                    ">=" => Condition::GreaterThanOrEqual(value),
                    "=" => Condition::Equals(value),
                    _ => return Err(invalid()),
                }
            }
            _ => return Err(invalid()),
        };
        Ok(Comparison::new(field.clone(), condition))
    }
}
