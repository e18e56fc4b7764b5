use crate::error::{Error, Result};

use aws_sdk_dynamodb::{primitives::Blob, types::AttributeValue};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_dynamo::{from_attribute_value, to_attribute_value};
use serde_json::Value;
use std::{convert, fmt, str, sync::Arc};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Custom transform between a stored value and its in-memory form.
///
/// Registered on the [`DbBuilder`](crate::model::DbBuilder) under a name and
/// referenced from a model with the `codec:<name>` cast tag.
pub trait AttributeCodec: Send + Sync {
    /// Stored value to in-memory value.
    fn decode(&self, attribute: &str, value: Value) -> Result<Value>;

    /// In-memory value to stored value.
    fn encode(&self, attribute: &str, value: &Value) -> Result<Value>;
}

/// Named [`AttributeCodec`]s.
#[derive(Clone, Default)]
pub struct CastRegistry {
    codecs: IndexMap<String, Arc<dyn AttributeCodec>>,
}

impl fmt::Debug for CastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}

impl CastRegistry {
    /// Register `codec` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, codec: impl AttributeCodec + 'static) {
        self.codecs.insert(name.into(), Arc::new(codec));
    }

    fn get(&self, attribute: &str, name: &str) -> Result<&dyn AttributeCodec> {
        self.codecs
            .get(name)
            .map(|codec| codec.as_ref())
            .ok_or_else(|| Error::cast(attribute, format!("no codec registered as `{name}`")))
    }
}

/// Per-attribute conversion between stored and in-memory values.
///
/// ```rust
/// use dynamodb_model::model::cast::Cast;
///
/// assert_eq!("set:string".parse::<Cast>().unwrap(), Cast::StringSet);
/// assert_eq!("codec:reverse".parse::<Cast>().unwrap(), Cast::Codec("reverse".to_string()));
/// assert_eq!("whatever".parse::<Cast>().unwrap(), Cast::Passthrough("whatever".to_string()));
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Cast {
    /// List, also accepted as a JSON encoded string.
    Array,
    /// Any value stored as a JSON encoded string.
    Json,
    /// Map, also accepted as a JSON encoded string.
    Object,
    /// Alias of [`Cast::Array`].
    List,
    /// Alias of [`Cast::Object`].
    Map,
    /// Alias of [`Cast::Array`].
    Collection,
    /// Array of strings stored as a string set.
    StringSet,
    /// Array of numbers stored as a number set.
    NumberSet,
    /// Array of strings stored as a binary set.
    BinarySet,
    /// `YYYY-MM-DD` calendar date.
    Date,
    /// RFC 3339 date and time, normalised to UTC.
    DateTime,
    /// RFC 3339 date and time in memory, epoch seconds in storage.
    Timestamp,
    /// Registered [`AttributeCodec`].
    Codec(String),
    /// Unrecognised tag, values pass through unchanged.
    Passthrough(String),
}

impl str::FromStr for Cast {
    type Err = convert::Infallible;

    fn from_str(tag: &str) -> std::result::Result<Self, Self::Err> {
        let cast = match tag {
            "array" => Self::Array,
            "json" => Self::Json,
            "object" => Self::Object,
            "list" => Self::List,
            "map" => Self::Map,
            "collection" => Self::Collection,
            "set:string" => Self::StringSet,
            "set:number" => Self::NumberSet,
            "set:binary" => Self::BinarySet,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "timestamp" => Self::Timestamp,
            _ => match tag.strip_prefix("codec:") {
                Some(name) => Self::Codec(name.to_string()),
                None => Self::Passthrough(tag.to_string()),
            },
        };
        Ok(cast)
    }
}

impl From<&str> for Cast {
    fn from(tag: &str) -> Self {
        match tag.parse() {
            Ok(cast) => cast,
            Err(infallible) => match infallible {},
        }
    }
}

fn parse_json(attribute: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|error| Error::cast(attribute, error))
}

fn parse_datetime(attribute: &str, text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|datetime| datetime.with_timezone(&Utc))
        .map_err(|error| Error::cast(attribute, error))
}

fn format_datetime(datetime: DateTime<Utc>) -> Value {
    Value::String(datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn set_members<'a>(attribute: &str, value: &'a Value) -> Result<&'a [Value]> {
    match value {
        Value::Array(members) => Ok(members),
        other => Err(Error::cast(attribute, format!("expected an array, got {other}"))),
    }
}

fn string_members(attribute: &str, value: &Value) -> Result<Vec<String>> {
    set_members(attribute, value)?
        .iter()
        .map(|member| match member {
            Value::String(member) => Ok(member.clone()),
            other => Err(Error::cast(attribute, format!("expected a string, got {other}"))),
        })
        .collect()
}

impl Cast {
    /// Decode a stored value.
    pub fn decode(
        &self,
        attribute: &str,
        raw: AttributeValue,
        registry: &CastRegistry,
    ) -> Result<Value> {
        if raw.is_null() {
            return Ok(match self {
                Self::StringSet | Self::NumberSet | Self::BinarySet => Value::Array(Vec::new()),
                _ => Value::Null,
            });
        }
        match (self, raw) {
            (
                Self::Array | Self::List | Self::Collection | Self::Object | Self::Map | Self::Json,
                AttributeValue::S(text),
            ) => parse_json(attribute, &text),
            (Self::StringSet, AttributeValue::Ss(members)) => {
                Ok(Value::Array(members.into_iter().map(Value::String).collect()))
            }
            (Self::NumberSet, AttributeValue::Ns(members)) => members
                .iter()
                .map(|member| match parse_json(attribute, member)? {
                    number @ Value::Number(_) => Ok(number),
                    other => Err(Error::cast(attribute, format!("`{other}` is not a number"))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (Self::BinarySet, AttributeValue::Bs(members)) => members
                .into_iter()
                .map(|member| {
                    String::from_utf8(member.into_inner())
                        .map(Value::String)
                        .map_err(|error| Error::cast(attribute, error))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (Self::Date, AttributeValue::S(text)) => NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(|date| Value::String(date.format(DATE_FORMAT).to_string()))
                .map_err(|error| Error::cast(attribute, error)),
            (Self::DateTime, AttributeValue::S(text)) => {
                parse_datetime(attribute, &text).map(format_datetime)
            }
            (Self::Timestamp, AttributeValue::N(seconds)) => {
                let seconds: i64 = seconds
                    .parse()
                    .map_err(|error| Error::cast(attribute, error))?;
                DateTime::from_timestamp(seconds, 0)
                    .map(format_datetime)
                    .ok_or_else(|| Error::cast(attribute, "timestamp out of range"))
            }
            (Self::Codec(name), raw) => {
                let codec = registry.get(attribute, name)?;
                codec.decode(attribute, from_attribute_value(raw)?)
            }
            (_, raw) => Ok(from_attribute_value(raw)?),
        }
    }

    /// Encode an in-memory value for storage.
    pub fn encode(
        &self,
        attribute: &str,
        value: &Value,
        registry: &CastRegistry,
    ) -> Result<AttributeValue> {
        if value.is_null() {
            return Ok(AttributeValue::Null(true));
        }
        let encoded = match self {
            Self::Json => AttributeValue::S(value.to_string()),
            Self::StringSet => {
                let members = string_members(attribute, value)?;
                if members.is_empty() {
                    AttributeValue::Null(true)
                } else {
                    AttributeValue::Ss(members)
                }
            }
            Self::NumberSet => {
                let members = set_members(attribute, value)?
                    .iter()
                    .map(|member| match member {
                        Value::Number(number) => Ok(number.to_string()),
                        other => Err(Error::cast(
                            attribute,
                            format!("expected a number, got {other}"),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?;
                if members.is_empty() {
                    AttributeValue::Null(true)
                } else {
                    AttributeValue::Ns(members)
                }
            }
            Self::BinarySet => {
                let members = string_members(attribute, value)?;
                if members.is_empty() {
                    AttributeValue::Null(true)
                } else {
                    AttributeValue::Bs(members.into_iter().map(Blob::new).collect())
                }
            }
            Self::Date => match value {
                Value::String(text) => NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map(|date| AttributeValue::S(date.format(DATE_FORMAT).to_string()))
                    .map_err(|error| Error::cast(attribute, error))?,
                other => {
                    return Err(Error::cast(attribute, format!("expected a date, got {other}")));
                }
            },
            Self::DateTime => match value {
                Value::String(text) => {
                    let datetime = parse_datetime(attribute, text)?;
                    AttributeValue::S(datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                }
                other => {
                    return Err(Error::cast(attribute, format!("expected a datetime, got {other}")));
                }
            },
            Self::Timestamp => match value {
                Value::String(text) => {
                    AttributeValue::N(parse_datetime(attribute, text)?.timestamp().to_string())
                }
                Value::Number(seconds) => AttributeValue::N(seconds.to_string()),
                other => {
                    return Err(Error::cast(
                        attribute,
                        format!("expected a timestamp, got {other}"),
                    ));
                }
            },
            Self::Codec(name) => {
                let codec = registry.get(attribute, name)?;
                to_attribute_value(codec.encode(attribute, value)?)?
            }
            Self::Array
            | Self::List
            | Self::Collection
            | Self::Object
            | Self::Map
            | Self::Passthrough(_) => to_attribute_value(value)?,
        };
        Ok(encoded)
    }
}
