use crate::common;

use serde::Serialize;
use serde_dynamo::{Error, Result, to_attribute_value};

/// Key component.
///
/// ```rust
/// use dynamodb_model::common::key;
/// use serde_json::Value;
///
/// let key: key::Key<Value> = key::Key::new("pk", "USER#1");
/// assert_eq!(key.name, "pk");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Key<T> {
    /// The attribute name of the key.
    pub name: String,
    /// The value of the key.
    pub value: T,
}

impl<T> Key<T> {
    /// Build a key from an attribute name and a value.
    pub fn new(name: impl Into<String>, value: impl Into<T>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Primary key (partition key and optional sort key).
///
/// ```rust
/// use dynamodb_model::common::key;
/// use serde_json::Value;
///
/// let keys: key::Keys<Value> = key::Keys::composite(
///     key::Key::new("pk", "USER#1"),
///     key::Key::new("sk", "PROFILE"),
/// );
/// assert!(keys.sort_key.is_some());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keys<T> {
    /// The partition key (required).
    pub partition_key: Key<T>,
    /// The sort key (optional, only for tables with composite primary keys).
    pub sort_key: Option<Key<T>>,
}

impl<T> Keys<T> {
    /// Build a composite primary key.
    pub fn composite(partition_key: Key<T>, sort_key: Key<T>) -> Self {
        Self {
            partition_key,
            sort_key: Some(sort_key),
        }
    }
}

impl<T: Serialize> TryFrom<Keys<T>> for common::Item {
    type Error = Error;

    fn try_from(key: Keys<T>) -> Result<Self> {
        let partition_key_value = to_attribute_value(key.partition_key.value)?;
        let mut keys = Self::from([(key.partition_key.name, partition_key_value)]);
        if let Some(sort_key) = key.sort_key {
            let sort_key_value = to_attribute_value(sort_key.value)?;
            keys.insert(sort_key.name, sort_key_value);
        }
        Ok(keys)
    }
}
