use crate::error::{Error, Result};

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

/// Attribute values by name, in insertion order.
pub type Attributes = IndexMap<String, Value>;

/// Anything usable as a set of attribute values.
///
/// ```rust
/// use dynamodb_model::model::attributes::IntoAttributes;
/// use serde_json::json;
///
/// let attributes = json!({"name": "Fred"}).into_attributes().unwrap();
/// assert_eq!(attributes["name"], "Fred");
///
/// let attributes = [("name", "Fred")].into_attributes().unwrap();
/// assert_eq!(attributes["name"], "Fred");
/// ```
pub trait IntoAttributes {
    /// Convert into attribute values.
    fn into_attributes(self) -> Result<Attributes>;
}

impl IntoAttributes for Attributes {
    fn into_attributes(self) -> Result<Attributes> {
        Ok(self)
    }
}

impl IntoAttributes for Map<String, Value> {
    fn into_attributes(self) -> Result<Attributes> {
        Ok(self.into_iter().collect())
    }
}

impl IntoAttributes for Value {
    fn into_attributes(self) -> Result<Attributes> {
        match self {
            Value::Object(map) => map.into_attributes(),
            Value::Null => Ok(Attributes::new()),
            other => Err(Error::cast(
                "attributes",
                format!("expected an object, got {other}"),
            )),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoAttributes for [(K, V); N] {
    fn into_attributes(self) -> Result<Attributes> {
        Ok(self
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect())
    }
}

impl<K: Into<String>, V: Into<Value>> IntoAttributes for Vec<(K, V)> {
    fn into_attributes(self) -> Result<Attributes> {
        Ok(self
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect())
    }
}

/// Current values, the snapshot last read from or written to storage, and the
/// names changed since that snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeStore {
    attributes: Attributes,
    original: Attributes,
    dirty: IndexSet<String>,
}

impl AttributeStore {
    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All current values.
    pub fn all(&self) -> &Attributes {
        &self.attributes
    }

    /// Snapshot as of the last load or successful write.
    pub fn original(&self) -> &Attributes {
        &self.original
    }

    /// Whether the entity has ever been loaded or persisted.
    pub fn has_original(&self) -> bool {
        !self.original.is_empty()
    }

    /// Whether `name` changed since the snapshot.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// Names changed since the snapshot, in the order they were first changed.
    pub fn dirty_names(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Changed names with their current values.
    pub fn dirty(&self) -> Attributes {
        self.dirty
            .iter()
            .filter_map(|name| {
                self.attributes
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    /// Assign `value` to `name`, tracking whether it now differs from the snapshot.
    pub(crate) fn set(&mut self, name: &str, value: Value) {
        if self.original.get(name) == Some(&value) {
            self.dirty.shift_remove(name);
        } else if self.differs(name, &value) {
            self.dirty.insert(name.to_string());
        }
        self.attributes.insert(name.to_string(), value);
    }

    fn differs(&self, name: &str, value: &Value) -> bool {
        if !self.original.contains_key(name) {
            return true;
        }
        self.attributes
            .get(name)
            .is_some_and(|current| current != value)
    }

    pub(crate) fn store_original(&mut self, original: Attributes) {
        self.original = original;
    }

    /// Take the current values as the new snapshot.
    pub(crate) fn sync_original(&mut self) {
        self.original = self.attributes.clone();
        self.dirty.clear();
    }
}
