use crate::{
    common::{self, key},
    error::{Error, Result},
    model::{attributes::Attributes, entity::Entity, schema::EntitySchema},
};

use serde_dynamo::from_attribute_value;
use serde_json::Value;
use std::collections;

/// Continuation key of a paginated query: the primary key of the last item read.
#[derive(Clone, Debug, PartialEq)]
pub struct LastEvaluatedKey {
    /// Partition key of the last item.
    pub partition_key: key::Key<Value>,
    /// Sort key of the last item.
    pub sort_key: key::Key<Value>,
}

impl LastEvaluatedKey {
    pub(crate) fn from_item(schema: &EntitySchema, mut item: common::Item) -> Result<Self> {
        let mut take = |name: &str| -> Result<key::Key<Value>> {
            let raw = item.remove(name).ok_or_else(|| {
                Error::InvalidQuery(format!("continuation key is missing `{name}`"))
            })?;
            let value: Value = from_attribute_value(raw)?;
            Ok(key::Key::new(name, value))
        };
        Ok(Self {
            partition_key: take(schema.partition_key(None))?,
            sort_key: take(schema.sort_key(None))?,
        })
    }

    /// Key as an `ExclusiveStartKey` map.
    pub fn to_map(&self) -> collections::HashMap<String, Value> {
        collections::HashMap::from([
            (self.partition_key.name.clone(), self.partition_key.value.clone()),
            (self.sort_key.name.clone(), self.sort_key.value.clone()),
        ])
    }
}

/// One query result row.
#[derive(Clone, Debug)]
pub enum Row {
    /// Row materialized as an entity.
    Entity(Entity),
    /// Row left as plain attribute values, under stored names.
    Raw(Attributes),
}

impl Row {
    /// The entity, for materialized rows.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Raw(_) => None,
        }
    }

    /// The entity, for materialized rows.
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Raw(_) => None,
        }
    }

    /// The attribute values, for raw rows.
    pub fn as_raw(&self) -> Option<&Attributes> {
        match self {
            Self::Raw(attributes) => Some(attributes),
            Self::Entity(_) => None,
        }
    }
}

/// Rows of one query, with the key to resume from.
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    pub(crate) rows: Vec<Row>,
    pub(crate) last_evaluated_key: Option<LastEvaluatedKey>,
}

impl QueryResult {
    /// Rows in key order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows in key order.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Materialized rows.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.rows.iter().filter_map(Row::as_entity)
    }

    /// Materialized rows.
    pub fn into_entities(self) -> Vec<Entity> {
        self.rows.into_iter().filter_map(Row::into_entity).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Key to pass to [`QueryBuilder::after`](crate::query::QueryBuilder::after) for the next page.
    pub fn last_evaluated_key(&self) -> Option<&LastEvaluatedKey> {
        self.last_evaluated_key.as_ref()
    }

    /// Whether another page may follow.
    pub fn has_more_results(&self) -> bool {
        self.last_evaluated_key.is_some()
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
