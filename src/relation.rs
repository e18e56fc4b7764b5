//! Relations between entities.
//!
//! An external relation keeps related entities as separate items under the
//! parent's partition key; an inline relation packs them into one map
//! attribute of the parent item. Both are reached through [`Relation`], which
//! loads lazily and caches on the parent entity.

/// Related entities stored as separate items.
pub mod external;

/// Related entities packed into a parent attribute.
pub mod inline;

use crate::{
    error::{Error, Result},
    model::{
        attributes::{Attributes, IntoAttributes},
        entity::Entity,
        schema::{RelationDescriptor, RelationKind},
    },
    query::QueryBuilder,
};

use indexmap::IndexMap;
use serde_json::Value;

/// Entity, or attribute data to build one from.
#[derive(Clone, Debug)]
pub enum Related {
    /// Existing entity of the related model.
    Entity(Entity),
    /// Attributes for a new entity of the related model.
    Data(Value),
}

impl From<Entity> for Related {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Value> for Related {
    fn from(data: Value) -> Self {
        Self::Data(data)
    }
}

impl From<Attributes> for Related {
    fn from(attributes: Attributes) -> Self {
        Self::Data(Value::Object(attributes.into_iter().collect()))
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RelationState {
    pub(crate) fetched: bool,
    pub(crate) entities: Vec<Entity>,
}

impl RelationState {
    /// Append `entity` unless a member with the same unique key is cached.
    pub(crate) fn insert(&mut self, entity: Entity) {
        let unique_key = entity.unique_key();
        if !self
            .entities
            .iter()
            .any(|existing| existing.unique_key() == unique_key)
        {
            self.entities.push(entity);
        }
    }
}

/// Relation caches of one entity, by relation name.
#[derive(Clone, Debug, Default)]
pub struct RelationRegistry {
    entries: IndexMap<String, RelationState>,
}

impl RelationRegistry {
    pub(crate) fn register(&mut self, name: &str) {
        if !self.entries.contains_key(name) {
            self.entries.insert(name.to_string(), RelationState::default());
        }
    }

    pub(crate) fn state(&self, name: &str) -> Option<&RelationState> {
        self.entries.get(name)
    }

    pub(crate) fn state_mut(&mut self, name: &str) -> &mut RelationState {
        self.entries.entry(name.to_string()).or_default()
    }

    /// Whether the relation was accessed or registered by a default.
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether the relation's entities have been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|state| state.fetched)
    }

    /// Cached entities of the relation, empty when not loaded.
    pub fn entities(&self, name: &str) -> &[Entity] {
        self.entries
            .get(name)
            .map(|state| state.entities.as_slice())
            .unwrap_or_default()
    }
}

/// Turn `related` into an entity of the relation's model.
pub(crate) fn coerce(
    parent: &Entity,
    descriptor: &RelationDescriptor,
    related: Related,
) -> Result<Entity> {
    match related {
        Related::Entity(entity) if entity.type_name() == descriptor.related => Ok(entity),
        Related::Entity(_) => Err(Error::InvalidRelation {
            model: parent.type_name().to_string(),
            relation: descriptor.name.clone(),
        }),
        Related::Data(data) => parent
            .db
            .model(&descriptor.related)?
            .make(data.into_attributes()?),
    }
}

/// Relation of one parent entity, borrowed from [`Entity::relation`].
///
/// ```rust
/// use dynamodb_model::{
///     client::memory::MemoryClient,
///     model::{Db, schema::ModelDefinition},
/// };
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> dynamodb_model::Result<()> {
/// let client = Arc::new(MemoryClient::new());
/// client.create_table("shop", "pk", "sk");
/// let db = Db::builder(client)
///     .model(ModelDefinition::new("Order").table("shop").has_many("lines", "Line"))
///     .model(ModelDefinition::new("Line").parent("Order").fillable(["qty"]))
///     .build()?;
///
/// let mut order = db.model("Order")?.create(json!({})).await?;
/// order.relation("lines")?.save(json!({"sk": "LINE#1", "qty": 2})).await?;
/// assert_eq!(order.relation("lines")?.get().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Relation<'a> {
    parent: &'a mut Entity,
    descriptor: RelationDescriptor,
}

impl<'a> Relation<'a> {
    pub(crate) fn new(parent: &'a mut Entity, descriptor: RelationDescriptor) -> Self {
        Self { parent, descriptor }
    }

    /// Declaration of this relation.
    pub fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    /// Whether the related entities have been loaded.
    pub fn is_loaded(&self) -> bool {
        self.parent.relations.is_loaded(&self.descriptor.name)
    }

    async fn load(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let entities = match &self.descriptor.kind {
            RelationKind::External { .. } => external::fetch(self.parent, &self.descriptor).await?,
            RelationKind::Inline { .. } => inline::unpack(self.parent, &self.descriptor)?,
        };
        let state = self.parent.relations.state_mut(&self.descriptor.name);
        state.entities = entities;
        state.fetched = true;
        Ok(())
    }

    /// Related entities, loaded on first access.
    pub async fn get(&mut self) -> Result<&[Entity]> {
        self.load().await?;
        Ok(self.parent.relations.entities(&self.descriptor.name))
    }

    /// Related entities for in-place changes, loaded on first access.
    pub async fn get_mut(&mut self) -> Result<&mut [Entity]> {
        self.load().await?;
        Ok(&mut self.parent.relations.state_mut(&self.descriptor.name).entities)
    }

    /// Add an entity to the cached collection without writing it.
    ///
    /// A never-persisted entity of an external relation gets the parent's
    /// partition key. An inline entity without a unique key is rejected. At
    /// most one entity per unique key is kept.
    pub async fn add(&mut self, related: impl Into<Related>) -> Result<()> {
        self.load().await?;
        let mut entity = coerce(self.parent, &self.descriptor, related.into())?;
        match self.descriptor.kind {
            RelationKind::External { .. } if !entity.store().has_original() => {
                external::stamp_parent_key(self.parent, &mut entity)?;
            }
            RelationKind::External { .. } => {}
            RelationKind::Inline { .. } => inline::check_unique_key(&entity)?,
        }
        self.parent
            .relations
            .state_mut(&self.descriptor.name)
            .insert(entity);
        Ok(())
    }

    /// Write a related entity and add it to the cached collection.
    ///
    /// External entities are written as their own item under the parent's
    /// partition key; inline entities are written into the parent's field.
    pub async fn save(&mut self, related: impl Into<Related>) -> Result<Entity> {
        let entity = coerce(self.parent, &self.descriptor, related.into())?;
        let saved = match &self.descriptor.kind {
            RelationKind::External { .. } => external::save(self.parent, entity).await?,
            RelationKind::Inline { .. } => inline::save(self.parent, entity).await?,
        };
        self.add(saved.clone()).await?;
        Ok(saved)
    }

    /// Drop the cache so the next access reloads.
    pub fn reset(&mut self) {
        let state = self.parent.relations.state_mut(&self.descriptor.name);
        state.fetched = false;
        state.entities.clear();
    }

    /// Query selecting the related rows of an external relation.
    pub fn query(&self) -> Result<QueryBuilder> {
        external::query(self.parent, &self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        client::memory::MemoryClient,
        model::{Db, schema::ModelDefinition},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn db() -> Db {
        let client = Arc::new(MemoryClient::new());
        client.create_table("test", "pk", "sk");
        Db::builder(client)
            .model(
                ModelDefinition::new("DemoModel")
                    .table("test")
                    .fillable(["pk", "sk", "test"]),
            )
            .model(
                ModelDefinition::new("Other")
                    .table("test")
                    .fillable(["pk", "sk"]),
            )
            .model(
                ModelDefinition::new("DemoModelWithRelation")
                    .table("test")
                    .fillable(["pk", "sk", "test"])
                    .has_many("demoModels", "DemoModel"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_relation() {
        let db = db();
        let mut parent = db.model("DemoModelWithRelation").unwrap().make(json!({})).unwrap();
        assert!(matches!(
            parent.relation("nope"),
            Err(Error::InvalidRelation { relation, .. }) if relation == "nope"
        ));
    }

    #[tokio::test]
    async fn test_add_rejects_other_models() {
        let db = db();
        let mut parent = db.model("DemoModelWithRelation").unwrap().make(json!({})).unwrap();
        let other = db.model("Other").unwrap().make(json!({})).unwrap();
        let result = parent.relation("demoModels").unwrap().add(other).await;
        assert!(matches!(result, Err(Error::InvalidRelation { .. })));
    }

    #[tokio::test]
    async fn test_add_deduplicates_and_stamps_parent_key() {
        let db = db();
        let mut parent = db
            .model("DemoModelWithRelation")
            .unwrap()
            .make(json!({"pk": "P"}))
            .unwrap();
        let mut relation = parent.relation("demoModels").unwrap();
        for _ in 0..3 {
            relation
                .add(json!({"sk": "DEMOMODEL#1", "test": "x"}))
                .await
                .unwrap();
        }
        let children = relation.get().await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].partition_key_value(), Some(&json!("P")));
        assert_eq!(children[0].unique_key(), "P.DEMOMODEL#1");
    }

    #[tokio::test]
    async fn test_reset_forgets_cache() {
        let db = db();
        let mut parent = db
            .model("DemoModelWithRelation")
            .unwrap()
            .make(json!({"pk": "P"}))
            .unwrap();
        let mut relation = parent.relation("demoModels").unwrap();
        relation.add(json!({"sk": "DEMOMODEL#1"})).await.unwrap();
        assert!(relation.is_loaded());
        relation.reset();
        assert!(!relation.is_loaded());
        assert!(relation.get().await.unwrap().is_empty());
    }
}
