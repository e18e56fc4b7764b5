use crate::{
    error::{Error, Result},
    model::{entity::Entity, schema::{RelationDescriptor, RelationKind}},
    query::QueryBuilder,
};

use serde_json::Value;

fn parent_key(parent: &Entity) -> Result<Value> {
    parent
        .partition_key_value()
        .cloned()
        .ok_or_else(|| Error::PartitionKeyNotSet {
            model: parent.type_name().to_string(),
            key: parent.schema().partition_key(None).to_string(),
        })
}

/// Query for the related rows: the parent's partition key plus the relation's
/// sort key filter.
pub(crate) fn query(parent: &Entity, descriptor: &RelationDescriptor) -> Result<QueryBuilder> {
    let RelationKind::External { search } = &descriptor.kind else {
        return Err(Error::InvalidRelation {
            model: parent.type_name().to_string(),
            relation: descriptor.name.clone(),
        });
    };
    let related = parent.db().model(&descriptor.related)?;
    Ok(related
        .query()
        .filter((parent.schema().partition_key(None), parent_key(parent)?))
        .filter(search.clone()))
}

/// Every related row, following continuation keys.
pub(crate) async fn fetch(parent: &Entity, descriptor: &RelationDescriptor) -> Result<Vec<Entity>> {
    let result = query(parent, descriptor)?.get_all().await?;
    Ok(result.into_entities())
}

/// Put the parent's partition key on `entity`.
pub(crate) fn stamp_parent_key(parent: &Entity, entity: &mut Entity) -> Result<()> {
    let name = entity
        .schema()
        .mapped_name(entity.schema().partition_key(None))
        .to_string();
    entity.set(&name, parent_key(parent)?)
}

/// Write `entity` as its own item under the parent's partition key.
pub(crate) async fn save(parent: &Entity, mut entity: Entity) -> Result<Entity> {
    let name = parent.schema().partition_key(None).to_string();
    entity.update([(name, parent_key(parent)?)]).await?;
    Ok(entity)
}
