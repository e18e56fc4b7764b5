use crate::{
    common,
    error::{Error, Result},
    model::{
        attributes::Attributes,
        entity::{Entity, value_text},
        schema::{InlineChild, RelationDescriptor, RelationKind},
    },
    relation::{self, Related},
    write,
};

use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::to_attribute_value;
use serde_json::{Map, Value};
use std::{collections, sync::Arc};

fn children_of(field: &str, blob: Option<&Value>) -> Result<Map<String, Value>> {
    match blob {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(children)) => Ok(children.clone()),
        Some(Value::String(text)) => match serde_json::from_str(text) {
            Ok(Value::Object(children)) => Ok(children),
            Ok(Value::Null) => Ok(Map::new()),
            Ok(other) => Err(Error::cast(field, format!("expected a map, got {other}"))),
            Err(error) => Err(Error::cast(field, error)),
        },
        Some(other) => Err(Error::cast(field, format!("expected a map, got {other}"))),
    }
}

/// Children decoded from the parent's field, carrying the parent's keys and
/// their unique key recovered from the blob's map keys.
pub(crate) fn unpack(parent: &Entity, descriptor: &RelationDescriptor) -> Result<Vec<Entity>> {
    let RelationKind::Inline { field } = &descriptor.kind else {
        return Ok(Vec::new());
    };
    let schema = parent.db.schema(&descriptor.related)?;
    let blob = parent.store().get(parent.schema().mapped_name(field));
    let children = children_of(field, blob)?;

    let mut entities = Vec::with_capacity(children.len());
    for (unique_key, data) in children {
        let Value::Object(data) = data else {
            return Err(Error::cast(field, format!("child `{unique_key}` is not a map")));
        };
        let mut item = common::Item::with_capacity(data.len() + 3);
        for (name, value) in data {
            item.insert(name, to_attribute_value(value)?);
        }
        if let Some(inline) = schema.inline() {
            item.insert(
                schema.reverse_mapped_name(&inline.unique_key).to_string(),
                AttributeValue::S(unique_key),
            );
        }
        if let Some(partition_key) = parent.partition_key_value() {
            item.insert(
                schema.partition_key(None).to_string(),
                to_attribute_value(partition_key)?,
            );
        }
        if let Some(sort_key) = parent.sort_key_value() {
            item.insert(schema.sort_key(None).to_string(), to_attribute_value(sort_key)?);
        }
        entities.push(Entity::hydrate(parent.db.clone(), Arc::clone(&schema), item)?);
    }
    Ok(entities)
}

/// Parent field value: a map from each child's unique key to its stored form.
pub(crate) fn pack(children: &[Entity]) -> Result<AttributeValue> {
    let mut packed = collections::HashMap::with_capacity(children.len());
    for child in children {
        let unique_key = child.inline_unique_key(child.inline_config()?)?;
        packed.insert(unique_key, AttributeValue::M(child.inline_item()?));
    }
    Ok(AttributeValue::M(packed))
}

/// Add children to an inline relation from a list or a keyed map of child data.
pub(crate) fn assign(
    parent: &mut Entity,
    descriptor: &RelationDescriptor,
    value: Value,
) -> Result<()> {
    let schema = parent.db.schema(&descriptor.related)?;
    let data: Vec<Value> = match value {
        Value::Null => Vec::new(),
        Value::Array(children) => children,
        Value::Object(children) => children
            .into_iter()
            .map(|(unique_key, child)| match (child, schema.inline()) {
                (Value::Object(mut child), Some(inline)) => {
                    child
                        .entry(inline.unique_key.clone())
                        .or_insert(Value::String(unique_key));
                    Value::Object(child)
                }
                (child, _) => child,
            })
            .collect(),
        other => {
            return Err(Error::cast(
                &descriptor.name,
                format!("expected a list or map of children, got {other}"),
            ));
        }
    };

    let mut entities = Vec::with_capacity(data.len());
    for child in data {
        let entity = relation::coerce(parent, descriptor, Related::Data(child))?;
        check_unique_key(&entity)?;
        entities.push(entity);
    }
    if !parent.relations.is_loaded(&descriptor.name) {
        let existing = unpack(parent, descriptor)?;
        let state = parent.relations.state_mut(&descriptor.name);
        state.entities = existing;
        state.fetched = true;
    }
    let state = parent.relations.state_mut(&descriptor.name);
    for entity in entities {
        state.insert(entity);
    }
    Ok(())
}

/// Fails when `entity` has no unique key to be stored under.
pub(crate) fn check_unique_key(entity: &Entity) -> Result<()> {
    entity.inline_unique_key(entity.inline_config()?).map(drop)
}

/// Stamp the parent's keys on `entity` and write it into the parent's field.
pub(crate) async fn save(parent: &Entity, mut entity: Entity) -> Result<Entity> {
    let schema = Arc::clone(&entity.schema);
    if let Some(partition_key) = parent.partition_key_value() {
        entity.set(schema.mapped_name(schema.partition_key(None)), partition_key.clone())?;
    }
    if let Some(sort_key) = parent.sort_key_value() {
        entity.set(schema.mapped_name(schema.sort_key(None)), sort_key.clone())?;
    }
    entity.save_inline_relation().await?;
    Ok(entity)
}

impl Entity {
    fn inline_config(&self) -> Result<&InlineChild> {
        let invalid = |reason: &str| Error::InvalidInlineModel {
            model: self.schema.name().to_string(),
            reason: reason.to_string(),
        };
        let inline = self
            .schema
            .inline()
            .ok_or_else(|| invalid("it is not declared as an inline child"))?;
        if inline.field.is_empty() {
            return Err(invalid("its parent field is empty"));
        }
        Ok(inline)
    }

    fn inline_unique_key(&self, inline: &InlineChild) -> Result<String> {
        match self.attributes.get(&inline.unique_key) {
            Some(value) if !value.is_null() => Ok(value_text(value)),
            _ => Err(Error::InvalidInlineModel {
                model: self.schema.name().to_string(),
                reason: format!("unique key `{}` is not set", inline.unique_key),
            }),
        }
    }

    /// Stored form inside the parent field: everything but the keys and the unique key.
    pub(crate) fn inline_item(&self) -> Result<common::Item> {
        let mut item = self.pack()?;
        item.remove(self.schema.partition_key(None));
        item.remove(self.schema.sort_key(None));
        if let Some(inline) = self.schema.inline() {
            item.remove(self.schema.reverse_mapped_name(&inline.unique_key));
        }
        Ok(item)
    }

    /// Write this inline child into its parent's field, replacing any child
    /// with the same unique key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_model.save_inline_relation",
            skip(self),
            fields(model = %self.schema.name()),
            err
        )
    )]
    pub async fn save_inline_relation(&mut self) -> Result<()> {
        let inline = self.inline_config()?.clone();
        let unique_key = self.inline_unique_key(&inline)?;
        let keys = self.keys()?;
        self.validate_schema()?;
        let action = write::update_item::SetAction::new(
            [inline.field.as_str(), unique_key.as_str()],
            AttributeValue::M(self.inline_item()?),
        );
        let request = write::update_item::UpdateItem {
            keys,
            set: vec![action],
            write_args: write::common::WriteArgs {
                table_name: self.schema.table().to_string(),
            },
        };
        self.db.update_item(request).await?;
        self.attributes.sync_original();
        Ok(())
    }

    /// Write the changed attributes of this inline child into its entry of the
    /// parent's field. Nothing is sent when nothing changed.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_model.update_inline_relation",
            skip(self),
            fields(model = %self.schema.name()),
            err
        )
    )]
    pub async fn update_inline_relation(&mut self) -> Result<()> {
        let inline = self.inline_config()?.clone();
        let unique_key = self.inline_unique_key(&inline)?;
        let keys = self.keys()?;
        self.validate_schema()?;

        let excluded = [
            self.schema.partition_key(None),
            self.schema.sort_key(None),
            self.schema.reverse_mapped_name(&inline.unique_key),
        ];
        let changed: Attributes = self.attributes.dirty();
        let mut set = Vec::with_capacity(changed.len());
        for (name, value) in &changed {
            let storage = self.schema.reverse_mapped_name(name);
            if excluded.contains(&storage) {
                continue;
            }
            set.push(write::update_item::SetAction::new(
                [inline.field.as_str(), unique_key.as_str(), storage],
                self.schema.encode(name, value)?,
            ));
        }
        if set.is_empty() {
            return Ok(());
        }

        let request = write::update_item::UpdateItem {
            keys,
            set,
            write_args: write::common::WriteArgs {
                table_name: self.schema.table().to_string(),
            },
        };
        self.db.update_item(request).await?;
        self.attributes.sync_original();
        Ok(())
    }
}
