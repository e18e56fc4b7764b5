use crate::{
    common::{self, key},
    error::{Error, Result},
    model::{
        Db,
        attributes::{AttributeStore, Attributes, IntoAttributes},
        schema::{EntitySchema, FieldKind, RelationKind},
    },
    relation::{self, Relation, RelationRegistry},
    write,
};

use serde_json::Value;
use std::sync::Arc;

pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One item of a model type, with its attributes and relation caches.
///
/// Entities come from [`Model::make`](crate::model::Model::make) (new, every
/// attribute dirty) or from reads (loaded, nothing dirty).
#[derive(Clone, Debug)]
pub struct Entity {
    pub(crate) db: Db,
    pub(crate) schema: Arc<EntitySchema>,
    pub(crate) attributes: AttributeStore,
    pub(crate) relations: RelationRegistry,
}

impl Entity {
    /// Build an entity: map stored names, apply defaults and generated keys,
    /// snapshot when `loading`, then fill with the key attributes first.
    pub(crate) fn new(
        db: Db,
        schema: Arc<EntitySchema>,
        attributes: Attributes,
        loading: bool,
    ) -> Result<Self> {
        let mut mapped: Attributes = attributes
            .into_iter()
            .map(|(name, value)| (schema.mapped_name(&name).to_string(), value))
            .collect();
        let mut relations = RelationRegistry::default();

        for (name, value) in schema.default_values() {
            let name = schema.mapped_name(name);
            match schema.field_kind(name) {
                Some(FieldKind::Attribute) => {
                    if !mapped.contains_key(name) {
                        mapped.insert(name.to_string(), value.clone());
                    }
                }
                Some(FieldKind::Relation(descriptor)) => relations.register(&descriptor.name),
                None => {}
            }
        }

        let partition_key = schema.mapped_name(schema.partition_key(None)).to_string();
        if !mapped.contains_key(&partition_key) {
            mapped.insert(partition_key, schema.default_partition_key());
        }
        let sort_key = schema.mapped_name(schema.sort_key(None)).to_string();
        if !mapped.contains_key(&sort_key) {
            mapped.insert(sort_key, schema.default_sort_key());
        }

        let mut entity = Self {
            db,
            schema,
            attributes: AttributeStore::default(),
            relations,
        };
        if loading {
            entity.attributes.store_original(mapped.clone());
        }
        entity.fill_attributes(mapped)?;
        Ok(entity)
    }

    /// Decode a stored item into a loaded entity.
    pub(crate) fn hydrate(db: Db, schema: Arc<EntitySchema>, item: common::Item) -> Result<Self> {
        let mut attributes = Attributes::with_capacity(item.len());
        for (storage, raw) in item {
            let name = schema.mapped_name(&storage).to_string();
            let value = schema.decode(&name, raw)?;
            attributes.insert(name, value);
        }
        Self::new(db, schema, attributes, true)
    }

    /// Resolved schema of the entity's model.
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Registry the entity belongs to.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Model type name.
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// Table the entity is stored in.
    pub fn table(&self) -> &str {
        self.schema.table()
    }

    /// Attribute values, snapshot and dirty set.
    pub fn store(&self) -> &AttributeStore {
        &self.attributes
    }

    /// Current attribute values without the hidden ones.
    pub fn attributes(&self) -> Attributes {
        self.attributes
            .all()
            .iter()
            .filter(|(name, _)| !self.schema.is_hidden(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Whether `name` changed since the entity was loaded or last written.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.attributes.is_dirty(name)
    }

    /// Value of the fillable attribute `name`.
    ///
    /// Relations are not attributes: read them through
    /// [`relation`](Self::relation), which loads them on first access.
    pub fn get(&self, name: &str) -> Result<Option<&Value>> {
        if self.schema.is_fillable(name) {
            Ok(self.attributes.get(name))
        } else {
            Err(self.not_fillable(name))
        }
    }

    /// Assign a fillable attribute, or add children to an inline relation.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let schema = Arc::clone(&self.schema);
        match schema.field_kind(name) {
            Some(FieldKind::Attribute) => {
                self.attributes.set(name, value);
                Ok(())
            }
            Some(FieldKind::Relation(descriptor))
                if matches!(descriptor.kind, RelationKind::Inline { .. }) =>
            {
                relation::inline::assign(self, descriptor, value)
            }
            _ => Err(self.not_fillable(name)),
        }
    }

    /// Assign several attributes, mapping stored names first.
    pub fn fill(&mut self, attributes: impl IntoAttributes) -> Result<()> {
        self.fill_attributes(attributes.into_attributes()?)
    }

    fn fill_attributes(&mut self, attributes: Attributes) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let mut attributes: Attributes = attributes
            .into_iter()
            .map(|(name, value)| (schema.mapped_name(&name).to_string(), value))
            .collect();
        for key in [schema.partition_key(None), schema.sort_key(None)] {
            let key = schema.mapped_name(key);
            if let Some(value) = attributes.shift_remove(key) {
                self.set(key, value)?;
            }
        }
        for (name, value) in attributes {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Run the model's validator over one attribute value.
    pub fn validate_attribute(&self, name: &str, value: Option<&Value>) -> Result<()> {
        match self.schema.validator() {
            Some(validator) => validator
                .validate_attribute(name, value)
                .map_err(Error::Validation),
            None => Ok(()),
        }
    }

    pub(crate) fn validate_schema(&self) -> Result<()> {
        match self.schema.validator() {
            Some(validator) => validator
                .validate(self.attributes.all())
                .map_err(Error::Validation),
            None => Ok(()),
        }
    }

    fn not_fillable(&self, name: &str) -> Error {
        Error::PropertyNotFillable {
            model: self.schema.name().to_string(),
            property: name.to_string(),
        }
    }

    /// Current partition key value.
    pub fn partition_key_value(&self) -> Option<&Value> {
        let name = self.schema.mapped_name(self.schema.partition_key(None));
        self.attributes.get(name).filter(|value| !value.is_null())
    }

    /// Current sort key value.
    pub fn sort_key_value(&self) -> Option<&Value> {
        let name = self.schema.mapped_name(self.schema.sort_key(None));
        self.attributes.get(name).filter(|value| !value.is_null())
    }

    /// Name of the attribute keying the entity inside its parent, for inline children.
    pub fn unique_key_name(&self) -> Option<&str> {
        self.schema
            .inline()
            .map(|inline| inline.unique_key.as_str())
    }

    /// Identity used to deduplicate relation collections: the unique key
    /// attribute for inline children, `partition.sort` otherwise.
    pub fn unique_key(&self) -> String {
        match self.schema.inline() {
            Some(inline) => self
                .attributes
                .get(&inline.unique_key)
                .map(value_text)
                .unwrap_or_default(),
            None => format!(
                "{}.{}",
                self.partition_key_value().map(value_text).unwrap_or_default(),
                self.sort_key_value().map(value_text).unwrap_or_default()
            ),
        }
    }

    /// Primary key of the entity, failing when either part is missing.
    pub fn keys(&self) -> Result<key::Keys<Value>> {
        let partition_key = self.schema.partition_key(None);
        let partition_value =
            self.partition_key_value()
                .cloned()
                .ok_or_else(|| Error::PartitionKeyNotSet {
                    model: self.schema.name().to_string(),
                    key: partition_key.to_string(),
                })?;
        let sort_key = self.schema.sort_key(None);
        let sort_value = self
            .sort_key_value()
            .cloned()
            .ok_or_else(|| Error::SortKeyNotSet {
                model: self.schema.name().to_string(),
                key: sort_key.to_string(),
            })?;
        Ok(key::Keys::composite(
            key::Key::new(partition_key, partition_value),
            key::Key::new(sort_key, sort_value),
        ))
    }

    /// Relation `name` of this entity.
    pub fn relation(&mut self, name: &str) -> Result<Relation<'_>> {
        let descriptor = self
            .schema
            .relation(name)
            .cloned()
            .ok_or_else(|| Error::InvalidRelation {
                model: self.schema.name().to_string(),
                relation: name.to_string(),
            })?;
        self.relations.register(&descriptor.name);
        Ok(Relation::new(self, descriptor))
    }

    /// Relation caches of this entity.
    pub fn relations(&self) -> &RelationRegistry {
        &self.relations
    }

    /// Full stored form: every attribute under its stored name, cast for
    /// storage, with registered inline relations packed into their fields.
    pub(crate) fn pack(&self) -> Result<common::Item> {
        let mut item = common::Item::with_capacity(self.attributes.all().len());
        for (name, value) in self.attributes.all() {
            let storage = self.schema.reverse_mapped_name(name);
            item.insert(storage.to_string(), self.schema.encode(name, value)?);
        }
        for descriptor in self.schema.relations() {
            let RelationKind::Inline { field } = &descriptor.kind else {
                continue;
            };
            let Some(state) = self.relations.state(&descriptor.name) else {
                continue;
            };
            let packed = if state.fetched {
                relation::inline::pack(&state.entities)?
            } else {
                relation::inline::pack(&relation::inline::unpack(self, descriptor)?)?
            };
            item.insert(field.clone(), packed);
        }
        Ok(item)
    }

    /// Write the whole entity, replacing any stored item with the same key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_model.save",
            skip(self),
            fields(model = %self.schema.name()),
            err
        )
    )]
    pub async fn save(&mut self) -> Result<()> {
        self.keys()?;
        self.validate_schema()?;
        let request = write::put_item::PutItem {
            item: self.pack()?,
            write_args: write::common::WriteArgs {
                table_name: self.schema.table().to_string(),
            },
        };
        self.db.put_item(request).await?;
        self.attributes.sync_original();
        Ok(())
    }

    /// Merge `attributes`, then write only the changed non-key attributes.
    ///
    /// Nothing is sent when no non-key attribute changed. On failure the
    /// entity is left exactly as it was before the call.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_model.update",
            skip(self, attributes),
            fields(model = %self.schema.name()),
            err
        )
    )]
    pub async fn update(&mut self, attributes: impl IntoAttributes) -> Result<()> {
        let attributes = attributes.into_attributes()?;
        let snapshot = (self.attributes.clone(), self.relations.clone());
        let result = self.write_changes(attributes).await;
        if result.is_err() {
            (self.attributes, self.relations) = snapshot;
        }
        result
    }

    async fn write_changes(&mut self, attributes: Attributes) -> Result<()> {
        self.fill_attributes(attributes)?;
        self.validate_schema()?;
        let keys = self.keys()?;
        let partition_key = self.schema.partition_key(None);
        let sort_key = self.schema.sort_key(None);

        let mut set = Vec::new();
        for name in self.attributes.dirty_names() {
            let storage = self.schema.reverse_mapped_name(name);
            if storage == partition_key || storage == sort_key {
                continue;
            }
            let Some(value) = self.attributes.get(name) else {
                continue;
            };
            set.push(write::update_item::SetAction::new(
                [storage],
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

    /// Remove the stored item.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_model.delete",
            skip(self),
            fields(model = %self.schema.name()),
            err
        )
    )]
    pub async fn delete(&self) -> Result<()> {
        let request = write::delete_item::DeleteItem {
            keys: self.keys()?,
            write_args: write::common::WriteArgs {
                table_name: self.schema.table().to_string(),
            },
        };
        self.db.delete_item(request).await
    }

    /// Reload from storage, replacing attributes, snapshot and relation caches.
    pub async fn refresh(&mut self) -> Result<()> {
        let keys = self.keys()?;
        let partition_key = keys.partition_key.value;
        let sort_key = keys
            .sort_key
            .map(|sort_key| sort_key.value)
            .unwrap_or_default();
        let fresh = self
            .db
            .find(&self.schema, partition_key.clone(), sort_key.clone())
            .await?
            .ok_or_else(|| Error::NotFound {
                model: self.schema.name().to_string(),
                partition_key,
                sort_key,
            })?;
        self.attributes = fresh.attributes;
        self.relations = fresh.relations;
        Ok(())
    }
}
