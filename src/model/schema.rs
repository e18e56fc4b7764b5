use crate::{
    common::condition::Filter,
    config::Defaults,
    error::{Error, FieldErrors, Result},
    model::{
        cast::{Cast, CastRegistry},
        validation::{RuleValidator, SchemaValidator},
    },
};

use aws_sdk_dynamodb::types::AttributeValue;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Key attributes of a secondary index.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq)]
pub struct SecondaryIndex {
    /// Partition key attribute of the index.
    #[serde(alias = "pk")]
    pub partition_key: String,
    /// Sort key attribute of the index.
    #[serde(alias = "sk")]
    pub sort_key: String,
}

impl SecondaryIndex {
    /// Index keyed on `partition_key` and `sort_key`.
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.partition_key == name || self.sort_key == name
    }
}

/// How related entities are stored.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationKind {
    /// Separate items sharing the parent's partition key, selected by `search`
    /// on the related model's sort key.
    External {
        /// Sort key filter identifying related rows.
        search: Filter,
    },
    /// Children packed into one map attribute of the parent item.
    Inline {
        /// Storage name of the parent attribute holding the children.
        field: String,
    },
}

/// Named relation from one model to another.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationDescriptor {
    /// Relation name, as used by `relation()` and `with_relation()`.
    pub name: String,
    /// Name of the related model.
    pub related: String,
    /// Storage strategy.
    pub kind: RelationKind,
}

/// Inline child configuration: where a model lives inside its parent item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InlineChild {
    /// Parent attribute holding the children.
    pub field: String,
    /// Attribute whose value keys the child inside `field`.
    pub unique_key: String,
}

/// What a name refers to on an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldKind<'a> {
    /// Fillable attribute.
    Attribute,
    /// Declared relation.
    Relation(&'a RelationDescriptor),
}

#[derive(Clone, Debug)]
struct DeclaredRelation {
    name: String,
    related: String,
    search: Option<Filter>,
    field: Option<String>,
}

/// Declarative description of a model, registered on a [`DbBuilder`](crate::model::DbBuilder).
///
/// Anything left unset falls back to the [`Defaults`] of the builder's configuration.
///
/// ```rust
/// use dynamodb_model::model::schema::ModelDefinition;
///
/// let definition = ModelDefinition::new("Order")
///     .table("shop")
///     .fillable(["pk", "sk", "total"])
///     .field_mapping("sk", "order_id")
///     .cast("total", "json");
/// # let _ = definition;
/// ```
#[derive(Clone, Debug)]
pub struct ModelDefinition {
    name: String,
    table: Option<String>,
    parent: Option<String>,
    partition_key: Option<String>,
    sort_key: Option<String>,
    consistent_read: Option<bool>,
    secondary_indexes: Option<IndexMap<String, SecondaryIndex>>,
    field_mappings: IndexMap<String, String>,
    fillable: IndexSet<String>,
    hidden: IndexSet<String>,
    defaults: IndexMap<String, Value>,
    default_sort_key: Option<Value>,
    casts: IndexMap<String, Cast>,
    rules: IndexMap<String, String>,
    validator: Option<Arc<dyn SchemaValidator>>,
    relations: Vec<DeclaredRelation>,
    inline: Option<InlineChild>,
}

impl ModelDefinition {
    /// Empty definition for the model type `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            parent: None,
            partition_key: None,
            sort_key: None,
            consistent_read: None,
            secondary_indexes: None,
            field_mappings: IndexMap::new(),
            fillable: IndexSet::new(),
            hidden: IndexSet::new(),
            defaults: IndexMap::new(),
            default_sort_key: None,
            casts: IndexMap::new(),
            rules: IndexMap::new(),
            validator: None,
            relations: Vec::new(),
            inline: None,
        }
    }

    /// Model type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table the model is stored in. Ignored when a parent is set.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Parent model whose table and key prefix this model shares.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Partition key attribute.
    pub fn partition_key(mut self, name: impl Into<String>) -> Self {
        self.partition_key = Some(name.into());
        self
    }

    /// Sort key attribute.
    pub fn sort_key(mut self, name: impl Into<String>) -> Self {
        self.sort_key = Some(name.into());
        self
    }

    /// Strongly consistent reads against the base table.
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Declare a secondary index. The first call replaces the configured defaults.
    pub fn secondary_index(mut self, name: impl Into<String>, index: SecondaryIndex) -> Self {
        self.secondary_indexes
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), index);
        self
    }

    /// Expose the stored attribute `storage` as `attribute`.
    pub fn field_mapping(
        mut self,
        storage: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        self.field_mappings.insert(storage.into(), attribute.into());
        self
    }

    /// Attributes that may be read and written.
    pub fn fillable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable.extend(names.into_iter().map(Into::into));
        self
    }

    /// Attributes left out of the serialized form.
    pub fn hidden<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden.extend(names.into_iter().map(Into::into));
        self
    }

    /// Value applied at construction when `name` is absent.
    ///
    /// When `name` is a relation, the relation is registered instead.
    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    /// Sort key value for new entities, instead of the upper-cased type name.
    pub fn default_sort_key(mut self, value: impl Into<Value>) -> Self {
        self.default_sort_key = Some(value.into());
        self
    }

    /// Cast applied to `name`, by tag (`json`, `set:string`, `codec:<name>`, ...).
    pub fn cast(mut self, name: impl Into<String>, cast: impl Into<Cast>) -> Self {
        self.casts.insert(name.into(), cast.into());
        self
    }

    /// Validation rules for `name`, as a `|` separated list (`required|string|max:255`).
    pub fn rules(mut self, name: impl Into<String>, rules: impl Into<String>) -> Self {
        self.rules.insert(name.into(), rules.into());
        self
    }

    /// Custom validator, replacing any [`rules`](Self::rules).
    pub fn validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// External relation selecting related rows whose sort key begins with the
    /// related type name, upper-cased and followed by `#`.
    pub fn has_many(mut self, name: impl Into<String>, related: impl Into<String>) -> Self {
        self.relations.push(DeclaredRelation {
            name: name.into(),
            related: related.into(),
            search: None,
            field: None,
        });
        self
    }

    /// External relation selecting related rows with an explicit sort key filter.
    pub fn has_many_matching(
        mut self,
        name: impl Into<String>,
        related: impl Into<String>,
        search: impl Into<Filter>,
    ) -> Self {
        self.relations.push(DeclaredRelation {
            name: name.into(),
            related: related.into(),
            search: Some(search.into()),
            field: None,
        });
        self
    }

    /// Inline relation packing related entities into the attribute `field`.
    pub fn inline_many(
        mut self,
        name: impl Into<String>,
        related: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.relations.push(DeclaredRelation {
            name: name.into(),
            related: related.into(),
            search: None,
            field: Some(field.into()),
        });
        self
    }

    /// Declare this model as an inline child stored under `field` of its parent,
    /// keyed by the value of `unique_key`.
    pub fn inline_child(mut self, field: impl Into<String>, unique_key: impl Into<String>) -> Self {
        self.inline = Some(InlineChild {
            field: field.into(),
            unique_key: unique_key.into(),
        });
        self
    }
}

/// Resolved model schema, shared by every entity of one model type.
#[derive(Clone, Debug)]
pub struct EntitySchema {
    name: String,
    table: String,
    parent: Option<String>,
    partition_key: String,
    sort_key: String,
    consistent_read: bool,
    secondary_indexes: IndexMap<String, SecondaryIndex>,
    field_mappings: IndexMap<String, String>,
    fillable: IndexSet<String>,
    hidden: IndexSet<String>,
    defaults: IndexMap<String, Value>,
    default_sort_key: Option<Value>,
    casts: IndexMap<String, Cast>,
    codecs: Arc<CastRegistry>,
    validator: Option<Arc<dyn SchemaValidator>>,
    relations: IndexMap<String, RelationDescriptor>,
    inline: Option<InlineChild>,
}

impl EntitySchema {
    /// Model type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table the model is stored in.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Parent model, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Partition key storage name of `index`, or of the base table.
    pub fn partition_key(&self, index: Option<&str>) -> &str {
        match index.and_then(|index| self.secondary_indexes.get(index)) {
            Some(index) => &index.partition_key,
            None => &self.partition_key,
        }
    }

    /// Sort key storage name of `index`, or of the base table.
    pub fn sort_key(&self, index: Option<&str>) -> &str {
        match index.and_then(|index| self.secondary_indexes.get(index)) {
            Some(index) => &index.sort_key,
            None => &self.sort_key,
        }
    }

    /// Whether base table reads are strongly consistent.
    pub fn consistent_read(&self) -> bool {
        self.consistent_read
    }

    /// Secondary indexes in declaration order.
    pub fn secondary_indexes(&self) -> &IndexMap<String, SecondaryIndex> {
        &self.secondary_indexes
    }

    /// Attribute name for a stored name.
    pub fn mapped_name<'a>(&'a self, storage: &'a str) -> &'a str {
        self.field_mappings
            .get(storage)
            .map(String::as_str)
            .unwrap_or(storage)
    }

    /// Stored name for an attribute name.
    pub fn reverse_mapped_name<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.field_mappings
            .iter()
            .find(|(_, mapped)| mapped.as_str() == attribute)
            .map(|(storage, _)| storage.as_str())
            .unwrap_or(attribute)
    }

    /// Whether `name` may be read and written as an attribute.
    pub fn is_fillable(&self, name: &str) -> bool {
        self.fillable.contains(name)
    }

    /// Whether `name` is left out of the serialized form.
    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.contains(name)
    }

    /// What `name` refers to, if anything.
    pub fn field_kind(&self, name: &str) -> Option<FieldKind<'_>> {
        if self.is_fillable(name) {
            Some(FieldKind::Attribute)
        } else {
            self.relations.get(name).map(FieldKind::Relation)
        }
    }

    /// Declared relation `name`.
    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Declared relations in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &RelationDescriptor> {
        self.relations.values()
    }

    /// Inline child configuration, when the model lives inside a parent item.
    pub fn inline(&self) -> Option<&InlineChild> {
        self.inline.as_ref()
    }

    /// Construction defaults.
    pub fn default_values(&self) -> &IndexMap<String, Value> {
        &self.defaults
    }

    /// Upper-cased type name, used in generated keys and relation searches.
    pub fn type_prefix(&self) -> String {
        self.name.to_uppercase()
    }

    /// Partition key value for a new entity: the upper-cased parent type name
    /// (or own type name) followed by `#` and a time-ordered UUID.
    pub fn default_partition_key(&self) -> Value {
        let prefix = self.parent.as_deref().unwrap_or(&self.name).to_uppercase();
        Value::String(format!("{prefix}#{}", uuid::Uuid::now_v7()))
    }

    /// Sort key value for a new entity.
    pub fn default_sort_key(&self) -> Value {
        self.default_sort_key
            .clone()
            .unwrap_or_else(|| Value::String(self.type_prefix()))
    }

    /// Cast declared on `name`.
    pub fn cast(&self, name: &str) -> Option<&Cast> {
        self.casts.get(name)
    }

    /// Decode a stored value of attribute `name`.
    pub fn decode(&self, name: &str, raw: AttributeValue) -> Result<Value> {
        match self.casts.get(name) {
            Some(cast) => cast.decode(name, raw, &self.codecs),
            None => Ok(serde_dynamo::from_attribute_value(raw)?),
        }
    }

    /// Encode attribute `name` for storage.
    pub fn encode(&self, name: &str, value: &Value) -> Result<AttributeValue> {
        match self.casts.get(name) {
            Some(cast) => cast.encode(name, value, &self.codecs),
            None => Ok(serde_dynamo::to_attribute_value(value)?),
        }
    }

    /// Validator applied before writes.
    pub fn validator(&self) -> Option<&dyn SchemaValidator> {
        self.validator.as_deref()
    }
}

fn resolve_table(
    name: &str,
    definitions: &IndexMap<String, ModelDefinition>,
    defaults: &Defaults,
) -> Result<(String, Option<String>)> {
    let mut current = definitions
        .get(name)
        .ok_or_else(|| Error::UnknownModel(name.to_string()))?;
    let parent = current.parent.clone();
    // A parent chain longer than the number of models must contain a cycle.
    for _ in 0..=definitions.len() {
        match &current.parent {
            Some(parent) => {
                current = definitions
                    .get(parent)
                    .ok_or_else(|| Error::UnknownModel(parent.clone()))?;
            }
            None => {
                let table = current.table.clone().unwrap_or_else(|| defaults.table.clone());
                return Ok((table, parent));
            }
        }
    }
    Err(Error::InvalidRelation {
        model: name.to_string(),
        relation: "parent".to_string(),
    })
}

fn resolve_validator(definition: &mut ModelDefinition) -> Result<Option<Arc<dyn SchemaValidator>>> {
    if let Some(validator) = definition.validator.take() {
        return Ok(Some(validator));
    }
    if definition.rules.is_empty() {
        return Ok(None);
    }
    let mut validator = RuleValidator::default();
    let mut errors = FieldErrors::default();
    for (name, rules) in &definition.rules {
        if let Err(message) = validator.add_rules(name, rules) {
            errors.push(name, message);
        }
    }
    if errors.is_empty() {
        Ok(Some(Arc::new(validator)))
    } else {
        Err(Error::Validation(errors))
    }
}

/// Resolve definitions against the configured defaults, checking that every
/// parent and relation target is registered.
pub(crate) fn resolve(
    definitions: Vec<ModelDefinition>,
    defaults: &Defaults,
    codecs: CastRegistry,
) -> Result<IndexMap<String, Arc<EntitySchema>>> {
    let definitions: IndexMap<String, ModelDefinition> = definitions
        .into_iter()
        .map(|definition| (definition.name.clone(), definition))
        .collect();
    let codecs = Arc::new(codecs);
    let sort_key_of = |name: &str| -> Result<String> {
        definitions
            .get(name)
            .map(|definition| {
                definition
                    .sort_key
                    .clone()
                    .unwrap_or_else(|| defaults.sort_key.clone())
            })
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    };

    let mut schemas = IndexMap::with_capacity(definitions.len());
    for (name, definition) in &definitions {
        let (table, parent) = resolve_table(name, &definitions, defaults)?;
        let mut definition = definition.clone();
        let validator = resolve_validator(&mut definition)?;

        let mut relations = IndexMap::with_capacity(definition.relations.len());
        for declared in definition.relations {
            let kind = match declared.field {
                Some(field) => {
                    if !definitions.contains_key(&declared.related) {
                        return Err(Error::UnknownModel(declared.related));
                    }
                    RelationKind::Inline { field }
                }
                None => {
                    let related_sort_key = sort_key_of(&declared.related)?;
                    let search = declared.search.unwrap_or_else(|| {
                        Filter::from((
                            related_sort_key,
                            "begins_with",
                            format!("{}#", declared.related.to_uppercase()),
                        ))
                    });
                    RelationKind::External { search }
                }
            };
            relations.insert(
                declared.name.clone(),
                RelationDescriptor {
                    name: declared.name,
                    related: declared.related,
                    kind,
                },
            );
        }

        let partition_key = definition
            .partition_key
            .unwrap_or_else(|| defaults.partition_key.clone());
        let sort_key = definition
            .sort_key
            .unwrap_or_else(|| defaults.sort_key.clone());
        // Key attributes are always fillable under their mapped names.
        let mut fillable = definition.fillable;
        for key in [&partition_key, &sort_key] {
            let mapped = definition.field_mappings.get(key).unwrap_or(key);
            fillable.insert(mapped.clone());
        }

        let schema = EntitySchema {
            name: name.clone(),
            table,
            parent,
            partition_key,
            sort_key,
            consistent_read: definition
                .consistent_read
                .unwrap_or(defaults.consistent_read),
            secondary_indexes: definition
                .secondary_indexes
                .unwrap_or_else(|| defaults.secondary_indexes.clone()),
            field_mappings: definition.field_mappings,
            fillable,
            hidden: definition.hidden,
            defaults: definition.defaults,
            default_sort_key: definition.default_sort_key,
            casts: definition.casts,
            codecs: Arc::clone(&codecs),
            validator,
            relations,
            inline: definition.inline,
        };
        schemas.insert(name.clone(), Arc::new(schema));
    }
    Ok(schemas)
}

impl EntitySchema {
    /// Indexes whose key attributes cover stored names, in declaration order.
    pub(crate) fn index_key_matches<'a>(
        &'a self,
        names: &'a [&'a str],
    ) -> impl Iterator<Item = (&'a str, usize)> + 'a {
        self.secondary_indexes.iter().map(move |(index, keys)| {
            let matches = names.iter().filter(|name| keys.contains(name)).count();
            (index.as_str(), matches)
        })
    }
}
