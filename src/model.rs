//! Entities, their schemas, and the registry that binds them to a store.
//!
//! A [`Db`] is built once from a [`StorageClient`], a [`Config`] and a set of
//! [`ModelDefinition`](schema::ModelDefinition)s. Every definition is resolved
//! into an immutable [`EntitySchema`](schema::EntitySchema) at build time; a
//! [`Model`] handle then creates, loads and queries entities of one type.

/// Attribute values and dirty tracking.
pub mod attributes;

/// Per-attribute casts and custom codecs.
pub mod cast;

/// Entity instances and their persistence operations.
pub mod entity;

/// Model definitions and resolved schemas.
pub mod schema;

/// Attribute validation.
pub mod validation;

use crate::{
    client::{self, QueryPage, StorageClient},
    common::{self, condition::Filter, key},
    config::Config,
    error::{Error, Result},
    model::{
        attributes::IntoAttributes,
        cast::{AttributeCodec, CastRegistry},
        entity::Entity,
        schema::{EntitySchema, ModelDefinition},
    },
    query::QueryBuilder,
    read, write,
};

use indexmap::IndexMap;
use serde_json::Value;
use std::{fmt, sync::Arc};

struct Inner {
    client: Arc<dyn StorageClient>,
    log_queries: bool,
    schemas: IndexMap<String, Arc<EntitySchema>>,
}

/// Registry of resolved models bound to a storage client.
///
/// Cheap to clone; every entity keeps a handle to the `Db` it came from.
///
/// ```rust
/// use dynamodb_model::{client::memory::MemoryClient, model::{Db, schema::ModelDefinition}};
/// use std::sync::Arc;
///
/// let db = Db::builder(Arc::new(MemoryClient::new()))
///     .model(ModelDefinition::new("User").table("app").fillable(["pk", "sk", "name"]))
///     .build()
///     .unwrap();
/// assert_eq!(db.model("User").unwrap().schema().table(), "app");
/// ```
#[derive(Clone)]
pub struct Db {
    inner: Arc<Inner>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("models", &self.inner.schemas.keys().collect::<Vec<_>>())
            .field("log_queries", &self.inner.log_queries)
            .finish_non_exhaustive()
    }
}

/// Collects models, codecs and configuration for a [`Db`].
pub struct DbBuilder {
    client: Arc<dyn StorageClient>,
    codecs: CastRegistry,
    config: Config,
    definitions: Vec<ModelDefinition>,
}

impl DbBuilder {
    /// Replace the configuration. Defaults to [`Config::default`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register a model. A later definition with the same name replaces an earlier one.
    pub fn model(mut self, definition: ModelDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Register a custom codec, usable with the `codec:<name>` cast tag.
    pub fn codec(mut self, name: impl Into<String>, codec: impl AttributeCodec + 'static) -> Self {
        self.codecs.register(name, codec);
        self
    }

    /// Resolve every definition and build the registry.
    pub fn build(self) -> Result<Db> {
        let schemas = schema::resolve(self.definitions, &self.config.defaults, self.codecs)?;
        Ok(Db {
            inner: Arc::new(Inner {
                client: self.client,
                log_queries: self.config.defaults.log_queries,
                schemas,
            }),
        })
    }
}

impl Db {
    /// Start building a registry on top of `client`.
    pub fn builder(client: Arc<dyn StorageClient>) -> DbBuilder {
        DbBuilder {
            client,
            codecs: CastRegistry::default(),
            config: Config::default(),
            definitions: Vec::new(),
        }
    }

    /// Start building a registry on top of an SDK client configured from `config`.
    pub async fn connect(config: Config) -> DbBuilder {
        let client = client::connect(&config).await;
        Self::builder(Arc::new(client)).config(config)
    }

    /// Handle on the model registered as `name`.
    pub fn model(&self, name: &str) -> Result<Model> {
        Ok(Model {
            db: self.clone(),
            schema: self.schema(name)?,
        })
    }

    /// Names of the registered models.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.inner.schemas.keys().map(String::as_str)
    }

    /// Untyped query against `table`; rows come back raw.
    pub fn table(&self, table: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.clone(), None).table(table)
    }

    /// Underlying storage client.
    pub fn client(&self) -> &dyn StorageClient {
        self.inner.client.as_ref()
    }

    /// Whether outgoing requests are logged.
    pub fn log_queries(&self) -> bool {
        self.inner.log_queries
    }

    pub(crate) fn schema(&self, name: &str) -> Result<Arc<EntitySchema>> {
        self.inner
            .schemas
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn log_request(&self, operation: &'static str, request: &dyn fmt::Debug) {
        #[cfg(feature = "tracing")]
        if self.inner.log_queries {
            tracing::info!(operation, request = ?request, "dynamodb request");
        }
    }

    pub(crate) async fn get_item(
        &self,
        request: read::get_item::GetItem,
    ) -> Result<Option<common::Item>> {
        self.log_request("get_item", &request);
        self.inner.client.get_item(request).await
    }

    pub(crate) async fn put_item(&self, request: write::put_item::PutItem) -> Result<()> {
        self.log_request("put_item", &request);
        self.inner.client.put_item(request).await
    }

    pub(crate) async fn update_item(&self, request: write::update_item::UpdateItem) -> Result<()> {
        self.log_request("update_item", &request);
        self.inner.client.update_item(request).await
    }

    pub(crate) async fn delete_item(&self, request: write::delete_item::DeleteItem) -> Result<()> {
        self.log_request("delete_item", &request);
        self.inner.client.delete_item(request).await
    }

    pub(crate) async fn query(&self, request: read::query::Query) -> Result<QueryPage> {
        self.log_request("query", &request);
        self.inner.client.query(request).await
    }

    pub(crate) async fn find(
        &self,
        schema: &Arc<EntitySchema>,
        partition_key: Value,
        sort_key: Value,
    ) -> Result<Option<Entity>> {
        let request = read::get_item::GetItem {
            keys: key::Keys::composite(
                key::Key::new(schema.partition_key(None), partition_key),
                key::Key::new(schema.sort_key(None), sort_key),
            ),
            single_read_args: read::common::SingleReadArgs {
                consistent_read: Some(schema.consistent_read()),
                table_name: schema.table().to_string(),
            },
        };
        match self.get_item(request).await? {
            Some(item) => Entity::hydrate(self.clone(), Arc::clone(schema), item).map(Some),
            None => Ok(None),
        }
    }
}

/// Handle on one registered model type.
#[derive(Clone, Debug)]
pub struct Model {
    db: Db,
    schema: Arc<EntitySchema>,
}

impl Model {
    /// Resolved schema of this model.
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Registry the model belongs to.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// New, unsaved entity filled with `attributes`.
    pub fn make(&self, attributes: impl IntoAttributes) -> Result<Entity> {
        Entity::new(
            self.db.clone(),
            Arc::clone(&self.schema),
            attributes.into_attributes()?,
            false,
        )
    }

    /// New entity filled with `attributes` and saved.
    pub async fn create(&self, attributes: impl IntoAttributes) -> Result<Entity> {
        let mut entity = self.make(attributes)?;
        entity.save().await?;
        Ok(entity)
    }

    /// Load the entity stored under the key pair, if any.
    pub async fn find(
        &self,
        partition_key: impl Into<Value>,
        sort_key: impl Into<Value>,
    ) -> Result<Option<Entity>> {
        self.db
            .find(&self.schema, partition_key.into(), sort_key.into())
            .await
    }

    /// Load the entity stored under the key pair, failing with [`Error::NotFound`].
    pub async fn find_or_fail(
        &self,
        partition_key: impl Into<Value>,
        sort_key: impl Into<Value>,
    ) -> Result<Entity> {
        let partition_key = partition_key.into();
        let sort_key = sort_key.into();
        self.find(partition_key.clone(), sort_key.clone())
            .await?
            .ok_or_else(|| Error::NotFound {
                model: self.schema.name().to_string(),
                partition_key,
                sort_key,
            })
    }

    /// Query over this model.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.db.clone(), Some(Arc::clone(&self.schema)))
    }

    /// Query over this model starting with one filter.
    pub fn filter(&self, filter: impl Into<Filter>) -> QueryBuilder {
        self.query().filter(filter)
    }

    /// Query over this model against a secondary index.
    pub fn with_index(&self, index: impl Into<String>) -> QueryBuilder {
        self.query().with_index(index)
    }

    /// Query over this model eagerly loading the relation `name`.
    pub fn with_relation(&self, name: &str) -> Result<QueryBuilder> {
        self.query().with_relation(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::memory::{MemoryClient, Request};
    use serde_json::json;

    fn db(client: &Arc<MemoryClient>) -> Db {
        client.create_table("test", "pk", "sk");
        Db::builder(client.clone())
            .model(
                ModelDefinition::new("DemoModel")
                    .table("test")
                    .field_mapping("sk", "mapped")
                    .fillable(["pk", "mapped", "test"])
                    .default_sort_key("DEMO_MODEL"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_model() {
        let client = Arc::new(MemoryClient::new());
        assert!(matches!(db(&client).model("Nope"), Err(Error::UnknownModel(name)) if name == "Nope"));
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let client = Arc::new(MemoryClient::new());
        let model = db(&client).model("DemoModel").unwrap();

        let created = model.create(json!({"pk": "A", "test": "x"})).await.unwrap();
        assert_eq!(created.get("mapped").unwrap(), Some(&json!("DEMO_MODEL")));

        let found = model.find("A", "DEMO_MODEL").await.unwrap().unwrap();
        assert_eq!(found.get("test").unwrap(), Some(&json!("x")));
        assert!(!found.is_dirty("test"));
        assert!(matches!(
            client.requests().last(),
            Some(Request::GetItem(request)) if request.single_read_args.consistent_read == Some(true)
        ));
    }

    #[tokio::test]
    async fn test_find_or_fail() {
        let client = Arc::new(MemoryClient::new());
        let model = db(&client).model("DemoModel").unwrap();
        assert!(model.find("missing", "DEMO_MODEL").await.unwrap().is_none());
        let result = model.find_or_fail("missing", "DEMO_MODEL").await;
        assert!(matches!(
            result,
            Err(Error::NotFound { partition_key, .. }) if partition_key == json!("missing")
        ));
    }
}
