//! Query builder over model partitions and secondary indexes.
//!
//! Filters are positional tuples (see [`Filter`]). At most two are accepted,
//! one on the partition key and one on the sort key of either the base table
//! or a secondary index. When no index is named, the index whose keys cover
//! the filters is picked automatically.
//!
//! ```rust
//! use dynamodb_model::{Db, client::memory::MemoryClient, model::schema::ModelDefinition};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> dynamodb_model::Result<()> {
//! let client = Arc::new(MemoryClient::new());
//! client.create_table("app", "pk", "sk");
//! let db = Db::builder(client)
//!     .model(ModelDefinition::new("Order").table("app").fillable(["total"]))
//!     .build()?;
//!
//! let orders = db.model("Order")?;
//! orders.create(json!({"pk": "CUSTOMER#1", "sk": "ORDER#1", "total": 10})).await?;
//! let result = orders
//!     .filter(("pk", "CUSTOMER#1"))
//!     .filter(("sk", "begins_with", "ORDER#"))
//!     .get()
//!     .await?;
//! assert_eq!(result.len(), 1);
//! # Ok(())
//! # }
//! ```

/// Index selection, filter validation and result hydration.
pub mod engine;

/// Rows and continuation keys returned by queries.
pub mod result;

use crate::{
    common::condition::Filter,
    error::{Error, Result},
    model::{
        Db,
        schema::{EntitySchema, RelationDescriptor, RelationKind},
    },
    read,
};
use result::{LastEvaluatedKey, QueryResult, Row};

use std::sync::Arc;

/// Builds and runs a query against one table.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    pub(crate) db: Db,
    pub(crate) schema: Option<Arc<EntitySchema>>,
    pub(crate) table: Option<String>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) index: Option<String>,
    pub(crate) limit: Option<i32>,
    pub(crate) raw: bool,
    pub(crate) descending: bool,
    pub(crate) with_data: bool,
    pub(crate) relations: Vec<RelationDescriptor>,
    pub(crate) after: Option<LastEvaluatedKey>,
}

impl QueryBuilder {
    pub(crate) fn new(db: Db, schema: Option<Arc<EntitySchema>>) -> Self {
        Self {
            db,
            schema,
            table: None,
            filters: Vec::new(),
            index: None,
            limit: None,
            raw: false,
            descending: false,
            with_data: false,
            relations: Vec::new(),
            after: None,
        }
    }

    /// Add a key filter.
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Query a named secondary index instead of guessing one.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Maximum number of items read per page.
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return plain attribute maps instead of entities.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Read in ascending sort key order (the default).
    pub fn sort_ascending(mut self) -> Self {
        self.descending = false;
        self
    }

    /// Read in descending sort key order.
    pub fn sort_descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Query `table` instead of the model's table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Re-read every matched item by primary key.
    ///
    /// Useful on indexes that project only some attributes.
    pub fn with_data(mut self) -> Self {
        self.with_data = true;
        self
    }

    /// Load the named relation along with the results.
    ///
    /// Rows of the related type found on the same page are attached to the
    /// first base row; anything else is fetched afterwards. Inline relations
    /// travel with their parent item and need no extra reads.
    pub fn with_relation(mut self, name: &str) -> Result<Self> {
        let invalid = || Error::InvalidRelation {
            model: self
                .schema
                .as_ref()
                .map(|schema| schema.name().to_string())
                .unwrap_or_default(),
            relation: name.to_string(),
        };
        let descriptor = self
            .schema
            .as_ref()
            .and_then(|schema| schema.relation(name))
            .cloned()
            .ok_or_else(invalid)?;
        if matches!(descriptor.kind, RelationKind::External { .. })
            && !self.relations.iter().any(|known| known.name == descriptor.name)
        {
            self.relations.push(descriptor);
        }
        Ok(self)
    }

    /// Resume after a key returned by a previous page.
    pub fn after(mut self, key: LastEvaluatedKey) -> Self {
        self.after = Some(key);
        self
    }

    /// The request the builder would send for its next page.
    pub fn request(&self) -> Result<read::query::Query> {
        engine::build_request(self)
    }

    /// Read one page.
    pub async fn get(&self) -> Result<QueryResult> {
        engine::execute(self).await
    }

    /// Read every page, following continuation keys.
    pub async fn get_all(&self) -> Result<QueryResult> {
        let mut builder = self.clone();
        let mut rows = Vec::new();
        loop {
            let page = engine::execute(&builder).await?;
            rows.extend(page.rows);
            match page.last_evaluated_key {
                Some(key) => builder.after = Some(key),
                None => break,
            }
        }
        Ok(QueryResult {
            rows,
            last_evaluated_key: None,
        })
    }

    /// First matching row, if any.
    pub async fn first(&self) -> Result<Option<Row>> {
        let builder = self.clone().limit(1);
        Ok(engine::execute(&builder).await?.into_rows().into_iter().next())
    }
}
