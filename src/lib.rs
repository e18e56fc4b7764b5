#![deny(missing_docs)]

//! # DynamoDB Model
//!
//! A typed object mapper for single-table DynamoDB designs.
//!
//! ## Overview
//!
//! Several entity types share one table, told apart by key prefixes. This
//! crate describes each type once and then:
//! - Maps stored attribute names to entity attribute names and back
//! - Casts values between their stored and in-memory shapes
//! - Tracks which attributes changed, so updates write only those
//! - Validates entities before they are written
//! - Builds key-condition queries and picks a matching secondary index
//! - Loads related entities, either stored as sibling items or packed inline
//!
//! ## Quick Example
//!
//! ```rust
//! use dynamodb_model::{Db, client::memory::MemoryClient, model::schema::ModelDefinition};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> dynamodb_model::Result<()> {
//! let client = Arc::new(MemoryClient::new());
//! client.create_table("app", "pk", "sk");
//!
//! let db = Db::builder(client)
//!     .model(
//!         ModelDefinition::new("Customer")
//!             .table("app")
//!             .fillable(["name"])
//!             .rules("name", "required|string")
//!             .has_many("orders", "Order"),
//!     )
//!     .model(ModelDefinition::new("Order").table("app").parent("Customer").fillable(["total"]))
//!     .build()?;
//!
//! let mut customer = db.model("Customer")?.create(json!({"name": "Jane"})).await?;
//! customer
//!     .relation("orders")?
//!     .save(json!({"sk": "ORDER#1", "total": 42}))
//!     .await?;
//!
//! let mut orders = customer.relation("orders")?;
//! assert_eq!(orders.get().await?.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`mod@model`] - Registry, schemas and entities
//! - [`mod@query`] - Query builder and results
//! - [`mod@relation`] - External and inline relations
//! - [`mod@client`] - Storage clients, for DynamoDB and in memory
//! - [`mod@read`] / [`mod@write`] - Structured requests sent to a client

/// Storage clients the model layer reads from and writes to.
pub mod client;

/// Common utilities for keys, conditions, and expression placeholders.
pub mod common;

/// Connection settings and model defaults, optionally read from the environment.
pub mod config;

/// Error type shared by every operation.
pub mod error;

/// Model registry, schemas and entities.
pub mod model;

/// Query builder and query results.
pub mod query;

/// Read requests for retrieving items from DynamoDB tables.
pub mod read;

/// Relations between entities.
pub mod relation;

/// Write requests for modifying items in DynamoDB tables.
pub mod write;

pub use common::condition::Filter;
pub use error::{Error, Result};
pub use model::{Db, Model, entity::Entity};
pub use query::QueryBuilder;
