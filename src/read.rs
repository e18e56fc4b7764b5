//! Read requests issued by the model layer.
//!
//! - Getting a single item by its primary key
//! - Querying a partition with key conditions, one page at a time

/// Arguments shared by read requests.
pub mod common;

/// Get item request for loading a single item by primary key.
pub mod get_item;

/// Query request for loading a page of items matching key conditions.
pub mod query;
