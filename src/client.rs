//! Storage boundary between the model layer and DynamoDB.
//!
//! The model layer only ever talks to a [`StorageClient`]. The SDK client
//! implements it directly; [`memory::MemoryClient`] implements it in process.

/// In-process table store.
pub mod memory;

use crate::{
    common, config,
    error::{Error, Result},
    read, write,
};

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    config::{Credentials, Region},
};

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    /// Items in key order.
    pub items: Vec<common::Item>,
    /// Key to resume from, present only when more items remain.
    pub last_evaluated_key: Option<common::Item>,
}

/// Executes typed requests against a store.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Load one item by primary key.
    async fn get_item(&self, request: read::get_item::GetItem) -> Result<Option<common::Item>>;

    /// Create or replace a whole item.
    async fn put_item(&self, request: write::put_item::PutItem) -> Result<()>;

    /// Apply SET actions to an item.
    async fn update_item(&self, request: write::update_item::UpdateItem) -> Result<()>;

    /// Remove an item by primary key.
    async fn delete_item(&self, request: write::delete_item::DeleteItem) -> Result<()>;

    /// Read one page of a key-condition query.
    async fn query(&self, request: read::query::Query) -> Result<QueryPage>;
}

#[async_trait]
impl StorageClient for Client {
    async fn get_item(&self, request: read::get_item::GetItem) -> Result<Option<common::Item>> {
        let output = request
            .send(self)
            .await
            .map_err(|error| Error::query_execution("get_item", error))?;
        Ok(output.item)
    }

    async fn put_item(&self, request: write::put_item::PutItem) -> Result<()> {
        request
            .send(self)
            .await
            .map_err(|error| Error::query_execution("put_item", error))?;
        Ok(())
    }

    async fn update_item(&self, request: write::update_item::UpdateItem) -> Result<()> {
        request
            .send(self)
            .await
            .map_err(|error| Error::query_execution("update_item", error))?;
        Ok(())
    }

    async fn delete_item(&self, request: write::delete_item::DeleteItem) -> Result<()> {
        request
            .send(self)
            .await
            .map_err(|error| Error::query_execution("delete_item", error))?;
        Ok(())
    }

    async fn query(&self, request: read::query::Query) -> Result<QueryPage> {
        let output = request
            .send(self)
            .await
            .map_err(|error| Error::query_execution("query", error))?;
        Ok(QueryPage {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }
}

/// Build an SDK client from the connection settings.
///
/// ```rust,no_run
/// use dynamodb_model::{client, config::Config};
///
/// # async fn example() {
/// let client = client::connect(&Config::from_env()).await;
/// # let _ = client;
/// # }
/// ```
pub async fn connect(config: &config::Config) -> Client {
    use aws_config::BehaviorVersion;

    let mut aws_config =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.endpoint {
        aws_config = aws_config.endpoint_url(endpoint);
    }
    if let Some(credentials) = &config.credentials {
        aws_config = aws_config.credentials_provider(Credentials::new(
            &credentials.key,
            &credentials.secret,
            None,
            None,
            "dynamodb-model",
        ));
    }
    let sdk_config = aws_config.load().await;
    Client::new(&sdk_config)
}
