use crate::{
    client::{QueryPage, StorageClient},
    common::{self, condition},
    error::{Error, Result},
    model::schema::SecondaryIndex,
    read, write,
};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::{cmp, collections};

/// Request received by a [`MemoryClient`].
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// GetItem.
    GetItem(read::get_item::GetItem),
    /// PutItem.
    PutItem(write::put_item::PutItem),
    /// UpdateItem.
    UpdateItem(write::update_item::UpdateItem),
    /// DeleteItem.
    DeleteItem(write::delete_item::DeleteItem),
    /// Query.
    Query(read::query::Query),
}

#[derive(Clone, Debug)]
struct MemoryTable {
    indexes: IndexMap<String, SecondaryIndex>,
    items: Vec<common::Item>,
    partition_key: String,
    sort_key: String,
}

impl MemoryTable {
    fn key_names(&self) -> [&str; 2] {
        [&self.partition_key, &self.sort_key]
    }

    fn position(&self, keys: &common::Item) -> Option<usize> {
        self.items.iter().position(|item| {
            self.key_names()
                .iter()
                .all(|name| item.get(*name).is_some() && item.get(*name) == keys.get(*name))
        })
    }
}

fn unmarshall(value: &AttributeValue) -> Result<Value> {
    Ok(serde_dynamo::from_attribute_value(value.clone())?)
}

fn invalid(operation: &'static str, message: impl Into<String>) -> Error {
    Error::query_execution(operation, message.into())
}

fn set_path(
    item: &mut common::Item,
    path: &[String],
    value: AttributeValue,
) -> std::result::Result<(), String> {
    let Some((first, rest)) = path.split_first() else {
        return Err("empty attribute path".to_string());
    };
    let Some((last, parents)) = rest.split_last() else {
        item.insert(first.clone(), value);
        return Ok(());
    };
    let mut container = item.get_mut(first);
    for parent in parents {
        container = match container {
            Some(AttributeValue::M(map)) => map.get_mut(parent),
            _ => None,
        };
    }
    match container {
        Some(AttributeValue::M(map)) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        _ => Err(format!(
            "the document path `{}` is invalid for update",
            path.join(".")
        )),
    }
}

/// In-process [`StorageClient`] holding tables in memory.
///
/// Key conditions are evaluated with [`condition::Comparison::matches`], pages
/// honour `Limit` and `ExclusiveStartKey`, and every request is recorded.
///
/// ```rust
/// use dynamodb_model::client::memory::MemoryClient;
///
/// let client = MemoryClient::new();
/// client.create_table("default", "pk", "sk");
/// assert_eq!(client.request_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryClient {
    requests: Mutex<Vec<Request>>,
    tables: Mutex<collections::HashMap<String, MemoryTable>>,
}

impl MemoryClient {
    /// Empty store without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table with its primary key attributes.
    pub fn create_table(
        &self,
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) {
        self.tables.lock().insert(
            name.into(),
            MemoryTable {
                indexes: IndexMap::new(),
                items: Vec::new(),
                partition_key: partition_key.into(),
                sort_key: sort_key.into(),
            },
        );
    }

    /// Register a secondary index on an existing table.
    pub fn create_index(&self, table: &str, name: impl Into<String>, index: SecondaryIndex) {
        if let Some(table) = self.tables.lock().get_mut(table) {
            table.indexes.insert(name.into(), index);
        }
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Stored item under `keys`, bypassing the request log.
    pub fn item(&self, table: &str, keys: &common::Item) -> Option<common::Item> {
        let tables = self.tables.lock();
        let table = tables.get(table)?;
        table.position(keys).map(|position| table.items[position].clone())
    }

    fn record(&self, request: Request) {
        self.requests.lock().push(request);
    }

    fn with_table<T>(
        &self,
        operation: &'static str,
        name: &str,
        f: impl FnOnce(&mut MemoryTable) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| invalid(operation, format!("table `{name}` does not exist")))?;
        f(table)
    }
}

#[async_trait]
impl StorageClient for MemoryClient {
    async fn get_item(&self, request: read::get_item::GetItem) -> Result<Option<common::Item>> {
        self.record(Request::GetItem(request.clone()));
        let keys: common::Item = request.keys.try_into()?;
        self.with_table("get_item", &request.single_read_args.table_name, |table| {
            Ok(table
                .position(&keys)
                .map(|position| table.items[position].clone()))
        })
    }

    async fn put_item(&self, request: write::put_item::PutItem) -> Result<()> {
        self.record(Request::PutItem(request.clone()));
        self.with_table("put_item", &request.write_args.table_name, |table| {
            for name in table.key_names() {
                if !request.item.contains_key(name) {
                    return Err(invalid(
                        "put_item",
                        format!("missing key attribute `{name}`"),
                    ));
                }
            }
            match table.position(&request.item) {
                Some(position) => table.items[position] = request.item,
                None => table.items.push(request.item),
            }
            Ok(())
        })
    }

    async fn update_item(&self, request: write::update_item::UpdateItem) -> Result<()> {
        self.record(Request::UpdateItem(request.clone()));
        let keys: common::Item = request.keys.try_into()?;
        self.with_table("update_item", &request.write_args.table_name, |table| {
            let position = table.position(&keys);
            let mut item = match position {
                Some(position) => table.items[position].clone(),
                None => keys,
            };
            for action in request.set {
                set_path(&mut item, &action.path, action.value)
                    .map_err(|message| invalid("update_item", message))?;
            }
            match position {
                Some(position) => table.items[position] = item,
                None => table.items.push(item),
            }
            Ok(())
        })
    }

    async fn delete_item(&self, request: write::delete_item::DeleteItem) -> Result<()> {
        self.record(Request::DeleteItem(request.clone()));
        let keys: common::Item = request.keys.try_into()?;
        self.with_table("delete_item", &request.write_args.table_name, |table| {
            if let Some(position) = table.position(&keys) {
                table.items.remove(position);
            }
            Ok(())
        })
    }

    async fn query(&self, request: read::query::Query) -> Result<QueryPage> {
        self.record(Request::Query(request.clone()));
        let args = &request.multiple_read_args;
        self.with_table("query", &args.table_name, |table| {
            let (partition_key, sort_key) = match &args.index_name {
                Some(index_name) => {
                    let index = table.indexes.get(index_name).ok_or_else(|| {
                        invalid("query", format!("index `{index_name}` does not exist"))
                    })?;
                    (index.partition_key.clone(), index.sort_key.clone())
                }
                None => (table.partition_key.clone(), table.sort_key.clone()),
            };
            if !request
                .key_conditions
                .iter()
                .any(|comparison| comparison.name == partition_key)
            {
                return Err(invalid(
                    "query",
                    format!("key condition must name partition key `{partition_key}`"),
                ));
            }
            for comparison in &request.key_conditions {
                let on_partition_key = comparison.name == partition_key
                    && matches!(comparison.condition, condition::Condition::Equals(_));
                if !on_partition_key && comparison.name != sort_key {
                    return Err(invalid(
                        "query",
                        format!("unsupported key condition on `{}`", comparison.name),
                    ));
                }
            }

            let mut matched = Vec::new();
            'items: for item in &table.items {
                let (Some(partition), Some(sort)) = (item.get(&partition_key), item.get(&sort_key))
                else {
                    continue;
                };
                for comparison in &request.key_conditions {
                    let value = if comparison.name == partition_key {
                        partition
                    } else {
                        sort
                    };
                    if !comparison.matches(&unmarshall(value)?) {
                        continue 'items;
                    }
                }
                matched.push((unmarshall(sort)?, item));
            }
            matched.sort_by(|(left, _), (right, _)| {
                condition::compare_values(left, right).unwrap_or(cmp::Ordering::Equal)
            });
            if request.scan_index_forward == Some(false) {
                matched.reverse();
            }

            let mut start = 0;
            if let Some(exclusive_start_key) = &args.exclusive_start_key {
                let mut start_key = common::Item::with_capacity(exclusive_start_key.len());
                for (name, value) in exclusive_start_key {
                    start_key.insert(name.clone(), serde_dynamo::to_attribute_value(value)?);
                }
                if let Some(position) = matched.iter().position(|(_, item)| {
                    start_key
                        .iter()
                        .all(|(name, value)| item.get(name) == Some(value))
                }) {
                    start = position + 1;
                }
            }
            let remaining = &matched[start.min(matched.len())..];
            let limit = args
                .limit
                .and_then(|limit| usize::try_from(limit).ok())
                .unwrap_or(remaining.len());
            let page: Vec<common::Item> = remaining
                .iter()
                .take(limit)
                .map(|(_, item)| (*item).clone())
                .collect();

            let last_evaluated_key = if remaining.len() > page.len() {
                page.last().map(|item| {
                    [
                        table.partition_key.as_str(),
                        table.sort_key.as_str(),
                        partition_key.as_str(),
                        sort_key.as_str(),
                    ]
                    .into_iter()
                        .filter_map(|name| {
                            item.get(name).map(|value| (name.to_string(), value.clone()))
                        })
                        .collect()
                })
            } else {
                None
            };
            Ok(QueryPage {
                items: page,
                last_evaluated_key,
            })
        })
    }
}
