use crate::{
    common::{
        self,
        condition::{Comparison, ComparisonBuilder, Filter},
    },
    error::{Error, Result},
    model::{
        attributes::Attributes,
        entity::Entity,
        schema::{EntitySchema, RelationDescriptor, RelationKind},
    },
    query::{
        QueryBuilder,
        result::{LastEvaluatedKey, QueryResult, Row},
    },
    read,
};

use serde_dynamo::from_attribute_value;
use serde_json::Value;
use std::sync::Arc;

const MAX_FILTERS: usize = 2;

/// Pick a secondary index whose key attributes cover the filters.
///
/// An index covering every filter wins immediately; otherwise the index
/// covering the most filters wins, ties going to the first declared.
pub(crate) fn guess_index(schema: &EntitySchema, filters: &[Filter]) -> Option<String> {
    let names: Vec<&str> = filters
        .iter()
        .filter_map(Filter::field)
        .map(|field| schema.reverse_mapped_name(field))
        .collect();
    let mut best: Option<(&str, usize)> = None;
    for (index, matches) in schema.index_key_matches(&names) {
        if matches == 0 {
            continue;
        }
        if matches == filters.len() {
            return Some(index.to_string());
        }
        if best.is_none_or(|(_, count)| matches > count) {
            best = Some((index, matches));
        }
    }
    best.map(|(index, _)| index.to_string())
}

/// Check that the filters form a key condition on `index` (or the base table)
/// and parse them into comparisons on stored names.
pub(crate) fn validate_filters(
    schema: Option<&EntitySchema>,
    filters: &[Filter],
    index: Option<&str>,
) -> Result<Vec<Comparison>> {
    if filters.len() > MAX_FILTERS {
        return Err(Error::InvalidQuery(format!(
            "a query takes at most {MAX_FILTERS} filters, got {}",
            filters.len()
        )));
    }
    if filters.is_empty() {
        return Err(Error::InvalidQuery(
            "a query needs a partition key filter".to_string(),
        ));
    }
    let filters: Vec<Filter> = match schema {
        Some(schema) => filters
            .iter()
            .map(|filter| match filter.field() {
                Some(field) => filter.with_field(schema.reverse_mapped_name(field)),
                None => filter.clone(),
            })
            .collect(),
        None => filters.to_vec(),
    };

    if let Some(schema) = schema {
        let partition_key = schema.partition_key(index);
        let sort_key = schema.sort_key(index);
        let fields: Vec<&str> = filters.iter().filter_map(Filter::field).collect();
        for field in &fields {
            let allowed = if filters.len() == 1 {
                *field == partition_key
            } else {
                *field == partition_key || *field == sort_key
            };
            if !allowed {
                return Err(Error::InvalidQuery(format!("cannot query using `{field}`")));
            }
        }
        if !fields.contains(&partition_key) {
            return Err(Error::InvalidQuery(format!(
                "a query needs a filter on the partition key `{partition_key}`"
            )));
        }
    }

    filters
        .iter()
        .map(|filter| ComparisonBuilder::from_array(&filter.0))
        .collect()
}

/// Request for one page of `builder`.
pub(crate) fn build_request(builder: &QueryBuilder) -> Result<read::query::Query> {
    let schema = builder.schema.as_deref();
    let table_name = builder
        .table
        .clone()
        .or_else(|| schema.map(|schema| schema.table().to_string()))
        .ok_or_else(|| Error::InvalidQuery("no table to query".to_string()))?;
    let index_name = match (&builder.index, schema) {
        (Some(index), _) => Some(index.clone()),
        (None, Some(schema)) => guess_index(schema, &builder.filters),
        (None, None) => None,
    };
    let key_conditions = validate_filters(schema, &builder.filters, index_name.as_deref())?;
    let consistent_read = match (&index_name, schema) {
        (None, Some(schema)) => Some(schema.consistent_read()),
        _ => None,
    };
    Ok(read::query::Query {
        key_conditions,
        multiple_read_args: read::common::MultipleReadArgs {
            consistent_read,
            exclusive_start_key: builder.after.as_ref().map(LastEvaluatedKey::to_map),
            index_name,
            limit: builder.limit,
            table_name,
        },
        scan_index_forward: builder.descending.then_some(false),
    })
}

fn raw_row(item: common::Item) -> Result<Row> {
    let mut attributes = Attributes::with_capacity(item.len());
    for (name, raw) in item {
        let value: Value = from_attribute_value(raw)?;
        attributes.insert(name, value);
    }
    Ok(Row::Raw(attributes))
}

fn key_value(item: &common::Item, name: &str) -> Result<Value> {
    match item.get(name) {
        Some(raw) => Ok(from_attribute_value(raw.clone())?),
        None => Ok(Value::Null),
    }
}

/// Related schema whose search matches the item, with the relation's name.
fn match_relation(
    builder: &QueryBuilder,
    item: &common::Item,
) -> Result<Option<(String, Arc<EntitySchema>)>> {
    for descriptor in &builder.relations {
        let RelationKind::External { search } = &descriptor.kind else {
            continue;
        };
        let related = builder.db.schema(&descriptor.related)?;
        let comparison = ComparisonBuilder::from_array(&search.0)?;
        let Some(raw) = item.get(related.sort_key(None)) else {
            continue;
        };
        let candidate: Value = from_attribute_value(raw.clone())?;
        if comparison.matches(&candidate) {
            return Ok(Some((descriptor.name.clone(), related)));
        }
    }
    Ok(None)
}

/// Attach related rows to the base row and load whatever was not on the page.
async fn merge_relations(
    schema: &EntitySchema,
    relations: &[RelationDescriptor],
    rows: Vec<(Option<String>, Entity)>,
) -> Result<Vec<Entity>> {
    let base = rows
        .iter()
        .position(|(relation, entity)| relation.is_none() && entity.type_name() == schema.name());
    let mut entities = match base {
        Some(base) => {
            let mut base_entity = None;
            let mut related = Vec::new();
            for (position, (relation, entity)) in rows.into_iter().enumerate() {
                match relation {
                    Some(relation) => related.push((relation, entity)),
                    None if position == base => base_entity = Some(entity),
                    None => related.push((String::new(), entity)),
                }
            }
            let mut entities = Vec::with_capacity(1 + related.len());
            if let Some(mut base_entity) = base_entity {
                for descriptor in relations {
                    let state = base_entity.relations.state_mut(&descriptor.name);
                    state.fetched = true;
                }
                let mut unattached = Vec::new();
                for (relation, entity) in related {
                    if relation.is_empty() {
                        unattached.push(entity);
                    } else {
                        base_entity.relations.state_mut(&relation).insert(entity);
                    }
                }
                entities.push(base_entity);
                entities.extend(unattached);
            }
            entities
        }
        None => rows.into_iter().map(|(_, entity)| entity).collect(),
    };

    for entity in &mut entities {
        for descriptor in relations {
            if entity.schema().relation(&descriptor.name).is_some()
                && !entity.relations().is_loaded(&descriptor.name)
            {
                let mut relation = entity.relation(&descriptor.name)?;
                // Loading a relation runs a query of its own.
                Box::pin(relation.get()).await?;
            }
        }
    }
    Ok(entities)
}

/// Run one page of `builder`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(name = "dynamodb_model.query", skip(builder), err)
)]
pub(crate) async fn execute(builder: &QueryBuilder) -> Result<QueryResult> {
    let request = build_request(builder)?;
    let page = builder.db.query(request).await?;

    let Some(schema) = builder.schema.as_ref().filter(|_| !builder.raw) else {
        let last_evaluated_key = match (&builder.schema, page.last_evaluated_key) {
            (Some(schema), Some(key)) => Some(LastEvaluatedKey::from_item(schema, key)?),
            _ => None,
        };
        let rows = page.items.into_iter().map(raw_row).collect::<Result<_>>()?;
        return Ok(QueryResult {
            rows,
            last_evaluated_key,
        });
    };
    let last_evaluated_key = page
        .last_evaluated_key
        .map(|key| LastEvaluatedKey::from_item(schema, key))
        .transpose()?;

    let mut rows = Vec::with_capacity(page.items.len());
    for item in page.items {
        if builder.with_data {
            let partition_key = key_value(&item, schema.partition_key(None))?;
            let sort_key = key_value(&item, schema.sort_key(None))?;
            if let Some(entity) = builder.db.find(schema, partition_key, sort_key).await? {
                rows.push((None, entity));
            }
            continue;
        }
        let (relation, entity_schema) = match match_relation(builder, &item)? {
            Some((relation, related)) => (Some(relation), related),
            None => (None, Arc::clone(schema)),
        };
        let entity = Entity::hydrate(builder.db.clone(), entity_schema, item)?;
        rows.push((relation, entity));
    }

    let entities = if builder.relations.is_empty() {
        rows.into_iter().map(|(_, entity)| entity).collect()
    } else {
        merge_relations(schema, &builder.relations, rows).await?
    };
    Ok(QueryResult {
        rows: entities.into_iter().map(Row::Entity).collect(),
        last_evaluated_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        client::memory::MemoryClient,
        common::condition::Condition,
        model::{
            Db,
            schema::{ModelDefinition, SecondaryIndex},
        },
    };
    use rstest::rstest;
    use serde_json::json;

    fn db() -> Db {
        Db::builder(Arc::new(MemoryClient::new()))
            .model(
                ModelDefinition::new("DemoModel")
                    .table("test")
                    .field_mapping("sk", "mapped")
                    .fillable(["pk", "mapped", "gsi1_pk", "gsi1_sk", "test"])
                    .secondary_index("gsi1", SecondaryIndex::new("gsi1_pk", "gsi1_sk"))
                    .secondary_index("gsi2", SecondaryIndex::new("gsi2_pk", "gsi1_sk")),
            )
            .build()
            .unwrap()
    }

    fn filters(filters: Vec<Filter>) -> Vec<Filter> {
        filters
    }

    #[rstest]
    #[case::base_table(filters(vec![("pk", "A").into()]), None)]
    #[case::full_cover(filters(vec![("gsi1_pk", "A").into(), ("gsi1_sk", "B").into()]), Some("gsi1"))]
    #[case::partial_tie_goes_first(filters(vec![("gsi1_sk", "B").into()]), Some("gsi1"))]
    #[case::second_index(filters(vec![("gsi2_pk", "A").into()]), Some("gsi2"))]
    #[case::mapped_name(filters(vec![("pk", "A").into(), ("mapped", "B").into()]), None)]
    fn test_guess_index(#[case] filters: Vec<Filter>, #[case] expected: Option<&str>) {
        let schema = db().schema("DemoModel").unwrap();
        assert_eq!(guess_index(&schema, &filters).as_deref(), expected);
    }

    #[test]
    fn test_validate_maps_names() {
        let schema = db().schema("DemoModel").unwrap();
        let comparisons = validate_filters(
            Some(&schema),
            &[Filter::from(("pk", "A")), Filter::from(("mapped", "begins_with", "B"))],
            None,
        )
        .unwrap();
        assert_eq!(comparisons[1], Comparison::new("sk", Condition::BeginsWith(json!("B"))));
    }

    #[rstest]
    #[case::too_many(vec![("pk", "A").into(), ("mapped", "B").into(), ("test", "C").into()], None)]
    #[case::empty(vec![], None)]
    #[case::single_not_partition(vec![("mapped", "B").into()], None)]
    #[case::unknown_field(vec![("pk", "A").into(), ("test", "C").into()], None)]
    #[case::two_sort_keys(vec![("mapped", "A").into(), ("mapped", "B").into()], None)]
    #[case::base_key_on_index(vec![("pk", "A").into()], Some("gsi1"))]
    fn test_validate_rejects(#[case] filters: Vec<Filter>, #[case] index: Option<&str>) {
        let schema = db().schema("DemoModel").unwrap();
        let result = validate_filters(Some(&schema), &filters, index);
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_validate_without_model() {
        let comparisons = validate_filters(
            None,
            &[Filter::from(("anything", "A")), Filter::from(("else", ">", 1))],
            None,
        )
        .unwrap();
        assert_eq!(comparisons.len(), 2);
    }

    #[test]
    fn test_build_request() {
        let db = db();
        let builder = db
            .model("DemoModel")
            .unwrap()
            .filter(("gsi1_pk", "A"))
            .limit(10)
            .sort_descending();
        let request = build_request(&builder).unwrap();
        assert_eq!(request.multiple_read_args.index_name.as_deref(), Some("gsi1"));
        assert_eq!(request.multiple_read_args.consistent_read, None);
        assert_eq!(request.multiple_read_args.limit, Some(10));
        assert_eq!(request.multiple_read_args.table_name, "test");
        assert_eq!(request.scan_index_forward, Some(false));

        let request = build_request(&db.model("DemoModel").unwrap().filter(("pk", "A"))).unwrap();
        assert_eq!(request.multiple_read_args.index_name, None);
        assert_eq!(request.multiple_read_args.consistent_read, Some(true));
        assert_eq!(request.scan_index_forward, None);
    }

    #[test]
    fn test_build_request_for_table() {
        let request = build_request(&db().table("raw").filter(("id", "A"))).unwrap();
        assert_eq!(request.multiple_read_args.table_name, "raw");
        assert_eq!(request.multiple_read_args.consistent_read, None);
    }
}
