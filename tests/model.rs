use aws_sdk_dynamodb::types::AttributeValue;
use dynamodb_model::{
    Db, Error,
    client::memory::{MemoryClient, Request},
    model::schema::{ModelDefinition, SecondaryIndex},
    query::result::Row,
};
use rstest::rstest;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};

fn setup() -> (Arc<MemoryClient>, Db) {
    let client = Arc::new(MemoryClient::new());
    client.create_table("app", "pk", "sk");
    client.create_index("app", "gsi1", SecondaryIndex::new("gsi1_pk", "gsi1_sk"));
    client.create_index("app", "gsi2", SecondaryIndex::new("gsi2_pk", "gsi1_sk"));
    let db = Db::builder(client.clone())
        .model(
            ModelDefinition::new("Customer")
                .table("app")
                .field_mapping("gsi1_pk", "email")
                .fillable(["name", "email", "settings", "tags", "secret", "address_map"])
                .hidden(["secret"])
                .cast("settings", "json")
                .cast("tags", "set:string")
                .rules("name", "required|string|max:20")
                .secondary_index("gsi1", SecondaryIndex::new("gsi1_pk", "gsi1_sk"))
                .secondary_index("gsi2", SecondaryIndex::new("gsi2_pk", "gsi1_sk"))
                .has_many("orders", "Order")
                .default_value("addresses", json!({}))
                .inline_many("addresses", "Address", "address_map"),
        )
        .model(
            ModelDefinition::new("Order")
                .parent("Customer")
                .fillable(["total", "gsi1_pk", "gsi1_sk"])
                .default_value("total", 0),
        )
        .model(
            ModelDefinition::new("Address")
                .parent("Customer")
                .fillable(["id", "city"])
                .inline_child("address_map", "id"),
        )
        .build()
        .unwrap();
    (client, db)
}

fn stored_key(pk: &str, sk: &str) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("pk".to_string(), AttributeValue::S(pk.to_string())),
        ("sk".to_string(), AttributeValue::S(sk.to_string())),
    ])
}

#[tokio::test]
async fn test_create_and_find() {
    let (client, db) = setup();
    let customers = db.model("Customer").unwrap();
    let created = customers
        .create(json!({
            "pk": "CUSTOMER#1",
            "name": "Jane",
            "gsi1_pk": "jane@example.com",
            "settings": {"theme": "dark"},
            "tags": ["vip"],
            "secret": "hunter2",
        }))
        .await
        .unwrap();
    assert_eq!(created.sort_key_value(), Some(&json!("CUSTOMER")));
    assert!(!created.is_dirty("name"));
    assert!(!created.attributes().contains_key("secret"));

    let stored = client.item("app", &stored_key("CUSTOMER#1", "CUSTOMER")).unwrap();
    assert_eq!(
        stored.get("gsi1_pk"),
        Some(&AttributeValue::S("jane@example.com".to_string()))
    );
    assert_eq!(
        stored.get("settings"),
        Some(&AttributeValue::S(r#"{"theme":"dark"}"#.to_string()))
    );
    assert_eq!(stored.get("tags"), Some(&AttributeValue::Ss(vec!["vip".to_string()])));
    assert!(stored.contains_key("secret"));

    let found = customers
        .find_or_fail("CUSTOMER#1", "CUSTOMER")
        .await
        .unwrap();
    assert_eq!(found.get("email").unwrap(), Some(&json!("jane@example.com")));
    assert_eq!(found.get("settings").unwrap(), Some(&json!({"theme": "dark"})));
    assert_eq!(found.get("tags").unwrap(), Some(&json!(["vip"])));
    assert_eq!(found.store().dirty_names().count(), 0);
}

#[tokio::test]
async fn test_generated_keys() {
    let (_, db) = setup();
    let order = db.model("Order").unwrap().make(json!({})).unwrap();
    let partition_key = order.partition_key_value().unwrap().as_str().unwrap();
    assert!(partition_key.starts_with("CUSTOMER#"));
    assert_eq!(order.sort_key_value(), Some(&json!("ORDER")));
    assert_eq!(order.get("total").unwrap(), Some(&json!(0)));
    assert_eq!(order.table(), "app");
}

#[tokio::test]
async fn test_update_writes_dirty_attributes_only() {
    let (client, db) = setup();
    let mut customer = db
        .model("Customer")
        .unwrap()
        .create(json!({"pk": "CUSTOMER#1", "name": "Jane", "tags": ["a"]}))
        .await
        .unwrap();
    client.clear_requests();

    customer.update(json!({"name": "Janet"})).await.unwrap();
    let Some(Request::UpdateItem(update)) = client.requests().pop() else {
        panic!("expected an update");
    };
    assert_eq!(update.set.len(), 1);
    assert_eq!(update.set[0].path, vec!["name".to_string()]);
    assert!(!customer.is_dirty("name"));

    customer.update(json!({"name": "Janet"})).await.unwrap();
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_failed_update_leaves_entity_untouched() {
    let (client, db) = setup();
    let mut customer = db
        .model("Customer")
        .unwrap()
        .create(json!({"pk": "CUSTOMER#1", "name": "Jane"}))
        .await
        .unwrap();
    client.clear_requests();

    let result = customer
        .update(json!({"name": "a name that is much too long"}))
        .await;
    let Err(Error::Validation(errors)) = result else {
        panic!("expected a validation error");
    };
    assert!(errors.get("name").is_some());
    assert_eq!(customer.get("name").unwrap(), Some(&json!("Jane")));
    assert!(!customer.is_dirty("name"));
    assert_eq!(client.request_count(), 0);
}

#[rstest]
#[case::unknown_attribute(json!({"unknown": 1}))]
#[case::not_an_object(json!([1, 2]))]
#[tokio::test]
async fn test_make_rejects(#[case] attributes: serde_json::Value) {
    let (_, db) = setup();
    assert!(db.model("Customer").unwrap().make(attributes).is_err());
}

#[tokio::test]
async fn test_refresh_and_delete() {
    let (_, db) = setup();
    let customers = db.model("Customer").unwrap();
    let mut customer = customers
        .create(json!({"pk": "CUSTOMER#1", "name": "Jane"}))
        .await
        .unwrap();
    let mut other = customers
        .find_or_fail("CUSTOMER#1", "CUSTOMER")
        .await
        .unwrap();
    other.update(json!({"name": "Janet"})).await.unwrap();

    customer.refresh().await.unwrap();
    assert_eq!(customer.get("name").unwrap(), Some(&json!("Janet")));

    customer.delete().await.unwrap();
    assert!(customers.find("CUSTOMER#1", "CUSTOMER").await.unwrap().is_none());
    assert!(matches!(
        customer.refresh().await,
        Err(Error::NotFound { .. })
    ));
}

#[rstest]
#[case::three_filters(vec![
    ("pk", "=", "A").into(),
    ("sk", "=", "B").into(),
    ("name", "=", "C").into(),
])]
#[case::non_key(vec![("name", "=", "A").into()])]
#[case::no_partition_key(vec![("sk", "=", "A").into(), ("sk", "=", "B").into()])]
#[tokio::test]
async fn test_query_rejects_filters(#[case] filters: Vec<dynamodb_model::Filter>) {
    let (client, db) = setup();
    let mut query = db.model("Customer").unwrap().query();
    for filter in filters {
        query = query.filter(filter);
    }
    assert!(matches!(query.get().await, Err(Error::InvalidQuery(_))));
    assert_eq!(client.request_count(), 0);
}

#[rstest]
#[case::field_only(vec![json!("pk")])]
#[case::too_many_values(vec![json!("pk"), json!("between"), json!(1), json!(2), json!(3)])]
#[case::unknown_operator(vec![json!("pk"), json!("contains"), json!("A")])]
#[tokio::test]
async fn test_query_rejects_malformed_filter(#[case] filter: Vec<serde_json::Value>) {
    let (_, db) = setup();
    let result = db.model("Customer").unwrap().filter(filter).get().await;
    assert!(matches!(result, Err(Error::InvalidQuery(_))));
}

#[rstest]
#[case::mapped_index_key(vec![("email", "jane@example.com").into()], Some("gsi1"))]
#[case::full_cover_wins(
    vec![("gsi2_pk", "X").into(), ("gsi1_sk", ">", 1).into()],
    Some("gsi2"),
)]
#[case::base_table(vec![("pk", "CUSTOMER#1").into()], None)]
#[tokio::test]
async fn test_query_picks_index(
    #[case] filters: Vec<dynamodb_model::Filter>,
    #[case] expected: Option<&str>,
) {
    let (_, db) = setup();
    let mut query = db.model("Customer").unwrap().query();
    for filter in filters {
        query = query.filter(filter);
    }
    let request = query.request().unwrap();
    assert_eq!(request.multiple_read_args.index_name.as_deref(), expected);
}

#[tokio::test]
async fn test_query_pages_on_index() {
    let (_, db) = setup();
    let orders = db.model("Order").unwrap();
    for index in 1..=5 {
        orders
            .create(json!({
                "pk": "CUSTOMER#1",
                "sk": format!("ORDER#{index}"),
                "gsi1_pk": "ORDERS",
                "gsi1_sk": index,
            }))
            .await
            .unwrap();
    }

    let query = db.model("Customer").unwrap().filter(("email", "ORDERS")).limit(2).raw();
    let page = query.get().await.unwrap();
    assert_eq!(page.len(), 2);
    let next = query
        .clone()
        .after(page.last_evaluated_key().cloned().unwrap())
        .get()
        .await
        .unwrap();
    let Row::Raw(first) = &next.rows()[0] else {
        panic!("expected a raw row");
    };
    assert_eq!(first["gsi1_sk"], json!(3));
    assert_eq!(query.get_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_external_relation() {
    let (client, db) = setup();
    let mut customer = db
        .model("Customer")
        .unwrap()
        .create(json!({"pk": "CUSTOMER#1", "name": "Jane"}))
        .await
        .unwrap();
    for index in 1..=3 {
        customer
            .relation("orders")
            .unwrap()
            .save(json!({"sk": format!("ORDER#{index}"), "total": index}))
            .await
            .unwrap();
    }
    customer
        .relation("orders")
        .unwrap()
        .save(json!({"sk": "ORDER#1", "total": 10}))
        .await
        .unwrap();
    assert_eq!(customer.relations().entities("orders").len(), 3);

    client.clear_requests();
    let loaded = db
        .model("Customer")
        .unwrap()
        .filter(("pk", "CUSTOMER#1"))
        .with_relation("orders")
        .unwrap()
        .get()
        .await
        .unwrap()
        .into_entities();
    assert_eq!(loaded.len(), 1);
    let orders = loaded[0].relations().entities("orders");
    assert_eq!(orders.len(), 3);
    assert_eq!(orders[0].get("total").unwrap(), Some(&json!(10)));
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_inline_relation() {
    let (client, db) = setup();
    let mut customer = db
        .model("Customer")
        .unwrap()
        .create(json!({"pk": "CUSTOMER#1", "name": "Jane"}))
        .await
        .unwrap();
    {
        let mut addresses = customer.relation("addresses").unwrap();
        addresses.save(json!({"id": "home", "city": "Paris"})).await.unwrap();
        addresses.save(json!({"id": "work", "city": "Lyon"})).await.unwrap();
        addresses.save(json!({"id": "home", "city": "Nice"})).await.unwrap();
        assert_eq!(addresses.get().await.unwrap().len(), 2);
    }

    let stored = client.item("app", &stored_key("CUSTOMER#1", "CUSTOMER")).unwrap();
    let Some(AttributeValue::M(children)) = stored.get("address_map") else {
        panic!("expected a map of children");
    };
    assert_eq!(children.len(), 2);
    assert!(children.contains_key("home"));

    let mut reloaded = db
        .model("Customer")
        .unwrap()
        .find_or_fail("CUSTOMER#1", "CUSTOMER")
        .await
        .unwrap();
    client.clear_requests();
    let mut relation = reloaded.relation("addresses").unwrap();
    let addresses = relation.get().await.unwrap();
    assert_eq!(addresses.len(), 2);
    let home = addresses
        .iter()
        .find(|address| address.unique_key() == "home")
        .unwrap();
    assert_eq!(home.get("city").unwrap(), Some(&json!("Nice")));
    assert_eq!(home.partition_key_value(), Some(&json!("CUSTOMER#1")));
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn test_inline_children_are_independent() {
    let (_, db) = setup();
    let mut first = db
        .model("Customer")
        .unwrap()
        .make(json!({"pk": "CUSTOMER#1", "name": "Jane"}))
        .unwrap();
    let mut second = db
        .model("Customer")
        .unwrap()
        .make(json!({"pk": "CUSTOMER#2", "name": "John"}))
        .unwrap();
    first
        .set("addresses", json!([{"id": "home", "city": "Paris"}]))
        .unwrap();
    second
        .set("addresses", json!({"home": {"city": "Rome"}}))
        .unwrap();

    assert_eq!(first.relations().entities("addresses").len(), 1);
    let city = |entity: &dynamodb_model::Entity| {
        entity.relations().entities("addresses")[0]
            .get("city")
            .unwrap()
            .cloned()
    };
    assert_eq!(city(&first), Some(json!("Paris")));
    assert_eq!(city(&second), Some(json!("Rome")));
}

#[tokio::test]
async fn test_unknown_relation() {
    let (_, db) = setup();
    let mut customer = db.model("Customer").unwrap().make(json!({})).unwrap();
    assert!(matches!(
        customer.relation("missing"),
        Err(Error::InvalidRelation { .. })
    ));
    assert!(matches!(db.model("Missing"), Err(Error::UnknownModel(_))));
}
