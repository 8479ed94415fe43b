use airquery::engine::executor::Executor;
use airquery::engine::filter::SortDirection;
use airquery::engine::nosql::MemoryCollection;
use airquery::engine::query::QueryBuilder;
use airquery::engine::schema::{FieldDescriptor, SchemaDescriptor, ValueProvider};
use airquery::engine::{QueryError, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const ID: &str = "5e53bb135b64856045ccb8dc";

fn schema() -> Arc<SchemaDescriptor> {
    Arc::new(
        SchemaDescriptor::new("message_display")
            .with_field(FieldDescriptor::new("id").primary().default(ValueProvider::ObjectId))
            .with_field(FieldDescriptor::new("msg_code"))
            .with_field(FieldDescriptor::new("msg_en").column("en"))
            .with_field(
                FieldDescriptor::new("updated_time")
                    .default(ValueProvider::Now)
                    .on_update(ValueProvider::Now),
            ),
    )
}

fn builder() -> QueryBuilder {
    QueryBuilder::new().model(schema())
}

fn row(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn seeded(n: i64) -> Result<MemoryCollection> {
    let store = MemoryCollection::new();
    for code in 0..n {
        store.execute(
            &builder()
                .values(row(json!({"msg_code": code, "msg_en": format!("m{}", code)})))
                .insert_query()?,
        )?;
    }
    Ok(store)
}

#[test]
fn test_identifier_round_trip() -> Result<()> {
    let store = seeded(3)?;
    let inserted = store.execute(
        &builder()
            .values(row(json!({"id": ID, "msg_code": 99, "msg_en": "hello"})))
            .insert_query()?,
    )?;
    assert_eq!(inserted.inserted_ids, vec![json!(ID)]);

    let found = store
        .fetch_one(&builder().filter_eq("id", ID).select_query()?)?
        .expect("inserted document");
    assert_eq!(found["id"], json!(ID));
    assert_eq!(found["msg_en"], json!("hello"));

    let dup = store
        .execute(&builder().values(row(json!({"id": ID, "msg_code": 1}))).insert_query()?)
        .unwrap_err();
    assert!(matches!(dup, QueryError::DuplicateKey(_)));
    Ok(())
}

#[test]
fn test_increment_passes_through() -> Result<()> {
    let store = seeded(3)?;
    let outcome = store.execute(
        &builder()
            .filter_eq("msg_code", 1)
            .values(row(json!({"$inc": {"msg_code": 100}})))
            .update_query()?,
    )?;
    assert_eq!(outcome.matched_count, 1);
    assert_eq!(outcome.modified_count, 1);

    let bumped = store
        .fetch_one(&builder().filter_eq("msg_code", 101).select_query()?)?
        .expect("updated document");
    assert_eq!(bumped["msg_en"], json!("m1"));
    assert!(bumped["updated_time"].is_string());
    Ok(())
}

#[test]
fn test_or_and_ordering() -> Result<()> {
    let store = seeded(10)?;
    let rows = store.fetch(
        &builder()
            .or_filter("msg_code", "eq", json!([3, 8]))
            .order_by("msg_code", SortDirection::Desc)
            .select_query()?,
    )?;
    let codes: Vec<Value> = rows.iter().map(|r| r["msg_code"].clone()).collect();
    assert_eq!(codes, vec![json!(8), json!(3)]);

    let like = store.count(&builder().filter_op("msg_en", "like", "m%").select_query()?)?;
    assert_eq!(like, 10);
    Ok(())
}

#[test]
fn test_pipeline_pagination() -> Result<()> {
    let store = seeded(25)?;
    let page = store.aggregate(
        &schema(),
        vec![json!({"$sort": {"msg_code": 1}})],
        Some(3),
        Some(10),
    )?;
    assert_eq!(page.len(), 5);
    assert_eq!(page[0]["msg_code"], json!(20));
    assert_eq!(page[0]["msg_en"], json!("m20"));
    Ok(())
}

#[test]
fn test_upsert_reports_new_id() -> Result<()> {
    let store = seeded(0)?;
    let outcome = store.execute(
        &builder()
            .filter_eq("msg_code", 7)
            .values(row(json!({"msg_en": "seven"})))
            .upsert()
            .update_query()?,
    )?;
    assert_eq!(outcome.matched_count, 0);
    let id = outcome.upserted_id.expect("upserted id");
    assert_eq!(id.len(), 24);

    let doc = store
        .fetch_one(&builder().filter_eq("id", id.as_str()).select_query()?)?
        .expect("upserted document");
    assert_eq!(doc["msg_code"], json!(7));
    assert_eq!(doc["msg_en"], json!("seven"));
    Ok(())
}
