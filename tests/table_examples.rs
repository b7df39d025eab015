use std::collections::BTreeMap;

use anyhow::Result;
use rust_sorm::{
    record, Database, DatabaseConfig, Destination, Error, Filter, Placeholder, QueryOperator,
    Source, Table, Value,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Tbs {
    sid: i64,
    name: String,
    dummy: String,
}

record!(Tbs {
    sid => "fn=id;pk=true",
    name => "_",
    dummy,
});

#[derive(Debug, Default)]
struct Keyless {
    dummy: String,
}

record!(Keyless { dummy });

fn tbs(sid: i64, dummy: &str) -> Tbs {
    Tbs {
        sid,
        name: format!("name{sid}"),
        dummy: dummy.to_string(),
    }
}

// In-memory database with an empty `xx` table bound
fn create_test_db() -> Result<(Database, Table)> {
    let db = Database::open(":memory:")?;
    db.exec_batch("CREATE TABLE xx(id INTEGER PRIMARY KEY, name TEXT, dummy TEXT)")?;
    let table = db.bind_table("xx")?;
    Ok((db, table))
}

fn all_rows(table: &Table) -> Result<Vec<Tbs>> {
    let mut rows = Vec::new();
    table.query("id > 0 ORDER BY id")?.all(&mut rows)?;
    Ok(rows)
}

#[tokio::test]
async fn test_insert_and_read_back() {
    test_insert_and_read_back_impl().unwrap();
}

fn test_insert_and_read_back_impl() -> Result<()> {
    let (_db, table) = create_test_db()?;

    let result = table.insert(Source::record(&tbs(1, "first")))?;
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.last_insert_id, 1);
    table.insert(Source::record(&tbs(2, "second")))?;

    let rows = all_rows(&table)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].sid, 1);
    assert_eq!(rows[0].dummy, "first");
    assert_eq!(rows[1].sid, 2);
    assert_eq!(rows[1].dummy, "second");
    Ok(())
}

#[tokio::test]
async fn test_filtered_query_yields_rows_in_order() {
    test_filtered_query_yields_rows_in_order_impl().unwrap();
}

fn test_filtered_query_yields_rows_in_order_impl() -> Result<()> {
    let (_db, table) = create_test_db()?;
    for i in 1..=3 {
        table.insert(Source::record(&tbs(i, &format!("dummy{i}"))))?;
    }
    table.insert(Source::record(&tbs(10, "outside")))?;

    let mut query = table.query("id>0 and id<10")?;
    let mut ids = Vec::new();
    let mut row = Tbs::default();
    while query.next(Destination::record(&mut row))? {
        ids.push(row.sid);
    }
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(row.dummy, "dummy3");
    Ok(())
}

#[tokio::test]
async fn test_all_scalar_matches_all_records() {
    test_all_scalar_matches_all_records_impl().unwrap();
}

fn test_all_scalar_matches_all_records_impl() -> Result<()> {
    let (db, table) = create_test_db()?;
    for i in 1..=3 {
        table.insert(Source::record(&tbs(i, &format!("dummy{i}"))))?;
    }
    table.insert(Source::record(&tbs(10, "outside")))?;

    let mut records: Vec<Tbs> = Vec::new();
    table.query("id>0 and id<10")?.all(&mut records)?;

    let mut ids: Vec<i64> = Vec::new();
    db.create_query("SELECT id FROM xx WHERE id>0 and id<10")?
        .execute([])?
        .all_scalar(&mut ids)?;

    assert_eq!(ids.len(), records.len());
    assert_eq!(ids, records.iter().map(|r| r.sid).collect::<Vec<_>>());
    assert_eq!(ids, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_ignored_field_is_never_written_or_read() {
    test_ignored_field_is_never_written_or_read_impl().unwrap();
}

fn test_ignored_field_is_never_written_or_read_impl() -> Result<()> {
    let (db, table) = create_test_db()?;
    table.insert(Source::record(&tbs(1, "d")))?;

    let mut stored = Value::Integer(0);
    db.query_row(
        "SELECT name FROM xx WHERE id = ?",
        [1],
        Destination::scalar(&mut stored),
    )?;
    assert_eq!(stored, Value::Null);

    db.exec("UPDATE xx SET name = 'from sql' WHERE id = 1", [])?;
    let rows = all_rows(&table)?;
    assert_eq!(rows[0].name, "");
    Ok(())
}

#[tokio::test]
async fn test_update_by_primary_key() {
    test_update_by_primary_key_impl().unwrap();
}

fn test_update_by_primary_key_impl() -> Result<()> {
    let (_db, table) = create_test_db()?;
    table.insert(Source::record(&tbs(1, "old")))?;
    table.insert(Source::record(&tbs(2, "untouched")))?;

    let result = table.update(Filter::new(), Source::record(&tbs(1, "new")))?;
    assert_eq!(result.rows_affected, 1);

    let rows = all_rows(&table)?;
    assert_eq!(rows[0].dummy, "new");
    assert_eq!(rows[1].dummy, "untouched");
    Ok(())
}

#[tokio::test]
async fn test_update_with_filter() {
    test_update_with_filter_impl().unwrap();
}

fn test_update_with_filter_impl() -> Result<()> {
    let (_db, table) = create_test_db()?;
    for i in 1..=3 {
        table.insert(Source::record(&tbs(i, "before")))?;
    }

    let mut changes = BTreeMap::new();
    changes.insert("dummy".to_string(), Value::from("after"));
    let result = table.update("id >= 2", Source::map(&changes))?;
    assert_eq!(result.rows_affected, 2);

    let filter = Filter::new().with_condition("dummy", QueryOperator::Equal("after".into()));
    let mut rows: Vec<Tbs> = Vec::new();
    table.query(filter)?.all(&mut rows)?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_keyless_record_needs_a_filter() {
    test_keyless_record_needs_a_filter_impl().unwrap();
}

fn test_keyless_record_needs_a_filter_impl() -> Result<()> {
    let (_db, table) = create_test_db()?;
    table.insert(Source::record(&tbs(1, "d")))?;

    let keyless = Keyless {
        dummy: "changed".to_string(),
    };
    let err = table.update("", Source::record(&keyless)).unwrap_err();
    assert!(matches!(err, Error::NoPrimaryKey { .. }));

    let result = table.update("id = 1", Source::record(&keyless))?;
    assert_eq!(result.rows_affected, 1);
    Ok(())
}

#[tokio::test]
async fn test_insert_from_map_and_ordered_values() {
    test_insert_from_map_and_ordered_values_impl().unwrap();
}

fn test_insert_from_map_and_ordered_values_impl() -> Result<()> {
    let (db, table) = create_test_db()?;

    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::from(3));
    map.insert("name".to_string(), Value::from("by map"));
    table.insert(Source::map(&map))?;

    table.insert(Source::values([Value::from(4), "by values".into(), "d4".into()]))?;

    let mut name = String::new();
    db.query_row(
        "SELECT name FROM xx WHERE id = ?",
        [3],
        Destination::scalar(&mut name),
    )?;
    assert_eq!(name, "by map");

    db.query_row(
        "SELECT name FROM xx WHERE id = ?",
        [4],
        Destination::scalar(&mut name),
    )?;
    assert_eq!(name, "by values");
    Ok(())
}

#[tokio::test]
async fn test_delete() {
    test_delete_impl().unwrap();
}

fn test_delete_impl() -> Result<()> {
    let (_db, table) = create_test_db()?;
    for i in 1..=4 {
        table.insert(Source::record(&tbs(i, "d")))?;
    }

    assert_eq!(table.delete("id = 4")?.rows_affected, 1);
    assert_eq!(table.delete_record(&tbs(3, "ignored"))?.rows_affected, 1);

    let filter = Filter::new().with_condition("id", QueryOperator::In(vec![]));
    assert_eq!(table.delete(filter)?.rows_affected, 0);

    assert_eq!(table.delete(Filter::new())?.rows_affected, 2);
    assert!(all_rows(&table)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_numbered_placeholders() {
    test_numbered_placeholders_impl().unwrap();
}

fn test_numbered_placeholders_impl() -> Result<()> {
    let config = DatabaseConfig::new(":memory:").with_placeholder(Placeholder::Numbered);
    let db = Database::open_with_config(config)?;
    db.exec_batch("CREATE TABLE xx(id INTEGER PRIMARY KEY, name TEXT, dummy TEXT)")?;
    let table = db.bind_table("xx")?;

    table.insert(Source::record(&tbs(1, "a")))?;
    table.insert(Source::record(&tbs(2, "b")))?;
    table.update(
        Filter::new().with_condition("id", QueryOperator::GreaterThan(1.into())),
        Source::record(&tbs(2, "c")),
    )?;

    let rows = all_rows(&table)?;
    assert_eq!(rows[1].dummy, "c");
    Ok(())
}

#[test]
fn test_missing_table_cannot_be_bound() {
    let (db, _table) = create_test_db().unwrap();
    let err = db.bind_table("nope").unwrap_err();
    assert!(matches!(err, Error::Sqlite(_)));
    assert!(matches!(db.bind_table(" "), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_table_fails_after_close() {
    let (db, table) = create_test_db().unwrap();
    db.close();
    db.close();
    assert!(!db.is_open());

    assert!(matches!(
        table.insert(Source::record(&tbs(1, "d"))),
        Err(Error::NotOpen)
    ));
    assert!(matches!(table.query(""), Err(Error::NotOpen)));
    assert!(matches!(db.bind_table("xx"), Err(Error::NotOpen)));
}

#[test]
fn test_table_fails_after_drop() {
    let (db, table) = create_test_db().unwrap();
    drop(db);
    assert!(matches!(table.delete(""), Err(Error::NotOpen)));
}
