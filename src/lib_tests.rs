use super::{Database, Direction, EngineConfig, IndexKey, TransactionState};
use crate::catalog::schema::{FieldSpec, IndexSpec, PropertyDef, Uniqueness};
use crate::catalog::types::{Properties, Rid, Value, ValueType};
use crate::error::{EngineError, EngineErrorCode};
use crate::query::plan::{ScanPlan, field};

fn db() -> Database {
    let db = Database::new(EngineConfig::default()).expect("open");
    db.create_class(
        "Person",
        None,
        vec![
            PropertyDef::new("name", ValueType::String),
            PropertyDef::new("age", ValueType::Integer),
        ],
    )
    .expect("class");
    db
}

fn person(name: &str, age: i64) -> Properties {
    let mut props = Properties::new();
    props.insert("name".into(), Value::string(name));
    props.insert("age".into(), Value::Integer(age));
    props
}

fn insert(db: &Database, name: &str, age: i64) -> Rid {
    let mut tx = db.begin();
    let rid = tx.create("Person", person(name, age)).expect("create");
    tx.commit().expect("commit");
    rid
}

fn name_index() -> IndexSpec {
    IndexSpec::new("Person.name", "Person", Uniqueness::Unique).field(FieldSpec::scalar("name"))
}

#[test]
fn invalid_config_is_rejected() {
    let err = Database::new(EngineConfig {
        max_expr_depth: 0,
        ..EngineConfig::default()
    })
    .expect_err("invalid");
    assert_eq!(err.code(), EngineErrorCode::InvalidConfig);
}

#[test]
fn created_index_covers_existing_records() {
    let db = db();
    let ann = insert(&db, "ann", 30);
    let bob = insert(&db, "bob", 41);
    db.create_index(name_index()).expect("index");

    let index = db.index("Person.name").expect("handle");
    assert_eq!(index.len().expect("len"), 2);
    assert_eq!(index.lookup(&IndexKey::single("ann")).expect("lookup"), vec![ann]);
    let descending = index
        .range_scan(None, None, true, true, Direction::Descending)
        .expect("scan");
    assert_eq!(
        descending.into_iter().map(|(_, rid)| rid).collect::<Vec<_>>(),
        vec![bob, ann]
    );
}

#[test]
fn building_a_unique_index_over_duplicates_fails_cleanly() {
    let db = db();
    insert(&db, "ann", 30);
    insert(&db, "ann", 31);
    let err = db.create_index(name_index()).expect_err("duplicate names");
    assert_eq!(err.code(), EngineErrorCode::UniquenessViolation);
    assert!(db.catalog().index("Person.name").is_none());
    assert!(db.index("Person.name").is_err());
}

#[test]
fn dropped_index_handles_report_not_found() {
    let db = db();
    db.create_index(name_index()).expect("index");
    let index = db.index("Person.name").expect("handle");
    db.drop_index("Person.name").expect("drop");
    let err = index.lookup(&IndexKey::single("ann")).expect_err("gone");
    assert_eq!(err.code(), EngineErrorCode::IndexNotFound);
    assert_eq!(
        db.drop_index("Person.name").expect_err("twice").code(),
        EngineErrorCode::IndexNotFound
    );
}

#[test]
fn schema_change_fails_in_flight_commit() {
    let db = db();
    let mut tx = db.begin();
    tx.create("Person", person("ann", 30)).expect("create");
    db.create_index(name_index()).expect("index");
    let err = tx.commit().expect_err("schema changed");
    assert_eq!(err, EngineError::SchemaChanged);
    assert!(err.is_retryable());
    assert_eq!(tx.state(), TransactionState::Failed);
    tx.rollback().expect("rollback");
    assert!(db.scan("Person").expect("scan").records.is_empty());
}

#[test]
fn run_in_transaction_retries_conflicts() {
    let db = db();
    let rid = insert(&db, "ann", 30);
    let mut attempts = 0;
    let outcome = db.run_in_transaction(3, |tx| {
        attempts += 1;
        let mut record = tx.read(rid).expect("record");
        if attempts == 1 {
            let mut rival_tx = db.begin();
            let mut rival = rival_tx.read(rid).expect("record");
            rival.set("age", 99i64);
            rival_tx.write(rival)?;
            rival_tx.commit()?;
        }
        record.set("age", 31i64);
        tx.write(record)?;
        Ok(attempts)
    });
    assert_eq!(outcome.expect("second attempt commits"), 2);
    let committed = db.read(rid).expect("committed");
    assert_eq!(committed.get("age"), Some(&Value::Integer(31)));
    assert_eq!(committed.version, 3);
}

#[test]
fn run_in_transaction_does_not_retry_user_errors() {
    let db = db();
    let mut attempts = 0;
    let err = db
        .run_in_transaction(5, |tx| {
            attempts += 1;
            tx.create("Person", person("ann", 30))?;
            Err::<(), _>(EngineError::Validation("abort".into()))
        })
        .expect_err("aborted");
    assert_eq!(err.code(), EngineErrorCode::Validation);
    assert_eq!(attempts, 1);
    assert!(db.scan("Person").expect("scan").records.is_empty());
}

#[test]
fn explain_and_query_agree_on_the_index_used() {
    let db = db();
    insert(&db, "ann", 30);
    insert(&db, "bob", 41);
    db.create_index(name_index()).expect("index");
    let filter = field("name").eq("bob").and(field("age").gt(40i64));
    let plan = db.explain("Person", &filter).expect("explain");
    assert!(matches!(plan, ScanPlan::IndexScan { .. }));
    let result = db.query("Person", &filter).expect("query");
    assert_eq!(result.plan, plan);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.rows_examined, 1);
}
