use txidx::{
    Database, EngineConfig, EngineErrorCode, FieldSpec, IndexKey, IndexSpec, Properties,
    PropertyDef, Rid, Uniqueness, Value, ValueType,
};

fn setup() -> Database {
    let db = Database::new(EngineConfig::default()).expect("open");
    db.create_class(
        "Person",
        None,
        vec![
            PropertyDef::new("name", ValueType::String),
            PropertyDef::new("nickname", ValueType::String),
            PropertyDef::new("tags", ValueType::EmbeddedList).with_linked_type(ValueType::String),
            PropertyDef::new("attrs", ValueType::EmbeddedMap).with_linked_type(ValueType::String),
            PropertyDef::new("friends", ValueType::LinkSet),
            PropertyDef::new("address", ValueType::Embedded).with_linked_type(ValueType::String),
        ],
    )
    .expect("person");
    db.create_class("Employee", Some("Person"), vec![PropertyDef::new("team", ValueType::String)])
        .expect("employee");
    db.create_index(
        IndexSpec::new("Person.tags", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::element("tags")),
    )
    .expect("tags index");
    db.create_index(
        IndexSpec::new("Person.attrs.key", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::map_key("attrs")),
    )
    .expect("map key index");
    db.create_index(
        IndexSpec::new("Person.attrs.value", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::map_value("attrs")),
    )
    .expect("map value index");
    db
}

fn props(entries: Vec<(&str, Value)>) -> Properties {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn create(db: &Database, record_type: &str, entries: Vec<(&str, Value)>) -> Rid {
    let mut tx = db.begin();
    let rid = tx.create(record_type, props(entries)).expect("create");
    tx.commit().expect("commit");
    rid
}

fn lookup(db: &Database, index: &str, key: impl Into<Value>) -> Vec<Rid> {
    db.index(index)
        .expect("index")
        .lookup(&IndexKey::single(key))
        .expect("lookup")
}

fn size(db: &Database, index: &str) -> usize {
    db.index(index).expect("index").len().expect("len")
}

#[test]
fn collection_elements_fan_out_into_one_entry_each() {
    let db = setup();
    let rid = create(&db, "Person", vec![("tags", Value::list(["a", "b", "c"]))]);
    assert_eq!(size(&db, "Person.tags"), 3);
    for tag in ["a", "b", "c"] {
        assert_eq!(lookup(&db, "Person.tags", tag), vec![rid]);
    }
}

#[test]
fn partial_collection_edit_touches_only_changed_elements() {
    let db = setup();
    let rid = create(&db, "Person", vec![("tags", Value::list(["a", "b", "c"]))]);

    let mut tx = db.begin();
    let mut record = tx.read(rid).expect("record");
    record.set("tags", Value::list(["a", "c", "d"]));
    tx.write(record).expect("write");
    assert_eq!(tx.pending_index_changes(), 2);
    tx.commit().expect("commit");

    assert!(lookup(&db, "Person.tags", "b").is_empty());
    assert_eq!(lookup(&db, "Person.tags", "d"), vec![rid]);
    assert_eq!(lookup(&db, "Person.tags", "a"), vec![rid]);
    assert_eq!(size(&db, "Person.tags"), 3);
}

#[test]
fn rewriting_identical_values_is_a_no_op() {
    let db = setup();
    let rid = create(&db, "Person", vec![("tags", Value::list(["a", "b"]))]);
    let before = db.index("Person.tags").expect("index").entries().expect("entries");

    let mut tx = db.begin();
    let record = tx.read(rid).expect("record");
    tx.write(record).expect("write");
    assert_eq!(tx.pending_index_changes(), 0);
    tx.commit().expect("commit");

    let after = db.index("Person.tags").expect("index").entries().expect("entries");
    assert_eq!(before, after);
    assert_eq!(db.read(rid).expect("record").version, 2);
}

#[test]
fn duplicate_elements_collapse_into_one_entry() {
    let db = setup();
    let rid = create(&db, "Person", vec![("tags", Value::list(["a", "a", "b"]))]);
    assert_eq!(size(&db, "Person.tags"), 2);

    let mut tx = db.begin();
    let mut record = tx.read(rid).expect("record");
    record.set("tags", Value::list(["a", "b"]));
    tx.write(record).expect("write");
    assert_eq!(tx.pending_index_changes(), 0);
}

#[test]
fn map_keys_and_values_are_indexed_independently() {
    let db = setup();
    let rid = create(
        &db,
        "Person",
        vec![("attrs", Value::map([("eyes", "green"), ("hair", "red")]))],
    );
    assert_eq!(lookup(&db, "Person.attrs.key", "eyes"), vec![rid]);
    assert_eq!(lookup(&db, "Person.attrs.value", "green"), vec![rid]);

    // Same keys, one value changed: the key index must not move.
    let keys_before = db.index("Person.attrs.key").expect("index").entries().expect("entries");
    let mut tx = db.begin();
    let mut record = tx.read(rid).expect("record");
    record.set("attrs", Value::map([("eyes", "blue"), ("hair", "red")]));
    tx.write(record).expect("write");
    tx.commit().expect("commit");

    let keys_after = db.index("Person.attrs.key").expect("index").entries().expect("entries");
    assert_eq!(keys_before, keys_after);
    assert!(lookup(&db, "Person.attrs.value", "green").is_empty());
    assert_eq!(lookup(&db, "Person.attrs.value", "blue"), vec![rid]);
}

#[test]
fn delete_removes_every_contributed_key() {
    let db = setup();
    let rid = create(
        &db,
        "Person",
        vec![
            ("tags", Value::list(["a", "b"])),
            ("attrs", Value::map([("k", "v")])),
        ],
    );
    let mut tx = db.begin();
    let record = tx.read(rid).expect("record");
    tx.delete(&record).expect("delete");
    tx.commit().expect("commit");

    assert_eq!(size(&db, "Person.tags"), 0);
    assert_eq!(size(&db, "Person.attrs.key"), 0);
    assert_eq!(size(&db, "Person.attrs.value"), 0);
    assert!(db.read(rid).is_none());
}

#[test]
fn link_collections_index_rids() {
    let db = setup();
    db.create_index(
        IndexSpec::new("Person.friends", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::element("friends")),
    )
    .expect("friends index");
    let ann = create(&db, "Person", vec![("name", Value::string("ann"))]);
    let bob = create(&db, "Person", vec![("friends", Value::set([Value::Link(ann)]))]);
    assert_eq!(lookup(&db, "Person.friends", Value::Link(ann)), vec![bob]);
}

#[test]
fn supertype_indexes_cover_subtype_records() {
    let db = setup();
    let rid = create(
        &db,
        "Employee",
        vec![("tags", Value::list(["ops"])), ("team", Value::string("infra"))],
    );
    assert_eq!(rid.segment, db.catalog().class("Employee").expect("class").segment);
    assert_eq!(lookup(&db, "Person.tags", "ops"), vec![rid]);
}

#[test]
fn composite_keys_with_nulls_are_indexed_unless_ignored() {
    let db = setup();
    db.create_index(
        IndexSpec::new("Person.name_nick", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::scalar("name"))
            .field(FieldSpec::scalar("nickname")),
    )
    .expect("composite");
    db.create_index(
        IndexSpec::new("Person.name_nick_strict", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::scalar("name"))
            .field(FieldSpec::scalar("nickname"))
            .ignore_nulls(true),
    )
    .expect("composite ignoring nulls");

    let rid = create(&db, "Person", vec![("name", Value::string("ann"))]);
    let composite = db.index("Person.name_nick").expect("index");
    assert_eq!(
        composite
            .lookup(&IndexKey::new([Value::string("ann"), Value::Null]))
            .expect("lookup"),
        vec![rid]
    );
    assert_eq!(size(&db, "Person.name_nick_strict"), 0);
}

#[test]
fn empty_collection_in_composite_contributes_a_null_component() {
    let db = setup();
    db.create_index(
        IndexSpec::new("Person.name_tags", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::scalar("name"))
            .field(FieldSpec::element("tags")),
    )
    .expect("composite");
    let rid = create(
        &db,
        "Person",
        vec![("name", Value::string("ann")), ("tags", Value::list(Vec::<Value>::new()))],
    );
    let entries = db.index("Person.name_tags").expect("index").entries().expect("entries");
    assert_eq!(
        entries,
        vec![(IndexKey::new([Value::string("ann"), Value::Null]), rid)]
    );
    assert_eq!(size(&db, "Person.tags"), 0);
}

#[test]
fn embedded_properties_are_reachable_by_dotted_paths() {
    let db = setup();
    db.create_index(
        IndexSpec::new("Person.city", "Person", Uniqueness::NotUnique)
            .field(FieldSpec::scalar("address.city")),
    )
    .expect("dotted index");
    let address: Properties = [("city".to_string(), Value::string("Oslo"))].into();
    let rid = create(&db, "Person", vec![("address", Value::Embedded(address))]);
    assert_eq!(lookup(&db, "Person.city", "Oslo"), vec![rid]);
}

#[test]
fn definition_mismatch_is_reported_at_write_time() {
    let db = setup();
    let mut tx = db.begin();
    let err = tx
        .create("Person", props(vec![("tags", Value::string("not a list"))]))
        .expect_err("scalar in collection role");
    assert_eq!(err.code(), EngineErrorCode::DefinitionMismatch);
    assert_eq!(tx.touched(), 0);
    assert_eq!(tx.pending_index_changes(), 0);

    let err = tx
        .create("Person", props(vec![("attrs", Value::list(["x"]))]))
        .expect_err("list in map role");
    assert_eq!(err.code(), EngineErrorCode::DefinitionMismatch);
}

#[test]
fn multiple_collection_fields_in_one_composite_are_rejected() {
    let db = setup();
    let err = db
        .create_index(
            IndexSpec::new("Person.bad", "Person", Uniqueness::NotUnique)
                .field(FieldSpec::element("tags"))
                .field(FieldSpec::map_key("attrs")),
        )
        .expect_err("two collection fields");
    assert_eq!(err.code(), EngineErrorCode::Validation);
}
