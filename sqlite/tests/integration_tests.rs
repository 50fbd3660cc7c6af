//! Integration tests for the shapedb-sqlite crate.

use serde_json::{Value, json};
use shapedb_core::{Field, FieldType, Shape, ShapeRegistry};
use shapedb_sqlite::{
    Agg, Cmp, ColumnGroup, Database, DatabaseSchema, Engine, MigrationOutcome, Predicate, Row,
    SchemaDescriptor, SortKey, StoreError,
};

/// The entity every query test runs against.
fn entry_shape() -> Shape {
    Shape::new("entry")
        .with_field(Field::primary("id", FieldType::Number))
        .with_field(Field::required("word", FieldType::Text))
        .with_field(Field::required("number", FieldType::Number))
        .with_field(Field::required("boolean", FieldType::Boolean))
        .with_field(Field::new("nullable", FieldType::Boolean))
        .with_field(Field::new("string", FieldType::Text))
        .with_field(Field::new("tags", FieldType::List(Box::new(FieldType::Text))))
        .with_field(Field::new("draft", FieldType::Text).transient())
}

/// One seed row. `nullable` stays NULL when `None`.
fn entry(
    id: i64,
    word: &str,
    number: i64,
    boolean: bool,
    nullable: Option<bool>,
    string: &str,
) -> Row {
    match json!({
        "id": id,
        "word": word,
        "number": number,
        "boolean": boolean,
        "nullable": nullable,
        "string": string,
    }) {
        Value::Object(map) => map,
        other => panic!("expected object, got {other:?}"),
    }
}

fn obj(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other:?}"),
    }
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| row.get("id").and_then(Value::as_i64).unwrap())
        .collect()
}

/// Opens an in-memory store seeded with ten rows covering every filter
/// dimension: repeated words, a spread of numbers, both booleans, NULL and
/// non-NULL optionals.
fn seeded() -> Database {
    let registry = ShapeRegistry::new().with_shape(entry_shape());
    let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
    let (db, _) = Database::open_in_memory(registry, schema).unwrap();

    db.table("entry")
        .unwrap()
        .insert(vec![
            entry(1, "Vasudeva", 7, false, Some(true), "Sri Vasudevaya"),
            entry(2, "Hare", 12, true, None, "Hare Krishna"),
            entry(3, "Krishna", 4, false, None, "Hare Rama"),
            entry(4, "Rama", 5, false, Some(false), "Sita Rama"),
            entry(5, "Sita", 4, true, None, "Jaya Sita"),
            entry(6, "Krishna", 6, false, None, "Radhe Shyam"),
            entry(7, "Hari", 2, true, None, "Om Namah"),
            entry(8, "Om", 8, false, Some(true), "Gopala"),
            entry(9, "Rama", 3, false, None, "Govinda"),
            entry(10, "Chaytanya", 9, false, None, "Om Shanti"),
        ])
        .run()
        .unwrap();
    db
}

// =============================================================================
// Filtering and Ordering
// =============================================================================

#[test]
fn test_filter_by_boolean_decodes_bools() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .filter(Predicate::eq("boolean", true))
        .order_by("id")
        .fetch()
        .unwrap();

    assert_eq!(ids(&rows), vec![2, 5, 7]);
    // Stored as 0/1, decoded back to JSON booleans.
    assert_eq!(rows[0].get("boolean"), Some(&Value::Bool(true)));
    assert_eq!(rows[0].get("nullable"), Some(&Value::Null));
}

#[test]
fn test_null_checks_on_optional_column() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let absent = entry
        .select_all()
        .filter(Predicate::is_null("nullable"))
        .fetch()
        .unwrap();
    assert_eq!(absent.len(), 7);

    let present = entry
        .select_all()
        .filter(Predicate::is_not_null("nullable"))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&present), vec![1, 4, 8]);
}

#[test]
fn test_between_and_not_between() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let inside = entry
        .select_all()
        .filter(Predicate::between("number", 4, 6))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&inside), vec![3, 4, 5, 6]);

    let outside = entry
        .select_all()
        .filter(Predicate::not_between("number", 4, 6))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&outside), vec![1, 2, 7, 8, 9, 10]);
}

#[test]
fn test_membership() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let named = entry
        .select_all()
        .filter(Predicate::is_in("word", ["Hare", "Krishna", "Rama"]))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&named), vec![2, 3, 4, 6, 9]);

    let rest = entry
        .select_all()
        .filter(Predicate::not_in("word", ["Hare", "Krishna", "Rama"]))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&rest), vec![1, 5, 7, 8, 10]);
}

#[test]
fn test_like_prefix() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .filter(Predicate::like("string", "Om%"))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![7, 10]);
}

#[test]
fn test_and_joined_groups_with_ordering() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .filter(Predicate::eq("boolean", false))
        .and(Predicate::between("number", 3, 8))
        .order_by("number")
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![9, 3, 4, 6, 1, 8]);
}

#[test]
fn test_or_widens_the_current_group() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .filter(Predicate::eq("boolean", true))
        .or(Predicate::not_between("number", 3, 8))
        .order_by(SortKey::desc("number"))
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![2, 10, 5, 7]);
}

#[test]
fn test_match_fields_partial_equality() {
    let db = seeded();
    let partial = obj(json!({
        "number": 7,
        "boolean": false,
        "nullable": true,
        "word": "Vasudeva",
    }));
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .match_fields(&partial)
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![1]);
}

#[test]
fn test_search_tokens_and_over_columns_or() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    // Every token must prefix-match at least one of the columns.
    let both = entry
        .select_all()
        .search("Ha Kri", ["word", "string"])
        .fetch()
        .unwrap();
    assert_eq!(ids(&both), vec![3]);

    let single = entry
        .select_all()
        .search("Om", ["word", "string"])
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&single), vec![7, 8, 10]);
}

#[test]
fn test_column_to_column_comparison() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .filter(Predicate::column("number", Cmp::Gt, "id"))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![1, 2, 3, 4]);
}

#[test]
fn test_nulls_last_ordering() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select_all()
        .order_by(SortKey::asc("nullable").nulls_last())
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![4, 1, 8, 2, 3, 5, 6, 7, 9, 10]);
}

#[test]
fn test_pagination_is_disjoint() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let first = entry
        .select_all()
        .order_by("id")
        .limit(5)
        .fetch()
        .unwrap();
    assert_eq!(ids(&first), vec![1, 2, 3, 4, 5]);

    let second = entry
        .select_all()
        .order_by("id")
        .limit_offset(5, 5)
        .fetch()
        .unwrap();
    assert_eq!(ids(&second), vec![6, 7, 8, 9, 10]);
}

#[test]
fn test_column_projection() {
    let db = seeded();
    let rows = db
        .table("entry")
        .unwrap()
        .select(["id", "word"])
        .order_by("id")
        .fetch()
        .unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[0].get("word"), Some(&Value::from("Vasudeva")));
    assert!(rows[0].get("number").is_none());
}

// =============================================================================
// Aggregates
// =============================================================================

#[test]
fn test_aggregate_vocabulary() {
    let db = seeded();
    let stats = db
        .table("entry")
        .unwrap()
        .aggregate([Agg::count_all(), Agg::avg("number"), Agg::max("number")])
        .fetch()
        .unwrap();

    assert_eq!(stats.get("COUNT(*)"), Some(&Value::from(10)));
    assert_eq!(stats.get("AVG(number)"), Some(&Value::from(6.0)));
    assert_eq!(stats.get("MAX(number)"), Some(&Value::from(12)));
}

#[test]
fn test_filtered_aggregate_sum_vs_total() {
    let db = seeded();
    let stats = db
        .table("entry")
        .unwrap()
        .aggregate([Agg::sum("number"), Agg::total("number")])
        .filter(Predicate::eq("boolean", true))
        .fetch()
        .unwrap();

    // SUM keeps integer affinity, TOTAL is always a float.
    assert_eq!(stats.get("SUM(number)"), Some(&Value::from(18)));
    assert_eq!(stats.get("TOTAL(number)"), Some(&Value::from(18.0)));
}

#[test]
fn test_distinct_aggregate() {
    let db = seeded();
    let stats = db
        .table("entry")
        .unwrap()
        .aggregate([Agg::count("word").distinct()])
        .fetch()
        .unwrap();
    assert_eq!(stats.get("COUNT(DISTINCT word)"), Some(&Value::from(8)));
}

#[test]
fn test_group_concat_plain_and_with_separator() {
    let db = seeded();
    let stats = db
        .table("entry")
        .unwrap()
        .aggregate([
            Agg::group_concat("word").distinct(),
            Agg::group_concat_sep("word", " | "),
        ])
        .fetch()
        .unwrap();

    // Unfiltered scans feed the aggregate in rowid order.
    assert_eq!(
        stats.get("GROUP_CONCAT(DISTINCT word)"),
        Some(&Value::from(
            "Vasudeva,Hare,Krishna,Rama,Sita,Hari,Om,Chaytanya"
        ))
    );
    assert_eq!(
        stats.get("GROUP_CONCAT(word, ' | ')"),
        Some(&Value::from(
            "Vasudeva | Hare | Krishna | Rama | Sita | Krishna | Hari | Om | Rama | Chaytanya"
        ))
    );
}

// =============================================================================
// Mutations
// =============================================================================

#[test]
fn test_insert_replaces_on_primary_conflict() {
    let db = seeded();
    let entry_table = db.table("entry").unwrap();

    let affected = entry_table
        .insert(vec![entry(1, "Replaced", 1, true, None, "overwritten")])
        .run()
        .unwrap();
    assert_eq!(affected, 1);

    let stats = entry_table.aggregate([Agg::count_all()]).fetch().unwrap();
    assert_eq!(stats.get("COUNT(*)"), Some(&Value::from(10)));

    let rows = entry_table
        .select(["word"])
        .filter(Predicate::eq("id", 1))
        .fetch()
        .unwrap();
    assert_eq!(rows[0].get("word"), Some(&Value::from("Replaced")));
}

#[test]
fn test_absent_primary_gets_rowid() {
    let db = seeded();
    let entry_table = db.table("entry").unwrap();

    entry_table
        .insert(vec![obj(json!({
            "word": "Nitai",
            "number": 16,
            "boolean": false,
        }))])
        .run()
        .unwrap();

    let rows = entry_table
        .select(["id"])
        .filter(Predicate::eq("word", "Nitai"))
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![11]);
}

#[test]
fn test_insert_missing_required_is_rejected() {
    let db = seeded();
    let entry_table = db.table("entry").unwrap();

    let result = entry_table
        .insert(vec![obj(json!({"id": 99, "word": "Gaura", "number": 1}))])
        .run();
    assert!(matches!(result, Err(StoreError::Validation(_))));

    let stats = entry_table.aggregate([Agg::count_all()]).fetch().unwrap();
    assert_eq!(stats.get("COUNT(*)"), Some(&Value::from(10)));
}

#[test]
fn test_filtered_update() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let affected = entry
        .update(obj(json!({"string": "Mahamantra"})))
        .filter(Predicate::eq("word", "Krishna"))
        .run()
        .unwrap();
    assert_eq!(affected, 2);

    let rows = entry
        .select(["id", "string"])
        .filter(Predicate::eq("string", "Mahamantra"))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![3, 6]);
}

#[test]
fn test_update_multiple_by_primary_key() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let affected = entry
        .update_multiple(vec![
            obj(json!({"id": 1, "number": 70})),
            obj(json!({"id": 2, "number": 120})),
        ])
        .run()
        .unwrap();
    assert_eq!(affected, 2);

    let rows = entry
        .select(["id", "number"])
        .filter(Predicate::is_in("id", [1, 2, 3]))
        .order_by("id")
        .fetch()
        .unwrap();
    assert_eq!(rows[0].get("number"), Some(&Value::from(70)));
    assert_eq!(rows[1].get("number"), Some(&Value::from(120)));
    assert_eq!(rows[2].get("number"), Some(&Value::from(4)));
}

#[test]
fn test_update_multiple_requires_primary_key() {
    let db = seeded();
    let result = db
        .table("entry")
        .unwrap()
        .update_multiple(vec![obj(json!({"number": 1}))])
        .run();
    assert!(matches!(result, Err(StoreError::Validation(_))));
}

#[test]
fn test_filtered_delete() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let affected = entry
        .delete()
        .filter(Predicate::eq("word", "Chaytanya"))
        .run()
        .unwrap();
    assert_eq!(affected, 1);

    let stats = entry.aggregate([Agg::count_all()]).fetch().unwrap();
    assert_eq!(stats.get("COUNT(*)"), Some(&Value::from(9)));
    let gone = entry
        .select_all()
        .filter(Predicate::eq("id", 10))
        .fetch()
        .unwrap();
    assert!(gone.is_empty());
}

#[test]
fn test_structured_field_round_trip() {
    let db = seeded();
    let entry_table = db.table("entry").unwrap();

    entry_table
        .insert(vec![obj(json!({
            "id": 11,
            "word": "Gauranga",
            "number": 1,
            "boolean": false,
            "tags": ["mantra", "daily"],
        }))])
        .run()
        .unwrap();

    let rows = entry_table
        .select_all()
        .filter(Predicate::is_not_null("tags"))
        .fetch()
        .unwrap();
    assert_eq!(ids(&rows), vec![11]);
    assert_eq!(rows[0].get("tags"), Some(&json!(["mantra", "daily"])));

    let untagged = entry_table
        .select_all()
        .filter(Predicate::is_null("tags"))
        .fetch()
        .unwrap();
    assert_eq!(untagged.len(), 10);
}

// =============================================================================
// Migration Lifecycle
// =============================================================================

#[test]
fn test_reopen_same_declaration_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let registry = ShapeRegistry::new().with_shape(entry_shape());
    let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
    let (db, report) = Database::open(&path, registry.clone(), schema.clone()).unwrap();
    assert_eq!(report.outcome, MigrationOutcome::Created);
    db.table("entry")
        .unwrap()
        .insert(vec![entry(1, "Hare", 1, true, None, "kept")])
        .run()
        .unwrap();
    drop(db);

    let (db, report) = Database::open(&path, registry, schema).unwrap();
    assert!(report.is_noop());
    let rows = db.table("entry").unwrap().select_all().fetch().unwrap();
    assert_eq!(rows[0].get("word"), Some(&Value::from("Hare")));
}

#[test]
fn test_column_rename_preserves_data_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let v1 = Shape::new("entry")
        .with_field(Field::primary("id", FieldType::Number))
        .with_field(Field::required("term", FieldType::Text));
    let registry = ShapeRegistry::new().with_shape(v1);
    let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
    let (db, _) = Database::open(&path, registry, schema).unwrap();
    db.table("entry")
        .unwrap()
        .insert(vec![obj(json!({"id": 1, "term": "mantra"}))])
        .run()
        .unwrap();
    drop(db);

    let v2 = Shape::new("entry")
        .with_field(Field::primary("id", FieldType::Number))
        .with_field(Field::required("word", FieldType::Text));
    let registry = ShapeRegistry::new().with_shape(v2);
    let schema = DatabaseSchema::new().with_entity(
        "entry",
        SchemaDescriptor::new().with_column_history("word", ["term"]),
    );
    let (db, report) = Database::open(&path, registry, schema).unwrap();
    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(report.columns_renamed, 1);

    let rows = db.table("entry").unwrap().select_all().fetch().unwrap();
    assert_eq!(rows[0].get("word"), Some(&Value::from("mantra")));
}

#[test]
fn test_table_rename_preserves_data_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let v1 = Shape::new("vocabulary")
        .with_field(Field::primary("id", FieldType::Number))
        .with_field(Field::required("word", FieldType::Text));
    let registry = ShapeRegistry::new().with_shape(v1);
    let schema = DatabaseSchema::new().with_entity("vocabulary", SchemaDescriptor::new());
    let (db, _) = Database::open(&path, registry, schema).unwrap();
    db.table("vocabulary")
        .unwrap()
        .insert(vec![obj(json!({"id": 1, "word": "Hare"}))])
        .run()
        .unwrap();
    drop(db);

    let v2 = Shape::new("entry")
        .with_field(Field::primary("id", FieldType::Number))
        .with_field(Field::required("word", FieldType::Text));
    let registry = ShapeRegistry::new().with_shape(v2);
    let schema = DatabaseSchema::new().with_entity(
        "entry",
        SchemaDescriptor::new().with_table_history(["vocabulary"]),
    );
    let (db, report) = Database::open(&path, registry, schema).unwrap();
    assert_eq!(report.tables_renamed, 1);
    assert_eq!(report.tables_dropped, 0);

    let rows = db.table("entry").unwrap().select_all().fetch().unwrap();
    assert_eq!(rows[0].get("word"), Some(&Value::from("Hare")));
}

#[test]
fn test_index_declaration_converges_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let registry = ShapeRegistry::new().with_shape(entry_shape());
    let indexed = DatabaseSchema::new().with_entity(
        "entry",
        SchemaDescriptor::new().with_index(ColumnGroup::new(["word"])),
    );
    let (db, _) = Database::open(&path, registry.clone(), indexed).unwrap();
    drop(db);

    let inspect = Engine::open(&path).unwrap();
    let indexes = &inspect.table_indexes(&["entry"]).unwrap()[0];
    let word_index = indexes.iter().find(|i| i.name == "idx_entry_word").unwrap();
    assert!(!word_index.unique);
    drop(inspect);

    let unique = DatabaseSchema::new().with_entity(
        "entry",
        SchemaDescriptor::new().with_unique(ColumnGroup::new(["word"])),
    );
    let (db, report) = Database::open(&path, registry, unique).unwrap();
    assert_eq!(report.indexes_dropped, 1);
    assert_eq!(report.indexes_created, 1);
    drop(db);

    let inspect = Engine::open(&path).unwrap();
    let indexes = &inspect.table_indexes(&["entry"]).unwrap()[0];
    let word_index = indexes.iter().find(|i| i.name == "idx_entry_word").unwrap();
    assert!(word_index.unique);
}

#[test]
fn test_required_addition_fails_and_preserves_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let registry = ShapeRegistry::new().with_shape(entry_shape());
    let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
    let (db, _) = Database::open(&path, registry.clone(), schema.clone()).unwrap();
    db.table("entry")
        .unwrap()
        .insert(vec![entry(1, "Hare", 1, true, None, "kept")])
        .run()
        .unwrap();
    drop(db);

    let expanded = entry_shape().with_field(Field::required("lang", FieldType::Text));
    let bad_registry = ShapeRegistry::new().with_shape(expanded);
    let result = Database::open(&path, bad_registry, schema.clone());
    assert!(matches!(result, Err(StoreError::SchemaViolation { .. })));

    // The failed migration rolled back, so the original declaration still
    // matches the stored fingerprint.
    let (db, report) = Database::open(&path, registry, schema).unwrap();
    assert!(report.is_noop());
    let rows = db.table("entry").unwrap().select_all().fetch().unwrap();
    assert_eq!(rows[0].get("word"), Some(&Value::from("Hare")));
}

#[test]
fn test_undeclared_entity_table_dropped_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let registry = ShapeRegistry::new()
        .with_shape(entry_shape())
        .with_shape(
            Shape::new("profile")
                .with_field(Field::primary("id", FieldType::Number))
                .with_field(Field::required("name", FieldType::Text)),
        );
    let schema = DatabaseSchema::new()
        .with_entity("entry", SchemaDescriptor::new())
        .with_entity("profile", SchemaDescriptor::new());
    let (db, _) = Database::open(&path, registry, schema).unwrap();
    drop(db);

    let registry = ShapeRegistry::new().with_shape(entry_shape());
    let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
    let (db, report) = Database::open(&path, registry, schema).unwrap();
    assert_eq!(report.tables_dropped, 1);
    assert!(db.table("profile").is_err());
    drop(db);

    let inspect = Engine::open(&path).unwrap();
    let tables = inspect.user_tables().unwrap();
    assert!(!tables.contains(&"profile".to_string()));
    assert!(tables.contains(&"entry".to_string()));
}

// =============================================================================
// Rejection Paths
// =============================================================================

#[test]
fn test_unknown_column_rejected_everywhere() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let select = entry.select(["nope"]).fetch();
    assert!(matches!(
        select,
        Err(StoreError::UnknownColumn { column, .. }) if column == "nope"
    ));

    // Transient fields have no column, so predicates cannot see them.
    let transient = entry
        .select_all()
        .filter(Predicate::eq("draft", "x"))
        .fetch();
    assert!(matches!(
        transient,
        Err(StoreError::UnknownColumn { column, .. }) if column == "draft"
    ));
}

#[test]
fn test_type_admission_rejections() {
    let db = seeded();
    let entry = db.table("entry").unwrap();

    let like_on_number = entry
        .select_all()
        .filter(Predicate::like("number", "1%"))
        .fetch();
    assert!(matches!(
        like_on_number,
        Err(StoreError::TypeMismatch { column, .. }) if column == "number"
    ));

    let order_on_boolean = entry
        .select_all()
        .filter(Predicate::gt("boolean", true))
        .fetch();
    assert!(matches!(
        order_on_boolean,
        Err(StoreError::TypeMismatch { column, .. }) if column == "boolean"
    ));
}
