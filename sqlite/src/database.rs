//! The entry point: validated open, migration, and per-table handles.
//!
//! [`Database::open`] is the only way to reach a [`Table`], and it runs the
//! declaration through validation and migration first. Queries therefore
//! never observe a store whose physical schema disagrees with the declared
//! one.

use std::path::Path;
use std::sync::Arc;

use shapedb_core::{Shape, ShapeRegistry, is_valid_identifier, validate_registry};

use crate::descriptor::DatabaseSchema;
use crate::engine::{Engine, Row};
use crate::error::{Result, StoreError};
use crate::fingerprint::schema_fingerprint;
use crate::migration::{CONFIG_TABLE, MigrationReport, Migrator};
use crate::predicate::persisted_field;
use crate::query::{Agg, Aggregate, Delete, Fresh, Insert, Select, Update, UpdateMultiple};

/// An open store whose physical schema matches its declaration.
///
/// Holds one handle per declared entity; [`table`](Database::table) hands
/// them out by name. The underlying connection is shared by all handles
/// and closed when the last one is dropped.
///
/// # Examples
///
/// ```no_run
/// use shapedb_core::{Field, FieldType, Shape, ShapeRegistry};
/// use shapedb_sqlite::{Database, DatabaseSchema, Result, SchemaDescriptor};
///
/// fn open_store() -> Result<Database> {
///     let registry = ShapeRegistry::new().with_shape(
///         Shape::new("entry")
///             .with_field(Field::primary("id", FieldType::Number))
///             .with_field(Field::required("word", FieldType::Text)),
///     );
///     let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
///     let (db, report) = Database::open("entries.db", registry, schema)?;
///     println!("migration outcome: {:?}", report.outcome);
///     Ok(db)
/// }
/// ```
pub struct Database {
    tables: Vec<Table>,
}

impl Database {
    /// Opens (creating if needed) a database file and migrates it to the
    /// declared schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the registry violates shape
    /// invariants, [`StoreError::UnknownTable`] if the schema declares an
    /// entity the registry does not define, [`StoreError::UnknownColumn`]
    /// if a descriptor indexes a column the shape does not persist,
    /// [`StoreError::InvalidIdentifier`] for unusable names, and any
    /// migration error.
    pub fn open(
        path: impl AsRef<Path>,
        registry: ShapeRegistry,
        schema: DatabaseSchema,
    ) -> Result<(Self, MigrationReport)> {
        Self::with_engine(Engine::open(path)?, registry, schema)
    }

    /// Opens a fresh in-memory store. Validation and migration behave
    /// exactly as in [`open`](Database::open).
    pub fn open_in_memory(
        registry: ShapeRegistry,
        schema: DatabaseSchema,
    ) -> Result<(Self, MigrationReport)> {
        Self::with_engine(Engine::open_in_memory()?, registry, schema)
    }

    /// Builds a database over an already-opened engine.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Database::open).
    pub fn with_engine(
        engine: Engine,
        registry: ShapeRegistry,
        schema: DatabaseSchema,
    ) -> Result<(Self, MigrationReport)> {
        validate_declaration(&registry, &schema)?;

        let fingerprint = schema_fingerprint(&registry, &schema)?;
        let report = Migrator::new(&engine, &registry, &schema, fingerprint).run()?;

        let engine = Arc::new(engine);
        let mut tables = Vec::with_capacity(schema.names().len());
        for (name, _) in schema.iter() {
            let shape = registry
                .get(name)
                .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
            tables.push(Table {
                name: name.to_string(),
                shape: shape.clone(),
                engine: Arc::clone(&engine),
            });
        }
        Ok((Self { tables }, report))
    }

    /// Looks up the handle for a declared entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownTable`] if `name` is not part of the
    /// declared schema.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }
}

/// Query access to one declared entity.
///
/// Every method returns a builder; nothing touches the store until the
/// builder's `fetch()` or `run()` is called.
pub struct Table {
    name: String,
    shape: Shape,
    engine: Arc<Engine>,
}

impl Table {
    /// The entity (and physical table) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared shape backing this table.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Starts a SELECT over the named columns.
    pub fn select<I, C>(&self, columns: I) -> Select<'_, Fresh>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Select::new(
            &self.engine,
            &self.name,
            &self.shape,
            columns.into_iter().map(Into::into).collect(),
        )
    }

    /// Starts a SELECT over every persisted column.
    pub fn select_all(&self) -> Select<'_, Fresh> {
        Select::new(&self.engine, &self.name, &self.shape, Vec::new())
    }

    /// Starts an aggregate query over the given expressions.
    pub fn aggregate<I>(&self, aggs: I) -> Aggregate<'_, Fresh>
    where
        I: IntoIterator<Item = Agg>,
    {
        Aggregate::new(
            &self.engine,
            &self.name,
            &self.shape,
            aggs.into_iter().collect(),
        )
    }

    /// Starts a bulk upsert of whole entities.
    pub fn insert(&self, objects: Vec<Row>) -> Insert<'_> {
        Insert::new(&self.engine, &self.name, &self.shape, objects)
    }

    /// Starts a filtered update applying `changes` to every matching row.
    pub fn update(&self, changes: Row) -> Update<'_, Fresh> {
        Update::new(&self.engine, &self.name, &self.shape, changes)
    }

    /// Starts a per-object update keyed by each object's primary field.
    pub fn update_multiple(&self, objects: Vec<Row>) -> UpdateMultiple<'_> {
        UpdateMultiple::new(&self.engine, &self.name, &self.shape, objects)
    }

    /// Starts a filtered delete.
    pub fn delete(&self) -> Delete<'_, Fresh> {
        Delete::new(&self.engine, &self.name, &self.shape)
    }
}

/// Rejects a declaration before any SQL is generated from it.
///
/// Registry invariants come first, then each declared entity must stay off
/// the reserved config name and resolve to a shape, every
/// descriptor-referenced column must be persisted, and every rename-history
/// name must be a usable identifier.
fn validate_declaration(registry: &ShapeRegistry, schema: &DatabaseSchema) -> Result<()> {
    let problems = validate_registry(registry);
    if !problems.is_empty() {
        let rendered: Vec<String> = problems.iter().map(ToString::to_string).collect();
        return Err(StoreError::Validation(rendered.join("; ")));
    }

    for (name, descriptor) in schema.iter() {
        if name == CONFIG_TABLE {
            return Err(StoreError::Validation(format!(
                "entity name '{CONFIG_TABLE}' is reserved"
            )));
        }
        let shape = registry
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;

        for group in descriptor.unique.iter().chain(descriptor.index.iter()) {
            for column in group.column_names() {
                persisted_field(shape, column)?;
            }
        }

        for prior in &descriptor.table_names_history {
            if !is_valid_identifier(prior) {
                return Err(StoreError::InvalidIdentifier(prior.clone()));
            }
            if prior == CONFIG_TABLE {
                return Err(StoreError::Validation(format!(
                    "table history cannot reference the reserved '{CONFIG_TABLE}' table"
                )));
            }
        }
        for (field, priors) in &descriptor.column_names_history {
            if !is_valid_identifier(field) {
                return Err(StoreError::InvalidIdentifier(field.clone()));
            }
            for prior in priors {
                if !is_valid_identifier(prior) {
                    return Err(StoreError::InvalidIdentifier(prior.clone()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use shapedb_core::{Field, FieldType};

    use super::*;
    use crate::descriptor::{ColumnGroup, SchemaDescriptor};
    use crate::migration::MigrationOutcome;

    fn entry_shape() -> Shape {
        Shape::new("entry")
            .with_field(Field::primary("id", FieldType::Number))
            .with_field(Field::required("word", FieldType::Text))
    }

    fn declaration() -> (ShapeRegistry, DatabaseSchema) {
        (
            ShapeRegistry::new().with_shape(entry_shape()),
            DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new()),
        )
    }

    fn obj(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_open_migrates_and_hands_out_tables() {
        let (registry, schema) = declaration();
        let (db, report) = Database::open_in_memory(registry, schema).unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Created);
        assert_eq!(db.table("entry").unwrap().name(), "entry");
        assert!(matches!(
            db.table("missing"),
            Err(StoreError::UnknownTable(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_open_rejects_registry_violations() {
        let registry = ShapeRegistry::new().with_shape(
            Shape::new("entry")
                .with_field(Field::primary("id", FieldType::Number))
                .with_field(Field::primary("uuid", FieldType::Text)),
        );
        let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());

        let result = Database::open_in_memory(registry, schema);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_open_rejects_undeclared_entity() {
        let registry = ShapeRegistry::new().with_shape(entry_shape());
        let schema = DatabaseSchema::new()
            .with_entity("entry", SchemaDescriptor::new())
            .with_entity("phantom", SchemaDescriptor::new());

        let result = Database::open_in_memory(registry, schema);
        assert!(matches!(
            result,
            Err(StoreError::UnknownTable(name)) if name == "phantom"
        ));
    }

    #[test]
    fn test_open_rejects_index_on_unknown_column() {
        let registry = ShapeRegistry::new().with_shape(entry_shape());
        let schema = DatabaseSchema::new().with_entity(
            "entry",
            SchemaDescriptor::new().with_index(ColumnGroup::new(["nope"])),
        );

        let result = Database::open_in_memory(registry, schema);
        assert!(matches!(
            result,
            Err(StoreError::UnknownColumn { column, .. }) if column == "nope"
        ));
    }

    #[test]
    fn test_open_rejects_reserved_entity_name() {
        let registry = ShapeRegistry::new().with_shape(
            Shape::new("_Config")
                .with_field(Field::primary("id", FieldType::Number))
                .with_field(Field::required("key", FieldType::Text)),
        );
        let schema = DatabaseSchema::new().with_entity("_Config", SchemaDescriptor::new());

        let result = Database::open_in_memory(registry, schema);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_open_rejects_unusable_history_name() {
        let registry = ShapeRegistry::new().with_shape(entry_shape());
        let schema = DatabaseSchema::new().with_entity(
            "entry",
            SchemaDescriptor::new().with_table_history(["bad name"]),
        );

        let result = Database::open_in_memory(registry, schema);
        assert!(matches!(
            result,
            Err(StoreError::InvalidIdentifier(name)) if name == "bad name"
        ));
    }

    #[test]
    fn test_facade_round_trip() {
        let (registry, schema) = declaration();
        let (db, _) = Database::open_in_memory(registry, schema).unwrap();
        let entry = db.table("entry").unwrap();

        let inserted = entry
            .insert(vec![
                obj(json!({"word": "Hare"})),
                obj(json!({"word": "Krishna"})),
            ])
            .run()
            .unwrap();
        assert_eq!(inserted, 2);

        let rows = entry.select_all().order_by("id").fetch().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("word"), Some(&Value::from("Hare")));
        assert_eq!(rows[1].get("id"), Some(&Value::from(2)));
    }
}
