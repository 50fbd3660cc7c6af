//! SQLite storage backend for shape-declared entities.
//!
//! This crate persists [`Shape`](shapedb_core::Shape)-declared entities in
//! SQLite: each declared entity becomes one table, structured fields are
//! stored as versioned JSON text, and the physical schema is reconciled
//! with the declaration by a fingerprint-driven migration every time the
//! store is opened. On top of that sits a staged query-builder interface
//! over `serde_json` entity objects.
//!
//! # Architecture
//!
//! - **`descriptor`** — per-entity index declarations and rename histories
//! - **`fingerprint`** — deterministic hashing of the full declaration
//! - **`migration`** — reconciles the physical store with the declaration
//! - **`engine`** — serialized connection access and pragma introspection
//! - **`predicate` / `query`** — typed filters and staged query builders
//! - **`database`** — validated open and per-table handles
//!
//! # Quick start — declaring and opening
//!
//! ```no_run
//! use shapedb_core::{Field, FieldType, Shape, ShapeRegistry};
//! use shapedb_sqlite::{ColumnGroup, Database, DatabaseSchema, SchemaDescriptor};
//!
//! let registry = ShapeRegistry::new().with_shape(
//!     Shape::new("entry")
//!         .with_field(Field::primary("id", FieldType::Number))
//!         .with_field(Field::required("word", FieldType::Text))
//!         .with_field(Field::new("meaning", FieldType::Text)),
//! );
//! let schema = DatabaseSchema::new().with_entity(
//!     "entry",
//!     SchemaDescriptor::new().with_index(ColumnGroup::new(["word"])),
//! );
//!
//! let (db, report) = Database::open("entries.db", registry, schema).unwrap();
//! println!("migration outcome: {:?}", report.outcome);
//! ```
//!
//! Reopening with a changed declaration migrates in place: renamed tables
//! and columns are carried along their declared histories, new optional
//! columns are added, and indexes converge on the declared set.
//!
//! # Quick start — queries
//!
//! ```
//! use serde_json::json;
//! use shapedb_core::{Field, FieldType, Shape, ShapeRegistry};
//! use shapedb_sqlite::{Agg, Database, DatabaseSchema, Predicate, SchemaDescriptor, SortKey};
//!
//! let registry = ShapeRegistry::new().with_shape(
//!     Shape::new("entry")
//!         .with_field(Field::primary("id", FieldType::Number))
//!         .with_field(Field::required("word", FieldType::Text))
//!         .with_field(Field::new("number", FieldType::Number)),
//! );
//! let schema = DatabaseSchema::new().with_entity("entry", SchemaDescriptor::new());
//! let (db, _) = Database::open_in_memory(registry, schema).unwrap();
//! let entry = db.table("entry").unwrap();
//!
//! let object = json!({"word": "Hare", "number": 12});
//! entry
//!     .insert(vec![object.as_object().unwrap().clone()])
//!     .run()
//!     .unwrap();
//!
//! let rows = entry
//!     .select(["id", "word"])
//!     .filter(Predicate::like("word", "Ha%"))
//!     .order_by(SortKey::desc("number"))
//!     .limit(10)
//!     .fetch()
//!     .unwrap();
//! println!("{} matches", rows.len());
//!
//! let stats = entry
//!     .aggregate([Agg::count_all(), Agg::avg("number")])
//!     .fetch()
//!     .unwrap();
//! println!("count: {:?}", stats.get("COUNT(*)"));
//! ```
//!
//! Builders do nothing until their terminal `fetch()` / `run()`; every
//! statement runs inside a transaction on one serialized connection.

mod codec;
mod database;
mod descriptor;
mod engine;
mod error;
mod fingerprint;
mod migration;
mod predicate;
mod query;

pub use codec::CODEC_VERSION;
pub use database::{Database, Table};
pub use descriptor::{ColumnGroup, DatabaseSchema, IndexColumn, SchemaDescriptor};
pub use engine::{ColumnInfo, Engine, IndexInfo, Row, ScalarValue, Tx};
pub use error::{Result, StoreError};
pub use fingerprint::schema_fingerprint;
pub use migration::{MigrationOutcome, MigrationReport};
pub use predicate::{Cmp, Predicate};
pub use query::{
    Agg, Aggregate, Delete, Filtered, Fresh, Insert, Ordered, Select, SortKey, Update,
    UpdateMultiple,
};
