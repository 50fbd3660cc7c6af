//! Core shape types for shapedb entity schemas.
//!
//! This crate defines the declarative data model storage backends build on:
//!
//! - [`Shape`] — a named entity schema, an ordered list of fields.
//! - [`Field`] — one field with a declared [`FieldType`] and [`FieldFlags`].
//! - [`FieldType`] — scalar (`Text`/`Number`/`Boolean`) or structured
//!   (`Shape`/`List`/`Map`) value types.
//! - [`ShapeRegistry`] — the set of shapes an application declares at
//!   startup.
//!
//! Validation ([`validate_shape`], [`validate_registry`]) catches structural
//! errors such as duplicate fields, multiple primary keys, and invalid
//! identifiers before any physical schema is derived.
//!
//! # Example
//!
//! ```
//! use shapedb_core::*;
//!
//! // Declare the entities an application persists
//! let registry = ShapeRegistry::new()
//!     .with_shape(
//!         Shape::new("profile")
//!             .with_field(Field::primary("id", FieldType::Number))
//!             .with_field(Field::required("name", FieldType::Text))
//!             .with_field(Field::new("city", FieldType::Text).indexed())
//!             .with_field(Field::new("draft", FieldType::Text).transient()),
//!     );
//!
//! let profile = registry.get("profile").unwrap();
//! assert_eq!(profile.primary_field().unwrap().name, "id");
//! assert_eq!(profile.persisted_fields().count(), 3);
//! assert!(validate_registry(&registry).is_empty());
//! ```

mod registry;
mod types;
mod validate;

pub use registry::ShapeRegistry;
pub use types::*;
pub use validate::{ValidationError, is_valid_identifier, validate_registry, validate_shape};
