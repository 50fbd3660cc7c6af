//! Shape and registry validation.
//!
//! Validates structural invariants of shapes before a storage backend maps
//! them to physical tables: identifier hygiene, duplicate fields, and the
//! primary-key flag rules. Catching these early keeps schema errors out of
//! generated DDL.
//!
//! # Examples
//!
//! ```
//! use shapedb_core::*;
//!
//! let shape = Shape::new("profile")
//!     .with_field(Field::primary("id", FieldType::Number))
//!     .with_field(Field::required("name", FieldType::Text));
//! assert!(validate_shape(&shape).is_empty());
//!
//! // Invalid: two primary fields
//! let bad = Shape::new("profile")
//!     .with_field(Field::primary("id", FieldType::Number))
//!     .with_field(Field::primary("uid", FieldType::Number));
//! assert!(!validate_shape(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{Shape, ShapeRegistry};

/// Shape/registry validation errors.
///
/// Each variant describes a specific structural problem found during
/// validation. The `Display` impl provides a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Shape name is empty or whitespace-only.
    #[error("shape name cannot be empty")]
    EmptyShapeName,
    /// Shape or field name is not a valid identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// Two shapes in the same registry share a name.
    #[error("duplicate shape in registry: {0}")]
    DuplicateShape(String),
    /// Two fields in the same shape share a name.
    #[error("duplicate field in shape {shape}: {field}")]
    DuplicateField {
        /// Owning shape name.
        shape: String,
        /// Offending field name.
        field: String,
    },
    /// Every field of the shape is transient, so no table can be derived.
    #[error("shape {0} has no persisted fields")]
    NoPersistedFields(String),
    /// More than one field carries the `primary` flag.
    #[error("shape {0} declares more than one primary field")]
    MultiplePrimaryFields(String),
    /// A primary field is missing the implied `required`/`unique` flags.
    #[error("primary field {field} in shape {shape} must be required and unique")]
    PrimaryMissingImpliedFlags {
        /// Owning shape name.
        shape: String,
        /// Offending field name.
        field: String,
    },
    /// A primary field is flagged transient.
    #[error("primary field {field} in shape {shape} cannot be transient")]
    TransientPrimary {
        /// Owning shape name.
        shape: String,
        /// Offending field name.
        field: String,
    },
    /// A primary field has a structured (shape/list/map) type.
    #[error("primary field {field} in shape {shape} must have a scalar type")]
    StructuredPrimary {
        /// Owning shape name.
        shape: String,
        /// Offending field name.
        field: String,
    },
}

/// Checks whether a name is usable as a table or column identifier.
///
/// Valid identifiers start with an ASCII letter or underscore and continue
/// with ASCII letters, digits, or underscores. This is deliberately stricter
/// than what stores accept with quoting; generated DDL never quotes names.
///
/// # Examples
///
/// ```
/// use shapedb_core::is_valid_identifier;
///
/// assert!(is_valid_identifier("profile"));
/// assert!(is_valid_identifier("date_synced"));
/// assert!(!is_valid_identifier("2fast"));
/// assert!(!is_valid_identifier("drop table"));
/// assert!(!is_valid_identifier(""));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates every shape in a registry plus registry-level invariants.
///
/// Checks for duplicate shape names, then validates each shape
/// individually. Returns on the first problem found.
///
/// # Examples
///
/// ```
/// use shapedb_core::*;
///
/// let registry = ShapeRegistry::new()
///     .with_shape(Shape::new("profile").with_field(Field::primary("id", FieldType::Number)))
///     .with_shape(Shape::new("profile").with_field(Field::primary("id", FieldType::Number)));
///
/// let errors = validate_registry(&registry);
/// assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateShape(_))));
/// ```
pub fn validate_registry(registry: &ShapeRegistry) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for shape in registry.iter() {
        if !seen.insert(shape.name.as_str()) {
            errors.push(ValidationError::DuplicateShape(shape.name.clone()));
            return errors;
        }
        errors.extend(validate_shape(shape));
        if !errors.is_empty() {
            return errors;
        }
    }

    errors
}

/// Validates a single shape.
///
/// Checks identifier hygiene for the shape and field names, duplicate
/// fields, that at least one field is persisted, and the primary-key flag
/// invariants (at most one primary; primary implies required and unique;
/// primary must be a persisted scalar).
pub fn validate_shape(shape: &Shape) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if shape.name.trim().is_empty() {
        errors.push(ValidationError::EmptyShapeName);
        return errors;
    }
    if !is_valid_identifier(&shape.name) {
        errors.push(ValidationError::InvalidIdentifier(shape.name.clone()));
        return errors;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut primary_count = 0usize;
    for field in &shape.fields {
        if !is_valid_identifier(&field.name) {
            errors.push(ValidationError::InvalidIdentifier(field.name.clone()));
            return errors;
        }
        if !seen.insert(field.name.as_str()) {
            errors.push(ValidationError::DuplicateField {
                shape: shape.name.clone(),
                field: field.name.clone(),
            });
            return errors;
        }

        if field.flags.primary {
            primary_count += 1;
            if !field.flags.required || !field.flags.unique {
                errors.push(ValidationError::PrimaryMissingImpliedFlags {
                    shape: shape.name.clone(),
                    field: field.name.clone(),
                });
                return errors;
            }
            if field.flags.transient {
                errors.push(ValidationError::TransientPrimary {
                    shape: shape.name.clone(),
                    field: field.name.clone(),
                });
                return errors;
            }
            if field.ty.is_structured() {
                errors.push(ValidationError::StructuredPrimary {
                    shape: shape.name.clone(),
                    field: field.name.clone(),
                });
                return errors;
            }
        }
    }

    if primary_count > 1 {
        errors.push(ValidationError::MultiplePrimaryFields(shape.name.clone()));
        return errors;
    }

    if shape.persisted_fields().next().is_none() {
        errors.push(ValidationError::NoPersistedFields(shape.name.clone()));
        return errors;
    }

    errors
}
