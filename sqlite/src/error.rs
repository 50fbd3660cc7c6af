//! Error types for the SQLite storage backend.
//!
//! Provides a unified error type covering engine access, migration,
//! validation, and query-builder failures.

use thiserror::Error;

/// Errors that can occur in the SQLite storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite operation failure, surfaced verbatim.
    #[error("engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    /// Migration would add a required or primary column to an existing
    /// table. Never weakened to a nullable add; the migration aborts.
    #[error("cannot add required column '{column}' to existing table '{table}'")]
    SchemaViolation {
        /// Table the column would be added to.
        table: String,
        /// The declared column that has no physical counterpart.
        column: String,
    },

    /// An object submitted for insert/update fails shape validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A rename history matches more than one live table or column, so the
    /// migration cannot pick a source without guessing.
    #[error("ambiguous rename history for '{entity}': candidates {candidates:?}")]
    MigrationAmbiguity {
        /// Entity (or `entity.field`) whose history is ambiguous.
        entity: String,
        /// All still-present candidates.
        candidates: Vec<String>,
    },

    /// Requested table is not part of the declared schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Referenced column is not declared on the shape.
    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn {
        /// Table the column was referenced on.
        table: String,
        /// The unknown column name.
        column: String,
    },

    /// Name is not usable as a table/column/index identifier.
    #[error("invalid identifier '{0}': must start with a letter or underscore and contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// A predicate is not admitted by the column's declared type.
    #[error("operation {operation} is not supported on column '{column}'")]
    TypeMismatch {
        /// Column the predicate referenced.
        column: String,
        /// Rendered form of the rejected operation.
        operation: String,
    },

    /// Structured-field encode/decode failure.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
