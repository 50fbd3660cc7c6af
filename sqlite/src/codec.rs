//! Versioned encoding for structured field values.
//!
//! Fields whose declared type is a nested shape, a list, or a map are
//! persisted as text. This module is the single place that text form is
//! defined: version 1 encodes the value as compact JSON. The version
//! participates in the schema fingerprint, so bumping it forces a migration
//! cycle instead of silently mixing encodings in one table.

use serde_json::Value;
use shapedb_core::FieldType;

use crate::error::{Result, StoreError};

/// Version of the structured-field encoding.
pub const CODEC_VERSION: u32 = 1;

/// Encodes a structured value to its stored text form.
pub fn encode(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a stored text form back to its structured value.
pub fn decode(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a value destined for a column of the given declared type.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when the value's kind does not match
/// the declared type, such as a list value on a `Shape` column.
pub fn encode_field(ty: &FieldType, value: &Value) -> Result<String> {
    check_kind(ty, value)?;
    encode(value)
}

/// Decodes a stored text form for a column of the given declared type.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when the decoded kind does not match
/// the declared type, which indicates the stored text predates the current
/// declaration.
pub fn decode_field(ty: &FieldType, text: &str) -> Result<Value> {
    let value = decode(text)?;
    check_kind(ty, &value)?;
    Ok(value)
}

fn check_kind(ty: &FieldType, value: &Value) -> Result<()> {
    let ok = match ty {
        FieldType::Shape(_) | FieldType::Map(_) => value.is_object(),
        FieldType::List(_) => value.is_array(),
        FieldType::Text | FieldType::Number | FieldType::Boolean => false,
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "value kind does not match declared type {ty:?}"
        )))
    }
}
