//! Deterministic fingerprint of the declared schema.
//!
//! The fingerprint detects drift between the schema persisted in the store
//! and the one the application declares: identical declarations always hash
//! identically, and any change to a field type, a flag, a descriptor hint,
//! or the structured-field codec version changes the hash. Collisions are a
//! correctness risk only, so a truncated SHA-256 digest is more than enough.

use serde::Serialize;
use sha2::{Digest, Sha256};
use shapedb_core::{Field, ShapeRegistry};

use crate::codec::CODEC_VERSION;
use crate::descriptor::{DatabaseSchema, SchemaDescriptor};
use crate::error::{Result, StoreError};

#[derive(Serialize)]
struct FingerprintInput<'a> {
    codec_version: u32,
    entities: Vec<FingerprintEntity<'a>>,
}

/// Transient fields never reach storage, so they are left out of the hash;
/// adding one must not trigger a migration cycle.
#[derive(Serialize)]
struct FingerprintEntity<'a> {
    name: &'a str,
    fields: Vec<&'a Field>,
    descriptor: &'a SchemaDescriptor,
}

/// Computes the fingerprint of the declared entities.
///
/// Serializes the persisted fields of each entity named by `schema`,
/// together with its descriptor and the codec version, to canonical JSON
/// and folds the first eight digest bytes into an `i64`. Descriptor maps
/// are ordered, so serialization is deterministic.
///
/// # Errors
///
/// Returns [`StoreError::UnknownTable`] if `schema` declares an entity the
/// registry does not define.
pub fn schema_fingerprint(registry: &ShapeRegistry, schema: &DatabaseSchema) -> Result<i64> {
    let mut entities = Vec::with_capacity(schema.entities.len());
    for (name, descriptor) in schema.iter() {
        let shape = registry
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
        entities.push(FingerprintEntity {
            name,
            fields: shape.persisted_fields().collect(),
            descriptor,
        });
    }

    let input = FingerprintInput {
        codec_version: CODEC_VERSION,
        entities,
    };
    let serialized = serde_json::to_vec(&input)?;
    let digest = Sha256::digest(&serialized);

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    Ok(i64::from_be_bytes(prefix))
}
