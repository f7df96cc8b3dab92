use crate::{Error, Result};
use serde::Serialize;

/// Deterministic digest of any serializable value.
///
/// serde_json keeps struct fields in declaration order and maps sorted,
/// so the same settings always give the same digest.
pub fn config_hash<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).map_err(Error::SerializationError)?;
    Ok(sha256::digest(json))
}
