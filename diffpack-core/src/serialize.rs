//! Canonical serialization with an integrity checksum.
//!
//! serde_json stores object members in a `BTreeMap`, so converting the
//! payload to a `Value` and emitting it compactly yields keys in
//! ascending codepoint order with `,`/`:` separators and no whitespace.
//! The `preserve_order` feature must stay off for this to hold.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{DiffError, Result};
use crate::models::Payload;

/// Compact canonical bytes of a JSON value.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DiffError::Internal(format!("serialization failed: {e}")))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// De-duplicates notes preserving first-seen order.
pub fn dedup_notes(notes: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    notes
        .into_iter()
        .filter(|note| seen.insert(note.clone()))
        .collect()
}

/// Freezes a payload into its canonical value.
///
/// The checksum field is first serialized blank, hashed, then replaced
/// with the hex digest; serializing the result again with a blanked
/// checksum reproduces the same digest.
pub fn finalize(mut payload: Payload) -> Result<Value> {
    payload.notes = dedup_notes(payload.notes);
    payload.provenance.checksum = String::new();

    let mut value = serde_json::to_value(&payload)
        .map_err(|e| DiffError::Internal(format!("payload serialization failed: {e}")))?;
    let digest = sha256_hex(&canonical_bytes(&value)?);
    set_checksum(&mut value, &digest)?;
    Ok(value)
}

/// Recomputes the digest of an emitted payload and compares it to the
/// embedded checksum.
pub fn verify_checksum(value: &Value) -> Result<bool> {
    let embedded = value
        .get("provenance")
        .and_then(|p| p.get("checksum"))
        .and_then(Value::as_str)
        .ok_or_else(|| DiffError::Internal("payload missing provenance.checksum".to_string()))?
        .to_string();

    let mut blanked = value.clone();
    set_checksum(&mut blanked, "")?;
    let digest = sha256_hex(&canonical_bytes(&blanked)?);
    Ok(digest == embedded)
}

fn set_checksum(value: &mut Value, digest: &str) -> Result<()> {
    value
        .get_mut("provenance")
        .and_then(|p| p.get_mut("checksum"))
        .map(|checksum| *checksum = Value::String(digest.to_string()))
        .ok_or_else(|| DiffError::Internal("payload missing provenance.checksum".to_string()))
}
