use runex_core::errors::{ErrorInfo, RunexError};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Computes a stable hexadecimal hash for the provided serializable payload.
///
/// Serialization goes through `serde_json`, which emits map keys in
/// iteration order; hashed payloads must therefore use ordered maps
/// (`BTreeMap`) to stay canonical.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, RunexError> {
    let bytes = serde_json::to_vec(value).map_err(|err| {
        RunexError::Serde(
            ErrorInfo::new("canonical-json", "failed to encode payload for hashing")
                .with_hint(err.to_string()),
        )
    })?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}
