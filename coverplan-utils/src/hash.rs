use crate::jsonify;
use serde::Serialize;

pub fn u8s_from_str(input: &str) -> [u8; 32] {
    blake3::hash(input.as_bytes()).into()
}

/// Hex blake3 digest of the canonical JSON form of `obj`.
pub fn fingerprint<T>(obj: &T) -> serde_json::Result<String>
where
    T: Serialize,
{
    Ok(hex::encode(u8s_from_str(&jsonify(obj)?)))
}
