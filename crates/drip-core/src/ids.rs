use sha2::{Digest, Sha256};

/// Short hex digest of arbitrary bytes, used to keep generated ids compact.
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..6]
        .iter()
        .map(|value| format!("{:02x}", value))
        .collect::<String>()
}

/// Builds a `{prefix}-{timestamp}-{hash}` identifier that is stable for the
/// same inputs, so replays of the same logical operation collide on purpose.
pub fn generate_id(prefix: &str, now_unix_ms: u64, seed: &str) -> String {
    let mut bytes = Vec::with_capacity(seed.len() + 8);
    bytes.extend_from_slice(seed.as_bytes());
    bytes.extend_from_slice(&now_unix_ms.to_le_bytes());
    format!("{prefix}-{now_unix_ms}-{}", short_hash(&bytes))
}
