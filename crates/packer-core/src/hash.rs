use sha2::{Digest, Sha256};

/// Hex sha256 of arbitrary bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Short content hash used in generated file names.
pub fn short_hash(bytes: &[u8]) -> String {
    let mut h = hash_bytes(bytes);
    h.truncate(8);
    h
}
