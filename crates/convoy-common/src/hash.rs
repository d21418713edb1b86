//! MD5 fingerprint utilities
//!
//! Fingerprints only need to be stable and fixed-length; they are never used
//! for integrity checks.

use std::path::Path;

/// Compute the lowercase hex MD5 digest of bytes
pub fn md5_hex(data: &[u8]) -> String {
    let digest = md5::compute(data);
    format!("{:x}", digest)
}

/// Fingerprint an ordered list of string parts.
///
/// Parts are concatenated without a separator before hashing, so
/// `["ab", "c"]` and `["a", "bc"]` produce the same fingerprint. Staleness
/// keys persisted in the cache use this layout, so changing it invalidates
/// every stored marker.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut ctx = md5::Context::new();
    for part in parts {
        ctx.consume(part.as_bytes());
    }
    format!("{:x}", ctx.compute())
}

/// Fingerprint a filesystem path by its lossy UTF-8 representation
pub fn path_fingerprint(path: &Path) -> String {
    md5_hex(path.to_string_lossy().as_bytes())
}
