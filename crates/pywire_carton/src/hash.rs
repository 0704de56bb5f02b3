//! Fast hashing utilities using xxHash3.
//!
//! Every identifier the compiler synthesizes (handler names, scope ids,
//! layout ids, content hashes) is derived here so that identical input always
//! produces identical output.

use xxhash_rust::xxh3::xxh3_64;

/// Compute a 64-bit hash of the given bytes using xxHash3.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u64 {
    xxh3_64(data)
}

/// Compute a 64-bit hash of the given string using xxHash3.
#[inline]
pub fn hash_str(data: &str) -> u64 {
    hash_bytes(data.as_bytes())
}

/// Convert a hash to a hex string (16 characters).
#[inline]
pub fn hash_to_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}

/// Compute hash of a string and return as hex.
#[inline]
pub fn content_hash(content: &str) -> String {
    hash_to_hex(hash_str(content))
}

/// First `len` hex digits of the content hash (at most 16).
///
/// Used for short identifiers such as the scoped-style id and the suffix of
/// synthesized method names.
pub fn short_hash(content: &str, len: usize) -> String {
    let mut hex = content_hash(content);
    hex.truncate(len.min(16));
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let content = "count += 1";
        assert_eq!(hash_str(content), hash_str(content));
    }

    #[test]
    fn test_hash_difference() {
        assert_ne!(hash_str("Hello"), hash_str("World"));
    }

    #[test]
    fn test_hex_format() {
        let hex = hash_to_hex(hash_str("test"));
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_hash() {
        let short = short_hash("pages/index.pywire", 8);
        assert_eq!(short.len(), 8);
        assert!(content_hash("pages/index.pywire").starts_with(&short));
        assert_eq!(short_hash("x", 64).len(), 16);
    }
}
