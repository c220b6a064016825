//! Content-addressed keys
//!
//! A key is the first 128 bits of the SHA-256 digest of the bytes, hex
//! encoded. It is both the dedup key and the stem of the stored object name.

use sha2::{Digest, Sha256};

/// Digest length in bytes
pub const KEY_BYTES: usize = 16;

/// Compute the content key of `data`
pub fn compute_key(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..KEY_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_128_bit_hex() {
        let key = compute_key(b"hello");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_equal_bytes_equal_keys() {
        assert_eq!(compute_key(b"same bytes"), compute_key(b"same bytes"));
        assert_ne!(compute_key(b"same bytes"), compute_key(b"other bytes"));
    }

    #[test]
    fn test_known_digest_prefix() {
        // sha256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e...
        assert_eq!(compute_key(b"hello"), "2cf24dba5fb0a30e26e83b2ac5b9e29e");
    }
}
