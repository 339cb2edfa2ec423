//! Cache key derivation from request payloads.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Derive a cache fingerprint from request bytes, optionally salted (e.g.
/// with the function id or endpoint) so identical payloads sent to
/// different operations don't collide.
pub fn fingerprint(request_bytes: &[u8], salt: Option<&[u8]>) -> u64 {
    let mut hasher = DefaultHasher::new();
    request_bytes.hash(&mut hasher);
    if let Some(salt) = salt {
        salt.hash(&mut hasher);
    }
    hasher.finish()
}

/// Render a fingerprint as a fixed-width hex string, convenient as a cache
/// store key.
pub fn fingerprint_hex(request_bytes: &[u8], salt: Option<&[u8]>) -> String {
    format!("{:016x}", fingerprint(request_bytes, salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_fingerprint() {
        let a = fingerprint(b"hello", None);
        let b = fingerprint(b"hello", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_salt_changes_fingerprint() {
        let a = fingerprint(b"hello", None);
        let b = fingerprint(b"hello", Some(b"salt"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_is_fixed_width() {
        let hex = fingerprint_hex(b"x", None);
        assert_eq!(hex.len(), 16);
    }
}
