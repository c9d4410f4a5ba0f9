//! Input fingerprinting.
//!
//! Every submitted payload is fingerprinted at the gateway so that log
//! lines, upload paths, and operator tooling can refer to an input
//! without carrying the bytes around.

use sha2::{Digest, Sha256};

/// SHA-256 hex fingerprint of an input payload.
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_64_hex_chars() {
        let a = fingerprint(b"image bytes");
        let b = fingerprint(b"image bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }
}
