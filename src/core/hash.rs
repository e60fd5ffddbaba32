//! Digest Helpers
//!
//! SHA-256 primitives shared by the fairness verifier and the commitment
//! checks. Digests travel over the wire as lowercase hex.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type Digest256 = [u8; 32];

/// Compute a SHA-256 digest of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> Digest256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of a UTF-8 string, as lowercase hex.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(hash_bytes(text.as_bytes()))
}

/// Normalize a hex digest for comparison.
///
/// Surrounding whitespace is dropped and letters are lowercased.
pub fn normalize_hex(digest: &str) -> String {
    digest.trim().to_ascii_lowercase()
}

/// Compare two hex digests ignoring case and surrounding whitespace.
pub fn hex_digests_match(a: &str, b: &str) -> bool {
    normalize_hex(a) == normalize_hex(b)
}

/// Check that a string is a non-empty run of hex digits.
pub fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_hexdigit())
}
