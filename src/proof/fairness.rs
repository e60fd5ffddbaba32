//! Crash Point Recomputation
//!
//! Rebuilds a round's crash point from its revealed seed using the same
//! arithmetic as the settlement server, so a player can check that the
//! multiplier broadcast for a round was committed to before it started.
//!
//! ```text
//! seed ──SHA-256──▶ hash ──first 13 hex──▶ h ──h / 2^52──▶ x
//!                                                          │
//!        floor(clamp(0.99 / (1 - x), 1, 100000) * 100) / 100
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::{hex_digests_match, is_hex, sha256_hex};

/// Number of leading hex digits that feed the crash point (52 bits).
pub const HASH_PREFIX_DIGITS: usize = 13;

/// Divisor mapping the 52-bit prefix onto `[0, 1)`.
pub const PREFIX_SPACE: f64 = 4_503_599_627_370_496.0; // 2^52

/// Return-to-player numerator of the payout curve.
pub const PAYOUT_FACTOR: f64 = 0.99;

/// Lowest possible crash point.
pub const MIN_CRASH_POINT: f64 = 1.00;

/// Highest possible crash point. Needed because `x → 1` diverges.
pub const MAX_CRASH_POINT: f64 = 100_000.00;

/// Errors for digest-based recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FairnessError {
    /// The digest has fewer than 13 hex digits.
    #[error("digest too short: need 13 hex digits, got {0}")]
    DigestTooShort(usize),
    /// The digest prefix contains non-hex characters.
    #[error("digest prefix is not hex: {0}")]
    NotHex(String),
}

/// Full breakdown of a seed's recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// SHA-256 of the seed, lowercase hex.
    pub hash: String,
    /// The 13 leading hex digits of `hash`.
    pub hex_prefix: String,
    /// `hex_prefix` read as an integer.
    pub decimal: u64,
    /// Resulting crash point, floored to two decimals.
    pub crash_point: f64,
}

/// Recompute the commitment hash and crash point for a revealed seed.
///
/// Pure and deterministic; the seed is hashed as its UTF-8 bytes.
pub fn verify(seed: &str) -> Verification {
    let hash = sha256_hex(seed);
    let hex_prefix = hash[..HASH_PREFIX_DIGITS].to_string();
    // A SHA-256 hex digest always has 64 hex digits, so this cannot fail.
    let decimal = u64::from_str_radix(&hex_prefix, 16).unwrap_or_default();

    Verification {
        crash_point: crash_point_from_prefix(decimal),
        hash,
        hex_prefix,
        decimal,
    }
}

/// Recompute the crash point from a hex digest alone.
pub fn crash_point_from_hash(digest: &str) -> Result<f64, FairnessError> {
    let digest = digest.trim();
    let prefix = digest
        .get(..HASH_PREFIX_DIGITS)
        .ok_or(FairnessError::DigestTooShort(digest.len()))?;

    if !is_hex(prefix) {
        return Err(FairnessError::NotHex(prefix.to_string()));
    }

    let decimal = u64::from_str_radix(prefix, 16)
        .map_err(|_| FairnessError::NotHex(prefix.to_string()))?;
    Ok(crash_point_from_prefix(decimal))
}

/// Map a 52-bit prefix integer onto the crash curve.
pub fn crash_point_from_prefix(h: u64) -> f64 {
    let x = h as f64 / PREFIX_SPACE;
    let raw = PAYOUT_FACTOR / (1.0 - x);
    let clamped = raw.clamp(MIN_CRASH_POINT, MAX_CRASH_POINT);
    (clamped * 100.0).floor() / 100.0
}

/// Result of checking a revealed seed against what the round published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// The recomputation itself.
    pub verification: Verification,
    /// `SHA256(seed) == commitment`, if a commitment was supplied.
    pub hash_matches: Option<bool>,
    /// Recomputed crash point equals the broadcast one, if supplied.
    pub crash_point_matches: Option<bool>,
}

impl AuditReport {
    /// True when every supplied check passed.
    pub fn is_consistent(&self) -> bool {
        self.hash_matches.unwrap_or(true) && self.crash_point_matches.unwrap_or(true)
    }
}

/// Check a revealed seed against the round's commitment and broadcast outcome.
///
/// Mismatches are reported as `Some(false)`, never as errors.
pub fn audit_round(seed: &str, commitment: Option<&str>, broadcast: Option<f64>) -> AuditReport {
    let verification = verify(seed);
    let hash_matches = commitment.map(|c| hex_digests_match(c, &verification.hash));
    let crash_point_matches = broadcast.map(|m| same_cents(m, verification.crash_point));

    AuditReport {
        verification,
        hash_matches,
        crash_point_matches,
    }
}

/// Compare two multipliers at two-decimal precision.
fn same_cents(a: f64, b: f64) -> bool {
    (a * 100.0).round() as i64 == (b * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES: &[(&str, f64)] = &[
        ("deadbeef", 1.19),
        ("abc", 3.64),
        ("crash-round-1", 1.30),
        ("0f1e2d3c4b5a69788796a5b4c3d2e1f0", 2.68),
        ("seed", 1.10),
        ("hello", 1.20),
        ("round-42", 1.59),
        ("test", 2.62),
    ];

    #[test]
    fn test_known_seed_fixtures() {
        for (seed, expected) in FIXTURES {
            assert_eq!(verify(seed).crash_point, *expected, "seed {seed}");
        }
    }

    #[test]
    fn test_verification_breakdown() {
        let v = verify("abc");
        assert_eq!(
            v.hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(v.hex_prefix, "ba7816bf8f01c");
        assert_eq!(v.decimal, 3_280_399_047_913_500);
        assert_eq!(v.crash_point, 3.64);
    }

    #[test]
    fn test_half_space_gives_one_ninety_eight() {
        // x = 0.5 -> 0.99 / 0.5 = 1.98
        assert_eq!(crash_point_from_prefix(1 << 51), 1.98);
        assert_eq!(crash_point_from_hash("8000000000000").unwrap(), 1.98);
    }

    #[test]
    fn test_floor_not_round() {
        // 0.99 / (1 - 1/16) = 1.056 -> 1.05
        assert_eq!(crash_point_from_hash("1000000000000").unwrap(), 1.05);
        assert_eq!(crash_point_from_hash("c000000000000").unwrap(), 3.96);
        assert_eq!(crash_point_from_hash("e000000000000").unwrap(), 7.92);
    }

    #[test]
    fn test_lower_clamp() {
        // x = 0 -> 0.99, clamped up to 1.00
        assert_eq!(crash_point_from_prefix(0), MIN_CRASH_POINT);
    }

    #[test]
    fn test_upper_clamp() {
        // x = 1 - 2^-52 -> ~4.46e15, must be capped
        assert_eq!(crash_point_from_prefix((1 << 52) - 1), MAX_CRASH_POINT);
        assert_eq!(crash_point_from_hash("fffffffffffff").unwrap(), MAX_CRASH_POINT);
    }

    #[test]
    fn test_verify_is_deterministic() {
        assert_eq!(verify("same-seed"), verify("same-seed"));
    }

    #[test]
    fn test_digest_input_validation() {
        assert_eq!(
            crash_point_from_hash("abc"),
            Err(FairnessError::DigestTooShort(3))
        );
        assert!(matches!(
            crash_point_from_hash("zzzzzzzzzzzzzzzz"),
            Err(FairnessError::NotHex(_))
        ));
        // Uppercase digests are accepted
        assert_eq!(crash_point_from_hash("8000000000000ABC").unwrap(), 1.98);
    }

    #[test]
    fn test_audit_round_matches() {
        let commitment = verify("deadbeef").hash.to_uppercase();
        let report = audit_round("deadbeef", Some(&commitment), Some(1.19));
        assert_eq!(report.hash_matches, Some(true));
        assert_eq!(report.crash_point_matches, Some(true));
        assert!(report.is_consistent());
    }

    #[test]
    fn test_audit_round_reports_mismatch() {
        let report = audit_round("deadbeef", Some("abc123"), Some(1.45));
        assert_eq!(report.hash_matches, Some(false));
        assert_eq!(report.crash_point_matches, Some(false));
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_audit_round_without_inputs() {
        let report = audit_round("deadbeef", None, None);
        assert_eq!(report.hash_matches, None);
        assert_eq!(report.crash_point_matches, None);
        assert!(report.is_consistent());
    }
}
