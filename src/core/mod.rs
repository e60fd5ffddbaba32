//! Core primitives.
//!
//! Time sources and digest helpers used by every other layer.

pub mod clock;
pub mod hash;

// Re-export core types
pub use clock::{Clock, ManualClock, Millis, MonotonicClock};
pub use hash::{hash_bytes, hex_digests_match, sha256_hex, Digest256};
