//! Provably-Fair Verification
//!
//! Each round publishes `SHA256(seed)` before it starts and reveals `seed`
//! after it crashes. This module recomputes both sides so the client can
//! confirm the server did not change the outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  fairness.rs     - seed -> hash -> crash point, audits      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod fairness;

// Re-export key types
pub use fairness::{
    audit_round, crash_point_from_hash, crash_point_from_prefix, verify,
    AuditReport, FairnessError, Verification, MAX_CRASH_POINT, MIN_CRASH_POINT,
};
