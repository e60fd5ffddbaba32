//! # Crash Sync
//!
//! Real-time synchronization and provably-fair verification engine for a
//! crash-multiplier game client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CRASH SYNC                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                               │
//! │  ├── clock.rs    - Monotonic and manual time sources        │
//! │  └── hash.rs     - SHA-256 and hex helpers                  │
//! │                                                             │
//! │  game/           - Client state (no I/O)                    │
//! │  ├── events.rs   - Typed server events                      │
//! │  ├── state.rs    - Phase machine, multiplier resync         │
//! │  ├── history.rs  - Bounded round history                    │
//! │  ├── ledger.rs   - Keyed optimistic bet ledger              │
//! │  ├── prediction.rs - Growth curve and render loop           │
//! │  ├── snapshot.rs - Immutable published view                 │
//! │  └── slip.rs     - Per-slot bet panel state                 │
//! │                                                             │
//! │  network/        - Networking (non-deterministic)           │
//! │  ├── client.rs   - Reconnecting WebSocket transport         │
//! │  ├── backoff.rs  - Exponential backoff with jitter          │
//! │  ├── protocol.rs - Colon-delimited frame codec              │
//! │  ├── session.rs  - Serialized reducer, snapshot publishing  │
//! │  ├── api.rs      - HTTP collaborator interfaces             │
//! │  └── desk.rs     - Optimistic bet actions with rollback     │
//! │                                                             │
//! │  proof/          - Provably-fair verification               │
//! │  └── fairness.rs - seed -> hash -> crash point              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! Transport frames are decoded and applied one at a time, in arrival
//! order, by a single session task. Every change publishes a fresh
//! `Arc<GameSnapshot>`; the render loop and UI layers only ever read those,
//! so they never observe a half-applied frame.
//!
//! Server messages always win: the prediction clock only fills the gaps
//! between authoritative samples and is re-anchored whenever they drift.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use core::clock::{Clock, ManualClock, MonotonicClock};
pub use game::{
    Bet, BetLedger, GameSnapshot, GameStateStore, GrowthModel, HistoryEntry, PredictionClock,
    RoundPhase, ServerEvent,
};
pub use network::{ClientConfig, GameSession, SessionHandle};
pub use proof::{audit_round, verify, AuditReport, Verification};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness probe period (ms)
pub const PING_INTERVAL_MS: u64 = 2_000;
