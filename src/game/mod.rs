//! Game Logic Module
//!
//! Everything that turns decoded server events into client state. No I/O:
//! reducers take the current time as an argument and never spawn work,
//! except the render loop in `prediction`.
//!
//! ## Module Structure
//!
//! - `events`: Typed server events
//! - `state`: Round phase machine and multiplier re-synchronization
//! - `history`: Bounded newest-first round history
//! - `ledger`: Keyed bet ledger with optimistic upserts
//! - `prediction`: Growth model, prediction clock, render loop
//! - `snapshot`: Immutable published view
//! - `slip`: Per-slot bet panel state

pub mod events;
pub mod history;
pub mod ledger;
pub mod prediction;
pub mod slip;
pub mod snapshot;
pub mod state;

// Re-export key types
pub use events::{AckKind, ServerEvent};
pub use history::{HistoryEntry, RoundHistory, Tier, HISTORY_LIMIT};
pub use ledger::{Bet, BetKey, BetLedger};
pub use prediction::{spawn_frame_loop, FrameSample, GrowthModel, PredictionClock};
pub use slip::{BetSlip, PhaseAction, SlipError, SlipStatus, MAX_STAKE};
pub use snapshot::{ConnectionStatus, GameSnapshot};
pub use state::{ApplyOutcome, GameStateStore, MultiplierSample, RoundPhase, StoreConfig};
