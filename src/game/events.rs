//! Server Events
//!
//! Typed form of every inbound frame the client understands. Produced by
//! the codec in `network::protocol`, consumed by the store and the ledger.

use serde::{Deserialize, Serialize};

use crate::game::history::HistoryEntry;
use crate::game::ledger::Bet;
use crate::game::state::RoundPhase;

/// Acknowledgement frames answering the player's own commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckKind {
    /// `BET_OK`
    Bet,
    /// `CASHOUT_OK`
    Cashout,
}

/// One decoded server frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authoritative phase, optionally with the current multiplier.
    State {
        /// Phase the server is in.
        phase: RoundPhase,
        /// Multiplier at the time of the frame.
        multiplier: Option<f64>,
    },

    /// Multiplier sample during flight.
    Tick {
        /// Authoritative multiplier.
        multiplier: f64,
    },

    /// Round ended. `multiplier` is `None` when the field was unreadable.
    Crash {
        /// Final multiplier.
        multiplier: Option<f64>,
        /// Revealed server seed.
        seed: Option<String>,
    },

    /// Flight is starting.
    Takeoff,

    /// Countdown to the next round.
    Timer {
        /// Whole seconds remaining.
        seconds: u32,
    },

    /// Commitment hash of the upcoming round.
    Hash {
        /// SHA-256 of the round's seed, hex.
        hash: String,
    },

    /// Bulk replacement of round history, newest-first.
    History {
        /// Finished rounds, newest-first.
        entries: Vec<HistoryEntry>,
    },

    /// Someone placed a bet.
    Bet(Bet),

    /// Someone cashed out.
    Cashout {
        /// Player identity.
        player: String,
        /// Multiplier the bet was settled at.
        multiplier: f64,
        /// Payout.
        profit: f64,
        /// Slot index.
        slot: u32,
    },

    /// Someone withdrew a bet before flight.
    CancelBet {
        /// Player identity.
        player: String,
        /// Slot index.
        slot: u32,
    },

    /// Liveness reply.
    Pong,

    /// Command acknowledgement; no effect on state.
    Ack {
        /// Which command was acknowledged.
        kind: AckKind,
    },
}

impl ServerEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::State { .. } => "state",
            ServerEvent::Tick { .. } => "tick",
            ServerEvent::Crash { .. } => "crash",
            ServerEvent::Takeoff => "takeoff",
            ServerEvent::Timer { .. } => "timer",
            ServerEvent::Hash { .. } => "hash",
            ServerEvent::History { .. } => "history",
            ServerEvent::Bet(_) => "bet",
            ServerEvent::Cashout { .. } => "cashout",
            ServerEvent::CancelBet { .. } => "cancel_bet",
            ServerEvent::Pong => "pong",
            ServerEvent::Ack { .. } => "ack",
        }
    }

    /// Whether this event targets the bet ledger rather than the store.
    pub fn is_ledger_event(&self) -> bool {
        matches!(
            self,
            ServerEvent::Bet(_) | ServerEvent::Cashout { .. } | ServerEvent::CancelBet { .. }
        )
    }
}
