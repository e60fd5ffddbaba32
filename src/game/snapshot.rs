//! Immutable view of the client's state, published after every applied
//! frame. Renderers and UI layers only ever read these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::clock::Millis;
use crate::game::history::HistoryEntry;
use crate::game::ledger::{Bet, BetLedger};
use crate::game::prediction::GrowthModel;
use crate::game::state::{GameStateStore, RoundPhase};

/// Transport health as seen by the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Socket is open.
    pub connected: bool,
    /// Reconnect attempts since the last successful open.
    pub attempt: u32,
    /// Last PING/PONG round trip.
    pub latency_ms: Option<f64>,
    /// When the current connection opened.
    pub connected_since: Option<DateTime<Utc>>,
}

/// Point-in-time copy of store, ledger and connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Current phase.
    pub phase: RoundPhase,
    /// Latest authoritative multiplier.
    pub multiplier: f64,
    /// Local time of that sample.
    pub sample_at: Millis,
    /// Anchor for the prediction clock while flying.
    pub virtual_round_start: Option<Millis>,
    /// Countdown seconds.
    pub time_left: u32,
    /// Largest stake first.
    pub bets: Vec<Bet>,
    /// Newest first.
    pub history: Vec<HistoryEntry>,
    /// Commitment of the current round.
    pub current_hash: Option<String>,
    /// Most recently revealed seed.
    pub last_seed: Option<String>,
    /// Transport health.
    pub connection: ConnectionStatus,
    /// Growth law the store resyncs with.
    pub growth: GrowthModel,
}

impl GameSnapshot {
    /// Capture the current state.
    pub fn capture(
        store: &GameStateStore,
        ledger: &BetLedger,
        connection: &ConnectionStatus,
    ) -> Self {
        let sample = store.sample();
        Self {
            phase: store.phase(),
            multiplier: sample.multiplier,
            sample_at: sample.received_at,
            virtual_round_start: store.virtual_round_start(),
            time_left: store.time_left(),
            bets: ledger.sorted_by_stake(),
            history: store.history().to_vec(),
            current_hash: store.current_hash().map(String::from),
            last_seed: store.last_seed().map(String::from),
            connection: connection.clone(),
            growth: store.config().growth,
        }
    }

    /// Bets of one player.
    pub fn bets_for<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a Bet> + 'a {
        self.bets.iter().filter(move |b| b.player == player)
    }

    /// One bet by key.
    pub fn bet(&self, player: &str, slot: u32) -> Option<&Bet> {
        self.bets.iter().find(|b| b.player == player && b.slot == slot)
    }

    /// Sum of all stakes this round.
    pub fn total_staked(&self) -> f64 {
        self.bets.iter().map(|b| b.stake).sum()
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Waiting,
            multiplier: 1.0,
            sample_at: 0.0,
            virtual_round_start: None,
            time_left: 0,
            bets: Vec::new(),
            history: Vec::new(),
            current_hash: None,
            last_seed: None,
            connection: ConnectionStatus::default(),
            growth: GrowthModel::V1,
        }
    }
}
