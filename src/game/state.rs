//! Game State Store
//!
//! Phase machine for the round, driven only by server events:
//!
//! ```text
//! WAITING ──TAKEOFF / STATE:FLYING──▶ FLYING ──CRASH──▶ CRASHED
//!    ▲                                                     │
//!    └──────────────────── STATE:WAITING ◀─────────────────┘
//! ```
//!
//! Besides the phase the store keeps the latest multiplier sample and the
//! virtual round start the prediction clock extrapolates from.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::clock::Millis;
use crate::game::events::ServerEvent;
use crate::game::history::{HistoryEntry, RoundHistory, HISTORY_LIMIT};
use crate::game::prediction::GrowthModel;

/// Default tolerance before a new sample moves the virtual round start.
pub const DEFAULT_DRIFT_THRESHOLD_MS: Millis = 250.0;

/// Accepted range for the drift threshold.
pub const DRIFT_THRESHOLD_RANGE_MS: (Millis, Millis) = (100.0, 500.0);

/// Round phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    /// Between rounds, bets open.
    #[default]
    Waiting,
    /// Multiplier is growing.
    Flying,
    /// Round ended.
    Crashed,
}

impl RoundPhase {
    /// Parse a wire phase name. `RUNNING` is an alias of `FLYING`.
    pub fn from_wire(name: &str) -> Option<RoundPhase> {
        match name {
            "WAITING" => Some(RoundPhase::Waiting),
            "FLYING" | "RUNNING" => Some(RoundPhase::Flying),
            "CRASHED" => Some(RoundPhase::Crashed),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            RoundPhase::Waiting => "WAITING",
            RoundPhase::Flying => "FLYING",
            RoundPhase::Crashed => "CRASHED",
        }
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest authoritative multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiplierSample {
    /// Server multiplier, at least 1.00.
    pub multiplier: f64,
    /// Local time the sample arrived.
    pub received_at: Millis,
}

impl MultiplierSample {
    fn reset(now: Millis) -> Self {
        Self {
            multiplier: 1.0,
            received_at: now,
        }
    }
}

/// What applying one event did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Phase before the event.
    pub previous: RoundPhase,
    /// Phase after the event.
    pub phase: RoundPhase,
    /// The round ended or a new one opened; the ledger must be cleared.
    pub round_boundary: bool,
    /// Any observable field changed.
    pub changed: bool,
}

impl ApplyOutcome {
    fn unchanged(phase: RoundPhase) -> Self {
        Self {
            previous: phase,
            phase,
            round_boundary: false,
            changed: false,
        }
    }

    /// Whether the phase moved.
    pub fn phase_changed(&self) -> bool {
        self.previous != self.phase
    }
}

/// Store tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoreConfig {
    /// Growth law used for re-synchronization.
    pub growth: GrowthModel,
    /// Minimum disagreement before the virtual start is moved.
    pub drift_threshold_ms: Millis,
    /// History bound.
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            growth: GrowthModel::V1,
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            history_limit: HISTORY_LIMIT,
        }
    }
}

/// Round state as last confirmed by the server.
#[derive(Clone, Debug)]
pub struct GameStateStore {
    config: StoreConfig,
    phase: RoundPhase,
    sample: MultiplierSample,
    virtual_round_start: Option<Millis>,
    time_left: u32,
    history: RoundHistory,
    current_hash: Option<String>,
    last_seed: Option<String>,
}

impl GameStateStore {
    /// Fresh store in WAITING.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            history: RoundHistory::new(config.history_limit),
            config,
            phase: RoundPhase::Waiting,
            sample: MultiplierSample::reset(0.0),
            virtual_round_start: None,
            time_left: 0,
            current_hash: None,
            last_seed: None,
        }
    }

    /// Apply one server event received at local time `now`.
    ///
    /// Ledger events pass through unchanged; the caller routes them.
    pub fn apply(&mut self, event: &ServerEvent, now: Millis) -> ApplyOutcome {
        let previous = self.phase;
        let mut outcome = ApplyOutcome::unchanged(previous);

        match event {
            ServerEvent::State { phase, multiplier } => {
                outcome.changed = true;
                match phase {
                    RoundPhase::Flying => {
                        if self.phase != RoundPhase::Flying {
                            self.enter_flying(now);
                        }
                    }
                    RoundPhase::Waiting => {
                        if self.phase != RoundPhase::Waiting {
                            self.enter_waiting(now);
                            outcome.round_boundary = true;
                        }
                    }
                    RoundPhase::Crashed => {
                        self.phase = RoundPhase::Crashed;
                        self.virtual_round_start = None;
                    }
                }
                if let Some(m) = multiplier {
                    self.record_sample(*m, now);
                }
            }
            ServerEvent::Takeoff => {
                if self.phase != RoundPhase::Flying {
                    self.enter_flying(now);
                    outcome.changed = true;
                }
            }
            ServerEvent::Tick { multiplier } => {
                if self.phase != RoundPhase::Flying {
                    debug!(multiplier, phase = %self.phase, "tick outside flight ignored");
                    return outcome;
                }
                self.record_sample(*multiplier, now);
                outcome.changed = true;
            }
            ServerEvent::Crash { multiplier, seed } => {
                let multiplier = multiplier.unwrap_or(self.sample.multiplier);
                if self.is_replayed_crash(multiplier, seed.as_deref()) {
                    debug!(multiplier, "duplicate crash ignored");
                    return outcome;
                }
                self.crash(multiplier, seed.clone(), now);
                outcome.changed = true;
                outcome.round_boundary = true;
            }
            ServerEvent::Timer { seconds } => {
                self.time_left = *seconds;
                outcome.changed = true;
            }
            ServerEvent::Hash { hash } => {
                debug!(hash = %hash, "new round commitment");
                self.current_hash = Some(hash.clone());
                outcome.changed = true;
            }
            ServerEvent::History { entries } => {
                self.history.replace(entries.iter().cloned());
                outcome.changed = true;
            }
            ServerEvent::Bet(_)
            | ServerEvent::Cashout { .. }
            | ServerEvent::CancelBet { .. }
            | ServerEvent::Pong
            | ServerEvent::Ack { .. } => {}
        }

        outcome.phase = self.phase;
        if outcome.phase_changed() {
            info!("Round phase {} -> {}", previous, self.phase);
        }
        outcome
    }

    fn enter_flying(&mut self, now: Millis) {
        self.phase = RoundPhase::Flying;
        self.sample = MultiplierSample::reset(now);
        self.virtual_round_start = Some(now);
        self.time_left = 0;
    }

    fn enter_waiting(&mut self, now: Millis) {
        self.phase = RoundPhase::Waiting;
        self.sample = MultiplierSample::reset(now);
        self.virtual_round_start = None;
    }

    fn crash(&mut self, multiplier: f64, seed: Option<String>, now: Millis) {
        self.phase = RoundPhase::Crashed;
        self.sample = MultiplierSample {
            multiplier,
            received_at: now,
        };
        self.virtual_round_start = None;

        if seed.is_some() {
            self.last_seed = seed.clone();
        }
        // The open round's commitment; the next HASH replaces current_hash
        self.history.push(HistoryEntry {
            multiplier,
            seed,
            commitment: self.current_hash.clone(),
            recorded_at: Some(Utc::now()),
        });
    }

    /// A CRASH repeated after reconnecting, already recorded.
    fn is_replayed_crash(&self, multiplier: f64, seed: Option<&str>) -> bool {
        self.phase == RoundPhase::Crashed
            && self
                .history
                .latest()
                .is_some_and(|e| e.multiplier == multiplier && e.seed.as_deref() == seed)
    }

    fn record_sample(&mut self, multiplier: f64, now: Millis) {
        self.sample = MultiplierSample {
            multiplier,
            received_at: now,
        };
        if self.phase == RoundPhase::Flying {
            self.resync(multiplier, now);
        }
    }

    /// Move the virtual round start if the sample disagrees with it by more
    /// than the drift threshold.
    fn resync(&mut self, multiplier: f64, now: Millis) {
        if multiplier <= 1.0 {
            return;
        }

        let candidate = now - self.config.growth.elapsed_for(multiplier);
        match self.virtual_round_start {
            Some(current) if (candidate - current).abs() <= self.config.drift_threshold_ms => {}
            current => {
                debug!(
                    multiplier,
                    drift_ms = current.map(|c| candidate - c),
                    "re-synchronizing round start"
                );
                self.virtual_round_start = Some(candidate);
            }
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Latest authoritative sample.
    pub fn sample(&self) -> MultiplierSample {
        self.sample
    }

    /// Latest authoritative multiplier.
    pub fn multiplier(&self) -> f64 {
        self.sample.multiplier
    }

    /// Estimated local time at which the current flight began.
    pub fn virtual_round_start(&self) -> Option<Millis> {
        self.virtual_round_start
    }

    /// Countdown seconds.
    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    /// Round history.
    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    /// Commitment hash of the upcoming or current round.
    pub fn current_hash(&self) -> Option<&str> {
        self.current_hash.as_deref()
    }

    /// Most recently revealed seed.
    pub fn last_seed(&self) -> Option<&str> {
        self.last_seed.as_deref()
    }

    /// Store tuning.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Default for GameStateStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(phase: RoundPhase, multiplier: Option<f64>) -> ServerEvent {
        ServerEvent::State { phase, multiplier }
    }

    fn tick(multiplier: f64) -> ServerEvent {
        ServerEvent::Tick { multiplier }
    }

    fn crash(multiplier: f64, seed: Option<&str>) -> ServerEvent {
        ServerEvent::Crash {
            multiplier: Some(multiplier),
            seed: seed.map(String::from),
        }
    }

    #[test]
    fn test_phase_from_wire() {
        assert_eq!(RoundPhase::from_wire("RUNNING"), Some(RoundPhase::Flying));
        assert_eq!(RoundPhase::from_wire("FLYING"), Some(RoundPhase::Flying));
        assert_eq!(RoundPhase::from_wire("CRASHED"), Some(RoundPhase::Crashed));
        assert_eq!(RoundPhase::from_wire("waiting"), None);
    }

    #[test]
    fn test_full_round_cycle() {
        let mut store = GameStateStore::default();
        assert_eq!(store.phase(), RoundPhase::Waiting);

        let out = store.apply(&ServerEvent::Takeoff, 1_000.0);
        assert_eq!((out.previous, out.phase), (RoundPhase::Waiting, RoundPhase::Flying));
        assert_eq!(store.multiplier(), 1.0);
        assert_eq!(store.virtual_round_start(), Some(1_000.0));

        let out = store.apply(&crash(2.0, Some("s")), 5_000.0);
        assert!(out.round_boundary);
        assert_eq!(store.phase(), RoundPhase::Crashed);
        assert_eq!(store.multiplier(), 2.0);
        assert_eq!(store.last_seed(), Some("s"));
        assert_eq!(store.history().len(), 1);

        let out = store.apply(&state(RoundPhase::Waiting, None), 6_000.0);
        assert!(out.round_boundary);
        assert_eq!(store.phase(), RoundPhase::Waiting);
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn test_repeated_waiting_is_not_a_boundary() {
        let mut store = GameStateStore::default();
        let out = store.apply(&state(RoundPhase::Waiting, None), 0.0);
        assert!(!out.round_boundary);
    }

    #[test]
    fn test_resync_hits_sample_exactly() {
        let mut store = GameStateStore::default();
        store.apply(&state(RoundPhase::Flying, None), 0.0);

        let t = 20_000.0;
        store.apply(&tick(2.0), t);

        let start = store.virtual_round_start().unwrap();
        let rate = GrowthModel::V1.rate_per_ms;
        assert!(((rate * (t - start)).exp() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_resync_ignores_small_jitter() {
        let mut store = GameStateStore::default();
        store.apply(&state(RoundPhase::Flying, None), 0.0);

        // Exactly on the curve, then 100 ms late
        let on_curve = GrowthModel::V1.elapsed_for(1.5);
        store.apply(&tick(1.5), on_curve);
        assert!((store.virtual_round_start().unwrap() - 0.0).abs() < 1e-6);

        store.apply(&tick(1.5), on_curve + 100.0);
        assert!((store.virtual_round_start().unwrap() - 0.0).abs() < 1e-6);
        // Sample still updates
        assert_eq!(store.sample().received_at, on_curve + 100.0);
    }

    #[test]
    fn test_resync_corrects_large_drift() {
        let mut store = GameStateStore::default();
        store.apply(&state(RoundPhase::Flying, None), 0.0);

        let on_curve = GrowthModel::V1.elapsed_for(1.5);
        store.apply(&tick(1.5), on_curve + 1_000.0);
        assert!((store.virtual_round_start().unwrap() - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_late_join_state_with_multiplier() {
        let mut store = GameStateStore::default();
        store.apply(&state(RoundPhase::Flying, Some(3.0)), 50_000.0);

        assert_eq!(store.phase(), RoundPhase::Flying);
        assert_eq!(store.multiplier(), 3.0);
        let expected = 50_000.0 - GrowthModel::V1.elapsed_for(3.0);
        assert!((store.virtual_round_start().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_takeoff_while_flying_keeps_start() {
        let mut store = GameStateStore::default();
        store.apply(&ServerEvent::Takeoff, 100.0);
        store.apply(&tick(1.2), 3_100.0);
        let before = store.virtual_round_start();

        let out = store.apply(&ServerEvent::Takeoff, 4_000.0);
        assert!(!out.changed);
        assert_eq!(store.virtual_round_start(), before);
    }

    #[test]
    fn test_crash_without_readable_multiplier_pins_last_sample() {
        let mut store = GameStateStore::default();
        store.apply(&ServerEvent::Takeoff, 0.0);
        store.apply(&tick(1.77), 9_000.0);
        store.apply(
            &ServerEvent::Crash {
                multiplier: None,
                seed: None,
            },
            9_100.0,
        );

        assert_eq!(store.phase(), RoundPhase::Crashed);
        assert_eq!(store.history().latest().unwrap().multiplier, 1.77);
    }

    #[test]
    fn test_replayed_crash_is_ignored() {
        let mut store = GameStateStore::default();
        store.apply(&ServerEvent::Takeoff, 0.0);
        store.apply(&crash(1.45, Some("abc")), 1.0);
        let out = store.apply(&crash(1.45, Some("abc")), 2.0);

        assert!(!out.changed);
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn test_history_capped_on_crash() {
        let mut store = GameStateStore::new(StoreConfig {
            history_limit: 200,
            ..StoreConfig::default()
        });
        for i in 0..250 {
            store.apply(&ServerEvent::Takeoff, i as f64);
            store.apply(&crash(1.0 + i as f64 / 100.0, None), i as f64);
            store.apply(&state(RoundPhase::Waiting, None), i as f64);
        }
        assert_eq!(store.history().len(), 200);
        assert_eq!(store.history().latest().unwrap().multiplier, 1.0 + 249.0 / 100.0);
    }

    #[test]
    fn test_timer_hash_and_history() {
        let mut store = GameStateStore::default();
        store.apply(&ServerEvent::Timer { seconds: 7 }, 0.0);
        store.apply(&ServerEvent::Hash { hash: "abc123".into() }, 0.0);
        store.apply(
            &ServerEvent::History {
                entries: vec![HistoryEntry::new(2.0, Some("x".into())), HistoryEntry::new(1.1, None)],
            },
            0.0,
        );

        assert_eq!(store.time_left(), 7);
        assert_eq!(store.current_hash(), Some("abc123"));
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.history().latest().unwrap().seed.as_deref(), Some("x"));
    }

    #[test]
    fn test_tick_outside_flight_is_ignored() {
        let mut store = GameStateStore::default();
        store.apply(&ServerEvent::Takeoff, 0.0);
        store.apply(&crash(1.45, Some("abc")), 1_000.0);

        let out = store.apply(&tick(1.5), 1_100.0);
        assert!(!out.changed);
        assert_eq!(store.phase(), RoundPhase::Crashed);
        assert_eq!(store.multiplier(), 1.45);

        store.apply(&state(RoundPhase::Waiting, None), 2_000.0);
        let out = store.apply(&tick(3.0), 2_100.0);
        assert!(!out.changed);
        assert_eq!(store.multiplier(), 1.0);
        assert_eq!(store.virtual_round_start(), None);
    }

    #[test]
    fn test_crash_records_round_commitment() {
        let mut store = GameStateStore::default();
        store.apply(&ServerEvent::Hash { hash: "round1".into() }, 0.0);
        store.apply(&ServerEvent::Takeoff, 100.0);
        store.apply(&crash(1.19, Some("s1")), 200.0);
        store.apply(&ServerEvent::Hash { hash: "round2".into() }, 300.0);

        let latest = store.history().latest().unwrap();
        assert_eq!(latest.commitment.as_deref(), Some("round1"));
        assert_eq!(store.current_hash(), Some("round2"));
    }

    #[test]
    fn test_ledger_events_pass_through() {
        let mut store = GameStateStore::default();
        let out = store.apply(&ServerEvent::CancelBet { player: "a".into(), slot: 0 }, 0.0);
        assert!(!out.changed);
        assert!(!out.round_boundary);
    }
}
