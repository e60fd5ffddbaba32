//! Prediction Clock
//!
//! The server only sends a multiplier sample every so often. Between samples
//! the client extrapolates along the same exponential curve the server uses,
//! anchored at the store's virtual round start.
//!
//! Nothing here writes to the store: the frame loop reads immutable
//! snapshots and publishes what should be drawn.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::core::clock::{Clock, Millis};
use crate::game::snapshot::GameSnapshot;
use crate::game::state::RoundPhase;

/// Growth law shared with the server: `m(t) = e^(rate * t)`, `t` in ms.
///
/// Versioned so a server-side model change shows up as a visible
/// contract bump instead of a silent desync.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthModel {
    /// Contract version.
    pub version: u32,
    /// Exponent per elapsed millisecond.
    pub rate_per_ms: f64,
}

impl GrowthModel {
    /// Curve currently used by the game server.
    pub const V1: GrowthModel = GrowthModel {
        version: 1,
        rate_per_ms: 0.00006,
    };

    /// Create a model with an explicit version and rate.
    pub const fn new(version: u32, rate_per_ms: f64) -> Self {
        Self { version, rate_per_ms }
    }

    /// Multiplier after `elapsed_ms` of flight. Negative time reads as 1.00.
    #[inline]
    pub fn multiplier_at(&self, elapsed_ms: Millis) -> f64 {
        (self.rate_per_ms * elapsed_ms.max(0.0)).exp()
    }

    /// Flight time needed to reach `multiplier`. Values at or below 1.00 give 0.
    #[inline]
    pub fn elapsed_for(&self, multiplier: f64) -> Millis {
        if multiplier <= 1.0 {
            return 0.0;
        }
        multiplier.ln() / self.rate_per_ms
    }
}

impl Default for GrowthModel {
    fn default() -> Self {
        Self::V1
    }
}

/// Turns a snapshot plus the current time into the multiplier to display.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionClock {
    growth: GrowthModel,
}

impl PredictionClock {
    /// Create a clock for a growth model.
    pub fn new(growth: GrowthModel) -> Self {
        Self { growth }
    }

    /// Growth model in use.
    pub fn growth(&self) -> GrowthModel {
        self.growth
    }

    /// Raw curve value at `now` for a round that started at `round_start`.
    pub fn predict(&self, round_start: Millis, now: Millis) -> f64 {
        self.growth.multiplier_at(now - round_start)
    }

    /// Multiplier to render for `snapshot` at `now`.
    ///
    /// While flying this is `max(last sample, prediction)`, so the curve
    /// never drops below confirmed truth. Other phases show the sample.
    pub fn display(&self, snapshot: &GameSnapshot, now: Millis) -> f64 {
        match (snapshot.phase, snapshot.virtual_round_start) {
            (RoundPhase::Flying, Some(start)) => snapshot.multiplier.max(self.predict(start, now)),
            _ => snapshot.multiplier,
        }
    }

    /// Build the frame for `snapshot` at `now`.
    pub fn frame(&self, snapshot: &GameSnapshot, now: Millis) -> FrameSample {
        FrameSample {
            phase: snapshot.phase,
            multiplier: self.display(snapshot, now),
            time_left: snapshot.time_left,
            at: now,
        }
    }
}

/// One evaluated display frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// Phase shown in this frame.
    pub phase: RoundPhase,
    /// Multiplier to draw.
    pub multiplier: f64,
    /// Countdown seconds while waiting.
    pub time_left: u32,
    /// Local time the frame was evaluated.
    pub at: Millis,
}

impl Default for FrameSample {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Waiting,
            multiplier: 1.0,
            time_left: 0,
            at: 0.0,
        }
    }
}

/// Spawn the render-cadence loop.
///
/// Evaluates the prediction clock once per `frame_interval` against the
/// latest snapshot and publishes the result. Stops once the snapshot
/// publisher or every frame receiver is gone.
pub fn spawn_frame_loop(
    mut snapshots: watch::Receiver<Arc<GameSnapshot>>,
    clock: Arc<dyn Clock>,
    frame_interval: Duration,
) -> (JoinHandle<()>, watch::Receiver<FrameSample>) {
    let (frame_tx, frame_rx) = watch::channel(FrameSample::default());

    let handle = tokio::spawn(async move {
        let mut ticker = interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if snapshots.has_changed().is_err() || frame_tx.is_closed() {
                break;
            }

            let snapshot = snapshots.borrow_and_update().clone();
            let prediction = PredictionClock::new(snapshot.growth);
            frame_tx.send_replace(prediction.frame(&snapshot, clock.now_ms()));
        }

        debug!("Frame loop stopped");
    });

    (handle, frame_rx)
}
