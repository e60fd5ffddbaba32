//! Client Session
//!
//! Owns the store and the ledger and applies everything to them in one
//! place, strictly in arrival order: transport frames, connection changes
//! and the caller's optimistic ledger commands. After each change an
//! immutable [`GameSnapshot`] is published.
//!
//! ```text
//!  GameConnection ──TransportEvent──┐
//!                                   ├──▶ GameSession ──Arc<GameSnapshot>──▶ watch (latest)
//!  BetDesk / UI ───LedgerCommand────┘    (store+ledger)                 └──▶ broadcast (every)
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace};

use crate::core::clock::{Clock, MonotonicClock};
use crate::game::events::ServerEvent;
use crate::game::history::HISTORY_LIMIT;
use crate::game::ledger::{Bet, BetLedger};
use crate::game::prediction::{spawn_frame_loop, FrameSample, GrowthModel};
use crate::game::snapshot::{ConnectionStatus, GameSnapshot};
use crate::game::state::{
    GameStateStore, StoreConfig, DEFAULT_DRIFT_THRESHOLD_MS, DRIFT_THRESHOLD_RANGE_MS,
};
use crate::network::backoff::ReconnectPolicy;
use crate::network::client::{GameConnection, TransportConfig, TransportEvent};
use crate::network::protocol::parse_frame;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stream endpoint.
    pub url: String,
    /// Liveness probe period.
    pub ping_interval: Duration,
    /// Single connect attempt timeout.
    pub connect_timeout: Duration,
    /// Retry schedule.
    pub reconnect: ReconnectPolicy,
    /// Re-synchronization tolerance (ms), 100..=500.
    pub drift_threshold_ms: f64,
    /// Growth law shared with the server.
    pub growth: GrowthModel,
    /// Rounds of history kept.
    pub history_limit: usize,
    /// Render loop period.
    pub frame_interval: Duration,
    /// Snapshots buffered per lagging subscriber.
    pub snapshot_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            url: transport.url,
            ping_interval: transport.ping_interval,
            connect_timeout: transport.connect_timeout,
            reconnect: transport.reconnect,
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            growth: GrowthModel::V1,
            history_limit: HISTORY_LIMIT,
            frame_interval: Duration::from_millis(16),
            snapshot_capacity: 256,
        }
    }
}

/// Invalid environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Variable set but unparseable.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CRASH_WS_URL") {
            config.url = url;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CRASH_PING_INTERVAL_MS")? {
            config.ping_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse_var::<f64, _>(&lookup, "CRASH_DRIFT_THRESHOLD_MS")? {
            config.drift_threshold_ms = ms;
        }
        if let Some(rate) = parse_var::<f64, _>(&lookup, "CRASH_GROWTH_RATE")? {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::Invalid {
                    var: "CRASH_GROWTH_RATE",
                    value: rate.to_string(),
                });
            }
            config.growth.rate_per_ms = rate;
        }
        if let Some(version) = parse_var::<u32, _>(&lookup, "CRASH_GROWTH_VERSION")? {
            config.growth.version = version;
        }
        if let Some(limit) = parse_var::<usize, _>(&lookup, "CRASH_HISTORY_LIMIT")? {
            config.history_limit = limit;
        }

        config.drift_threshold_ms = clamp_drift(config.drift_threshold_ms);
        Ok(config)
    }

    /// Transport part of the config.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.url.clone(),
            ping_interval: self.ping_interval,
            connect_timeout: self.connect_timeout,
            reconnect: self.reconnect,
        }
    }

    /// Store part of the config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            growth: self.growth,
            drift_threshold_ms: clamp_drift(self.drift_threshold_ms),
            history_limit: self.history_limit,
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn clamp_drift(ms: f64) -> f64 {
    let (lo, hi) = DRIFT_THRESHOLD_RANGE_MS;
    if ms.is_nan() {
        return DEFAULT_DRIFT_THRESHOLD_MS;
    }
    ms.clamp(lo, hi)
}

// =============================================================================
// LEDGER COMMANDS
// =============================================================================

/// Optimistic ledger operations issued by the bet-placement side.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    /// Insert (or merge) the player's own bet before confirmation.
    AddLocalBet(Bet),
    /// Roll back a bet whose placement failed.
    RemoveLocalBet {
        /// Player identity.
        player: String,
        /// Slot index.
        slot: u32,
    },
    /// Record a confirmed cash-out.
    ApplyCashoutResult {
        /// Player identity.
        player: String,
        /// Slot index.
        slot: u32,
        /// Cash-out multiplier.
        multiplier: f64,
        /// Payout.
        profit: f64,
    },
}

// =============================================================================
// SESSION
// =============================================================================

/// Serialized reducer over store, ledger and connection status.
pub struct GameSession {
    store: GameStateStore,
    ledger: BetLedger,
    connection: ConnectionStatus,
    clock: Arc<dyn Clock>,
    latest_tx: watch::Sender<Arc<GameSnapshot>>,
    updates_tx: broadcast::Sender<Arc<GameSnapshot>>,
}

impl GameSession {
    /// Fresh session publishing an initial WAITING snapshot.
    pub fn new(config: StoreConfig, clock: Arc<dyn Clock>, snapshot_capacity: usize) -> Self {
        let store = GameStateStore::new(config);
        let ledger = BetLedger::new();
        let connection = ConnectionStatus::default();
        let initial = Arc::new(GameSnapshot::capture(&store, &ledger, &connection));
        let (latest_tx, _) = watch::channel(initial);
        let (updates_tx, _) = broadcast::channel(snapshot_capacity.max(1));

        Self {
            store,
            ledger,
            connection,
            clock,
            latest_tx,
            updates_tx,
        }
    }

    /// Decode and apply one raw frame. Malformed frames are dropped.
    pub fn apply_frame(&mut self, frame: &str) -> bool {
        match parse_frame(frame) {
            Ok(event) => self.apply_event(event),
            Err(e) if e.is_forward_compatible() => {
                trace!("Ignoring frame: {}", e);
                false
            }
            Err(e) => {
                debug!("Dropping malformed frame {:?}: {}", frame, e);
                false
            }
        }
    }

    /// Apply one decoded event. Returns true if a snapshot was published.
    pub fn apply_event(&mut self, event: ServerEvent) -> bool {
        let changed = match event {
            ServerEvent::Bet(bet) => {
                self.ledger.apply_remote_bet(bet);
                true
            }
            ServerEvent::Cashout {
                player,
                multiplier,
                profit,
                slot,
            } => self
                .ledger
                .apply_cashout_result(&player, slot, multiplier, profit),
            ServerEvent::CancelBet { player, slot } => {
                self.ledger.apply_remote_cancel(&player, slot)
            }
            ServerEvent::Pong | ServerEvent::Ack { .. } => false,
            other => {
                let outcome = self.store.apply(&other, self.clock.now_ms());
                if outcome.round_boundary {
                    debug!(bets = self.ledger.len(), "round boundary, clearing ledger");
                    self.ledger.clear_all();
                }
                outcome.changed
            }
        };

        if changed {
            self.publish();
        }
        changed
    }

    /// Apply an optimistic ledger command.
    pub fn apply_command(&mut self, command: LedgerCommand) -> bool {
        let changed = match command {
            LedgerCommand::AddLocalBet(bet) => {
                self.ledger.add_local_bet(bet);
                true
            }
            LedgerCommand::RemoveLocalBet { player, slot } => {
                self.ledger.remove_local_bet(&player, slot).is_some()
            }
            LedgerCommand::ApplyCashoutResult {
                player,
                slot,
                multiplier,
                profit,
            } => self
                .ledger
                .apply_cashout_result(&player, slot, multiplier, profit),
        };

        if changed {
            self.publish();
        }
        changed
    }

    /// Fold a transport event into the session.
    pub fn handle_transport(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Frame(text) => return self.apply_frame(&text),
            TransportEvent::Connected => {
                self.connection = ConnectionStatus {
                    connected: true,
                    attempt: 0,
                    latency_ms: None,
                    connected_since: Some(Utc::now()),
                };
            }
            TransportEvent::Latency(rtt) => {
                self.connection.latency_ms = Some(rtt.as_secs_f64() * 1_000.0);
            }
            TransportEvent::Disconnected { attempt, .. } => {
                self.connection.connected = false;
                self.connection.attempt = attempt;
                self.connection.connected_since = None;
            }
        }
        self.publish();
        true
    }

    fn publish(&self) {
        let snapshot = Arc::new(GameSnapshot::capture(
            &self.store,
            &self.ledger,
            &self.connection,
        ));
        self.latest_tx.send_replace(snapshot.clone());
        // No subscribers is fine
        let _ = self.updates_tx.send(snapshot);
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<GameSnapshot> {
        self.latest_tx.borrow().clone()
    }

    /// Every snapshot from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GameSnapshot>> {
        self.updates_tx.subscribe()
    }

    /// Latest-value view for render loops.
    pub fn watch(&self) -> watch::Receiver<Arc<GameSnapshot>> {
        self.latest_tx.subscribe()
    }

    /// Round state.
    pub fn store(&self) -> &GameStateStore {
        &self.store
    }

    /// Current bets.
    pub fn ledger(&self) -> &BetLedger {
        &self.ledger
    }

    /// Transport health.
    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }
}

// =============================================================================
// RUNNING SESSION
// =============================================================================

/// Handle to a session running in the background against a live stream.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<LedgerCommand>,
    latest: watch::Receiver<Arc<GameSnapshot>>,
    updates: broadcast::Sender<Arc<GameSnapshot>>,
    clock: Arc<dyn Clock>,
    frame_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Connect and start applying frames.
    pub fn start(config: ClientConfig) -> Self {
        Self::start_with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Like [`SessionHandle::start`] with an explicit clock.
    pub fn start_with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
        let session = GameSession::new(config.store_config(), clock.clone(), config.snapshot_capacity);
        let latest = session.watch();
        let updates = session.updates_tx.clone();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(run_session(
            session,
            config.transport_config(),
            commands_rx,
            shutdown_rx,
        ));

        Self {
            commands: commands_tx,
            latest,
            updates,
            clock,
            frame_interval: config.frame_interval,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Sender for optimistic ledger commands.
    pub fn commands(&self) -> mpsc::UnboundedSender<LedgerCommand> {
        self.commands.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<GameSnapshot> {
        self.latest.borrow().clone()
    }

    /// Latest-value view.
    pub fn watch(&self) -> watch::Receiver<Arc<GameSnapshot>> {
        self.latest.clone()
    }

    /// Every snapshot from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GameSnapshot>> {
        self.updates.subscribe()
    }

    /// Start the render loop for this session.
    pub fn spawn_frame_loop(&self) -> (JoinHandle<()>, watch::Receiver<FrameSample>) {
        spawn_frame_loop(self.watch(), self.clock.clone(), self.frame_interval)
    }

    /// Close the transport (no reconnect) and stop applying frames.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[instrument(skip_all, fields(url = %transport.url))]
async fn run_session(
    mut session: GameSession,
    transport: TransportConfig,
    mut commands_rx: mpsc::UnboundedReceiver<LedgerCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (connection, mut transport_rx) = GameConnection::connect(transport);
    info!("Session started");

    loop {
        tokio::select! {
            Some(event) = transport_rx.recv() => {
                session.handle_transport(event);
            }
            Some(command) = commands_rx.recv() => {
                session.apply_command(command);
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    connection.shutdown().await;
    session.connection.connected = false;
    session.connection.connected_since = None;
    session.publish();
    info!("Session stopped");
}
