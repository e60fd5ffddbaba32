//! Network Layer
//!
//! WebSocket transport, frame codec and the session that applies frames to
//! game state. This layer is **non-deterministic** (sockets, timers, jitter);
//! all state transitions run through `game/`.

pub mod api;
pub mod backoff;
pub mod client;
pub mod desk;
pub mod protocol;
pub mod session;

pub use api::{
    decode_history, decode_top_bets, resolve_avatar_url, ApiError, CashoutReceipt, GameApi,
    IdentityProvider, StaticIdentity, TopBet, TopBetsKind,
};
pub use backoff::{Backoff, ReconnectPolicy};
pub use client::{GameConnection, TransportConfig, TransportError, TransportEvent};
pub use desk::{BetDesk, DeskError};
pub use protocol::{parse_frame, ClientCommand, ProtocolError};
pub use session::{ClientConfig, ConfigError, GameSession, LedgerCommand, SessionHandle};
