//! HTTP Collaborator Interfaces
//!
//! Player actions (bet, cancel, cash-out) and the slower listings (full
//! history, top bets) go over request/response HTTP, not the stream. The
//! transport itself lives outside this crate; these traits are the seam,
//! plus decoders for the JSON payload shapes the game backend returns.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Avatar shown when a player has none.
pub const DEFAULT_AVATAR: &str = "/assets/default-avatar.png";

/// Path prefix of avatars served by the game backend itself.
const BACKEND_AVATAR_PREFIX: &str = "/users/";

/// Collaborator failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// No logged-in player.
    #[error("not authenticated")]
    Unauthenticated,

    /// Backend refused the request, with its message.
    #[error("rejected ({status}): {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Backend error text.
        message: String,
    },

    /// Request never completed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Response body had an unexpected shape.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Who the local player is.
pub trait IdentityProvider: Send + Sync {
    /// Current player identity, `None` when logged out.
    fn current_identity(&self) -> Option<String>;
}

/// Fixed identity, for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<String>);

impl StaticIdentity {
    /// Logged in as `player`.
    pub fn new(player: impl Into<String>) -> Self {
        Self(Some(player.into()))
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Successful cash-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutReceipt {
    /// Multiplier the server settled at.
    #[serde(default)]
    pub multiplier: Option<f64>,
    /// Payout.
    pub win_amount: f64,
    /// Balance after payout.
    pub new_balance: f64,
}

/// Leaderboard ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopBetsKind {
    /// Largest payouts.
    Profit,
    /// Highest cash-out multipliers.
    Multiplier,
}

impl TopBetsKind {
    /// Query value.
    pub fn as_str(self) -> &'static str {
        match self {
            TopBetsKind::Profit => "profit",
            TopBetsKind::Multiplier => "multiplier",
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopBet {
    /// Player.
    pub username: String,
    /// Avatar reference as sent by the backend.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Stake.
    pub amount: f64,
    /// Cash-out multiplier.
    pub multiplier: f64,
    /// Payout.
    pub profit: f64,
    /// When the bet settled.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Request/response game backend.
pub trait GameApi: Send + Sync {
    /// Place a bet. `auto_cashout` is `None` when disabled.
    fn place_bet(
        &self,
        stake: f64,
        auto_cashout: Option<f64>,
        slot: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Withdraw a bet before flight.
    fn cancel_bet(&self, slot: u32) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Cash out a running bet.
    fn cash_out(&self, slot: u32) -> impl Future<Output = Result<CashoutReceipt, ApiError>> + Send;

    /// Full crash history, newest first.
    fn history(&self) -> impl Future<Output = Result<Vec<f64>, ApiError>> + Send;

    /// Leaderboard.
    fn top_bets(
        &self,
        kind: TopBetsKind,
    ) -> impl Future<Output = Result<Vec<TopBet>, ApiError>> + Send;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryItem {
    Number(f64),
    Text(String),
}

/// Decode a history listing: a JSON array of decimal strings (numbers
/// are accepted too). `null` means empty; unreadable items are skipped.
pub fn decode_history(body: &str) -> Result<Vec<f64>, ApiError> {
    let items: Option<Vec<HistoryItem>> = serde_json::from_str(body)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match item {
            HistoryItem::Number(n) => Some(n),
            HistoryItem::Text(s) => s.trim().parse::<f64>().ok(),
        })
        .filter(|m| m.is_finite())
        .collect())
}

/// Decode a top-bets listing.
pub fn decode_top_bets(body: &str) -> Result<Vec<TopBet>, ApiError> {
    let bets: Option<Vec<TopBet>> = serde_json::from_str(body)?;
    Ok(bets.unwrap_or_default())
}

/// Decode a cash-out response.
pub fn decode_cashout(body: &str) -> Result<CashoutReceipt, ApiError> {
    Ok(serde_json::from_str(body)?)
}

/// Resolve an avatar reference for display.
///
/// Backend-relative paths (`/users/...`) are served by the API host; absent
/// avatars fall back to [`DEFAULT_AVATAR`]; anything else is used as is.
pub fn resolve_avatar_url(api_base: &str, avatar: Option<&str>) -> String {
    match avatar.map(str::trim).filter(|a| !a.is_empty()) {
        None => DEFAULT_AVATAR.to_string(),
        Some(path) if path.starts_with(BACKEND_AVATAR_PREFIX) => {
            format!("{}{}", api_base.trim_end_matches('/'), path)
        }
        Some(url) => url.to_string(),
    }
}
