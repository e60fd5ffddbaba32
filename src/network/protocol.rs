//! Protocol Codec
//!
//! Wire format for the game stream: one UTF-8 text frame per event, a tag
//! followed by colon-separated fields.
//!
//! ```text
//! STATE:FLYING:1.37        TICK:2.04          CRASH:3.10:<seed>
//! TAKEOFF                  TIMER:5            HASH:<hex>
//! HISTORY:2.10:<seed>,1.05 BET:alice:10:1:/users/a.png
//! CASHOUT:alice:2.5:15:1   CANCEL_BET:alice:1 PONG
//! ```
//!
//! The tag is the exact text before the first colon. The last field of a
//! frame may itself contain colons (avatar URLs), so it is taken greedily.
//! Decoding never panics; anything malformed comes back as a
//! [`ProtocolError`] for the caller to log and drop.

use std::fmt;

use thiserror::Error;

use crate::game::events::{AckKind, ServerEvent};
use crate::game::history::HistoryEntry;
use crate::game::ledger::Bet;
use crate::game::state::RoundPhase;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Blank frame.
    #[error("empty frame")]
    Empty,

    /// Tag this client does not know. Expected from newer servers.
    #[error("unknown tag {0:?}")]
    UnknownTag(String),

    /// Required field absent.
    #[error("{tag}: missing {field}")]
    MissingField {
        /// Frame tag.
        tag: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// Field present but not a usable number.
    #[error("{tag}: invalid {field} {value:?}")]
    InvalidNumber {
        /// Frame tag.
        tag: &'static str,
        /// Field name.
        field: &'static str,
        /// Raw text.
        value: String,
    },

    /// `STATE` with a phase name this client does not know.
    #[error("unknown phase {0:?}")]
    UnknownPhase(String),
}

impl ProtocolError {
    /// Whether the frame is simply from a newer protocol revision.
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, ProtocolError::UnknownTag(_))
    }
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Commands this client sends over the stream. Player actions go through
/// the HTTP collaborator instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Liveness probe.
    Ping,
}

impl ClientCommand {
    /// Wire text.
    pub fn encode(&self) -> &'static str {
        match self {
            ClientCommand::Ping => "PING",
        }
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Whether `frame` is a liveness reply, without a full decode.
pub fn is_pong(frame: &str) -> bool {
    frame.trim() == "PONG"
}

/// Decode one inbound frame.
pub fn parse_frame(frame: &str) -> Result<ServerEvent, ProtocolError> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let (tag, rest) = match frame.split_once(':') {
        Some((tag, rest)) => (tag, Some(rest)),
        None => (frame, None),
    };

    match tag {
        "STATE" => parse_state(Fields::new("STATE", rest)),
        "TICK" => {
            let mut f = Fields::new("TICK", rest);
            let multiplier = f.multiplier("multiplier")?;
            Ok(ServerEvent::Tick { multiplier })
        }
        "CRASH" => parse_crash(Fields::new("CRASH", rest)),
        "TAKEOFF" => Ok(ServerEvent::Takeoff),
        "TIMER" => {
            let mut f = Fields::new("TIMER", rest);
            let seconds = f.seconds("seconds")?;
            Ok(ServerEvent::Timer { seconds })
        }
        "HASH" => {
            let mut f = Fields::new("HASH", rest);
            let hash = f.require_rest("hash")?.to_string();
            Ok(ServerEvent::Hash { hash })
        }
        "HISTORY" => Ok(ServerEvent::History {
            entries: parse_history(rest.unwrap_or_default()),
        }),
        "BET" => parse_bet(Fields::new("BET", rest)),
        "CASHOUT" => {
            let mut f = Fields::new("CASHOUT", rest);
            let player = f.require("player")?.to_string();
            let multiplier = f.multiplier("multiplier")?;
            let profit = f.number("profit")?;
            let slot = f.optional_slot();
            Ok(ServerEvent::Cashout {
                player,
                multiplier,
                profit,
                slot,
            })
        }
        "CANCEL_BET" => {
            let mut f = Fields::new("CANCEL_BET", rest);
            let player = f.require("player")?.to_string();
            let slot = f.optional_slot();
            Ok(ServerEvent::CancelBet { player, slot })
        }
        "PONG" => Ok(ServerEvent::Pong),
        "BET_OK" => Ok(ServerEvent::Ack { kind: AckKind::Bet }),
        "CASHOUT_OK" => Ok(ServerEvent::Ack {
            kind: AckKind::Cashout,
        }),
        other => Err(ProtocolError::UnknownTag(other.to_string())),
    }
}

fn parse_state(mut f: Fields<'_>) -> Result<ServerEvent, ProtocolError> {
    let name = f.require("phase")?;
    let phase =
        RoundPhase::from_wire(name).ok_or_else(|| ProtocolError::UnknownPhase(name.to_string()))?;
    // An unreadable optional multiplier does not invalidate the phase
    let multiplier = f.next().and_then(parse_multiplier);
    Ok(ServerEvent::State { phase, multiplier })
}

fn parse_crash(mut f: Fields<'_>) -> Result<ServerEvent, ProtocolError> {
    // The phase change must not be lost to a garbled number; the store
    // falls back to its last sample.
    let multiplier = f.next().and_then(parse_multiplier);
    let seed = f.rest().map(String::from);
    Ok(ServerEvent::Crash { multiplier, seed })
}

fn parse_bet(mut f: Fields<'_>) -> Result<ServerEvent, ProtocolError> {
    let player = f.require("player")?.to_string();
    let stake = f.number("amount")?;
    if stake <= 0.0 {
        return Err(f.invalid("amount", &stake.to_string()));
    }

    let mut bet = Bet::new(player, stake, 0);
    if let Some(remainder) = f.rest() {
        let (head, tail) = match remainder.split_once(':') {
            Some((head, tail)) => (head, Some(tail)),
            None => (remainder, None),
        };
        match head.parse::<u32>() {
            Ok(slot) => {
                bet.slot = slot;
                bet.avatar = tail.filter(|t| !t.is_empty()).map(String::from);
            }
            Err(_) => bet.avatar = Some(remainder.to_string()),
        }
    }
    Ok(ServerEvent::Bet(bet))
}

/// `m[:seed]` entries separated by commas. Unreadable entries are skipped.
fn parse_history(csv: &str) -> Vec<HistoryEntry> {
    csv.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .filter_map(|entry| {
            let (m, seed) = match entry.split_once(':') {
                Some((m, seed)) => (m, Some(seed).filter(|s| !s.is_empty())),
                None => (entry, None),
            };
            let multiplier = parse_multiplier(m)?;
            Some(HistoryEntry::new(multiplier, seed.map(String::from)))
        })
        .collect()
}

fn parse_multiplier(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite() && *m >= 1.0)
}

// =============================================================================
// FIELD SPLITTER
// =============================================================================

/// Positional reader over the colon-separated fields after a tag.
struct Fields<'a> {
    tag: &'static str,
    rest: Option<&'a str>,
}

impl<'a> Fields<'a> {
    fn new(tag: &'static str, rest: Option<&'a str>) -> Self {
        Self { tag, rest }
    }

    /// Next field, `None` once exhausted or when the field is empty.
    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest.take()?;
        let field = match rest.split_once(':') {
            Some((field, tail)) => {
                self.rest = Some(tail);
                field
            }
            None => rest,
        };
        Some(field).filter(|f| !f.is_empty())
    }

    /// Everything left, colons included.
    fn rest(&mut self) -> Option<&'a str> {
        self.rest.take().filter(|r| !r.is_empty())
    }

    fn require(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.next().ok_or(ProtocolError::MissingField {
            tag: self.tag,
            field,
        })
    }

    fn require_rest(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.rest().ok_or(ProtocolError::MissingField {
            tag: self.tag,
            field,
        })
    }

    fn number(&mut self, field: &'static str) -> Result<f64, ProtocolError> {
        let raw = self.require(field)?;
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(self.invalid(field, raw)),
        }
    }

    fn multiplier(&mut self, field: &'static str) -> Result<f64, ProtocolError> {
        let raw = self.require(field)?;
        parse_multiplier(raw).ok_or_else(|| self.invalid(field, raw))
    }

    /// Whole seconds. Fractional values are floored.
    fn seconds(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let raw = self.require(field)?;
        if let Ok(s) = raw.trim().parse::<u32>() {
            return Ok(s);
        }
        match raw.trim().parse::<f64>() {
            Ok(s) if s.is_finite() && s >= 0.0 && s <= u32::MAX as f64 => Ok(s.floor() as u32),
            _ => Err(self.invalid(field, raw)),
        }
    }

    /// Trailing slot index, 0 when absent or unreadable.
    fn optional_slot(&mut self) -> u32 {
        self.next()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(0)
    }

    fn invalid(&self, field: &'static str, raw: &str) -> ProtocolError {
        ProtocolError::InvalidNumber {
            tag: self.tag,
            field,
            value: raw.to_string(),
        }
    }
}
