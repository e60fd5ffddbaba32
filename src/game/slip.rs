//! Bet Slip
//!
//! Local state of one bet panel (one slot). Every player action is applied
//! optimistically and paired with a rollback for when the HTTP call fails.
//!
//! ```text
//!         place                 cash_out
//!  Idle ─────────▶ Placed ──────────────▶ CashedOut
//!   ▲               │                        │
//!   └── cancel ─────┘                        │
//!   └──────────────── CRASHED ───────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::ledger::Bet;
use crate::game::state::RoundPhase;

/// Largest stake accepted by a slip.
pub const MAX_STAKE: f64 = 100.0;

/// Stake a fresh slip starts with.
pub const DEFAULT_STAKE: f64 = 5.0;

/// Auto-cashout target a fresh slip starts with (disabled until set).
pub const DEFAULT_AUTO_CASHOUT: f64 = 2.0;

/// Rejected slip action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlipError {
    /// Zero, negative or NaN stake.
    #[error("stake must be positive, got {0}")]
    StakeNotPositive(f64),

    /// Above [`MAX_STAKE`].
    #[error("max bet is 100, got {0}")]
    StakeTooLarge(f64),

    /// Target that could never trigger.
    #[error("auto-cashout target must be above 1.00, got {0}")]
    AutoCashoutTooLow(f64),

    /// Betting outside WAITING.
    #[error("bets are only accepted while waiting (phase is {0})")]
    BettingClosed(RoundPhase),

    /// Cash-out outside FLYING.
    #[error("cash-out is only possible while flying (phase is {0})")]
    NotFlying(RoundPhase),

    /// Slot already holds a bet.
    #[error("a bet is already placed on this slot")]
    AlreadyPlaced,

    /// Slot holds no bet.
    #[error("no bet on this slot")]
    NothingPlaced,

    /// Bet already settled.
    #[error("bet already cashed out")]
    AlreadyCashedOut,
}

/// Where the slip is in its round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipStatus {
    /// No bet.
    #[default]
    Idle,
    /// Bet placed (possibly not yet confirmed).
    Placed,
    /// Bet cashed out (possibly not yet confirmed).
    CashedOut,
}

/// What a phase change asks of the slip's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    /// Nothing to do.
    None,
    /// Auto-bet is on and the slot is empty: place a bet now.
    PlaceAutoBet,
}

/// One bet panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetSlip {
    slot: u32,
    stake: f64,
    auto_cashout: Option<f64>,
    auto_bet: bool,
    status: SlipStatus,
}

impl BetSlip {
    /// Fresh slip for `slot`.
    pub fn new(slot: u32) -> Self {
        Self {
            slot,
            stake: DEFAULT_STAKE,
            auto_cashout: None,
            auto_bet: false,
            status: SlipStatus::Idle,
        }
    }

    /// Slot index.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Configured stake.
    pub fn stake(&self) -> f64 {
        self.stake
    }

    /// Current status.
    pub fn status(&self) -> SlipStatus {
        self.status
    }

    /// Auto-cashout target, if enabled.
    pub fn auto_cashout(&self) -> Option<f64> {
        self.auto_cashout
    }

    /// Whether auto-bet is on.
    pub fn auto_bet(&self) -> bool {
        self.auto_bet
    }

    /// Set the stake.
    pub fn set_stake(&mut self, stake: f64) -> Result<(), SlipError> {
        validate_stake(stake)?;
        self.stake = stake;
        Ok(())
    }

    /// Raise the stake, capped at [`MAX_STAKE`].
    pub fn add_to_stake(&mut self, amount: f64) {
        self.stake = (self.stake + amount).min(MAX_STAKE);
    }

    /// Enable auto-cashout at `target`, or disable it with `None`.
    pub fn set_auto_cashout(&mut self, target: Option<f64>) -> Result<(), SlipError> {
        if let Some(t) = target {
            if t.is_nan() || t <= 1.0 {
                return Err(SlipError::AutoCashoutTooLow(t));
            }
        }
        self.auto_cashout = target;
        Ok(())
    }

    /// Toggle auto-bet.
    pub fn set_auto_bet(&mut self, enabled: bool) {
        self.auto_bet = enabled;
    }

    /// Optimistically mark the bet placed. Returns the stake to send.
    pub fn place(&mut self, phase: RoundPhase) -> Result<f64, SlipError> {
        validate_stake(self.stake)?;
        if phase != RoundPhase::Waiting {
            return Err(SlipError::BettingClosed(phase));
        }
        if self.status != SlipStatus::Idle {
            return Err(SlipError::AlreadyPlaced);
        }
        self.status = SlipStatus::Placed;
        Ok(self.stake)
    }

    /// Undo [`BetSlip::place`] after the server rejected it.
    pub fn rollback_place(&mut self) {
        if self.status == SlipStatus::Placed {
            self.status = SlipStatus::Idle;
        }
    }

    /// Optimistically withdraw the bet.
    pub fn cancel(&mut self) -> Result<(), SlipError> {
        match self.status {
            SlipStatus::Placed => {
                self.status = SlipStatus::Idle;
                Ok(())
            }
            SlipStatus::Idle => Err(SlipError::NothingPlaced),
            SlipStatus::CashedOut => Err(SlipError::AlreadyCashedOut),
        }
    }

    /// Undo [`BetSlip::cancel`] after the server rejected it.
    pub fn rollback_cancel(&mut self) {
        if self.status == SlipStatus::Idle {
            self.status = SlipStatus::Placed;
        }
    }

    /// Optimistically mark the bet cashed out.
    pub fn cash_out(&mut self, phase: RoundPhase) -> Result<(), SlipError> {
        match self.status {
            SlipStatus::Idle => return Err(SlipError::NothingPlaced),
            SlipStatus::CashedOut => return Err(SlipError::AlreadyCashedOut),
            SlipStatus::Placed => {}
        }
        if phase != RoundPhase::Flying {
            return Err(SlipError::NotFlying(phase));
        }
        self.status = SlipStatus::CashedOut;
        Ok(())
    }

    /// Undo [`BetSlip::cash_out`] after the server rejected it.
    pub fn rollback_cash_out(&mut self) {
        if self.status == SlipStatus::CashedOut {
            self.status = SlipStatus::Placed;
        }
    }

    /// React to a phase the store just entered.
    pub fn on_phase(&mut self, phase: RoundPhase) -> PhaseAction {
        match phase {
            RoundPhase::Crashed => {
                self.status = SlipStatus::Idle;
                PhaseAction::None
            }
            RoundPhase::Waiting if self.auto_bet && self.status == SlipStatus::Idle => {
                PhaseAction::PlaceAutoBet
            }
            _ => PhaseAction::None,
        }
    }

    /// Adopt the ledger's view of this slot.
    ///
    /// While waiting, a bet the server knows about but the slip doesn't
    /// (page reload, second device) marks the slip placed with the server's
    /// stake. A recorded profit marks it cashed out.
    pub fn sync_with(&mut self, bet: &Bet, phase: RoundPhase) {
        if bet.slot != self.slot {
            return;
        }
        if self.status == SlipStatus::Idle && phase == RoundPhase::Waiting {
            self.status = SlipStatus::Placed;
            self.stake = bet.stake;
        }
        if bet.profit.is_some_and(|p| p > 0.0) && self.status == SlipStatus::Placed {
            self.status = SlipStatus::CashedOut;
        }
    }

    /// Whether the auto-cashout target has been reached.
    pub fn should_auto_cashout(&self, multiplier: f64) -> bool {
        self.status == SlipStatus::Placed && self.auto_cashout.is_some_and(|t| multiplier >= t)
    }

    /// Betting controls enabled.
    pub fn can_bet(&self, phase: RoundPhase) -> bool {
        phase == RoundPhase::Waiting && self.status == SlipStatus::Idle
    }

    /// Cash-out button enabled.
    pub fn can_cash_out(&self, phase: RoundPhase) -> bool {
        phase == RoundPhase::Flying && self.status == SlipStatus::Placed
    }
}

fn validate_stake(stake: f64) -> Result<(), SlipError> {
    if stake.is_nan() || stake <= 0.0 {
        return Err(SlipError::StakeNotPositive(stake));
    }
    if stake > MAX_STAKE {
        return Err(SlipError::StakeTooLarge(stake));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_cash_out_cycle() {
        let mut slip = BetSlip::new(0);
        assert_eq!(slip.place(RoundPhase::Waiting), Ok(DEFAULT_STAKE));
        assert_eq!(slip.place(RoundPhase::Waiting), Err(SlipError::AlreadyPlaced));

        assert_eq!(
            slip.cash_out(RoundPhase::Waiting),
            Err(SlipError::NotFlying(RoundPhase::Waiting))
        );
        assert!(slip.cash_out(RoundPhase::Flying).is_ok());
        assert_eq!(slip.status(), SlipStatus::CashedOut);
        assert_eq!(slip.cash_out(RoundPhase::Flying), Err(SlipError::AlreadyCashedOut));

        slip.on_phase(RoundPhase::Crashed);
        assert_eq!(slip.status(), SlipStatus::Idle);
    }

    #[test]
    fn test_betting_closed_outside_waiting() {
        let mut slip = BetSlip::new(0);
        assert_eq!(
            slip.place(RoundPhase::Flying),
            Err(SlipError::BettingClosed(RoundPhase::Flying))
        );
        assert_eq!(slip.status(), SlipStatus::Idle);
    }

    #[test]
    fn test_rollbacks() {
        let mut slip = BetSlip::new(1);
        slip.place(RoundPhase::Waiting).unwrap();
        slip.rollback_place();
        assert_eq!(slip.status(), SlipStatus::Idle);

        slip.place(RoundPhase::Waiting).unwrap();
        slip.cancel().unwrap();
        slip.rollback_cancel();
        assert_eq!(slip.status(), SlipStatus::Placed);

        slip.cash_out(RoundPhase::Flying).unwrap();
        slip.rollback_cash_out();
        assert_eq!(slip.status(), SlipStatus::Placed);
    }

    #[test]
    fn test_stake_bounds() {
        let mut slip = BetSlip::new(0);
        assert_eq!(slip.set_stake(0.0), Err(SlipError::StakeNotPositive(0.0)));
        assert_eq!(slip.set_stake(100.5), Err(SlipError::StakeTooLarge(100.5)));
        assert!(slip.set_stake(100.0).is_ok());

        slip.set_stake(90.0).unwrap();
        slip.add_to_stake(50.0);
        assert_eq!(slip.stake(), MAX_STAKE);
    }

    #[test]
    fn test_auto_cashout() {
        let mut slip = BetSlip::new(0);
        assert_eq!(
            slip.set_auto_cashout(Some(1.0)),
            Err(SlipError::AutoCashoutTooLow(1.0))
        );
        slip.set_auto_cashout(Some(DEFAULT_AUTO_CASHOUT)).unwrap();

        assert!(!slip.should_auto_cashout(3.0));
        slip.place(RoundPhase::Waiting).unwrap();
        assert!(!slip.should_auto_cashout(1.99));
        assert!(slip.should_auto_cashout(2.0));
    }

    #[test]
    fn test_auto_bet_on_waiting() {
        let mut slip = BetSlip::new(0);
        assert_eq!(slip.on_phase(RoundPhase::Waiting), PhaseAction::None);

        slip.set_auto_bet(true);
        assert_eq!(slip.on_phase(RoundPhase::Waiting), PhaseAction::PlaceAutoBet);

        slip.place(RoundPhase::Waiting).unwrap();
        assert_eq!(slip.on_phase(RoundPhase::Waiting), PhaseAction::None);
    }

    #[test]
    fn test_sync_with_ledger() {
        let mut slip = BetSlip::new(2);
        let mut bet = Bet::new("alice", 12.5, 2);

        // Other slots are ignored
        slip.sync_with(&Bet::new("alice", 1.0, 0), RoundPhase::Waiting);
        assert_eq!(slip.status(), SlipStatus::Idle);

        // Not adopted mid-flight
        slip.sync_with(&bet, RoundPhase::Flying);
        assert_eq!(slip.status(), SlipStatus::Idle);

        slip.sync_with(&bet, RoundPhase::Waiting);
        assert_eq!(slip.status(), SlipStatus::Placed);
        assert_eq!(slip.stake(), 12.5);

        bet.profit = Some(25.0);
        slip.sync_with(&bet, RoundPhase::Flying);
        assert_eq!(slip.status(), SlipStatus::CashedOut);
    }
}
