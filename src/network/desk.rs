//! Bet Desk
//!
//! Runs the local player's actions end to end: update the slip and the
//! ledger optimistically, call the backend, and roll both back if the call
//! fails. Confirmation of a successful bet arrives later as a `BET`
//! broadcast and merges into the optimistic entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::game::ledger::Bet;
use crate::game::slip::{BetSlip, PhaseAction, SlipError};
use crate::game::snapshot::GameSnapshot;
use crate::game::state::RoundPhase;
use crate::network::api::{ApiError, CashoutReceipt, GameApi, IdentityProvider};
use crate::network::session::LedgerCommand;

/// Why an action did not go through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeskError {
    /// Rejected locally before any request.
    #[error(transparent)]
    Slip(#[from] SlipError),

    /// Rejected or failed at the backend; local state was rolled back.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// No logged-in player.
    #[error("not logged in")]
    Unauthenticated,

    /// The session is gone.
    #[error("session closed")]
    SessionClosed,
}

/// Local player's bet controls.
pub struct BetDesk<A, I> {
    api: A,
    identity: I,
    commands: mpsc::UnboundedSender<LedgerCommand>,
    snapshots: watch::Receiver<Arc<GameSnapshot>>,
    slips: BTreeMap<u32, BetSlip>,
    last_phase: Option<RoundPhase>,
}

impl<A: GameApi, I: IdentityProvider> BetDesk<A, I> {
    /// Create a desk bound to a session's command and snapshot channels.
    pub fn new(
        api: A,
        identity: I,
        commands: mpsc::UnboundedSender<LedgerCommand>,
        snapshots: watch::Receiver<Arc<GameSnapshot>>,
    ) -> Self {
        Self {
            api,
            identity,
            commands,
            snapshots,
            slips: BTreeMap::new(),
            last_phase: None,
        }
    }

    /// Slip for `slot`, if it has been used.
    pub fn slip(&self, slot: u32) -> Option<&BetSlip> {
        self.slips.get(&slot)
    }

    /// Slip for `slot`, created on first use.
    pub fn slip_mut(&mut self, slot: u32) -> &mut BetSlip {
        self.slips.entry(slot).or_insert_with(|| BetSlip::new(slot))
    }

    /// Backend collaborator.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Place the slip's stake on `slot`.
    pub async fn place_bet(&mut self, slot: u32) -> Result<(), DeskError> {
        let player = self.player()?;
        let phase = self.snapshot().phase;

        let slip = self.slip_mut(slot);
        let stake = slip.place(phase)?;
        let auto_cashout = slip.auto_cashout();

        if let Err(e) = self.send(LedgerCommand::AddLocalBet(Bet::new(player.clone(), stake, slot))) {
            self.slip_mut(slot).rollback_place();
            return Err(e);
        }

        match self.api.place_bet(stake, auto_cashout, slot).await {
            Ok(()) => {
                info!(slot, stake, "Bet placed");
                Ok(())
            }
            Err(e) => {
                warn!(slot, "Bet failed: {}", e);
                self.slip_mut(slot).rollback_place();
                self.send(LedgerCommand::RemoveLocalBet { player, slot })?;
                Err(e.into())
            }
        }
    }

    /// Withdraw the bet on `slot`.
    pub async fn cancel_bet(&mut self, slot: u32) -> Result<(), DeskError> {
        let player = self.player()?;
        let slip = self.slip_mut(slot);
        slip.cancel()?;
        let fallback_stake = slip.stake();

        let previous = self
            .snapshot()
            .bet(&player, slot)
            .cloned()
            .unwrap_or_else(|| Bet::new(player.clone(), fallback_stake, slot));
        let removed = self.send(LedgerCommand::RemoveLocalBet {
            player: player.clone(),
            slot,
        });
        if let Err(e) = removed {
            self.slip_mut(slot).rollback_cancel();
            return Err(e);
        }

        match self.api.cancel_bet(slot).await {
            Ok(()) => {
                info!(slot, "Bet cancelled");
                Ok(())
            }
            Err(e) => {
                warn!(slot, "Cancel failed: {}", e);
                self.slip_mut(slot).rollback_cancel();
                self.send(LedgerCommand::AddLocalBet(previous))?;
                Err(e.into())
            }
        }
    }

    /// Cash out the bet on `slot`.
    pub async fn cash_out(&mut self, slot: u32) -> Result<CashoutReceipt, DeskError> {
        let player = self.player()?;
        let snapshot = self.snapshot();
        self.slip_mut(slot).cash_out(snapshot.phase)?;

        match self.api.cash_out(slot).await {
            Ok(receipt) => {
                let multiplier = receipt.multiplier.unwrap_or(snapshot.multiplier);
                info!(slot, multiplier, win = receipt.win_amount, "Cashed out");
                self.send(LedgerCommand::ApplyCashoutResult {
                    player,
                    slot,
                    multiplier,
                    profit: receipt.win_amount,
                })?;
                Ok(receipt)
            }
            Err(e) => {
                warn!(slot, "Cash-out failed: {}", e);
                self.slip_mut(slot).rollback_cash_out();
                Err(e.into())
            }
        }
    }

    /// Fold the latest snapshot into the slips.
    ///
    /// Returns the slots whose auto-bet wants a bet placed now.
    pub fn on_snapshot(&mut self) -> Vec<u32> {
        let snapshot = self.snapshot();
        let player = self.identity.current_identity();
        let mut auto_bets = Vec::new();

        let entered = self.last_phase != Some(snapshot.phase);
        self.last_phase = Some(snapshot.phase);

        for (slot, slip) in self.slips.iter_mut() {
            if entered && slip.on_phase(snapshot.phase) == PhaseAction::PlaceAutoBet {
                auto_bets.push(*slot);
            }
            if let Some(bet) = player.as_deref().and_then(|p| snapshot.bet(p, *slot)) {
                slip.sync_with(bet, snapshot.phase);
            }
        }
        auto_bets
    }

    /// Slots whose auto-cashout target is reached at `multiplier`.
    pub fn auto_cashout_due(&self, multiplier: f64) -> Vec<u32> {
        self.slips
            .values()
            .filter(|s| s.should_auto_cashout(multiplier))
            .map(BetSlip::slot)
            .collect()
    }

    fn player(&self) -> Result<String, DeskError> {
        self.identity
            .current_identity()
            .ok_or(DeskError::Unauthenticated)
    }

    fn snapshot(&self) -> Arc<GameSnapshot> {
        self.snapshots.borrow().clone()
    }

    fn send(&self, command: LedgerCommand) -> Result<(), DeskError> {
        self.commands
            .send(command)
            .map_err(|_| DeskError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::game::slip::SlipStatus;
    use crate::game::state::StoreConfig;
    use crate::network::api::{StaticIdentity, TopBet, TopBetsKind};
    use crate::network::session::GameSession;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MockApi {
        fail: AtomicBool,
    }

    impl MockApi {
        fn result(&self) -> Result<(), ApiError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(ApiError::Rejected {
                    status: 400,
                    message: "Insufficient balance".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl GameApi for MockApi {
        fn place_bet(
            &self,
            _stake: f64,
            _auto_cashout: Option<f64>,
            _slot: u32,
        ) -> impl Future<Output = Result<(), ApiError>> + Send {
            let result = self.result();
            async move { result }
        }

        fn cancel_bet(&self, _slot: u32) -> impl Future<Output = Result<(), ApiError>> + Send {
            let result = self.result();
            async move { result }
        }

        fn cash_out(
            &self,
            _slot: u32,
        ) -> impl Future<Output = Result<CashoutReceipt, ApiError>> + Send {
            let result = self.result().map(|()| CashoutReceipt {
                multiplier: Some(2.0),
                win_amount: 10.0,
                new_balance: 110.0,
            });
            async move { result }
        }

        fn history(&self) -> impl Future<Output = Result<Vec<f64>, ApiError>> + Send {
            async { Ok(vec![]) }
        }

        fn top_bets(
            &self,
            _kind: TopBetsKind,
        ) -> impl Future<Output = Result<Vec<TopBet>, ApiError>> + Send {
            async { Ok(vec![]) }
        }
    }

    struct Harness {
        session: GameSession,
        commands: mpsc::UnboundedReceiver<LedgerCommand>,
        desk: BetDesk<MockApi, StaticIdentity>,
    }

    impl Harness {
        fn new() -> Self {
            let session =
                GameSession::new(StoreConfig::default(), Arc::new(ManualClock::new(0.0)), 16);
            let (tx, rx) = mpsc::unbounded_channel();
            let desk = BetDesk::new(MockApi::default(), StaticIdentity::new("me"), tx, session.watch());
            Self {
                session,
                commands: rx,
                desk,
            }
        }

        /// Apply queued desk commands, as the session loop would.
        fn pump(&mut self) {
            while let Ok(command) = self.commands.try_recv() {
                self.session.apply_command(command);
            }
        }

        fn fail(&self, fail: bool) {
            self.desk.api().fail.store(fail, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_place_bet_then_echo_merges() {
        let mut h = Harness::new();
        h.desk.place_bet(0).await.unwrap();
        h.pump();
        assert_eq!(h.session.ledger().len(), 1);

        h.session.apply_frame("BET:me:5:0");
        assert_eq!(h.session.ledger().len(), 1);
        assert_eq!(h.desk.slip(0).unwrap().status(), SlipStatus::Placed);
    }

    #[tokio::test]
    async fn test_failed_bet_rolls_back() {
        let mut h = Harness::new();
        h.fail(true);

        let err = h.desk.place_bet(1).await.unwrap_err();
        assert!(matches!(err, DeskError::Api(ApiError::Rejected { status: 400, .. })));
        h.pump();
        assert!(h.session.ledger().is_empty());
        assert_eq!(h.desk.slip(1).unwrap().status(), SlipStatus::Idle);
    }

    #[tokio::test]
    async fn test_failed_cancel_restores_bet() {
        let mut h = Harness::new();
        h.desk.slip_mut(0).set_stake(20.0).unwrap();
        h.desk.place_bet(0).await.unwrap();
        h.pump();

        h.fail(true);
        assert!(h.desk.cancel_bet(0).await.is_err());
        h.pump();
        assert_eq!(h.session.ledger().get("me", 0).unwrap().stake, 20.0);
        assert_eq!(h.desk.slip(0).unwrap().status(), SlipStatus::Placed);

        h.fail(false);
        h.desk.cancel_bet(0).await.unwrap();
        h.pump();
        assert!(h.session.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_cash_out_records_result() {
        let mut h = Harness::new();
        h.desk.place_bet(0).await.unwrap();
        h.pump();

        // Not flying yet
        assert!(matches!(h.desk.cash_out(0).await, Err(DeskError::Slip(_))));

        h.session.apply_frame("STATE:FLYING");
        let receipt = h.desk.cash_out(0).await.unwrap();
        assert_eq!(receipt.win_amount, 10.0);
        h.pump();

        let bet = h.session.ledger().get("me", 0).unwrap();
        assert_eq!(bet.cashout_multiplier, Some(2.0));
        assert_eq!(bet.profit, Some(10.0));
    }

    #[tokio::test]
    async fn test_failed_cash_out_rolls_back() {
        let mut h = Harness::new();
        h.desk.place_bet(0).await.unwrap();
        h.session.apply_frame("TAKEOFF");
        h.fail(true);

        assert!(h.desk.cash_out(0).await.is_err());
        assert_eq!(h.desk.slip(0).unwrap().status(), SlipStatus::Placed);
    }

    #[tokio::test]
    async fn test_closed_session_leaves_slip_untouched() {
        let mut h = Harness::new();
        h.desk.place_bet(0).await.unwrap();
        h.pump();

        h.commands.close();
        assert_eq!(h.desk.place_bet(1).await, Err(DeskError::SessionClosed));
        assert_eq!(h.desk.slip(1).unwrap().status(), SlipStatus::Idle);

        assert_eq!(h.desk.cancel_bet(0).await, Err(DeskError::SessionClosed));
        assert_eq!(h.desk.slip(0).unwrap().status(), SlipStatus::Placed);
    }

    #[tokio::test]
    async fn test_unauthenticated() {
        let session =
            GameSession::new(StoreConfig::default(), Arc::new(ManualClock::new(0.0)), 16);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut desk = BetDesk::new(MockApi::default(), StaticIdentity::default(), tx, session.watch());
        assert_eq!(desk.place_bet(0).await, Err(DeskError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_auto_bet_and_auto_cashout() {
        let mut h = Harness::new();
        h.desk.slip_mut(0).set_auto_bet(true);
        h.desk.slip_mut(0).set_auto_cashout(Some(1.5)).unwrap();

        assert_eq!(h.desk.on_snapshot(), vec![0]);
        // Same phase again: no repeat request
        assert!(h.desk.on_snapshot().is_empty());

        h.desk.place_bet(0).await.unwrap();
        h.session.apply_frame("TAKEOFF");
        h.desk.on_snapshot();
        assert!(h.desk.auto_cashout_due(1.2).is_empty());
        assert_eq!(h.desk.auto_cashout_due(1.5), vec![0]);

        h.session.apply_frame("CRASH:1.3");
        h.desk.on_snapshot();
        assert_eq!(h.desk.slip(0).unwrap().status(), SlipStatus::Idle);
    }

    #[tokio::test]
    async fn test_reload_adopts_server_bet() {
        let mut h = Harness::new();
        h.desk.slip_mut(2);
        h.session.apply_frame("BET:me:42:2");
        h.desk.on_snapshot();

        let slip = h.desk.slip(2).unwrap();
        assert_eq!(slip.status(), SlipStatus::Placed);
        assert_eq!(slip.stake(), 42.0);
    }
}
