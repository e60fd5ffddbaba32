//! Bet Ledger
//!
//! Every stake in the current round, keyed by `(player, slot)`.
//!
//! A player's own bet can arrive twice: once as an optimistic local insert
//! and once as the server's broadcast echo. Both paths upsert the same key,
//! so the ledger converges to one entry. The ledger does not track whether
//! an entry is pending or confirmed; callers roll back with
//! [`BetLedger::remove_local_bet`] when the placement call fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Ledger key: one entry per player per slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BetKey {
    /// Player identity (username).
    pub player: String,
    /// Sub-bet index for players holding several bets.
    pub slot: u32,
}

impl BetKey {
    /// Build a key.
    pub fn new(player: impl Into<String>, slot: u32) -> Self {
        Self {
            player: player.into(),
            slot,
        }
    }
}

/// A stake in the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    /// Player identity.
    pub player: String,
    /// Amount staked, always positive.
    pub stake: f64,
    /// Slot index.
    pub slot: u32,
    /// Multiplier the bet was cashed out at.
    pub cashout_multiplier: Option<f64>,
    /// Payout recorded for the cash-out.
    pub profit: Option<f64>,
    /// Avatar reference, if the server sent one.
    pub avatar: Option<String>,
}

impl Bet {
    /// A fresh, not yet cashed out bet.
    pub fn new(player: impl Into<String>, stake: f64, slot: u32) -> Self {
        Self {
            player: player.into(),
            stake,
            slot,
            cashout_multiplier: None,
            profit: None,
            avatar: None,
        }
    }

    /// Attach an avatar.
    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Key this bet is stored under.
    pub fn key(&self) -> BetKey {
        BetKey::new(self.player.clone(), self.slot)
    }

    /// Whether the bet has been cashed out.
    pub fn is_cashed_out(&self) -> bool {
        self.profit.is_some()
    }

    /// Fold newer data for the same key into this entry.
    ///
    /// Stake always takes the incoming value. Avatar and cash-out fields
    /// only overwrite when the incoming bet carries them.
    fn merge(&mut self, incoming: Bet) {
        self.stake = incoming.stake;
        if incoming.avatar.is_some() {
            self.avatar = incoming.avatar;
        }
        if incoming.cashout_multiplier.is_some() {
            self.cashout_multiplier = incoming.cashout_multiplier;
        }
        if incoming.profit.is_some() {
            self.profit = incoming.profit;
        }
    }
}

/// Keyed collection of the round's bets.
#[derive(Debug, Clone, Default)]
pub struct BetLedger {
    bets: BTreeMap<BetKey, Bet>,
}

impl BetLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the local player's optimistic bet.
    pub fn add_local_bet(&mut self, bet: Bet) {
        trace!(player = %bet.player, slot = bet.slot, "optimistic bet");
        self.upsert(bet);
    }

    /// Roll back a local bet. Returns the removed entry.
    pub fn remove_local_bet(&mut self, player: &str, slot: u32) -> Option<Bet> {
        self.bets.remove(&BetKey::new(player, slot))
    }

    /// Apply a bet broadcast by the server.
    pub fn apply_remote_bet(&mut self, bet: Bet) {
        debug!(player = %bet.player, slot = bet.slot, stake = bet.stake, "remote bet");
        self.upsert(bet);
    }

    /// Apply a withdrawn bet broadcast by the server. Returns true if it existed.
    pub fn apply_remote_cancel(&mut self, player: &str, slot: u32) -> bool {
        self.bets.remove(&BetKey::new(player, slot)).is_some()
    }

    /// Record a cash-out. Returns true if the ledger changed.
    ///
    /// Replays carrying the same profit are no-ops, as are cash-outs for
    /// bets this client never saw.
    pub fn apply_cashout_result(
        &mut self,
        player: &str,
        slot: u32,
        multiplier: f64,
        profit: f64,
    ) -> bool {
        let Some(bet) = self.bets.get_mut(&BetKey::new(player, slot)) else {
            debug!(player, slot, "cash-out for unknown bet ignored");
            return false;
        };

        if bet.profit == Some(profit) {
            return false;
        }

        bet.cashout_multiplier = Some(multiplier);
        bet.profit = Some(profit);
        true
    }

    /// Drop every bet (round boundary).
    pub fn clear_all(&mut self) {
        self.bets.clear();
    }

    /// Look up one bet.
    pub fn get(&self, player: &str, slot: u32) -> Option<&Bet> {
        self.bets.get(&BetKey::new(player, slot))
    }

    /// All bets in key order.
    pub fn bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    /// Bets of one player, by slot.
    pub fn bets_for<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a Bet> + 'a {
        self.bets.values().filter(move |b| b.player == player)
    }

    /// Bets ordered for display: largest stake first, then by key.
    pub fn sorted_by_stake(&self) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self.bets.values().cloned().collect();
        bets.sort_by(|a, b| {
            b.stake
                .total_cmp(&a.stake)
                .then_with(|| a.player.cmp(&b.player))
                .then_with(|| a.slot.cmp(&b.slot))
        });
        bets
    }

    /// Sum of all stakes.
    pub fn total_staked(&self) -> f64 {
        self.bets.values().map(|b| b.stake).sum()
    }

    /// Number of bets.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// True if the round has no bets.
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    fn upsert(&mut self, bet: Bet) {
        match self.bets.get_mut(&bet.key()) {
            Some(existing) => existing.merge(bet),
            None => {
                self.bets.insert(bet.key(), bet);
            }
        }
    }
}
