//! 1v1 "slap" challenges
//!
//! Both parties escrow the same stake when the challenge is made; the winner
//! collects both stakes.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::account::{ensure_non_negative, league_id_of, AccountHandle};
use super::contract::{ContractCore, ContractId, RefundReason, SettlementOutcome};
use super::error::{VaultError, VaultResult};
use super::feed::{team_points, WeekResults};
use super::Tokens;

#[derive(Debug)]
pub struct SlapContract {
    core: ContractCore,
    challenger: AccountHandle,
    challengee: AccountHandle,
}

impl SlapContract {
    /// Create a challenge and escrow `amount` from both accounts.
    pub fn new(
        challenger: AccountHandle,
        challengee: AccountHandle,
        amount: Tokens,
        expiration: DateTime<Utc>,
        week: u32,
    ) -> VaultResult<Self> {
        ensure_non_negative(amount)?;
        if Arc::ptr_eq(&challenger, &challengee)
            || league_id_of(&challenger) == league_id_of(&challengee)
        {
            return Err(VaultError::validation(
                "challenger and challengee must be different accounts",
            ));
        }
        let core = ContractCore::new(amount, expiration, week)?;

        {
            let mut a = challenger.lock();
            let mut b = challengee.lock();
            a.ensure_funds(amount)?;
            b.ensure_funds(amount)?;
            a.debit(amount)?;
            b.debit(amount)?;
            debug!(
                challenger = a.league_id(),
                challengee = b.league_id(),
                amount,
                "slap stakes escrowed"
            );
        }

        Ok(Self {
            core,
            challenger,
            challengee,
        })
    }

    /// Rebuild a stored challenge. Stakes are already out of the stored balances.
    pub(crate) fn restore(
        core: ContractCore,
        challenger: AccountHandle,
        challengee: AccountHandle,
    ) -> Self {
        Self {
            core,
            challenger,
            challengee,
        }
    }

    pub fn core(&self) -> &ContractCore {
        &self.core
    }

    pub fn id(&self) -> ContractId {
        self.core.id()
    }

    pub fn challenger(&self) -> &AccountHandle {
        &self.challenger
    }

    pub fn challengee(&self) -> &AccountHandle {
        &self.challengee
    }

    pub fn challenger_id(&self) -> String {
        league_id_of(&self.challenger)
    }

    pub fn challengee_id(&self) -> String {
        league_id_of(&self.challengee)
    }

    pub fn payout_amount(&self) -> Tokens {
        self.core.stake_amount().saturating_mul(2)
    }

    /// Same two parties in either order.
    pub fn same_parties(&self, other: &SlapContract) -> bool {
        let mine = (self.challenger_id(), self.challengee_id());
        let theirs = (other.challenger_id(), other.challengee_id());
        mine == theirs || (mine.0 == theirs.1 && mine.1 == theirs.0)
    }

    pub fn settle(&mut self, winner_league_id: &str) -> VaultResult<Tokens> {
        self.settle_at(winner_league_id, Utc::now())
    }

    pub fn settle_at(&mut self, winner_league_id: &str, now: DateTime<Utc>) -> VaultResult<Tokens> {
        self.core.ensure_open()?;
        let winner = if self.challenger_id() == winner_league_id {
            &self.challenger
        } else if self.challengee_id() == winner_league_id {
            &self.challengee
        } else {
            return Err(VaultError::InvalidWinner {
                league_id: winner_league_id.to_string(),
            });
        };
        self.core.ensure_ready(now)?;

        let payout = self.payout_amount();
        winner.lock().credit(payout)?;
        self.core.mark_settled();
        info!(contract = %self.core.id(), winner = winner_league_id, payout, "slap settled");
        Ok(payout)
    }

    /// Return each party's stake.
    pub fn refund(&mut self) -> VaultResult<()> {
        self.core.ensure_open()?;
        let stake = self.core.stake_amount();
        self.challenger.lock().ensure_can_credit(stake)?;
        self.challengee.lock().ensure_can_credit(stake)?;
        self.challenger.lock().credit(stake)?;
        self.challengee.lock().credit(stake)?;
        self.core.mark_refunded();
        info!(contract = %self.core.id(), stake, "slap refunded");
        Ok(())
    }

    /// Pay whichever party's team outscored the other that week; a tie refunds.
    pub fn resolve(
        &mut self,
        results: &WeekResults,
        now: DateTime<Utc>,
    ) -> VaultResult<SettlementOutcome> {
        self.core.ensure_open()?;
        self.core.ensure_ready(now)?;
        let week = self.core.week();
        let challenger_id = self.challenger_id();
        let challengee_id = self.challengee_id();
        let challenger_points = team_points(results, &challenger_id, week)?;
        let challengee_points = team_points(results, &challengee_id, week)?;

        if challenger_points == challengee_points {
            self.refund()?;
            return Ok(SettlementOutcome::Refunded {
                reason: RefundReason::Push,
            });
        }
        let winner = if challenger_points > challengee_points {
            challenger_id
        } else {
            challengee_id
        };
        let amount = self.settle_at(&winner, now)?;
        Ok(SettlementOutcome::Paid {
            league_id: winner,
            amount,
        })
    }
}

impl PartialEq for SlapContract {
    fn eq(&self, other: &Self) -> bool {
        self.same_parties(other)
    }
}
