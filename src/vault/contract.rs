//! Contract lifecycle shared by every wager instrument
//!
//! PENDING -> READY -> SETTLED | REFUNDED. Readiness is a calendar-date
//! comparison: a contract becomes ready on the day after its expiration date.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::account::ensure_non_negative;
use super::error::{VaultError, VaultResult};
use super::feed::WeekResults;
use super::group_wager::GroupWagerContract;
use super::slap::SlapContract;
use super::Tokens;

pub type ContractId = Uuid;

/// The closed set of contract kinds the ledger keeps a queue for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractKind {
    SlapContract,
    GroupWagerContract,
}

impl ContractKind {
    /// Registration order; also the order a settlement sweep visits queues in.
    pub const ALL: [ContractKind; 2] = [ContractKind::SlapContract, ContractKind::GroupWagerContract];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::SlapContract => "SlapContract",
            ContractKind::GroupWagerContract => "GroupWagerContract",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| VaultError::InvalidKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractState {
    Pending,
    Ready,
    Settled,
    Refunded,
}

/// Fields and transitions common to every contract.
#[derive(Debug, Clone)]
pub struct ContractCore {
    id: ContractId,
    stake_amount: Tokens,
    expiration: DateTime<Utc>,
    week: u32,
    executed: bool,
    refunded: bool,
}

impl ContractCore {
    pub fn new(stake_amount: Tokens, expiration: DateTime<Utc>, week: u32) -> VaultResult<Self> {
        ensure_non_negative(stake_amount)?;
        Ok(Self {
            id: Uuid::new_v4(),
            stake_amount,
            expiration,
            week,
            executed: false,
            refunded: false,
        })
    }

    /// Rebuild from storage. `refunded` only counts on an executed record.
    pub(crate) fn restore(
        id: Option<ContractId>,
        stake_amount: Tokens,
        expiration: DateTime<Utc>,
        week: u32,
        executed: bool,
        refunded: bool,
    ) -> VaultResult<Self> {
        ensure_non_negative(stake_amount)?;
        if refunded && !executed {
            return Err(VaultError::validation(
                "contract record is marked refunded but not executed",
            ));
        }
        Ok(Self {
            id: id.unwrap_or_else(Uuid::new_v4),
            stake_amount,
            expiration,
            week,
            executed,
            refunded,
        })
    }

    pub fn refunded(&self) -> bool {
        self.refunded
    }

    pub fn id(&self) -> ContractId {
        self.id
    }

    pub fn stake_amount(&self) -> Tokens {
        self.stake_amount
    }

    pub(crate) fn add_stake(&mut self, amount: Tokens) -> VaultResult<()> {
        self.stake_amount = self
            .stake_amount
            .checked_add(amount)
            .ok_or_else(|| VaultError::validation("pot overflow"))?;
        Ok(())
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Utc::now())
    }

    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() > self.expiration.date_naive()
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> ContractState {
        match (self.executed, self.refunded) {
            (true, true) => ContractState::Refunded,
            (true, false) => ContractState::Settled,
            (false, _) if self.is_ready_at(now) => ContractState::Ready,
            (false, _) => ContractState::Pending,
        }
    }

    pub(crate) fn ensure_open(&self) -> VaultResult<()> {
        if self.executed {
            return Err(VaultError::AlreadySettled);
        }
        Ok(())
    }

    pub(crate) fn ensure_ready(&self, now: DateTime<Utc>) -> VaultResult<()> {
        if !self.is_ready_at(now) {
            return Err(VaultError::NotYetExpired {
                expiration: self.expiration,
            });
        }
        Ok(())
    }

    pub(crate) fn mark_settled(&mut self) {
        self.executed = true;
    }

    pub(crate) fn mark_refunded(&mut self) {
        self.executed = true;
        self.refunded = true;
    }
}

/// Why a contract's stakes went back to their owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// Both sides scored the same.
    Push,
    /// Only one prediction was placed.
    SoleParticipant,
    /// Nobody picked the side that won.
    NoWinningSidePrediction,
    Manual,
}

/// Result of resolving one contract against real scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Group wager closed with no predictions; nothing moved.
    Empty,
    Paid { league_id: String, amount: Tokens },
    Refunded { reason: RefundReason },
}

/// A queued wager instrument.
#[derive(Debug)]
pub enum Contract {
    Slap(SlapContract),
    GroupWager(GroupWagerContract),
}

impl Contract {
    pub fn kind(&self) -> ContractKind {
        match self {
            Contract::Slap(_) => ContractKind::SlapContract,
            Contract::GroupWager(_) => ContractKind::GroupWagerContract,
        }
    }

    pub fn core(&self) -> &ContractCore {
        match self {
            Contract::Slap(c) => c.core(),
            Contract::GroupWager(c) => c.core(),
        }
    }

    pub fn id(&self) -> ContractId {
        self.core().id()
    }

    pub fn week(&self) -> u32 {
        self.core().week()
    }

    pub fn executed(&self) -> bool {
        self.core().executed()
    }

    pub fn is_ready(&self) -> bool {
        self.core().is_ready()
    }

    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        self.core().is_ready_at(now)
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> ContractState {
        self.core().state_at(now)
    }

    pub fn payout_amount(&self) -> Tokens {
        match self {
            Contract::Slap(c) => c.payout_amount(),
            Contract::GroupWager(c) => c.payout_amount(),
        }
    }

    /// League ids of every account with funds in this contract.
    pub fn parties(&self) -> Vec<String> {
        match self {
            Contract::Slap(c) => vec![c.challenger_id(), c.challengee_id()],
            Contract::GroupWager(c) => c.predictions().iter().map(|p| p.bettor_id()).collect(),
        }
    }

    pub fn settle(&mut self, winner_league_id: &str) -> VaultResult<Tokens> {
        self.settle_at(winner_league_id, Utc::now())
    }

    pub fn settle_at(&mut self, winner_league_id: &str, now: DateTime<Utc>) -> VaultResult<Tokens> {
        match self {
            Contract::Slap(c) => c.settle_at(winner_league_id, now),
            Contract::GroupWager(c) => c.settle_at(winner_league_id, now),
        }
    }

    pub fn refund(&mut self) -> VaultResult<()> {
        match self {
            Contract::Slap(c) => c.refund(),
            Contract::GroupWager(c) => c.refund(),
        }
    }

    /// Settle against a week's published scores.
    pub fn resolve(
        &mut self,
        results: &WeekResults,
        now: DateTime<Utc>,
    ) -> VaultResult<SettlementOutcome> {
        match self {
            Contract::Slap(c) => c.resolve(results, now),
            Contract::GroupWager(c) => c.resolve_from_results(results, now),
        }
    }

    pub fn as_slap(&self) -> Option<&SlapContract> {
        match self {
            Contract::Slap(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_group_wager(&self) -> Option<&GroupWagerContract> {
        match self {
            Contract::GroupWager(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_group_wager_mut(&mut self) -> Option<&mut GroupWagerContract> {
        match self {
            Contract::GroupWager(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn kind_names_round_trip_and_unknown_names_fail() {
        for kind in ContractKind::ALL {
            assert_eq!(kind.as_str().parse::<ContractKind>().unwrap(), kind);
        }
        let err = "ParlayContract".parse::<ContractKind>().unwrap_err();
        assert_eq!(err, VaultError::InvalidKind("ParlayContract".into()));
    }

    #[test]
    fn readiness_compares_calendar_dates() {
        let expiration = Utc.with_ymd_and_hms(2024, 9, 10, 4, 0, 0).unwrap();
        let core = ContractCore::new(10, expiration, 1).unwrap();

        // Later the same day is still pending.
        let same_day = Utc.with_ymd_and_hms(2024, 9, 10, 23, 59, 0).unwrap();
        assert!(!core.is_ready_at(same_day));
        assert_eq!(core.state_at(same_day), ContractState::Pending);

        let next_day = expiration + Duration::days(1);
        assert!(core.is_ready_at(next_day));
        assert_eq!(core.state_at(next_day), ContractState::Ready);
    }

    #[test]
    fn terminal_states_are_distinguished() {
        let now = Utc::now();
        let mut settled = ContractCore::new(5, now, 1).unwrap();
        settled.mark_settled();
        assert_eq!(settled.state_at(now), ContractState::Settled);
        assert_eq!(settled.ensure_open(), Err(VaultError::AlreadySettled));

        let mut refunded = ContractCore::new(5, now, 1).unwrap();
        refunded.mark_refunded();
        assert_eq!(refunded.state_at(now), ContractState::Refunded);
    }

    #[test]
    fn negative_stake_rejected() {
        assert!(matches!(
            ContractCore::new(-1, Utc::now(), 1),
            Err(VaultError::Validation(_))
        ));
    }
}
