//! Group wager pools on a single fantasy matchup
//!
//! Each bettor stakes tokens on one side of the matchup together with a guess
//! at the combined score. The closest guess on the side that actually won
//! takes the whole pot, including the house bonus.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::account::{ensure_non_negative, league_id_of, AccountHandle};
use super::contract::{ContractCore, ContractId, RefundReason, SettlementOutcome};
use super::error::{VaultError, VaultResult};
use super::feed::{team_points, WeekResults};
use super::Tokens;

/// One bettor's pick: a side and a combined-score guess.
#[derive(Debug, Clone)]
pub struct Prediction {
    bettor: AccountHandle,
    predicted_side: String,
    predicted_total: i64,
    stake: Tokens,
}

impl Prediction {
    pub(crate) fn restore(
        bettor: AccountHandle,
        predicted_side: String,
        predicted_total: i64,
        stake: Tokens,
    ) -> Self {
        Self {
            bettor,
            predicted_side,
            predicted_total,
            stake,
        }
    }

    pub fn bettor(&self) -> &AccountHandle {
        &self.bettor
    }

    pub fn bettor_id(&self) -> String {
        league_id_of(&self.bettor)
    }

    pub fn predicted_side(&self) -> &str {
        &self.predicted_side
    }

    pub fn predicted_total(&self) -> i64 {
        self.predicted_total
    }

    pub fn stake(&self) -> Tokens {
        self.stake
    }

    fn distance_to(&self, combined_total: f64) -> f64 {
        (self.predicted_total as f64 - combined_total).abs()
    }
}

#[derive(Debug)]
pub struct GroupWagerContract {
    core: ContractCore,
    side_a_id: String,
    side_b_id: String,
    bonus: Tokens,
    predictions: Vec<Prediction>,
}

impl GroupWagerContract {
    /// Open a pool seeded with `bonus` house tokens.
    pub fn new(
        side_a_id: impl Into<String>,
        side_b_id: impl Into<String>,
        bonus: Tokens,
        expiration: DateTime<Utc>,
        week: u32,
    ) -> VaultResult<Self> {
        let side_a_id = side_a_id.into();
        let side_b_id = side_b_id.into();
        if side_a_id == side_b_id {
            return Err(VaultError::validation(format!(
                "matchup sides must differ, got {side_a_id} twice"
            )));
        }
        Ok(Self {
            core: ContractCore::new(bonus, expiration, week)?,
            side_a_id,
            side_b_id,
            bonus,
            predictions: Vec::new(),
        })
    }

    pub(crate) fn restore(
        core: ContractCore,
        side_a_id: String,
        side_b_id: String,
        bonus: Tokens,
        predictions: Vec<Prediction>,
    ) -> VaultResult<Self> {
        if side_a_id == side_b_id {
            return Err(VaultError::validation(format!(
                "matchup sides must differ, got {side_a_id} twice"
            )));
        }
        ensure_non_negative(bonus)?;
        if bonus > core.stake_amount() {
            return Err(VaultError::validation(format!(
                "bonus {bonus} exceeds pot {}",
                core.stake_amount()
            )));
        }

        let mut wager = Self {
            core,
            side_a_id,
            side_b_id,
            bonus,
            predictions: Vec::with_capacity(predictions.len()),
        };
        for prediction in predictions {
            ensure_non_negative(prediction.stake)?;
            wager.ensure_valid_pick(&prediction.predicted_side, prediction.predicted_total)?;
            wager.ensure_unique(
                &prediction.bettor_id(),
                &prediction.predicted_side,
                prediction.predicted_total,
            )?;
            wager.predictions.push(prediction);
        }
        Ok(wager)
    }

    fn ensure_valid_pick(&self, predicted_side: &str, predicted_total: i64) -> VaultResult<()> {
        if predicted_total < 0 {
            return Err(VaultError::validation("predicted total cannot be negative"));
        }
        if !self.involves_team(predicted_side) {
            return Err(VaultError::validation(format!(
                "team {predicted_side} is not part of matchup {} vs {}",
                self.side_a_id, self.side_b_id
            )));
        }
        Ok(())
    }

    /// One prediction per bettor, one bettor per (side, total).
    fn ensure_unique(
        &self,
        bettor_id: &str,
        predicted_side: &str,
        predicted_total: i64,
    ) -> VaultResult<()> {
        if self.predictions.iter().any(|p| p.bettor_id() == bettor_id) {
            return Err(VaultError::DuplicateBettor {
                league_id: bettor_id.to_string(),
            });
        }
        if self
            .predictions
            .iter()
            .any(|p| p.predicted_side == predicted_side && p.predicted_total == predicted_total)
        {
            return Err(VaultError::DuplicatePrediction {
                team_id: predicted_side.to_string(),
                points: predicted_total,
            });
        }
        Ok(())
    }

    pub fn core(&self) -> &ContractCore {
        &self.core
    }

    pub fn id(&self) -> ContractId {
        self.core.id()
    }

    pub fn side_a_id(&self) -> &str {
        &self.side_a_id
    }

    pub fn side_b_id(&self) -> &str {
        &self.side_b_id
    }

    pub fn bonus(&self) -> Tokens {
        self.bonus
    }

    /// Bonus plus every stake ever added.
    pub fn pot_amount(&self) -> Tokens {
        self.core.stake_amount()
    }

    pub fn payout_amount(&self) -> Tokens {
        self.pot_amount()
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn involves_team(&self, team_id: &str) -> bool {
        self.side_a_id == team_id || self.side_b_id == team_id
    }

    /// Same unordered matchup and same expiration.
    pub fn same_matchup(&self, other: &GroupWagerContract) -> bool {
        let same_pair = (self.side_a_id == other.side_a_id && self.side_b_id == other.side_b_id)
            || (self.side_a_id == other.side_b_id && self.side_b_id == other.side_a_id);
        same_pair && self.core.expiration() == other.core.expiration()
    }

    pub fn add_prediction(
        &mut self,
        bettor: AccountHandle,
        predicted_side: &str,
        predicted_total: i64,
        stake: Tokens,
    ) -> VaultResult<()> {
        self.core.ensure_open()?;
        ensure_non_negative(stake)?;
        self.ensure_valid_pick(predicted_side, predicted_total)?;

        let bettor_id = league_id_of(&bettor);
        bettor.lock().ensure_funds(stake)?;
        self.ensure_unique(&bettor_id, predicted_side, predicted_total)?;
        if self.pot_amount().checked_add(stake).is_none() {
            return Err(VaultError::validation("pot overflow"));
        }

        bettor.lock().debit(stake)?;
        self.core.add_stake(stake)?;
        self.predictions.push(Prediction {
            bettor,
            predicted_side: predicted_side.to_string(),
            predicted_total,
            stake,
        });
        debug!(
            contract = %self.core.id(),
            bettor = %bettor_id,
            side = predicted_side,
            total = predicted_total,
            stake,
            pot = self.pot_amount(),
            "prediction added"
        );
        Ok(())
    }

    /// Pay the full pot to one of the bettors.
    pub fn settle(&mut self, winner_league_id: &str) -> VaultResult<Tokens> {
        self.settle_at(winner_league_id, Utc::now())
    }

    pub fn settle_at(&mut self, winner_league_id: &str, now: DateTime<Utc>) -> VaultResult<Tokens> {
        self.core.ensure_open()?;
        let winner = self
            .predictions
            .iter()
            .find(|p| p.bettor_id() == winner_league_id)
            .map(|p| p.bettor.clone())
            .ok_or_else(|| VaultError::InvalidWinner {
                league_id: winner_league_id.to_string(),
            })?;
        self.core.ensure_ready(now)?;

        let payout = self.payout_amount();
        winner.lock().credit(payout)?;
        self.core.mark_settled();
        info!(contract = %self.core.id(), winner = winner_league_id, payout, "group wager settled");
        Ok(payout)
    }

    /// Split the staked pool evenly across bettors; the bonus stays with the house.
    ///
    /// Shares are whole tokens. The `pool % bettors` leftover goes out one token
    /// at a time in submission order so nothing staked is lost.
    pub fn refund(&mut self) -> VaultResult<()> {
        self.core.ensure_open()?;
        if self.predictions.is_empty() {
            self.core.mark_refunded();
            return Ok(());
        }

        let pool = (self.pot_amount() - self.bonus).max(0);
        let count = self.predictions.len() as Tokens;
        let share = pool / count;
        let remainder = pool % count;
        let payouts: Vec<(&AccountHandle, Tokens)> = self
            .predictions
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                let extra = if (idx as Tokens) < remainder { 1 } else { 0 };
                (&p.bettor, share + extra)
            })
            .collect();
        // every credit is checked before any balance moves
        for (bettor, amount) in &payouts {
            bettor.lock().ensure_can_credit(*amount)?;
        }
        for (bettor, amount) in payouts {
            bettor.lock().credit(amount)?;
        }
        self.core.mark_refunded();
        info!(contract = %self.core.id(), pool, bettors = count, share, "group wager refunded");
        Ok(())
    }

    /// Settle against final side totals.
    pub fn resolve(
        &mut self,
        side_a_points: f64,
        side_b_points: f64,
        now: DateTime<Utc>,
    ) -> VaultResult<SettlementOutcome> {
        self.core.ensure_open()?;
        self.core.ensure_ready(now)?;

        if self.predictions.is_empty() {
            self.core.mark_settled();
            return Ok(SettlementOutcome::Empty);
        }

        let combined_total = side_a_points + side_b_points;
        if side_a_points == side_b_points {
            return self.refund_for(RefundReason::Push);
        }
        // Product rule: a lone bettor has nobody to beat.
        if self.predictions.len() < 2 {
            return self.refund_for(RefundReason::SoleParticipant);
        }

        let winning_side = if side_a_points > side_b_points {
            self.side_a_id.clone()
        } else {
            self.side_b_id.clone()
        };
        // min_by keeps the first of equally close guesses, i.e. the earliest one.
        let closest = self
            .predictions
            .iter()
            .filter(|p| p.predicted_side == winning_side)
            .min_by(|x, y| {
                x.distance_to(combined_total)
                    .total_cmp(&y.distance_to(combined_total))
            })
            .map(|p| p.bettor_id());

        match closest {
            Some(winner) => {
                let amount = self.settle_at(&winner, now)?;
                Ok(SettlementOutcome::Paid {
                    league_id: winner,
                    amount,
                })
            }
            None => self.refund_for(RefundReason::NoWinningSidePrediction),
        }
    }

    pub fn resolve_from_results(
        &mut self,
        results: &WeekResults,
        now: DateTime<Utc>,
    ) -> VaultResult<SettlementOutcome> {
        let week = self.core.week();
        let side_a_points = team_points(results, &self.side_a_id, week)?;
        let side_b_points = team_points(results, &self.side_b_id, week)?;
        self.resolve(side_a_points, side_b_points, now)
    }

    fn refund_for(&mut self, reason: RefundReason) -> VaultResult<SettlementOutcome> {
        self.refund()?;
        Ok(SettlementOutcome::Refunded { reason })
    }
}

impl PartialEq for GroupWagerContract {
    fn eq(&self, other: &Self) -> bool {
        self.same_matchup(other)
    }
}
