//! Settlement sweep
//!
//! Walks each contract queue from the head, resolving every contract whose
//! expiration day has passed against the week's published scores. The vault
//! lock is held for the whole sweep so nothing else can touch a contract
//! between "ready" and "persisted".

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::contract::{ContractId, ContractKind, SettlementOutcome};
use super::feed::{MatchupFeed, WeekResults};
use super::ledger::Vault;
use super::records::ContractRecord;
use super::store::{persist, LedgerStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettledContract {
    pub id: ContractId,
    pub kind: ContractKind,
    pub week: u32,
    #[serde(flatten)]
    pub outcome: SettlementOutcome,
}

/// A contract dropped from its queue because it could not be resolved.
/// The record is kept so an operator can re-create or refund it by hand.
#[derive(Debug, Clone, Serialize)]
pub struct FailedContract {
    pub id: ContractId,
    pub kind: ContractKind,
    pub error: String,
    pub record: ContractRecord,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub settled: Vec<SettledContract>,
    pub refunded: Vec<SettledContract>,
    pub failed: Vec<FailedContract>,
    /// Kinds whose head is waiting on results; retried next sweep.
    pub skipped_kinds: Vec<ContractKind>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
            && self.refunded.is_empty()
            && self.failed.is_empty()
            && self.skipped_kinds.is_empty()
    }
}

pub struct SettlementSweeper<F, S> {
    vault: Arc<Mutex<Vault>>,
    feed: Arc<F>,
    store: Arc<S>,
}

impl<F, S> SettlementSweeper<F, S>
where
    F: MatchupFeed,
    S: LedgerStore,
{
    pub fn new(vault: Arc<Mutex<Vault>>, feed: Arc<F>, store: Arc<S>) -> Self {
        Self { vault, feed, store }
    }

    pub fn vault(&self) -> Arc<Mutex<Vault>> {
        self.vault.clone()
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut vault = self.vault.lock().await;
        let mut report = SweepReport::default();
        let mut weeks: HashMap<u32, WeekResults> = HashMap::new();

        for kind in ContractKind::ALL {
            loop {
                let (id, week, executed, ready) = match vault.peek_next(kind) {
                    None => break,
                    Some(head) => (head.id(), head.week(), head.executed(), head.is_ready_at(now)),
                };
                if executed {
                    debug!(kind = %kind, contract = %id, "dropping executed contract");
                    vault.pop_next(kind);
                    persist(&vault, self.store.as_ref())
                        .await
                        .with_context(|| format!("persist vault after dropping contract {id}"))?;
                    continue;
                }
                if !ready {
                    break;
                }

                if !weeks.contains_key(&week) {
                    match self.feed.week_results(week).await {
                        Ok(results) => {
                            weeks.insert(week, results);
                        }
                        Err(err) => {
                            warn!(kind = %kind, week, error = %err, "week results unavailable");
                            report.skipped_kinds.push(kind);
                            break;
                        }
                    }
                }
                let Some(results) = weeks.get(&week) else {
                    break;
                };
                let Some(head) = vault.peek_next_mut(kind) else {
                    break;
                };

                match head.resolve(results, now) {
                    Ok(outcome) => {
                        vault.pop_next(kind);
                        let settled = SettledContract {
                            id,
                            kind,
                            week,
                            outcome,
                        };
                        info!(kind = %kind, contract = %id, week, outcome = ?settled.outcome, "contract resolved");
                        if matches!(settled.outcome, SettlementOutcome::Refunded { .. }) {
                            report.refunded.push(settled);
                        } else {
                            report.settled.push(settled);
                        }
                    }
                    Err(err) if err.is_retryable() => {
                        warn!(kind = %kind, contract = %id, error = %err, "contract not resolvable yet");
                        report.skipped_kinds.push(kind);
                        break;
                    }
                    Err(err) => {
                        error!(kind = %kind, contract = %id, error = %err, "contract settlement failed");
                        if let Some(contract) = vault.pop_next(kind) {
                            report.failed.push(FailedContract {
                                id,
                                kind,
                                error: err.to_string(),
                                record: ContractRecord::from(&contract),
                            });
                        }
                    }
                }
                persist(&vault, self.store.as_ref())
                    .await
                    .with_context(|| format!("persist vault after contract {id}"))?;
            }
        }

        Ok(report)
    }

    /// Sweep on every tick until `shutdown` resolves. A sweep in progress
    /// always runs to completion.
    pub async fn run<Sd>(&self, every: Duration, shutdown: Sd)
    where
        Sd: Future<Output = ()>,
    {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = every.as_secs(), "settlement sweeper started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("settlement sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) if report.is_empty() => debug!("nothing to settle"),
                        Ok(report) => info!(
                            settled = report.settled.len(),
                            refunded = report.refunded.len(),
                            failed = report.failed.len(),
                            skipped = report.skipped_kinds.len(),
                            "sweep complete"
                        ),
                        Err(err) => error!(error = %err, "sweep aborted"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::contract::RefundReason;
    use crate::vault::feed::StaticFeed;
    use crate::vault::ledger::ContractRequest;
    use crate::vault::store::{restore, MemoryLedgerStore, StoreKey};
    use chrono::Duration as ChronoDuration;

    struct Harness {
        sweeper: SettlementSweeper<StaticFeed, MemoryLedgerStore>,
        feed: Arc<StaticFeed>,
        store: Arc<MemoryLedgerStore>,
    }

    fn harness(vault: Vault) -> Harness {
        let feed = Arc::new(StaticFeed::new());
        let store = Arc::new(MemoryLedgerStore::new());
        let sweeper = SettlementSweeper::new(
            Arc::new(Mutex::new(vault)),
            feed.clone(),
            store.clone(),
        );
        Harness {
            sweeper,
            feed,
            store,
        }
    }

    fn league(ids: &[&str]) -> Vault {
        let mut vault = Vault::new();
        for id in ids {
            vault
                .register_account(format!("member {id}"), format!("<@{id}>"), format!("chat-{id}"), *id, 100)
                .unwrap();
        }
        vault
    }

    fn slap(vault: &mut Vault, a: &str, b: &str, amount: i64, days: i64, week: u32) -> ContractId {
        vault
            .create_contract(ContractRequest::Slap {
                challenger_id: a.into(),
                challengee_id: b.into(),
                amount,
                expiration: Utc::now() + ChronoDuration::days(days),
                week,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn settles_ready_heads_and_persists() {
        let mut vault = league(&["1", "2", "3"]);
        let first = slap(&mut vault, "1", "2", 20, -2, 1);
        let wager = vault
            .create_contract(ContractRequest::GroupWager {
                side_a_id: "1".into(),
                side_b_id: "2".into(),
                bonus: 0,
                expiration: Utc::now() - ChronoDuration::days(2),
                week: 1,
            })
            .unwrap();
        vault.add_prediction(wager, "3", "1", 200, 10).unwrap();
        vault.add_prediction(wager, "2", "2", 150, 10).unwrap();
        let later = slap(&mut vault, "2", "3", 5, 3, 2);

        let h = harness(vault);
        h.feed.set_points(1, "1", 110.0);
        h.feed.set_points(1, "2", 95.5);

        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report.settled.len(), 2);
        assert_eq!(report.settled[0].id, first);
        assert_eq!(
            report.settled[1].outcome,
            SettlementOutcome::Paid {
                league_id: "3".into(),
                amount: 20
            }
        );
        assert!(report.failed.is_empty());
        assert!(report.skipped_kinds.is_empty());

        let vault = h.sweeper.vault();
        let vault = vault.lock().await;
        assert_eq!(vault.balance("1").unwrap(), 120);
        // 100 - 20 (slap) - 10 (prediction) - 5 (pending slap)
        assert_eq!(vault.balance("2").unwrap(), 65);
        assert_eq!(vault.balance("3").unwrap(), 105);
        assert_eq!(vault.peek_next(ContractKind::SlapContract).unwrap().id(), later);
        assert_eq!(vault.count(ContractKind::GroupWagerContract), 0);

        let stored = restore(h.store.as_ref()).await.unwrap();
        assert_eq!(stored.balance("1").unwrap(), 120);
        assert_eq!(stored.count(ContractKind::SlapContract), 1);
    }

    #[tokio::test]
    async fn missing_results_keep_head_in_place() {
        let mut vault = league(&["1", "2"]);
        let id = slap(&mut vault, "1", "2", 10, -2, 4);
        let h = harness(vault);

        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report.skipped_kinds, vec![ContractKind::SlapContract]);

        // week published but one team absent
        h.feed.set_points(4, "1", 80.0);
        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report.skipped_kinds, vec![ContractKind::SlapContract]);
        assert_eq!(
            h.sweeper.vault().lock().await.peek_next(ContractKind::SlapContract).unwrap().id(),
            id
        );
        assert!(h.store.load(StoreKey::Accounts).await.unwrap().is_none());

        h.feed.set_points(4, "2", 80.0);
        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(
            report.refunded[0].outcome,
            SettlementOutcome::Refunded {
                reason: RefundReason::Push
            }
        );
        assert_eq!(h.sweeper.vault().lock().await.balance("1").unwrap(), 100);
    }

    #[tokio::test]
    async fn failing_contract_is_popped_and_reported() {
        let mut vault = league(&["1", "2"]);
        let broken = slap(&mut vault, "1", "2", 10, -2, 1);
        let next = slap(&mut vault, "1", "2", 10, -2, 1);
        vault.set_balance("1", i64::MAX).unwrap();
        let h = harness(vault);
        h.feed.set_points(1, "1", 120.0);
        h.feed.set_points(1, "2", 60.0);

        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].id, broken);
        assert_eq!(report.failed[1].id, next);
        assert!(report.failed[0].error.contains("overflow"));
        assert_eq!(h.sweeper.vault().lock().await.count(ContractKind::SlapContract), 0);
    }

    #[tokio::test]
    async fn pending_head_blocks_later_contracts() {
        let mut vault = league(&["1", "2"]);
        slap(&mut vault, "1", "2", 10, 5, 1);
        slap(&mut vault, "1", "2", 10, -5, 1);
        let h = harness(vault);
        h.feed.set_points(1, "1", 1.0);
        h.feed.set_points(1, "2", 2.0);

        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(h.sweeper.vault().lock().await.count(ContractKind::SlapContract), 2);
    }

    #[tokio::test]
    async fn dropping_an_executed_head_is_persisted() {
        let mut vault = league(&["1", "2"]);
        slap(&mut vault, "1", "2", 10, 5, 1);
        vault
            .peek_next_mut(ContractKind::SlapContract)
            .unwrap()
            .refund()
            .unwrap();
        let h = harness(vault);

        let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(
            h.store.load(StoreKey::SlapContracts).await.unwrap(),
            Some(vec![])
        );
        let stored = restore(h.store.as_ref()).await.unwrap();
        assert_eq!(stored.balance("1").unwrap(), 100);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = harness(league(&["1"]));
        tokio::time::timeout(
            Duration::from_secs(5),
            h.sweeper.run(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }),
        )
        .await
        .unwrap();
    }
}
