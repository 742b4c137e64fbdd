//! The Vault: account registry plus one FIFO queue per contract kind
//!
//! Not internally synchronized. Callers that share a `Vault` wrap it in a
//! single lock and hold it for the whole check/settle/persist sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::account::{ensure_non_negative, Account, AccountHandle};
use super::contract::{Contract, ContractId, ContractKind};
use super::error::{VaultError, VaultResult};
use super::group_wager::GroupWagerContract;
use super::records::{AccountRecord, ContractRecord};
use super::slap::SlapContract;
use super::Tokens;

/// Input to the contract factory.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractRequest {
    Slap {
        challenger_id: String,
        challengee_id: String,
        amount: Tokens,
        expiration: DateTime<Utc>,
        week: u32,
    },
    GroupWager {
        side_a_id: String,
        side_b_id: String,
        bonus: Tokens,
        expiration: DateTime<Utc>,
        week: u32,
    },
}

impl ContractRequest {
    pub fn kind(&self) -> ContractKind {
        match self {
            ContractRequest::Slap { .. } => ContractKind::SlapContract,
            ContractRequest::GroupWager { .. } => ContractKind::GroupWagerContract,
        }
    }
}

/// A league member as listed on the season roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub chat_tag: String,
    pub chat_id: String,
    pub league_id: String,
}

/// Balance row for leaderboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub league_id: String,
    pub name: String,
    pub balance: Tokens,
}

pub struct Vault {
    accounts: HashMap<String, AccountHandle>,
    contracts: HashMap<ContractKind, VecDeque<Contract>>,
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

impl Vault {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            contracts: ContractKind::ALL
                .into_iter()
                .map(|kind| (kind, VecDeque::new()))
                .collect(),
        }
    }

    /// Drop every account and contract.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // ---------------------------------------------------------------------
    // Account registry
    // ---------------------------------------------------------------------

    pub fn register_account(
        &mut self,
        name: impl Into<String>,
        chat_tag: impl Into<String>,
        chat_id: impl Into<String>,
        league_id: impl Into<String>,
        balance: Tokens,
    ) -> VaultResult<AccountHandle> {
        let league_id = league_id.into();
        if self.accounts.contains_key(&league_id) {
            return Err(VaultError::DuplicateAccount { league_id });
        }
        if balance < 0 {
            return Err(VaultError::validation("opening balance cannot be negative"));
        }
        let handle =
            Account::new(name, chat_tag, chat_id, league_id.clone(), balance)?.into_handle();
        self.accounts.insert(league_id.clone(), Arc::clone(&handle));
        debug!(league_id = %league_id, balance, "account registered");
        Ok(handle)
    }

    /// Register every roster member that is not already known. Returns how many were added.
    pub fn seed_season(&mut self, roster: &[RosterEntry], starting_balance: Tokens) -> VaultResult<usize> {
        ensure_non_negative(starting_balance)?;
        let mut added = 0;
        for member in roster {
            if self.accounts.contains_key(&member.league_id) {
                continue;
            }
            self.register_account(
                member.name.clone(),
                member.chat_tag.clone(),
                member.chat_id.clone(),
                member.league_id.clone(),
                starting_balance,
            )?;
            added += 1;
        }
        info!(added, starting_balance, "season roster seeded");
        Ok(added)
    }

    pub fn account(&self, league_id: &str) -> VaultResult<AccountHandle> {
        self.accounts
            .get(league_id)
            .cloned()
            .ok_or_else(|| VaultError::AccountNotFound {
                league_id: league_id.to_string(),
            })
    }

    pub fn balance(&self, league_id: &str) -> VaultResult<Tokens> {
        Ok(self.account(league_id)?.lock().balance())
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn rename_account(&self, league_id: &str, name: impl Into<String>) -> VaultResult<()> {
        self.account(league_id)?.lock().set_member_name(name);
        Ok(())
    }

    pub fn set_balance(&self, league_id: &str, value: Tokens) -> VaultResult<()> {
        self.account(league_id)?.lock().set_balance(value)
    }

    pub fn add_funds(&self, league_id: &str, amount: Tokens) -> VaultResult<()> {
        ensure_non_negative(amount)?;
        self.account(league_id)?.lock().credit(amount)?;
        debug!(league_id, amount, "funds added");
        Ok(())
    }

    pub fn deduct_funds(&self, league_id: &str, amount: Tokens) -> VaultResult<()> {
        ensure_non_negative(amount)?;
        self.account(league_id)?.lock().debit(amount)?;
        debug!(league_id, amount, "funds deducted");
        Ok(())
    }

    /// All-or-nothing move between two accounts.
    pub fn transfer_funds(&self, from_id: &str, to_id: &str, amount: Tokens) -> VaultResult<()> {
        ensure_non_negative(amount)?;
        let from = self.account(from_id)?;
        let to = self.account(to_id)?;
        if Arc::ptr_eq(&from, &to) {
            from.lock().ensure_funds(amount)?;
            return Ok(());
        }
        if to.lock().balance().checked_add(amount).is_none() {
            return Err(VaultError::validation("balance overflow"));
        }
        from.lock().debit(amount)?;
        to.lock().credit(amount)?;
        debug!(from = from_id, to = to_id, amount, "funds transferred");
        Ok(())
    }

    pub fn find_by_chat_id(&self, chat_id: &str) -> Option<AccountHandle> {
        self.accounts
            .values()
            .find(|handle| handle.lock().chat_id() == chat_id)
            .cloned()
    }

    /// Accounts by balance, richest first; ties by league id.
    pub fn leaderboard(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .accounts
            .values()
            .map(|handle| {
                let account = handle.lock();
                Standing {
                    league_id: account.league_id().to_string(),
                    name: account.member_name().to_string(),
                    balance: account.balance(),
                }
            })
            .collect();
        standings.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.league_id.cmp(&b.league_id))
        });
        standings
    }

    // ---------------------------------------------------------------------
    // Contracts
    // ---------------------------------------------------------------------

    fn queue(&self, kind: ContractKind) -> &VecDeque<Contract> {
        // Every kind gets a queue in `new`.
        &self.contracts[&kind]
    }

    fn queue_mut(&mut self, kind: ContractKind) -> &mut VecDeque<Contract> {
        self.contracts.entry(kind).or_default()
    }

    /// Build a contract and enqueue it.
    ///
    /// A group wager equal to one already queued (same matchup, same
    /// expiration) is not added again; the existing contract's id comes back.
    pub fn create_contract(&mut self, request: ContractRequest) -> VaultResult<ContractId> {
        let kind = request.kind();
        let contract = match request {
            ContractRequest::Slap {
                challenger_id,
                challengee_id,
                amount,
                expiration,
                week,
            } => {
                ensure_non_negative(amount)?;
                if challenger_id == challengee_id {
                    return Err(VaultError::validation(
                        "challenger and challengee must be different accounts",
                    ));
                }
                let challenger = self.account(&challenger_id)?;
                let challengee = self.account(&challengee_id)?;
                Contract::Slap(SlapContract::new(
                    challenger, challengee, amount, expiration, week,
                )?)
            }
            ContractRequest::GroupWager {
                side_a_id,
                side_b_id,
                bonus,
                expiration,
                week,
            } => {
                let wager = GroupWagerContract::new(side_a_id, side_b_id, bonus, expiration, week)?;
                let existing = self
                    .queue(kind)
                    .iter()
                    .filter_map(Contract::as_group_wager)
                    .find(|queued| queued.same_matchup(&wager))
                    .map(GroupWagerContract::id);
                if let Some(id) = existing {
                    debug!(contract = %id, "duplicate group wager suppressed");
                    return Ok(id);
                }
                Contract::GroupWager(wager)
            }
        };

        let id = contract.id();
        info!(contract = %id, kind = %kind, week = contract.week(), "contract created");
        self.queue_mut(kind).push_back(contract);
        Ok(id)
    }

    /// One group wager per matchup, skipping matchups that already have one.
    pub fn create_week_wagers(
        &mut self,
        week: u32,
        matchups: &[(String, String)],
        expiration: DateTime<Utc>,
        bonus: Tokens,
    ) -> VaultResult<Vec<ContractId>> {
        matchups
            .iter()
            .map(|(side_a, side_b)| {
                self.create_contract(ContractRequest::GroupWager {
                    side_a_id: side_a.clone(),
                    side_b_id: side_b.clone(),
                    bonus,
                    expiration,
                    week,
                })
            })
            .collect()
    }

    pub fn contract(&self, id: ContractId) -> VaultResult<&Contract> {
        self.contracts
            .values()
            .flat_map(|queue| queue.iter())
            .find(|c| c.id() == id)
            .ok_or_else(|| VaultError::ContractNotFound { id: id.to_string() })
    }

    pub fn contract_mut(&mut self, id: ContractId) -> VaultResult<&mut Contract> {
        self.contracts
            .values_mut()
            .flat_map(|queue| queue.iter_mut())
            .find(|c| c.id() == id)
            .ok_or_else(|| VaultError::ContractNotFound { id: id.to_string() })
    }

    /// The open group wager covering `team_id`, if any.
    pub fn find_group_wager(&self, team_id: &str) -> Option<&GroupWagerContract> {
        self.queue(ContractKind::GroupWagerContract)
            .iter()
            .filter_map(Contract::as_group_wager)
            .find(|w| !w.core().executed() && w.involves_team(team_id))
    }

    pub fn add_prediction(
        &mut self,
        contract_id: ContractId,
        bettor_id: &str,
        predicted_side: &str,
        predicted_total: i64,
        stake: Tokens,
    ) -> VaultResult<()> {
        let bettor = self.account(bettor_id)?;
        let wager = self
            .contract_mut(contract_id)?
            .as_group_wager_mut()
            .ok_or_else(|| VaultError::validation("predictions only apply to group wagers"))?;
        wager.add_prediction(bettor, predicted_side, predicted_total, stake)
    }

    pub fn count(&self, kind: ContractKind) -> usize {
        self.queue(kind).len()
    }

    pub fn is_ready_to_execute(&self, kind: ContractKind) -> bool {
        self.is_ready_to_execute_at(kind, Utc::now())
    }

    pub fn is_ready_to_execute_at(&self, kind: ContractKind, now: DateTime<Utc>) -> bool {
        self.queue(kind)
            .front()
            .map(|head| head.is_ready_at(now))
            .unwrap_or(false)
    }

    pub fn peek_next(&self, kind: ContractKind) -> Option<&Contract> {
        self.queue(kind).front()
    }

    pub fn peek_next_mut(&mut self, kind: ContractKind) -> Option<&mut Contract> {
        self.queue_mut(kind).front_mut()
    }

    pub fn pop_next(&mut self, kind: ContractKind) -> Option<Contract> {
        self.queue_mut(kind).pop_front()
    }

    // Name-keyed variants for callers holding a kind string; an unknown name
    // is `InvalidKind`.

    pub fn count_by_name(&self, kind: &str) -> VaultResult<usize> {
        Ok(self.count(kind.parse()?))
    }

    pub fn peek_next_by_name(&self, kind: &str) -> VaultResult<Option<&Contract>> {
        Ok(self.peek_next(kind.parse()?))
    }

    pub fn pop_next_by_name(&mut self, kind: &str) -> VaultResult<Option<Contract>> {
        Ok(self.pop_next(kind.parse()?))
    }

    // ---------------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------------

    pub fn serialize_accounts(&self) -> Vec<AccountRecord> {
        let mut records: Vec<AccountRecord> = self
            .accounts
            .values()
            .map(|handle| AccountRecord::from(&*handle.lock()))
            .collect();
        records.sort_by(|a, b| a.league_id.cmp(&b.league_id));
        records
    }

    pub fn serialize_contracts(&self, kind: ContractKind) -> Vec<ContractRecord> {
        self.queue(kind).iter().map(ContractRecord::from).collect()
    }

    /// Rebuild a vault from stored records. Accounts load first so contracts
    /// can resolve their parties by league id.
    pub fn initialize_from_serialized(
        accounts: Option<Vec<AccountRecord>>,
        slap_contracts: Option<Vec<ContractRecord>>,
        wager_contracts: Option<Vec<ContractRecord>>,
    ) -> VaultResult<Self> {
        let mut vault = Self::new();
        for record in accounts.unwrap_or_default() {
            let league_id = record.league_id.clone();
            if vault.accounts.contains_key(&league_id) {
                return Err(VaultError::DuplicateAccount { league_id });
            }
            let handle = Account::try_from(record)?.into_handle();
            vault.accounts.insert(league_id, handle);
        }

        let sections = [
            (ContractKind::SlapContract, slap_contracts),
            (ContractKind::GroupWagerContract, wager_contracts),
        ];
        for (kind, records) in sections {
            for record in records.unwrap_or_default() {
                if record.kind() != kind {
                    return Err(VaultError::validation(format!(
                        "{} record stored under the {kind} section",
                        record.kind()
                    )));
                }
                let contract = record.into_contract(|account| vault.account(&account.league_id))?;
                vault.queue_mut(kind).push_back(contract);
            }
        }

        info!(
            accounts = vault.accounts.len(),
            slaps = vault.count(ContractKind::SlapContract),
            wagers = vault.count(ContractKind::GroupWagerContract),
            "vault initialized from stored records"
        );
        Ok(vault)
    }
}
