//! Vault Module - League Token Ledger
//!
//! This module handles:
//! 1. Member accounts and their token balances
//! 2. Wager contracts (1v1 slaps, group score predictions) with escrow
//! 3. Settlement of expired contracts against weekly matchup scores
//!
//! Architecture:
//! - `Vault` owns the account registry and one FIFO queue per contract kind
//! - Contracts hold shared handles to the accounts they escrowed from
//! - `SettlementSweeper` resolves queue heads and persists through a `LedgerStore`

pub mod account;
pub mod contract;
pub mod error;
pub mod feed;
pub mod group_wager;
pub mod ledger;
pub mod records;
pub mod slap;
pub mod store;
pub mod sweeper;

/// Whole league tokens.
pub type Tokens = i64;

pub use account::{Account, AccountHandle};
pub use contract::{
    Contract, ContractCore, ContractId, ContractKind, ContractState, RefundReason,
    SettlementOutcome,
};
pub use error::{VaultError, VaultResult};
pub use feed::{JsonDirFeed, MatchupFeed, StaticFeed, TeamScore, WeekResults};
pub use group_wager::{GroupWagerContract, Prediction};
pub use ledger::{ContractRequest, RosterEntry, Standing, Vault};
pub use records::{
    AccountRecord, ContractRecord, GroupWagerRecord, PredictionRecord, SlapRecord,
};
pub use slap::SlapContract;
pub use store::{persist, restore, LedgerStore, MemoryLedgerStore, SqliteLedgerStore, StoreKey};
pub use sweeper::{FailedContract, SettledContract, SettlementSweeper, SweepReport};
