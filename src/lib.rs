//! Gridiron Vault Library
//!
//! Token ledger for a fantasy football league: member accounts, escrowed
//! wager contracts and their settlement against weekly scores.

pub mod config;
pub mod vault;

pub use config::VaultConfig;
