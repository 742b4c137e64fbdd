//! Ledger error taxonomy.
//!
//! Every variant is raised before any balance is touched, so a returned error
//! means the ledger is exactly as it was before the call.

use chrono::{DateTime, Utc};

use super::Tokens;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VaultError {
    /// Bad input: negative amounts, identical parties, identical matchup sides.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid balance value {value}: balances cannot be negative")]
    InvalidValue { value: Tokens },

    #[error("no account registered for league id {league_id}")]
    AccountNotFound { league_id: String },

    #[error("account {league_id} is already registered")]
    DuplicateAccount { league_id: String },

    #[error("no contract with id {id}")]
    ContractNotFound { id: String },

    #[error("unregistered contract kind '{0}'")]
    InvalidKind(String),

    #[error("account {league_id} holds {balance} tokens, {required} required")]
    InsufficientFunds {
        league_id: String,
        balance: Tokens,
        required: Tokens,
    },

    #[error("contract has already been executed")]
    AlreadySettled,

    #[error("contract expires {expiration} and cannot be settled yet")]
    NotYetExpired { expiration: DateTime<Utc> },

    #[error("account {league_id} is not a party to this contract")]
    InvalidWinner { league_id: String },

    #[error("account {league_id} already has a prediction on this wager")]
    DuplicateBettor { league_id: String },

    #[error("a prediction of {points} for team {team_id} already exists")]
    DuplicatePrediction { team_id: String, points: i64 },

    #[error("week {week} results are missing team {team_id}")]
    MissingResult { team_id: String, week: u32 },
}

impl VaultError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures that should leave a contract queued for a later retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MissingResult { .. } | Self::NotYetExpired { .. })
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_account() {
        let err = VaultError::InsufficientFunds {
            league_id: "414.l.1.t.3".to_string(),
            balance: 20,
            required: 50,
        };
        assert_eq!(
            err.to_string(),
            "account 414.l.1.t.3 holds 20 tokens, 50 required"
        );
    }

    #[test]
    fn only_feed_gaps_and_early_calls_are_retryable() {
        assert!(VaultError::MissingResult {
            team_id: "7".into(),
            week: 3
        }
        .is_retryable());
        assert!(!VaultError::AlreadySettled.is_retryable());
        assert!(!VaultError::validation("bad").is_retryable());
    }
}
