//! League member wallets
//!
//! An `Account` is shared between the registry and every open contract that
//! names it, so it lives behind an `AccountHandle`. Balance changes made
//! through any handle are visible everywhere.

use parking_lot::Mutex;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::error::{VaultError, VaultResult};
use super::Tokens;

pub type AccountHandle = Arc<Mutex<Account>>;

/// One league member's token wallet.
#[derive(Debug, Clone)]
pub struct Account {
    member_name: String,
    mention_tag: String,
    chat_id: String,
    league_id: String,
    balance: Tokens,
}

impl Account {
    pub fn new(
        member_name: impl Into<String>,
        mention_tag: impl Into<String>,
        chat_id: impl Into<String>,
        league_id: impl Into<String>,
        balance: Tokens,
    ) -> VaultResult<Self> {
        if balance < 0 {
            return Err(VaultError::InvalidValue { value: balance });
        }
        Ok(Self {
            member_name: member_name.into(),
            mention_tag: mention_tag.into(),
            chat_id: chat_id.into(),
            league_id: league_id.into(),
            balance,
        })
    }

    pub fn into_handle(self) -> AccountHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    pub fn mention_tag(&self) -> &str {
        &self.mention_tag
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Registry key. Never changes after construction.
    pub fn league_id(&self) -> &str {
        &self.league_id
    }

    pub fn balance(&self) -> Tokens {
        self.balance
    }

    pub fn set_member_name(&mut self, name: impl Into<String>) {
        self.member_name = name.into();
    }

    pub fn set_balance(&mut self, value: Tokens) -> VaultResult<()> {
        if value < 0 {
            return Err(VaultError::InvalidValue { value });
        }
        self.balance = value;
        Ok(())
    }

    pub fn ensure_funds(&self, amount: Tokens) -> VaultResult<()> {
        if self.balance < amount {
            return Err(VaultError::InsufficientFunds {
                league_id: self.league_id.clone(),
                balance: self.balance,
                required: amount,
            });
        }
        Ok(())
    }

    /// Fails exactly when `credit(amount)` would.
    pub fn ensure_can_credit(&self, amount: Tokens) -> VaultResult<()> {
        ensure_non_negative(amount)?;
        self.balance
            .checked_add(amount)
            .map(|_| ())
            .ok_or_else(|| VaultError::validation("balance overflow"))
    }

    pub fn credit(&mut self, amount: Tokens) -> VaultResult<()> {
        self.ensure_can_credit(amount)?;
        self.balance += amount;
        Ok(())
    }

    pub fn debit(&mut self, amount: Tokens) -> VaultResult<()> {
        ensure_non_negative(amount)?;
        self.ensure_funds(amount)?;
        self.balance -= amount;
        Ok(())
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.league_id == other.league_id
    }
}

impl Eq for Account {}

impl Hash for Account {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.league_id.hash(state);
    }
}

pub(crate) fn ensure_non_negative(amount: Tokens) -> VaultResult<()> {
    if amount < 0 {
        return Err(VaultError::validation(format!(
            "amount must be non-negative, got {amount}"
        )));
    }
    Ok(())
}

pub(crate) fn league_id_of(handle: &AccountHandle) -> String {
    handle.lock().league_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn account(balance: Tokens) -> Account {
        Account::new("Sam", "<@1>", "1", "t.1", balance).unwrap()
    }

    #[test]
    fn negative_opening_balance_rejected() {
        let err = Account::new("Sam", "<@1>", "1", "t.1", -5).unwrap_err();
        assert_eq!(err, VaultError::InvalidValue { value: -5 });
    }

    #[test]
    fn set_balance_refuses_negative_and_keeps_old_value() {
        let mut acct = account(40);
        assert!(acct.set_balance(-1).is_err());
        assert_eq!(acct.balance(), 40);
        acct.set_balance(0).unwrap();
        assert_eq!(acct.balance(), 0);
    }

    #[test]
    fn debit_beyond_balance_is_rejected_without_change() {
        let mut acct = account(30);
        let err = acct.debit(31).unwrap_err();
        assert!(matches!(err, VaultError::InsufficientFunds { required: 31, .. }));
        assert_eq!(acct.balance(), 30);
        acct.debit(30).unwrap();
        assert_eq!(acct.balance(), 0);
    }

    #[test]
    fn negative_amounts_are_validation_errors() {
        let mut acct = account(10);
        assert!(matches!(acct.credit(-1), Err(VaultError::Validation(_))));
        assert!(matches!(acct.debit(-1), Err(VaultError::Validation(_))));
        assert_eq!(acct.balance(), 10);
    }

    #[test]
    fn identity_is_league_id_only() {
        let a = Account::new("Sam", "<@1>", "1", "t.1", 10).unwrap();
        let b = Account::new("Renamed", "<@9>", "9", "t.1", 99).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn handles_share_balance_changes() {
        let handle = account(100).into_handle();
        let other = Arc::clone(&handle);
        handle.lock().debit(25).unwrap();
        assert_eq!(other.lock().balance(), 75);
    }
}
