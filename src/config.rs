//! Runtime configuration

use std::path::PathBuf;

use crate::vault::Tokens;

pub const DEFAULT_LOG_FILTER: &str = "gridiron_vault=info,vault_sweeper=info";

/// Vault service configuration
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub database_path: String,
    pub results_dir: PathBuf,
    pub sweep_interval_secs: u64,
    pub starting_balance: Tokens,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database_path: "./vault.db".to_string(),
            results_dir: PathBuf::from("./results"),
            sweep_interval_secs: 3600,
            starting_balance: 1000,
        }
    }
}

impl VaultConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Unparseable values fall back to their defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database_path = lookup("VAULT_DATABASE_PATH").unwrap_or(defaults.database_path);

        let results_dir = lookup("VAULT_RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.results_dir);

        let sweep_interval_secs = lookup("VAULT_SWEEP_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults.sweep_interval_secs);

        let starting_balance = lookup("VAULT_STARTING_BALANCE")
            .and_then(|v| v.parse().ok())
            .filter(|balance: &Tokens| *balance >= 0)
            .unwrap_or(defaults.starting_balance);

        Self {
            database_path,
            results_dir,
            sweep_interval_secs,
            starting_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> VaultConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VaultConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.database_path, "./vault.db");
        assert_eq!(config.results_dir, PathBuf::from("./results"));
        assert_eq!(config.sweep_interval_secs, 3600);
        assert_eq!(config.starting_balance, 1000);
    }

    #[test]
    fn env_values_override_and_bad_values_fall_back() {
        let config = config_from(&[
            ("VAULT_DATABASE_PATH", "/var/lib/vault/league.db"),
            ("VAULT_SWEEP_INTERVAL_SECS", "0"),
            ("VAULT_STARTING_BALANCE", "-5"),
            ("VAULT_RESULTS_DIR", "/srv/results"),
        ]);
        assert_eq!(config.database_path, "/var/lib/vault/league.db");
        assert_eq!(config.results_dir, PathBuf::from("/srv/results"));
        assert_eq!(config.sweep_interval_secs, 3600);
        assert_eq!(config.starting_balance, 1000);
    }
}
