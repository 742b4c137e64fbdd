//! Vault Sweeper - league ledger service
//!
//! Usage:
//!   vault-sweeper run
//!   vault-sweeper sweep-once
//!   vault-sweeper balances
//!   vault-sweeper seed --roster ./roster.json --starting-balance 1000

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridiron_vault::config::{VaultConfig, DEFAULT_LOG_FILTER};
use gridiron_vault::vault::{
    persist, restore, JsonDirFeed, RosterEntry, SettlementSweeper, SqliteLedgerStore, Tokens,
};

/// League token vault: settles expired wagers against weekly results
#[derive(Parser, Debug)]
#[command(name = "vault-sweeper")]
#[command(about = "Settle league wager contracts and manage token balances")]
struct Cli {
    /// Path to the SQLite ledger database
    #[arg(long, env = "VAULT_DATABASE_PATH")]
    db_path: Option<String>,

    /// Directory holding week_<n>.json result files
    #[arg(long, env = "VAULT_RESULTS_DIR")]
    results_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep periodically until Ctrl-C
    Run {
        /// Seconds between sweeps
        #[arg(long, env = "VAULT_SWEEP_INTERVAL_SECS")]
        interval_secs: Option<u64>,
    },

    /// Run a single sweep and print the report as JSON
    SweepOnce,

    /// Print the leaderboard
    Balances,

    /// Register every roster member not yet in the vault
    Seed {
        /// JSON array of {name, chat_tag, chat_id, league_id}
        #[arg(long)]
        roster: PathBuf,

        #[arg(long, env = "VAULT_STARTING_BALANCE")]
        starting_balance: Option<Tokens>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = VaultConfig::from_env()?;
    init_tracing();
    let cli = Cli::parse();

    if let Some(db_path) = cli.db_path {
        config.database_path = db_path;
    }
    if let Some(results_dir) = cli.results_dir {
        config.results_dir = results_dir;
    }

    let store = Arc::new(
        SqliteLedgerStore::new(&config.database_path)
            .with_context(|| format!("open ledger at {}", config.database_path))?,
    );
    let vault = restore(store.as_ref()).await?;
    info!(db = %config.database_path, accounts = vault.account_count(), "vault loaded");

    match cli.command {
        Commands::Run { interval_secs } => {
            let every = Duration::from_secs(interval_secs.unwrap_or(config.sweep_interval_secs).max(1));
            let sweeper = SettlementSweeper::new(
                Arc::new(Mutex::new(vault)),
                Arc::new(JsonDirFeed::new(&config.results_dir)),
                store,
            );
            sweeper
                .run(every, async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "ctrl-c handler failed; stopping");
                    }
                })
                .await;
        }
        Commands::SweepOnce => {
            let sweeper = SettlementSweeper::new(
                Arc::new(Mutex::new(vault)),
                Arc::new(JsonDirFeed::new(&config.results_dir)),
                store,
            );
            let report = sweeper.sweep_once(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Balances => {
            for (rank, standing) in vault.leaderboard().iter().enumerate() {
                println!(
                    "{:>3}. {:<24} {:>10}  ({})",
                    rank + 1,
                    standing.name,
                    standing.balance,
                    standing.league_id
                );
            }
        }
        Commands::Seed {
            roster,
            starting_balance,
        } => {
            let raw = tokio::fs::read_to_string(&roster)
                .await
                .with_context(|| format!("read roster {}", roster.display()))?;
            let entries: Vec<RosterEntry> =
                serde_json::from_str(&raw).context("parse roster JSON")?;

            let mut vault = vault;
            let added =
                vault.seed_season(&entries, starting_balance.unwrap_or(config.starting_balance))?;
            persist(&vault, store.as_ref()).await?;
            info!(added, roster = entries.len(), "season seeded");
            println!("registered {added} of {} roster members", entries.len());
        }
    }

    Ok(())
}
