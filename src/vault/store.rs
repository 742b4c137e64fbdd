//! Vault persistence
//!
//! Storage is a key -> record-list capability. The vault is written as three
//! lists (accounts, slap contracts, group wagers) after every mutation and
//! read back at startup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::contract::ContractKind;
use super::ledger::Vault;
use super::records::{AccountRecord, ContractRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Accounts,
    SlapContracts,
    WagerContracts,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [
        StoreKey::Accounts,
        StoreKey::SlapContracts,
        StoreKey::WagerContracts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Accounts => "accounts",
            StoreKey::SlapContracts => "slap_contracts",
            StoreKey::WagerContracts => "wager_contracts",
        }
    }

    pub fn for_kind(kind: ContractKind) -> Self {
        match kind {
            ContractKind::SlapContract => StoreKey::SlapContracts,
            ContractKind::GroupWagerContract => StoreKey::WagerContracts,
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self, key: StoreKey) -> Result<Option<Vec<Value>>>;
    async fn store(&self, key: StoreKey, records: Vec<Value>) -> Result<()>;
}

/// SQLite-backed store: one row per key holding a JSON array.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open ledger db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().context("open in-memory ledger db")?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_records (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load(&self, key: StoreKey) -> Result<Option<Vec<Value>>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare_cached("SELECT payload FROM ledger_records WHERE key = ?1 LIMIT 1")?;
        let payload: Option<String> = stmt
            .query_row(params![key.as_str()], |row| row.get(0))
            .optional()?;
        payload
            .map(|raw| {
                serde_json::from_str::<Vec<Value>>(&raw)
                    .with_context(|| format!("decode stored {key} records"))
            })
            .transpose()
    }

    async fn store(&self, key: StoreKey, records: Vec<Value>) -> Result<()> {
        let payload = serde_json::to_string(&records)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO ledger_records (key, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![key.as_str(), payload, Utc::now().timestamp()],
        )
        .with_context(|| format!("write {key} records"))?;
        debug!(key = %key, records = records.len(), "ledger records stored");
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    records: parking_lot::Mutex<HashMap<StoreKey, Vec<Value>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self, key: StoreKey) -> Result<Option<Vec<Value>>> {
        Ok(self.records.lock().get(&key).cloned())
    }

    async fn store(&self, key: StoreKey, records: Vec<Value>) -> Result<()> {
        self.records.lock().insert(key, records);
        Ok(())
    }
}

/// Write the whole vault.
pub async fn persist<S>(vault: &Vault, store: &S) -> Result<()>
where
    S: LedgerStore + ?Sized,
{
    let mut sections: Vec<(StoreKey, Vec<Value>)> = Vec::with_capacity(StoreKey::ALL.len());
    sections.push((
        StoreKey::Accounts,
        vault
            .serialize_accounts()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
    ));
    for kind in ContractKind::ALL {
        sections.push((
            StoreKey::for_kind(kind),
            vault
                .serialize_contracts(kind)
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
        ));
    }

    for (key, records) in sections {
        store.store(key, records).await?;
    }
    Ok(())
}

/// Load the vault; missing keys give empty sections.
pub async fn restore<S>(store: &S) -> Result<Vault>
where
    S: LedgerStore + ?Sized,
{
    let accounts = store
        .load(StoreKey::Accounts)
        .await?
        .map(|values| {
            values
                .into_iter()
                .map(serde_json::from_value::<AccountRecord>)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
        .context("decode account records")?;

    let mut contracts = Vec::with_capacity(ContractKind::ALL.len());
    for kind in ContractKind::ALL {
        let key = StoreKey::for_kind(kind);
        let records = store
            .load(key)
            .await?
            .map(|values| {
                values
                    .into_iter()
                    .map(ContractRecord::from_value)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .with_context(|| format!("decode {key} records"))?;
        contracts.push(records);
    }
    let wagers = contracts.pop().flatten();
    let slaps = contracts.pop().flatten();

    let vault = Vault::initialize_from_serialized(accounts, slaps, wagers)?;
    info!(accounts = vault.account_count(), "vault restored");
    Ok(vault)
}
