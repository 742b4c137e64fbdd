//! Matchup data feeds
//!
//! The ledger only needs per-team point totals for a given week. Fantasy API
//! clients live outside this crate and hand results over through
//! `MatchupFeed`; the JSON directory feed covers exported result files.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamScore {
    pub total_points: f64,
}

/// team id -> final score for one week.
pub type WeekResults = HashMap<String, TeamScore>;

pub fn team_points(results: &WeekResults, team_id: &str, week: u32) -> VaultResult<f64> {
    results
        .get(team_id)
        .map(|score| score.total_points)
        .ok_or_else(|| VaultError::MissingResult {
            team_id: team_id.to_string(),
            week,
        })
}

#[async_trait]
pub trait MatchupFeed: Send + Sync {
    async fn week_results(&self, week: u32) -> Result<WeekResults>;
}

/// Reads `week_<n>.json` files shaped as `{"<team id>": {"total_points": 101.4}}`.
#[derive(Debug, Clone)]
pub struct JsonDirFeed {
    dir: PathBuf,
}

impl JsonDirFeed {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn week_path(&self, week: u32) -> PathBuf {
        self.dir.join(format!("week_{week}.json"))
    }
}

#[async_trait]
impl MatchupFeed for JsonDirFeed {
    async fn week_results(&self, week: u32) -> Result<WeekResults> {
        let path = self.week_path(week);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read results file {}", path.display()))?;
        let results: WeekResults = serde_json::from_str(&raw)
            .with_context(|| format!("parse results file {}", path.display()))?;
        debug!(week, teams = results.len(), "loaded week results");
        Ok(results)
    }
}

/// In-memory feed, filled by hand.
#[derive(Debug, Default)]
pub struct StaticFeed {
    weeks: RwLock<HashMap<u32, WeekResults>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_points(&self, week: u32, team_id: impl Into<String>, total_points: f64) {
        self.weeks
            .write()
            .entry(week)
            .or_default()
            .insert(team_id.into(), TeamScore { total_points });
    }
}

#[async_trait]
impl MatchupFeed for StaticFeed {
    async fn week_results(&self, week: u32) -> Result<WeekResults> {
        self.weeks
            .read()
            .get(&week)
            .cloned()
            .with_context(|| format!("no results published for week {week}"))
    }
}
