//! End-to-end season flow: seed a roster, open week wagers and slaps, settle
//! them from result files, and reload the ledger from disk.

use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use gridiron_vault::vault::{
    restore, ContractKind, ContractRequest, JsonDirFeed, RosterEntry, SettlementOutcome,
    SettlementSweeper, SqliteLedgerStore, Vault,
};

fn roster() -> Vec<RosterEntry> {
    (1..=4)
        .map(|n| RosterEntry {
            name: format!("Manager {n}"),
            chat_tag: format!("<@10{n}>"),
            chat_id: format!("10{n}"),
            league_id: format!("t{n}"),
        })
        .collect()
}

fn write_week(dir: &Path, week: u32, scores: &[(&str, f64)]) {
    let body: serde_json::Map<String, serde_json::Value> = scores
        .iter()
        .map(|(team, points)| (team.to_string(), serde_json::json!({ "total_points": points })))
        .collect();
    std::fs::write(
        dir.join(format!("week_{week}.json")),
        serde_json::Value::Object(body).to_string(),
    )
    .unwrap();
}

fn total_tokens(vault: &Vault) -> i64 {
    vault.leaderboard().iter().map(|s| s.balance).sum()
}

#[tokio::test]
async fn week_settles_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vault.db");
    let results_dir = dir.path().join("results");
    std::fs::create_dir_all(&results_dir).unwrap();

    let mut vault = Vault::new();
    assert_eq!(vault.seed_season(&roster(), 1000).unwrap(), 4);
    assert_eq!(vault.seed_season(&roster(), 1000).unwrap(), 0);

    let expired = Utc::now() - Duration::days(2);
    let matchups = vec![
        ("t1".to_string(), "t2".to_string()),
        ("t3".to_string(), "t4".to_string()),
    ];
    let wagers = vault.create_week_wagers(1, &matchups, expired, 0).unwrap();
    assert_eq!(vault.create_week_wagers(1, &matchups, expired, 0).unwrap(), wagers);
    assert_eq!(vault.count(ContractKind::GroupWagerContract), 2);

    vault.add_prediction(wagers[0], "t3", "t1", 250, 50).unwrap();
    vault.add_prediction(wagers[0], "t4", "t1", 200, 50).unwrap();
    vault.add_prediction(wagers[0], "t2", "t2", 230, 50).unwrap();
    vault
        .create_contract(ContractRequest::Slap {
            challenger_id: "t1".into(),
            challengee_id: "t3".into(),
            amount: 100,
            expiration: expired,
            week: 1,
        })
        .unwrap();

    write_week(
        &results_dir,
        1,
        &[("t1", 130.5), ("t2", 99.0), ("t3", 88.0), ("t4", 140.25)],
    );

    let store = Arc::new(SqliteLedgerStore::new(db_path.to_str().unwrap()).unwrap());
    let sweeper = SettlementSweeper::new(
        Arc::new(Mutex::new(vault)),
        Arc::new(JsonDirFeed::new(&results_dir)),
        store,
    );
    let report = sweeper.sweep_once(Utc::now()).await.unwrap();

    assert_eq!(report.settled.len(), 3);
    assert!(report.refunded.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.settled[0].kind, ContractKind::SlapContract);
    assert_eq!(
        report.settled[1].outcome,
        SettlementOutcome::Paid {
            league_id: "t3".into(),
            amount: 150
        }
    );
    assert_eq!(report.settled[2].outcome, SettlementOutcome::Empty);
    drop(sweeper);

    let reopened = SqliteLedgerStore::new(db_path.to_str().unwrap()).unwrap();
    let vault = restore(&reopened).await.unwrap();
    let board: Vec<(String, i64)> = vault
        .leaderboard()
        .into_iter()
        .map(|s| (s.league_id, s.balance))
        .collect();
    assert_eq!(
        board,
        vec![
            ("t1".to_string(), 1100),
            ("t3".to_string(), 1000),
            ("t2".to_string(), 950),
            ("t4".to_string(), 950),
        ]
    );
    assert_eq!(total_tokens(&vault), 4000);
    for kind in ContractKind::ALL {
        assert_eq!(vault.count(kind), 0);
    }
}

#[tokio::test]
async fn pending_week_is_untouched_until_results_arrive() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteLedgerStore::new(dir.path().join("vault.db").to_str().unwrap()).unwrap());

    let mut vault = Vault::new();
    vault.seed_season(&roster(), 500).unwrap();
    let wager = vault
        .create_contract(ContractRequest::GroupWager {
            side_a_id: "t1".into(),
            side_b_id: "t2".into(),
            bonus: 0,
            expiration: Utc::now() - Duration::days(1),
            week: 3,
        })
        .unwrap();
    vault.add_prediction(wager, "t3", "t2", 180, 40).unwrap();
    vault.add_prediction(wager, "t4", "t1", 190, 40).unwrap();

    let sweeper = SettlementSweeper::new(
        Arc::new(Mutex::new(vault)),
        Arc::new(JsonDirFeed::new(dir.path())),
        store.clone(),
    );

    let report = sweeper.sweep_once(Utc::now()).await.unwrap();
    assert_eq!(report.skipped_kinds, vec![ContractKind::GroupWagerContract]);
    {
        let vault = sweeper.vault();
        let vault = vault.lock().await;
        assert_eq!(vault.peek_next(ContractKind::GroupWagerContract).unwrap().id(), wager);
        assert_eq!(total_tokens(&vault), 2000 - 80);
    }

    write_week(dir.path(), 3, &[("t1", 101.0), ("t2", 101.0)]);
    let report = sweeper.sweep_once(Utc::now()).await.unwrap();
    assert_eq!(report.refunded.len(), 1);

    let vault = restore(store.as_ref()).await.unwrap();
    assert_eq!(total_tokens(&vault), 2000);
    assert_eq!(vault.balance("t3").unwrap(), 500);
}
