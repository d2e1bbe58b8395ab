//! Snapshot command handlers

use super::open_store;
use crate::config::Config;
use crate::services::SnapshotManager;

async fn manager(config: &Config) -> anyhow::Result<SnapshotManager> {
    let store = open_store(config).await?;
    Ok(SnapshotManager::new(
        store,
        config.snapshot.tables.clone(),
        config.snapshot.retain_sets,
    ))
}

pub async fn cmd_snapshots_list(config: &Config) -> anyhow::Result<()> {
    let sets = manager(config).await?.list().await?;

    if sets.is_empty() {
        println!("No snapshot sets.");
        return Ok(());
    }

    println!("Snapshot sets ({} total)", sets.len());
    println!("{:-<60}", "");
    for set in sets {
        let taken = set
            .taken_at()
            .map_or_else(|| "?".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        println!("{}  ({taken} UTC)", set.timestamp);
        println!("  tables: {}", set.tables.join(", "));
    }
    Ok(())
}

pub async fn cmd_snapshots_create(config: &Config) -> anyhow::Result<()> {
    let outcome = manager(config).await?.snapshot(chrono::Utc::now()).await?;
    println!(
        "✓ Snapshot set {} created ({} tables)",
        outcome.timestamp,
        outcome.tables.len()
    );
    for ts in &outcome.pruned {
        println!("  Dropped old set {ts}");
    }
    Ok(())
}

pub async fn cmd_snapshots_restore(config: &Config, timestamp: &str) -> anyhow::Result<()> {
    let set = manager(config).await?.restore(timestamp).await?;
    println!("✓ Restored {} tables from snapshot {}", set.tables.len(), set.timestamp);
    Ok(())
}
