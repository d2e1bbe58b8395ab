//! Status command handler

use super::{artifact_store, open_store};
use crate::config::Config;
use crate::constants::tables;
use crate::services::BackupVerifier;

pub async fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    println!("reelsync status");
    println!("{:-<60}", "");

    match store.load_checkpoint(&config.update.job_name).await? {
        Some(ts) => println!("Checkpoint ({}): {}", config.update.job_name, ts.to_rfc3339()),
        None => println!("Checkpoint ({}): never run", config.update.job_name),
    }

    println!();
    println!("Rows:");
    for (table, count) in store.table_counts(tables::LIVE).await? {
        println!("  {table:<16} {count}");
    }

    println!();
    let sets = store.list_snapshot_sets().await?;
    if sets.is_empty() {
        println!("Snapshots: none");
    } else {
        let list: Vec<&str> = sets.iter().map(|s| s.timestamp.as_str()).collect();
        println!("Snapshots: {}", list.join(", "));
    }

    let verifier = BackupVerifier::new(artifact_store(config), config.backup.artifact_prefix.clone());
    let max_age = chrono::Duration::hours(i64::from(config.backup.max_age_hours));
    match verifier.verify(max_age, chrono::Utc::now()).await {
        Ok(v) if v.passed => println!("Backup:    ✓ {}", v.reason),
        Ok(v) => println!("Backup:    ✗ {}", v.reason),
        Err(e) => println!("Backup:    ✗ {e}"),
    }

    Ok(())
}
