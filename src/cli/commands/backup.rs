//! Offsite backup command handlers

use super::{artifact_store, open_store};
use crate::config::Config;
use crate::services::{BackupJob, BackupVerifier};

pub async fn cmd_backup(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let job = BackupJob::new(store, artifact_store(config), config.backup.clone());

    let report = job.run(chrono::Utc::now()).await?;
    println!("✓ Uploaded {} ({} bytes)", report.artifact, report.size);
    if report.deleted.is_empty() {
        println!("  No old versions removed");
    } else {
        for name in &report.deleted {
            println!("  Removed old version {name}");
        }
    }
    Ok(())
}

pub async fn cmd_verify_backup(config: &Config) -> anyhow::Result<()> {
    let verifier = BackupVerifier::new(artifact_store(config), config.backup.artifact_prefix.clone());
    let max_age = chrono::Duration::hours(i64::from(config.backup.max_age_hours));

    let verdict = verifier.verify(max_age, chrono::Utc::now()).await?;
    if verdict.passed {
        println!("✓ Backup OK: {}", verdict.reason);
        Ok(())
    } else {
        anyhow::bail!("Backup check failed: {}", verdict.reason)
    }
}
