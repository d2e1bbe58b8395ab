//! Update command handler

use super::{artifact_store, open_store};
use crate::clients::tmdb::TmdbClient;
use crate::config::Config;
use crate::services::{RunCoordinator, RunOptions, RunReport};
use std::sync::Arc;

pub async fn cmd_update(config: &Config, options: RunOptions) -> anyhow::Result<()> {
    config.require_credentials()?;

    let store = open_store(config).await?;
    let catalog = Arc::new(TmdbClient::new(&config.tmdb)?);
    let coordinator = RunCoordinator::new(
        Arc::new(config.clone()),
        store,
        catalog,
        artifact_store(config),
    );

    let report = coordinator.run(options).await;
    print_report(&report);

    if !report.is_success() {
        anyhow::bail!(
            "update run ended {} with {} failure(s)",
            report.state,
            report.failures.len()
        );
    }
    Ok(())
}

pub fn print_report(report: &RunReport) {
    let mode = if report.options.dry_run { " (dry run)" } else { "" };
    println!("Update run{mode}: {}", report.state);
    println!("{:-<60}", "");

    if let Some(gate) = &report.gate {
        println!("Backup gate: {gate}");
    }
    if let Some(ts) = &report.snapshot {
        println!("Snapshot:    {ts}");
    }

    for kind in &report.kinds {
        let window = kind
            .window
            .map_or_else(|| "-".to_string(), |w| w.to_string());
        println!();
        println!("[{}] window {window}", kind.kind);
        println!(
            "  resolved {}{} | processed {} | fetched {} | removed {} | failed {}",
            kind.resolved,
            if kind.truncated { " (capped)" } else { "" },
            kind.processed,
            kind.fetched,
            kind.removed.len(),
            kind.failed_ids.len()
        );
        if !kind.previews.is_empty() {
            for path in &kind.previews {
                println!("  preview: {}", path.display());
            }
        } else {
            println!(
                "  written: {} entities, {} credits, {} stale credits removed",
                kind.written.entities, kind.written.associations, kind.written.pruned
            );
        }
    }

    if !report.failures.is_empty() {
        println!();
        println!("Failures:");
        for failure in &report.failures {
            println!("  {failure}");
        }
    }

    println!();
    match report.checkpoint_written {
        Some(ts) => println!("Checkpoint advanced to {}", ts.to_rfc3339()),
        None => println!("Checkpoint unchanged"),
    }
}
