pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod domain;
pub mod entities;
pub mod models;
pub mod services;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, SnapshotCommands};
use clients::tmdb::TmdbClient;
pub use config::Config;
use services::{BackupJob, RunCoordinator, RunOptions, Scheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Init)) {
        if Config::create_default_if_missing()? {
            println!("✓ Config file created. Set tmdb.api_key in config.toml and run again.");
        } else {
            println!("config.toml already exists.");
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config);

    match cli.command {
        Some(Commands::Update {
            dry_run,
            sample,
            force_days,
            skip_backup_check,
        }) => {
            let options = RunOptions {
                dry_run,
                sample,
                force_days,
                skip_backup_check,
            };
            cli::cmd_update(&config, options).await
        }

        Some(Commands::Backup) => cli::cmd_backup(&config).await,

        Some(Commands::VerifyBackup) => cli::cmd_verify_backup(&config).await,

        Some(Commands::Snapshots { command }) => match command {
            SnapshotCommands::List => cli::cmd_snapshots_list(&config).await,
            SnapshotCommands::Create => cli::cmd_snapshots_create(&config).await,
            SnapshotCommands::Restore { timestamp } => {
                cli::cmd_snapshots_restore(&config, &timestamp).await
            }
        },

        Some(Commands::Status) => cli::cmd_status(&config).await,

        Some(Commands::Daemon) => run_daemon(config).await,

        Some(Commands::Init) => Ok(()),

        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.general.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    config.require_credentials()?;

    if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(
            "Prometheus metrics exporter listening on :{}",
            config.observability.metrics_port
        );
    }

    let config = Arc::new(config);
    let store = cli::open_store(&config).await?;
    store.ping().await?;

    let artifacts = cli::artifact_store(&config);
    let catalog = Arc::new(TmdbClient::new(&config.tmdb)?);

    let coordinator = Arc::new(RunCoordinator::new(
        Arc::clone(&config),
        store.clone(),
        catalog,
        Arc::clone(&artifacts),
    ));
    let backup = Arc::new(BackupJob::new(store, artifacts, config.backup.clone()));

    info!("Starting reelsync daemon");
    Scheduler::new(coordinator, backup, config.scheduler.clone())
        .start()
        .await
}
