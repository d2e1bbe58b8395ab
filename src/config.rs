use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub tmdb: TmdbConfig,

    pub update: UpdateConfig,

    pub retry: RetryConfig,

    pub snapshot: SnapshotConfig,

    pub backup: BackupConfig,

    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/tmdb.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub base_url: String,

    /// v3 API key, sent as the `api_key` query parameter.
    /// Overridden by the `TMDB_API_KEY` environment variable.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// v4 read access token, sent as a bearer token when set.
    /// Overridden by the `TMDB_READ_ACCESS_TOKEN` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_access_token: Option<String>,

    pub language: String,

    pub request_timeout_seconds: u32,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: String::new(),
            read_access_token: None,
            language: "en-US".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Row key in `last_updates` holding this job's checkpoint.
    pub job_name: String,

    /// Lookback used when no checkpoint has been recorded yet.
    pub default_lookback_days: u32,

    /// Maximum span of one change-feed query. TMDB rejects more than 14.
    pub max_window_days: u32,

    pub max_changes_per_kind: usize,

    pub fetch_workers: usize,

    /// Entities per upsert transaction.
    pub batch_size: usize,

    /// Remove credits of a refreshed entity that are no longer listed upstream.
    pub prune_stale_credits: bool,

    pub preview_dir: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            job_name: "weekly_update".to_string(),
            default_lookback_days: 7,
            max_window_days: 14,
            max_changes_per_kind: 2000,
            fetch_workers: 15,
            batch_size: 200,
            prune_stale_credits: true,
            preview_dir: "previews".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,

    pub tables: Vec<String>,

    /// Number of snapshot sets kept after rotation (current + previous = 2).
    pub retain_sets: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tables: crate::constants::tables::LIVE
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            retain_sets: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory of the offsite artifact store (a mounted bucket or remote volume).
    pub artifact_dir: String,

    pub artifact_prefix: String,

    /// Newest artifact must be younger than this for a mutating run to proceed.
    pub max_age_hours: u32,

    /// Prior versions kept besides the current artifact.
    pub keep_versions: usize,

    /// Prior versions older than this are deleted regardless of `keep_versions`.
    pub retention_days: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            artifact_dir: "backups".to_string(),
            artifact_prefix: "tmdb_backup".to_string(),
            max_age_hours: 192,
            keep_versions: 4,
            retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub cron_expression: String,

    /// Run the offsite backup job after every successful update.
    pub backup_after_update: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: "0 0 3 * * Mon".to_string(),
            backup_after_update: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_port: 9464,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("TMDB_API_KEY")
            && !key.is_empty()
        {
            self.tmdb.api_key = key;
        }

        if let Ok(token) = std::env::var("TMDB_READ_ACCESS_TOKEN")
            && !token.is_empty()
        {
            self.tmdb.read_access_token = Some(token);
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("reelsync").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".reelsync").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.update.max_window_days == 0 || self.update.max_window_days > 14 {
            anyhow::bail!("update.max_window_days must be between 1 and 14");
        }

        let max_lookback = crate::constants::limits::MAX_LOOKBACK_DAYS;
        let lookback = self.update.default_lookback_days;
        if lookback == 0 || lookback > max_lookback {
            anyhow::bail!("update.default_lookback_days must be between 1 and {max_lookback}");
        }

        if self.update.fetch_workers == 0 {
            anyhow::bail!("update.fetch_workers must be > 0");
        }

        if self.update.batch_size == 0 {
            anyhow::bail!("update.batch_size must be > 0");
        }

        if self.update.max_changes_per_kind == 0 {
            anyhow::bail!("update.max_changes_per_kind must be > 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be >= 1");
        }

        if self.snapshot.enabled && self.snapshot.retain_sets == 0 {
            anyhow::bail!("snapshot.retain_sets must be >= 1 when snapshots are enabled");
        }

        if self.snapshot.enabled {
            crate::db::validate_table_set(&self.snapshot.tables)
                .context("snapshot.tables is not a restorable set")?;
        }

        if self.backup.artifact_prefix.is_empty() {
            anyhow::bail!("backup.artifact_prefix cannot be empty");
        }

        Ok(())
    }

    /// Fails when no TMDB credential is configured; only commands that call
    /// the API need one.
    pub fn require_credentials(&self) -> Result<()> {
        if self.tmdb.api_key.is_empty() && self.tmdb.read_access_token.is_none() {
            anyhow::bail!(
                "No TMDB credential configured: set TMDB_API_KEY or tmdb.api_key in config.toml"
            );
        }
        Ok(())
    }
}
