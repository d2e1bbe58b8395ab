//! Offsite backups.
//!
//! [`BackupJob`] uploads a consistent copy of the store to an
//! [`ArtifactStore`] and applies version retention. [`BackupVerifier`] is the
//! read-only safety gate consulted before any mutating update run.

use crate::config::BackupConfig;
use crate::constants::backup::{EXTENSION, TIMESTAMP_FORMAT};
use crate::db::Store;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<sea_orm::DbErr> for BackupError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for BackupError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// One stored artifact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Versioned storage for backup artifacts.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ArtifactInfo>, BackupError>;

    /// Uploads `source` as `name` and returns the stored size.
    async fn put(&self, source: &Path, name: &str) -> Result<u64, BackupError>;

    async fn delete(&self, name: &str) -> Result<(), BackupError>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Artifact store over a directory, typically a mounted bucket or remote volume.
pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BackupError> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.contains("..")
        {
            return Err(BackupError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait::async_trait]
impl ArtifactStore for DirectoryArtifactStore {
    async fn list(&self) -> Result<Vec<ArtifactInfo>, BackupError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            artifacts.push(ArtifactInfo {
                name,
                size: metadata.len(),
                modified: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }

        Ok(artifacts)
    }

    async fn put(&self, source: &Path, name: &str) -> Result<u64, BackupError> {
        let dest = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        // Readers never observe a half-written artifact.
        let partial = self.root.join(format!(".{name}.partial"));
        let size = tokio::fs::copy(source, &partial).await?;
        tokio::fs::rename(&partial, &dest).await?;
        Ok(size)
    }

    async fn delete(&self, name: &str) -> Result<(), BackupError> {
        let path = self.path_for(name)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

#[must_use]
pub fn artifact_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}_{}.{EXTENSION}", at.format(TIMESTAMP_FORMAT))
}

/// Creation time of an artifact: the timestamp embedded in its name, or the
/// store's modification time when the name carries none. `None` when the
/// artifact does not belong to `prefix`.
#[must_use]
pub fn artifact_time(prefix: &str, artifact: &ArtifactInfo) -> Option<DateTime<Utc>> {
    let stem = artifact
        .name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(EXTENSION)?
        .strip_suffix('.')?;

    Some(
        NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT)
            .map_or(artifact.modified, |t| t.and_utc()),
    )
}

/// Outcome of the offsite backup gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub passed: bool,
    pub artifact: Option<String>,
    pub age: Option<chrono::Duration>,
    pub reason: String,
}

pub struct BackupVerifier {
    artifacts: Arc<dyn ArtifactStore>,
    prefix: String,
}

impl BackupVerifier {
    #[must_use]
    pub fn new(artifacts: Arc<dyn ArtifactStore>, prefix: impl Into<String>) -> Self {
        Self {
            artifacts,
            prefix: prefix.into(),
        }
    }

    /// Passes when the newest non-empty artifact is younger than `max_age`.
    pub async fn verify(
        &self,
        max_age: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<GateVerdict, BackupError> {
        let newest = self
            .artifacts
            .list()
            .await?
            .into_iter()
            .filter(|a| a.size > 0)
            .filter_map(|a| artifact_time(&self.prefix, &a).map(|t| (a, t)))
            .max_by_key(|(_, t)| *t);

        let Some((artifact, created)) = newest else {
            return Ok(GateVerdict {
                passed: false,
                artifact: None,
                age: None,
                reason: format!(
                    "no non-empty backup with prefix {:?} in {}",
                    self.prefix,
                    self.artifacts.location()
                ),
            });
        };

        if created > now {
            warn!(
                event = "backup_from_future",
                artifact = %artifact.name,
                created = %created,
                "Newest backup is timestamped after the current time"
            );
            return Ok(GateVerdict {
                passed: false,
                reason: format!(
                    "{} is timestamped in the future ({created})",
                    artifact.name
                ),
                artifact: Some(artifact.name),
                age: None,
            });
        }

        let age = now - created;
        let passed = age <= max_age;
        let reason = if passed {
            format!("{} is {}h old", artifact.name, age.num_hours())
        } else {
            format!(
                "{} is {}h old, limit is {}h",
                artifact.name,
                age.num_hours(),
                max_age.num_hours()
            )
        };

        Ok(GateVerdict {
            passed,
            artifact: Some(artifact.name),
            age: Some(age),
            reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub artifact: String,
    pub size: u64,
    pub deleted: Vec<String>,
}

pub struct BackupJob {
    store: Store,
    artifacts: Arc<dyn ArtifactStore>,
    config: BackupConfig,
}

impl BackupJob {
    #[must_use]
    pub fn new(store: Store, artifacts: Arc<dyn ArtifactStore>, config: BackupConfig) -> Self {
        Self {
            store,
            artifacts,
            config,
        }
    }

    /// Uploads a consistent copy of the store, then applies retention.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<BackupReport, BackupError> {
        let name = artifact_name(&self.config.artifact_prefix, now);
        let staging = std::env::temp_dir().join(format!("reelsync-{}.db", uuid::Uuid::new_v4()));

        let uploaded = self.upload(&staging, &name).await;
        if let Err(e) = tokio::fs::remove_file(&staging).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging copy");
        }
        let size = uploaded?;

        info!(
            event = "backup_uploaded",
            artifact = %name,
            size,
            location = %self.artifacts.location(),
            "Backup artifact uploaded"
        );

        let deleted = self.apply_retention(now).await?;
        Ok(BackupReport {
            artifact: name,
            size,
            deleted,
        })
    }

    async fn upload(&self, staging: &Path, name: &str) -> Result<u64, BackupError> {
        self.store.vacuum_into(staging).await?;
        self.artifacts.put(staging, name).await
    }

    /// Deletes versions outside the retention policy and returns their names.
    pub async fn apply_retention(&self, now: DateTime<Utc>) -> Result<Vec<String>, BackupError> {
        let versions: Vec<(String, DateTime<Utc>)> = self
            .artifacts
            .list()
            .await?
            .into_iter()
            .filter_map(|a| artifact_time(&self.config.artifact_prefix, &a).map(|t| (a.name, t)))
            .collect();

        let doomed = plan_retention(
            versions,
            self.config.keep_versions,
            chrono::Duration::days(i64::from(self.config.retention_days)),
            now,
        );

        for name in &doomed {
            self.artifacts.delete(name).await?;
            info!(event = "backup_pruned", artifact = %name, "Old backup version deleted");
        }
        Ok(doomed)
    }
}

/// The newest version is always kept. Of the older ones, at most
/// `keep_versions` younger than `retention` survive.
#[must_use]
pub fn plan_retention(
    mut versions: Vec<(String, DateTime<Utc>)>,
    keep_versions: usize,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    versions.sort_by(|a, b| b.1.cmp(&a.1));

    let mut kept = 0;
    let mut doomed = Vec::new();
    for (name, created) in versions.into_iter().skip(1) {
        if kept < keep_versions && now - created < retention {
            kept += 1;
        } else {
            doomed.push(name);
        }
    }
    doomed
}
