//! Rollback snapshots of the live catalog tables.

use crate::constants::snapshot::TIMESTAMP_FORMAT;
use crate::db::{SnapshotSet, Store, validate_table_set};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid snapshot request: {0}")]
    Invalid(String),

    #[error("Snapshot copy failed: {0}")]
    Copy(String),

    #[error("Snapshot set not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for SnapshotError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for SnapshotError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// A freshly committed snapshot set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub timestamp: String,
    pub tables: Vec<String>,
    /// Timestamps of older sets removed by rotation.
    pub pruned: Vec<String>,
}

pub struct SnapshotManager {
    store: Store,
    tables: Vec<String>,
    retain_sets: usize,
}

impl SnapshotManager {
    #[must_use]
    pub fn new(store: Store, tables: Vec<String>, retain_sets: usize) -> Self {
        Self {
            store,
            tables,
            retain_sets: retain_sets.max(1),
        }
    }

    #[must_use]
    pub fn timestamp_for(at: DateTime<Utc>) -> String {
        at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Copies every configured table, then rotates old sets.
    ///
    /// The copy is all-or-nothing. Rotation runs only after the copy has
    /// committed; a rotation failure leaves an extra set behind and is logged
    /// without failing the snapshot.
    pub async fn snapshot(&self, at: DateTime<Utc>) -> Result<SnapshotOutcome, SnapshotError> {
        if self.tables.is_empty() {
            return Err(SnapshotError::Invalid("no tables configured".into()));
        }
        validate_table_set(&self.tables).map_err(|e| SnapshotError::Invalid(e.to_string()))?;

        let timestamp = Self::timestamp_for(at);
        if self
            .list()
            .await?
            .iter()
            .any(|set| set.timestamp == timestamp)
        {
            return Err(SnapshotError::Invalid(format!(
                "snapshot set {timestamp} already exists"
            )));
        }

        let created = self
            .store
            .create_snapshot_set(&self.tables, &timestamp)
            .await
            .map_err(|e| SnapshotError::Copy(format!("{e:#}")))?;

        info!(
            event = "snapshot_created",
            timestamp = %timestamp,
            tables = created.len(),
            "Snapshot set created"
        );

        let pruned = match self.prune().await {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "Snapshot rotation failed; older sets kept");
                Vec::new()
            }
        };

        Ok(SnapshotOutcome {
            timestamp,
            tables: self.tables.clone(),
            pruned,
        })
    }

    /// Retained sets, newest first.
    pub async fn list(&self) -> Result<Vec<SnapshotSet>, SnapshotError> {
        Ok(self.store.list_snapshot_sets().await?)
    }

    /// Drops every set beyond the newest `retain_sets`.
    pub async fn prune(&self) -> Result<Vec<String>, SnapshotError> {
        let sets = self.list().await?;
        let stale: Vec<SnapshotSet> = sets.into_iter().skip(self.retain_sets).collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let dropped = self.store.drop_snapshot_sets(&stale).await?;
        let timestamps: Vec<String> = stale.into_iter().map(|s| s.timestamp).collect();
        info!(
            event = "snapshot_pruned",
            sets = timestamps.len(),
            tables = dropped,
            "Old snapshot sets dropped"
        );
        Ok(timestamps)
    }

    /// Replaces live table contents with the set taken at `timestamp`.
    pub async fn restore(&self, timestamp: &str) -> Result<SnapshotSet, SnapshotError> {
        let Some(found) = self
            .list()
            .await?
            .into_iter()
            .find(|set| set.timestamp == timestamp)
        else {
            return Err(SnapshotError::NotFound(timestamp.to_string()));
        };
        validate_table_set(&found.tables).map_err(|e| {
            SnapshotError::Invalid(format!("set {timestamp} is incomplete: {e}"))
        })?;

        let set = self.store.restore_snapshot_set(timestamp).await?;
        info!(
            event = "snapshot_restored",
            timestamp = %timestamp,
            tables = set.tables.len(),
            "Live tables restored from snapshot"
        );
        Ok(set)
    }
}
