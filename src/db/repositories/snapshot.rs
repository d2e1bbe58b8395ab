//! Rollback copies of live tables.
//!
//! A snapshot set is one `CREATE TABLE .. AS SELECT` copy per live table, all
//! sharing a timestamp suffix: `rollback_<table>_<YYYYMMDD_HHMMSS>`. The set is
//! discovered from `sqlite_master`, so no bookkeeping table is needed.

use crate::constants::{snapshot, tables};
use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, Statement, TransactionTrait,
};
use std::collections::BTreeMap;

/// Tables sharing one snapshot timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSet {
    pub timestamp: String,
    /// Live table names, not the prefixed copies.
    pub tables: Vec<String>,
}

impl SnapshotSet {
    #[must_use]
    pub fn taken_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, snapshot::TIMESTAMP_FORMAT).ok()
    }
}

pub struct SnapshotRepository {
    conn: DatabaseConnection,
}

impl SnapshotRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// All snapshot sets, newest first.
    pub async fn list_sets(&self) -> Result<Vec<SnapshotSet>> {
        let names = self.table_names().await?;
        let mut sets: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for name in names {
            if let Some((table, ts)) = parse_snapshot_name(&name) {
                sets.entry(ts.to_string()).or_default().push(table.to_string());
            }
        }

        Ok(sets
            .into_iter()
            .rev()
            .map(|(timestamp, mut tables)| {
                tables.sort_by_key(|t| table_rank(t));
                SnapshotSet { timestamp, tables }
            })
            .collect())
    }

    /// Copies every table in one transaction. Any failure rolls back all
    /// copies made so far.
    pub async fn create_set(&self, live_tables: &[String], timestamp: &str) -> Result<Vec<String>> {
        validate_timestamp(timestamp)?;
        validate_table_set(live_tables)?;

        let txn = self.conn.begin().await?;
        let mut created = Vec::with_capacity(live_tables.len());

        for table in live_tables {
            let copy = snapshot_table_name(table, timestamp);
            txn.execute_unprepared(&format!(
                "CREATE TABLE \"{copy}\" AS SELECT * FROM \"{table}\""
            ))
            .await
            .with_context(|| format!("Failed to copy {table} into {copy}"))?;
            created.push(copy);
        }

        txn.commit().await?;
        Ok(created)
    }

    /// Drops whole sets in one transaction. Returns the number of tables dropped.
    pub async fn drop_sets(&self, sets: &[SnapshotSet]) -> Result<usize> {
        if sets.is_empty() {
            return Ok(0);
        }

        let txn = self.conn.begin().await?;
        let mut dropped = 0;

        for set in sets {
            for table in &set.tables {
                let copy = snapshot_table_name(table, &set.timestamp);
                txn.execute_unprepared(&format!("DROP TABLE IF EXISTS \"{copy}\""))
                    .await?;
                dropped += 1;
            }
        }

        txn.commit().await?;
        Ok(dropped)
    }

    /// Replaces the contents of every live table in the set with its copy.
    pub async fn restore_set(&self, timestamp: &str) -> Result<SnapshotSet> {
        validate_timestamp(timestamp)?;
        let Some(set) = self
            .list_sets()
            .await?
            .into_iter()
            .find(|s| s.timestamp == timestamp)
        else {
            bail!("Snapshot set {timestamp} not found");
        };
        validate_table_set(&set.tables)
            .with_context(|| format!("Snapshot set {timestamp} cannot be restored"))?;

        let txn = self.conn.begin().await?;

        // Children first on delete, parents first on insert.
        for table in set.tables.iter().rev() {
            txn.execute_unprepared(&format!("DELETE FROM \"{table}\""))
                .await
                .with_context(|| format!("Failed to clear {table}"))?;
        }
        for table in &set.tables {
            restore_table(&txn, table, timestamp).await?;
        }

        txn.commit().await?;
        Ok(set)
    }

    pub async fn row_count(&self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        let backend = self.conn.get_database_backend();
        let row = self
            .conn
            .query_one(Statement::from_string(
                backend,
                format!("SELECT COUNT(*) AS count FROM \"{table}\""),
            ))
            .await?
            .context("COUNT returned no row")?;
        let count: i64 = row.try_get("", "count")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.table_names().await?.iter().any(|t| t == table))
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let backend = self.conn.get_database_backend();
        let rows = self
            .conn
            .query_all(Statement::from_string(
                backend,
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string(),
            ))
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String>("", "name").map_err(Into::into))
            .collect()
    }
}

async fn restore_table(txn: &DatabaseTransaction, table: &str, timestamp: &str) -> Result<()> {
    let copy = snapshot_table_name(table, timestamp);
    txn.execute_unprepared(&format!("INSERT INTO \"{table}\" SELECT * FROM \"{copy}\""))
        .await
        .with_context(|| format!("Failed to restore {table} from {copy}"))?;
    Ok(())
}

#[must_use]
pub fn snapshot_table_name(table: &str, timestamp: &str) -> String {
    format!("{}{table}_{timestamp}", snapshot::NAMESPACE_PREFIX)
}

/// Splits `rollback_<table>_<ts>` into `(table, ts)`.
fn parse_snapshot_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(snapshot::NAMESPACE_PREFIX)?;
    if rest.len() < snapshot::TIMESTAMP_LEN + 2 {
        return None;
    }
    let (head, ts) = rest.split_at(rest.len() - snapshot::TIMESTAMP_LEN);
    let table = head.strip_suffix('_')?;
    if table.is_empty() || validate_timestamp(ts).is_err() {
        return None;
    }
    Some((table, ts))
}

/// Position of a table in dependency order; unknown tables sort last.
fn table_rank(table: &str) -> usize {
    tables::LIVE
        .iter()
        .position(|t| *t == table)
        .unwrap_or(tables::LIVE.len())
}

/// Table names are interpolated into DDL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid || name.starts_with(snapshot::NAMESPACE_PREFIX) {
        bail!("Invalid table name: {name:?}");
    }
    Ok(())
}

/// Every name must be a plain identifier, and cascading pairs must be
/// present together: clearing a parent table empties its children, so a set
/// holding only one side could not put the other back.
pub fn validate_table_set<S: AsRef<str>>(names: &[S]) -> Result<()> {
    for name in names {
        validate_identifier(name.as_ref())?;
    }
    let has = |table: &str| names.iter().any(|n| n.as_ref() == table);

    for (child, parent) in tables::CASCADES {
        match (has(child), has(parent)) {
            (true, false) => bail!("Table {child} requires its parent {parent} in the same set"),
            (false, true) => bail!("Table {parent} requires its dependent {child} in the same set"),
            _ => {}
        }
    }
    Ok(())
}

fn validate_timestamp(ts: &str) -> Result<()> {
    if ts.len() != snapshot::TIMESTAMP_LEN {
        bail!("Invalid snapshot timestamp: {ts:?}");
    }
    NaiveDateTime::parse_from_str(ts, snapshot::TIMESTAMP_FORMAT)
        .with_context(|| format!("Invalid snapshot timestamp: {ts:?}"))?;
    Ok(())
}
