use crate::models::{MovieBundle, TvBundle};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::entities::{movie_cast, movies, tv_show_cast, tv_shows};

pub mod migrator;
pub mod repositories;

pub use repositories::catalog::UpsertCounts;
pub use repositories::snapshot::{
    SnapshotSet, snapshot_table_name, validate_identifier, validate_table_set,
};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file {path_str}"))?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn catalog_repo(&self) -> repositories::catalog::CatalogRepository {
        repositories::catalog::CatalogRepository::new(self.conn.clone())
    }

    fn checkpoint_repo(&self) -> repositories::checkpoint::CheckpointRepository {
        repositories::checkpoint::CheckpointRepository::new(self.conn.clone())
    }

    fn snapshot_repo(&self) -> repositories::snapshot::SnapshotRepository {
        repositories::snapshot::SnapshotRepository::new(self.conn.clone())
    }

    pub async fn upsert_movies(
        &self,
        bundles: &[MovieBundle],
        prune_stale: bool,
    ) -> Result<UpsertCounts> {
        self.catalog_repo().upsert_movies(bundles, prune_stale).await
    }

    pub async fn upsert_tv_shows(
        &self,
        bundles: &[TvBundle],
        prune_stale: bool,
    ) -> Result<UpsertCounts> {
        self.catalog_repo().upsert_tv_shows(bundles, prune_stale).await
    }

    pub async fn get_movie(&self, id: i64) -> Result<Option<movies::Model>> {
        self.catalog_repo().get_movie(id).await
    }

    pub async fn get_tv_show(&self, id: i64) -> Result<Option<tv_shows::Model>> {
        self.catalog_repo().get_tv_show(id).await
    }

    pub async fn get_movie_cast(&self, movie_id: i64) -> Result<Vec<movie_cast::Model>> {
        self.catalog_repo().get_movie_cast(movie_id).await
    }

    pub async fn get_tv_show_cast(&self, tv_id: i64) -> Result<Vec<tv_show_cast::Model>> {
        self.catalog_repo().get_tv_show_cast(tv_id).await
    }

    pub async fn load_checkpoint(&self, job_name: &str) -> Result<Option<DateTime<Utc>>> {
        self.checkpoint_repo().load(job_name).await
    }

    pub async fn save_checkpoint(&self, job_name: &str, last_run: DateTime<Utc>) -> Result<()> {
        self.checkpoint_repo().save(job_name, last_run).await
    }

    pub async fn list_snapshot_sets(&self) -> Result<Vec<SnapshotSet>> {
        self.snapshot_repo().list_sets().await
    }

    pub async fn create_snapshot_set(
        &self,
        live_tables: &[String],
        timestamp: &str,
    ) -> Result<Vec<String>> {
        self.snapshot_repo().create_set(live_tables, timestamp).await
    }

    pub async fn drop_snapshot_sets(&self, sets: &[SnapshotSet]) -> Result<usize> {
        self.snapshot_repo().drop_sets(sets).await
    }

    pub async fn restore_snapshot_set(&self, timestamp: &str) -> Result<SnapshotSet> {
        self.snapshot_repo().restore_set(timestamp).await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        self.snapshot_repo().table_exists(table).await
    }

    pub async fn row_count(&self, table: &str) -> Result<u64> {
        self.snapshot_repo().row_count(table).await
    }

    /// Row counts of the given tables, in order.
    pub async fn table_counts(&self, tables: &[&str]) -> Result<Vec<(String, u64)>> {
        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            counts.push(((*table).to_string(), self.row_count(table).await?));
        }
        Ok(counts)
    }

    /// Writes a consistent copy of the whole database to `dest`.
    pub async fn vacuum_into(&self, dest: &Path) -> Result<()> {
        let dest_str = dest
            .to_str()
            .with_context(|| format!("Non UTF-8 backup path: {}", dest.display()))?;
        let escaped = dest_str.replace('\'', "''");
        self.conn
            .execute_unprepared(&format!("VACUUM INTO '{escaped}'"))
            .await
            .with_context(|| format!("VACUUM INTO {dest_str} failed"))?;
        Ok(())
    }
}
