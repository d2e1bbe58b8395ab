//! Shared fixtures: an in-memory catalog fake and a temp store with a fresh
//! offsite backup.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use reelsync::clients::tmdb::{ChangedEntry, ChangesPage, MovieDetails, TvDetails};
use reelsync::clients::{Catalog, CatalogError};
use reelsync::config::Config;
use reelsync::db::Store;
use reelsync::domain::{CatalogId, DateWindow, EntityKind};
use reelsync::services::backup::artifact_name;
use reelsync::services::{DirectoryArtifactStore, RetryPolicy, RunCoordinator};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 3, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> NaiveDate {
    (now() - Duration::days(days)).date_naive()
}

#[derive(Default)]
pub struct FakeCatalog {
    changes: Vec<(EntityKind, NaiveDate, i64)>,
    movies: HashMap<i64, MovieDetails>,
    shows: HashMap<i64, TvDetails>,
    failing_feeds: Vec<EntityKind>,
    /// Remaining 503 responses per movie id.
    flaky: Mutex<HashMap<i64, u32>>,
    pub change_calls: Mutex<Vec<(EntityKind, DateWindow)>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_movie(mut self, changed_on: NaiveDate, details: MovieDetails) -> Self {
        self.changes.push((EntityKind::Movie, changed_on, details.id));
        self.movies.insert(details.id, details);
        self
    }

    pub fn with_show(mut self, changed_on: NaiveDate, details: TvDetails) -> Self {
        self.changes.push((EntityKind::Tv, changed_on, details.id));
        self.shows.insert(details.id, details);
        self
    }

    /// Lists `id` in the feed. Without registered details the id reads as
    /// removed upstream.
    pub fn with_change(mut self, kind: EntityKind, changed_on: NaiveDate, id: i64) -> Self {
        self.changes.push((kind, changed_on, id));
        self
    }

    pub fn with_flaky_movie(self, id: i64, failures: u32) -> Self {
        self.flaky.lock().unwrap().insert(id, failures);
        self
    }

    pub fn with_failing_feed(mut self, kind: EntityKind) -> Self {
        self.failing_feeds.push(kind);
        self
    }

    pub fn calls_for(&self, kind: EntityKind) -> Vec<DateWindow> {
        self.change_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, w)| *w)
            .collect()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn changes(
        &self,
        kind: EntityKind,
        window: DateWindow,
        page: u32,
    ) -> Result<ChangesPage, CatalogError> {
        self.change_calls.lock().unwrap().push((kind, window));
        if self.failing_feeds.contains(&kind) {
            return Err(CatalogError::Status {
                status: 401,
                body: "invalid api key".into(),
                retry_after: None,
            });
        }

        let results: Vec<ChangedEntry> = if page == 1 {
            self.changes
                .iter()
                .filter(|(k, day, _)| *k == kind && *day >= window.start && *day <= window.end)
                .map(|(_, _, id)| ChangedEntry {
                    id: *id,
                    adult: Some(false),
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(ChangesPage {
            total_results: results.len() as u64,
            results,
            page,
            total_pages: 1,
        })
    }

    async fn movie(&self, id: CatalogId) -> Result<Option<MovieDetails>, CatalogError> {
        if let Some(left) = self.flaky.lock().unwrap().get_mut(&id.value())
            && *left > 0
        {
            *left -= 1;
            return Err(CatalogError::Status {
                status: 503,
                body: "busy".into(),
                retry_after: None,
            });
        }
        Ok(self.movies.get(&id.value()).cloned())
    }

    async fn tv_show(&self, id: CatalogId) -> Result<Option<TvDetails>, CatalogError> {
        Ok(self.shows.get(&id.value()).cloned())
    }
}

pub fn movie(id: i64, title: &str) -> MovieDetails {
    MovieDetails {
        id,
        title: Some(title.to_string()),
        release_date: Some("2024-05-01".to_string()),
        ..Default::default()
    }
}

pub fn show(id: i64, name: &str) -> TvDetails {
    TvDetails {
        id,
        name: Some(name.to_string()),
        first_air_date: Some(String::new()),
        ..Default::default()
    }
}

pub struct Harness {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub store: Store,
    pub artifacts: Arc<DirectoryArtifactStore>,
}

impl Harness {
    /// Temp store plus an artifact directory holding one backup a day old.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let root = std::env::temp_dir().join(format!("reelsync-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();

        let mut config = Config::default();
        config.general.database_path = format!("sqlite:{}", root.join("catalog.db").display());
        config.update.preview_dir = root.join("previews").display().to_string();
        config.backup.artifact_dir = root.join("backups").display().to_string();
        tweak(&mut config);

        let store = Store::new(&config.general.database_path)
            .await
            .expect("Failed to open test store");
        let artifacts = Arc::new(DirectoryArtifactStore::new(&config.backup.artifact_dir));

        let harness = Self {
            root,
            config: Arc::new(config),
            store,
            artifacts,
        };
        harness.place_backup(now() - Duration::days(1));
        harness
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.backup.artifact_dir)
    }

    pub fn place_backup(&self, at: DateTime<Utc>) {
        let dir = self.backup_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let name = artifact_name(&self.config.backup.artifact_prefix, at);
        std::fs::write(dir.join(name), b"SQLite format 3").unwrap();
    }

    pub fn clear_backups(&self) {
        std::fs::remove_dir_all(self.backup_dir()).ok();
    }

    pub fn coordinator(&self, catalog: Arc<FakeCatalog>) -> RunCoordinator {
        RunCoordinator::with_retry(
            Arc::clone(&self.config),
            self.store.clone(),
            catalog,
            self.artifacts.clone(),
            RetryPolicy::immediate(3),
        )
    }

    pub async fn count(&self, table: &str) -> u64 {
        self.store.row_count(table).await.unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.root).ok();
    }
}
