use crate::clients::{Catalog, CatalogError};
use crate::domain::{CatalogId, EntityKind};
use crate::models::{FetchedRecord, MovieBundle, TvBundle};
use crate::services::retry::RetryPolicy;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of fetching one id.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(FetchedRecord),
    /// Gone upstream (404).
    Removed(CatalogId),
    Failed { id: CatalogId, error: CatalogError },
}

/// Outcomes of one kind, split by variant. Records are ordered by id.
#[derive(Debug, Default)]
pub struct FetchResults {
    pub records: Vec<FetchedRecord>,
    pub removed: Vec<CatalogId>,
    pub failed: Vec<(CatalogId, String)>,
}

pub struct RecordFetcher {
    catalog: Arc<dyn Catalog>,
    retry: RetryPolicy,
    workers: usize,
}

impl RecordFetcher {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, retry: RetryPolicy, workers: usize) -> Self {
        Self {
            catalog,
            retry,
            workers: workers.max(1),
        }
    }

    pub async fn fetch_one(&self, kind: EntityKind, id: CatalogId) -> FetchOutcome {
        let result = match kind {
            EntityKind::Movie => self
                .retry
                .run("movie", || self.catalog.movie(id))
                .await
                .map(|d| d.map(|d| FetchedRecord::Movie(MovieBundle::from(d)))),
            EntityKind::Tv => self
                .retry
                .run("tv", || self.catalog.tv_show(id))
                .await
                .map(|d| d.map(|d| FetchedRecord::Tv(TvBundle::from(d)))),
        };

        match result {
            Ok(Some(record)) => {
                debug!(kind = %kind, id = %id, associations = record.association_count(), "Fetched record");
                FetchOutcome::Fetched(record)
            }
            Ok(None) => {
                debug!(kind = %kind, id = %id, "Record removed upstream, skipping");
                FetchOutcome::Removed(id)
            }
            Err(error) => {
                warn!(kind = %kind, id = %id, error = %error, "Failed to fetch record");
                FetchOutcome::Failed { id, error }
            }
        }
    }

    /// Fetches every id with at most `workers` requests in flight.
    pub async fn fetch_all(&self, kind: EntityKind, ids: &[CatalogId]) -> FetchResults {
        let outcomes: Vec<FetchOutcome> = stream::iter(ids.iter().copied())
            .map(|id| self.fetch_one(kind, id))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut results = FetchResults::default();
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Fetched(record) => results.records.push(record),
                FetchOutcome::Removed(id) => results.removed.push(id),
                FetchOutcome::Failed { id, error } => results.failed.push((id, error.to_string())),
            }
        }

        results.records.sort_by_key(FetchedRecord::id);
        results.removed.sort_unstable();
        results.failed.sort_by_key(|(id, _)| *id);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::tmdb::{
        AggregateCastMember, AggregateCredits, CastRole, ChangesPage, MovieDetails, TvDetails,
    };
    use crate::domain::DateWindow;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct DetailFake {
        /// Transient failures left before an id succeeds.
        flaky: Mutex<HashMap<i64, u32>>,
        missing: Vec<i64>,
        broken: Vec<i64>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl DetailFake {
        async fn enter(&self, id: i64) -> Result<bool, CatalogError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.broken.contains(&id) {
                return Err(CatalogError::Decode("unexpected payload".into()));
            }
            if let Some(left) = self.flaky.lock().unwrap().get_mut(&id)
                && *left > 0
            {
                *left -= 1;
                return Err(CatalogError::Transport("connection reset".into()));
            }
            Ok(!self.missing.contains(&id))
        }
    }

    #[async_trait::async_trait]
    impl Catalog for DetailFake {
        async fn changes(
            &self,
            _kind: EntityKind,
            _window: DateWindow,
            _page: u32,
        ) -> Result<ChangesPage, CatalogError> {
            Ok(ChangesPage::default())
        }

        async fn movie(&self, id: CatalogId) -> Result<Option<MovieDetails>, CatalogError> {
            Ok(self.enter(id.value()).await?.then(|| MovieDetails {
                id: id.value(),
                title: Some(format!("Movie {id}")),
                ..Default::default()
            }))
        }

        async fn tv_show(&self, id: CatalogId) -> Result<Option<TvDetails>, CatalogError> {
            Ok(self.enter(id.value()).await?.then(|| TvDetails {
                id: id.value(),
                aggregate_credits: Some(AggregateCredits {
                    cast: vec![AggregateCastMember {
                        id: 1,
                        roles: vec![
                            CastRole {
                                character: Some("A".into()),
                                ..Default::default()
                            },
                            CastRole {
                                character: Some("B".into()),
                                ..Default::default()
                            },
                        ],
                        ..Default::default()
                    }],
                    crew: vec![],
                }),
                ..Default::default()
            }))
        }
    }

    fn ids(raw: &[i64]) -> Vec<CatalogId> {
        raw.iter().copied().map(CatalogId::new).collect()
    }

    #[tokio::test]
    async fn outcomes_are_split_by_variant() {
        let fake = Arc::new(DetailFake {
            flaky: Mutex::new(HashMap::from([(2, 1)])),
            missing: vec![3],
            broken: vec![4],
            ..Default::default()
        });
        let fetcher = RecordFetcher::new(fake, RetryPolicy::immediate(3), 4);

        let results = fetcher
            .fetch_all(EntityKind::Movie, &ids(&[4, 3, 2, 1]))
            .await;

        let fetched: Vec<i64> = results.records.iter().map(|r| r.id().value()).collect();
        assert_eq!(fetched, vec![1, 2]);
        assert_eq!(results.removed, ids(&[3]));
        assert_eq!(results.failed.len(), 1);
        assert_eq!(results.failed[0].0, CatalogId::new(4));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_id() {
        let fake = Arc::new(DetailFake {
            flaky: Mutex::new(HashMap::from([(8, 5)])),
            ..Default::default()
        });
        let fetcher = RecordFetcher::new(fake, RetryPolicy::immediate(3), 2);

        let outcome = fetcher.fetch_one(EntityKind::Movie, CatalogId::new(8)).await;
        assert!(matches!(outcome, FetchOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn tv_roles_are_flattened() {
        let fake = Arc::new(DetailFake::default());
        let fetcher = RecordFetcher::new(fake, RetryPolicy::immediate(1), 1);

        let FetchOutcome::Fetched(record) = fetcher.fetch_one(EntityKind::Tv, CatalogId::new(10)).await
        else {
            panic!("expected a fetched record");
        };
        assert_eq!(record.kind(), EntityKind::Tv);
        assert_eq!(record.association_count(), 2);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let fake = Arc::new(DetailFake::default());
        let fetcher = RecordFetcher::new(Arc::clone(&fake) as Arc<dyn Catalog>, RetryPolicy::immediate(1), 3);

        let all: Vec<i64> = (1..=20).collect();
        let results = fetcher.fetch_all(EntityKind::Movie, &ids(&all)).await;

        assert_eq!(results.records.len(), 20);
        assert!(fake.peak.load(Ordering::SeqCst) <= 3);
    }
}
