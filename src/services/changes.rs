//! Change-set resolution.
//!
//! The change feed only accepts windows of a limited span, so a longer window
//! is walked as consecutive sub-windows, oldest first. Ids are unioned across
//! sub-windows and capped per kind. When the cap truncates the list, the
//! returned `resolved_through` marks where the next run has to resume.

use crate::clients::{Catalog, CatalogError};
use crate::constants::limits::MAX_CHANGE_PAGES;
use crate::domain::{CatalogId, DateWindow, EntityKind};
use crate::services::retry::RetryPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolved identifiers of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub kind: EntityKind,
    pub window: DateWindow,
    pub ids: Vec<CatalogId>,
    /// Instant up to which every change is covered by `ids`.
    pub resolved_through: DateTime<Utc>,
    pub truncated: bool,
    /// Distinct ids reported by the feed before capping.
    pub distinct_seen: usize,
}

pub struct ChangeSetResolver {
    catalog: Arc<dyn Catalog>,
    retry: RetryPolicy,
    max_window_days: u32,
    max_changes: usize,
}

impl ChangeSetResolver {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        retry: RetryPolicy,
        max_window_days: u32,
        max_changes: usize,
    ) -> Self {
        Self {
            catalog,
            retry,
            max_window_days,
            max_changes,
        }
    }

    /// Resolves the ids of `kind` changed between `since` and `now`.
    ///
    /// A sub-window that would overflow the cap is walked again one day at a
    /// time; the first day that does not fit whole becomes `resolved_through`.
    /// Ids are dropped only when a single day alone exceeds the cap.
    pub async fn resolve(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ChangeSet, CatalogError> {
        let end = now.date_naive();
        let start = since.date_naive().min(end);
        let window = DateWindow::new(start, end)
            .ok_or_else(|| CatalogError::InvalidRequest(format!("empty window {start}..{end}")))?;

        let sub_windows = window.split(self.max_window_days);
        let mut taken = Taken::default();
        let mut cutoff: Option<DateTime<Utc>> = None;

        for sub in &sub_windows {
            let fresh = taken.fresh(self.fetch_window(kind, *sub).await?);
            if taken.ids.len() + fresh.len() <= self.max_changes {
                taken.extend(fresh);
                continue;
            }

            cutoff = self.take_by_day(kind, *sub, &mut taken, now).await?;
            if cutoff.is_some() {
                break;
            }
        }

        info!(
            kind = %kind,
            window = %window,
            sub_windows = sub_windows.len(),
            resolved = taken.ids.len(),
            truncated = cutoff.is_some(),
            "Resolved change set"
        );

        Ok(ChangeSet {
            kind,
            window,
            distinct_seen: taken.seen.len(),
            ids: taken.ids,
            resolved_through: cutoff.unwrap_or(now),
            truncated: cutoff.is_some(),
        })
    }

    /// Takes whole days of `sub` until one no longer fits under the cap and
    /// returns the instant the next run has to resume from. `None` when every
    /// day fitted after all.
    async fn take_by_day(
        &self,
        kind: EntityKind,
        sub: DateWindow,
        taken: &mut Taken,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, CatalogError> {
        for day in sub.start.iter_days().take_while(|d| *d <= sub.end) {
            let single = DateWindow {
                start: day,
                end: day,
            };
            let fresh = taken.fresh(self.fetch_window(kind, single).await?);
            if taken.ids.len() + fresh.len() <= self.max_changes {
                taken.extend(fresh);
                continue;
            }

            if taken.ids.is_empty() {
                let dropped = fresh.len() - self.max_changes;
                warn!(
                    kind = %kind,
                    day = %day,
                    cap = self.max_changes,
                    dropped,
                    "Changes of a single day exceed the cap; excess ids are skipped"
                );
                taken.extend(fresh.into_iter().take(self.max_changes));
                let next = day.succ_opt().map_or(now, start_of);
                return Ok(Some(next.min(now)));
            }

            info!(
                kind = %kind,
                cap = self.max_changes,
                resume_from = %day,
                "Change cap reached; remaining changes deferred to the next run"
            );
            return Ok(Some(start_of(day)));
        }

        Ok(None)
    }

    async fn fetch_window(
        &self,
        kind: EntityKind,
        window: DateWindow,
    ) -> Result<Vec<CatalogId>, CatalogError> {
        let mut ids = Vec::new();
        let mut page = 1;

        loop {
            let result = self
                .retry
                .run("changes", || self.catalog.changes(kind, window, page))
                .await?;

            debug!(
                kind = %kind,
                window = %window,
                page,
                total_pages = result.total_pages,
                results = result.results.len(),
                "Fetched change page"
            );

            let empty = result.results.is_empty();
            ids.extend(result.results.into_iter().map(|e| CatalogId::new(e.id)));

            if empty || page >= result.total_pages || page >= MAX_CHANGE_PAGES {
                break;
            }
            page += 1;
        }

        Ok(ids)
    }
}

/// Ids accepted so far, plus every distinct id the feed reported.
#[derive(Default)]
struct Taken {
    ids: Vec<CatalogId>,
    accepted: HashSet<CatalogId>,
    seen: HashSet<CatalogId>,
}

impl Taken {
    /// Not-yet-accepted ids of one feed response, ascending.
    fn fresh(&mut self, mut raw: Vec<CatalogId>) -> Vec<CatalogId> {
        self.seen.extend(raw.iter().copied());
        raw.sort_unstable();
        raw.dedup();
        raw.retain(|id| !self.accepted.contains(id));
        raw
    }

    fn extend(&mut self, ids: impl IntoIterator<Item = CatalogId>) {
        for id in ids {
            if self.accepted.insert(id) {
                self.ids.push(id);
            }
        }
    }
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::tmdb::{ChangedEntry, ChangesPage, MovieDetails, TvDetails};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Serves pre-seeded ids by change date, two per page.
    #[derive(Default)]
    struct FeedFake {
        by_day: BTreeMap<NaiveDate, Vec<i64>>,
        calls: Mutex<Vec<(DateWindow, u32)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Catalog for FeedFake {
        async fn changes(
            &self,
            _kind: EntityKind,
            window: DateWindow,
            page: u32,
        ) -> Result<ChangesPage, CatalogError> {
            self.calls.lock().unwrap().push((window, page));
            if self.fail {
                return Err(CatalogError::Status {
                    status: 401,
                    body: "unauthorized".into(),
                    retry_after: None,
                });
            }
            let all: Vec<i64> = self
                .by_day
                .range(window.start..=window.end)
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            let pages: Vec<_> = all.chunks(2).map(<[i64]>::to_vec).collect();
            let results = pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|id| ChangedEntry { id, adult: None })
                .collect();
            Ok(ChangesPage {
                results,
                page,
                total_pages: u32::try_from(pages.len()).unwrap(),
                total_results: all.len() as u64,
            })
        }

        async fn movie(&self, _id: CatalogId) -> Result<Option<MovieDetails>, CatalogError> {
            Ok(None)
        }

        async fn tv_show(&self, _id: CatalogId) -> Result<Option<TvDetails>, CatalogError> {
            Ok(None)
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        start_of(date(s)) + chrono::Duration::hours(12)
    }

    fn feed(days: &[(&str, &[i64])]) -> Arc<FeedFake> {
        let mut fake = FeedFake::default();
        for (day, ids) in days {
            fake.by_day.insert(date(day), ids.to_vec());
        }
        Arc::new(fake)
    }

    fn resolver(fake: Arc<FeedFake>, cap: usize) -> ChangeSetResolver {
        ChangeSetResolver::new(fake, RetryPolicy::immediate(2), 14, cap)
    }

    fn values(set: &ChangeSet) -> Vec<i64> {
        set.ids.iter().map(CatalogId::value).collect()
    }

    #[tokio::test]
    async fn long_window_is_split_and_unioned() {
        let fake = feed(&[
            ("2026-09-18", &[5, 3, 3, 9]),
            ("2026-10-02", &[9, 1]),
            ("2026-10-16", &[2]),
        ]);

        let set = resolver(Arc::clone(&fake), 100)
            .resolve(EntityKind::Movie, at("2026-09-18"), at("2026-10-18"))
            .await
            .unwrap();

        assert_eq!(values(&set), vec![3, 5, 9, 1, 2]);
        assert!(!set.truncated);
        assert_eq!(set.resolved_through, at("2026-10-18"));

        let calls = fake.calls.lock().unwrap();
        let starts: HashSet<NaiveDate> = calls.iter().map(|(w, _)| w.start).collect();
        assert_eq!(starts.len(), 3);
        assert!(calls.iter().all(|(w, _)| w.days() <= 14));
    }

    #[tokio::test]
    async fn cap_defers_from_first_day_that_does_not_fit() {
        let fake = feed(&[
            ("2026-09-18", &[1, 2]),
            ("2026-10-05", &[3]),
            ("2026-10-07", &[4, 5]),
            ("2026-10-17", &[6]),
        ]);

        let set = resolver(Arc::clone(&fake), 3)
            .resolve(EntityKind::Tv, at("2026-09-18"), at("2026-10-18"))
            .await
            .unwrap();

        assert_eq!(values(&set), vec![1, 2, 3]);
        assert!(set.truncated);
        assert_eq!(set.resolved_through, start_of(date("2026-10-07")));

        // Nothing after the deferred day is queried.
        let calls = fake.calls.lock().unwrap();
        assert!(calls.iter().all(|(w, _)| w.start <= date("2026-10-07")));
    }

    #[tokio::test]
    async fn weekly_window_over_cap_keeps_resume_point_behind_now() {
        let fake = feed(&[("2026-10-12", &[1, 2]), ("2026-10-14", &[3])]);

        let set = resolver(fake, 2)
            .resolve(EntityKind::Movie, at("2026-10-11"), at("2026-10-18"))
            .await
            .unwrap();

        assert_eq!(values(&set), vec![1, 2]);
        assert!(set.truncated);
        assert_eq!(set.resolved_through, start_of(date("2026-10-14")));
        assert!(set.resolved_through < at("2026-10-18"));
    }

    #[tokio::test]
    async fn single_day_over_cap_moves_past_that_day() {
        let fake = feed(&[("2026-10-12", &[4, 3, 2, 1]), ("2026-10-15", &[7])]);

        let set = resolver(fake, 2)
            .resolve(EntityKind::Movie, at("2026-10-11"), at("2026-10-18"))
            .await
            .unwrap();

        assert_eq!(values(&set), vec![1, 2]);
        assert!(set.truncated);
        assert_eq!(set.resolved_through, start_of(date("2026-10-13")));
    }

    #[tokio::test]
    async fn permanent_failure_surfaces() {
        let fake = Arc::new(FeedFake {
            fail: true,
            ..Default::default()
        });

        let err = resolver(fake, 10)
            .resolve(EntityKind::Movie, at("2026-10-11"), at("2026-10-18"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 401, .. }));
    }
}
