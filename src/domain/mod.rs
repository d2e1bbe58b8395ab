//! Domain types for the catalog update engine.
//!
//! Newtypes and small enums shared by the clients, repositories and the run
//! coordinator. They keep catalog ids, entity kinds and date windows from being
//! mixed up with plain integers and strings.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream catalog identifier of a movie or TV show.
///
/// Immutable once assigned upstream; the same numeric value may exist for both
/// kinds, so an id is only meaningful together with its [`EntityKind`].
///
/// # Examples
///
/// ```rust
/// use reelsync::domain::CatalogId;
///
/// let id = CatalogId::new(550);
/// assert_eq!(id.value(), 550);
/// assert_eq!(id.to_string(), "550");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CatalogId(i64);

impl CatalogId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        debug_assert!(id >= 0, "CatalogId should be non-negative");
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CatalogId {
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

impl From<CatalogId> for i64 {
    fn from(id: CatalogId) -> Self {
        id.0
    }
}

impl Serialize for CatalogId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for CatalogId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i64::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

/// The two top-level record types processed by an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Movie,
    Tv,
}

impl EntityKind {
    /// Processing order of a run; kinds never overlap.
    pub const ALL: [Self; 2] = [Self::Movie, Self::Tv];

    /// Path segment of the upstream API (`/movie/changes`, `/tv/{id}`).
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }

    /// Live table holding entity rows of this kind.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Movie => crate::constants::tables::MOVIES,
            Self::Tv => crate::constants::tables::TV_SHOWS,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        })
    }
}

/// Inclusive range of calendar days queried against the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Returns `None` when `end` precedes `start`.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of calendar days covered, both ends included.
    #[must_use]
    pub fn days(&self) -> u64 {
        u64::try_from((self.end - self.start).num_days()).unwrap_or(0) + 1
    }

    /// Splits the window into consecutive sub-windows of at most `max_days`
    /// days each, oldest first.
    #[must_use]
    pub fn split(&self, max_days: u32) -> Vec<Self> {
        let span = u64::from(max_days.max(1));
        let mut windows = Vec::new();
        let mut cursor = self.start;

        while cursor <= self.end {
            let last = cursor
                .checked_add_days(Days::new(span - 1))
                .map_or(self.end, |d| d.min(self.end));
            windows.push(Self {
                start: cursor,
                end: last,
            });
            match last.checked_add_days(Days::new(1)) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        windows
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// States of one update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    GateCheck,
    Snapshot,
    Resolve,
    Fetch,
    Upsert,
    Finalize,
    Aborted,
    Completed,
}

impl RunState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted | Self::Completed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GateCheck => "GATE_CHECK",
            Self::Snapshot => "SNAPSHOT",
            Self::Resolve => "RESOLVE",
            Self::Fetch => "FETCH",
            Self::Upsert => "UPSERT",
            Self::Finalize => "FINALIZE",
            Self::Aborted => "ABORTED",
            Self::Completed => "COMPLETED",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn catalog_id_conversions() {
        let id = CatalogId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(i64::from(id), 42);
        assert_eq!(CatalogId::from(42), id);
    }

    #[test]
    fn catalog_id_serialization() {
        let id = CatalogId::new(603);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "603");
        let back: CatalogId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(DateWindow::new(date("2026-10-02"), date("2026-10-01")).is_none());
    }

    #[test]
    fn short_window_is_not_split() {
        let window = DateWindow::new(date("2026-10-01"), date("2026-10-07")).unwrap();
        assert_eq!(window.days(), 7);
        assert_eq!(window.split(14), vec![window]);
    }

    #[test]
    fn thirty_one_days_split_into_three_chunks() {
        let window = DateWindow::new(date("2026-09-17"), date("2026-10-17")).unwrap();
        let parts = window.split(14);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].start, date("2026-09-17"));
        assert_eq!(parts[0].end, date("2026-09-30"));
        assert_eq!(parts[1].start, date("2026-10-01"));
        assert_eq!(parts[1].end, date("2026-10-14"));
        assert_eq!(parts[2].start, date("2026-10-15"));
        assert_eq!(parts[2].end, date("2026-10-17"));
        assert!(parts.iter().all(|p| p.days() <= 14));
    }

    #[test]
    fn single_day_window() {
        let window = DateWindow::new(date("2026-10-18"), date("2026-10-18")).unwrap();
        assert_eq!(window.split(14).len(), 1);
        assert_eq!(window.days(), 1);
    }

    #[test]
    fn run_state_display_and_terminal() {
        assert_eq!(RunState::GateCheck.to_string(), "GATE_CHECK");
        assert!(RunState::Aborted.is_terminal());
        assert!(!RunState::Upsert.is_terminal());
    }
}
