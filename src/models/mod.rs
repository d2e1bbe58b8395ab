pub mod movie;
pub mod tv_show;

pub use movie::{MovieBundle, MovieCastRow, MovieCrewRow, MovieRow};
pub use tv_show::{TvBundle, TvCastRow, TvCrewRow, TvShowRow};

use crate::domain::{CatalogId, EntityKind};
use chrono::NaiveDate;

/// One entity and its association rows, as fetched from upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedRecord {
    Movie(MovieBundle),
    Tv(TvBundle),
}

impl FetchedRecord {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Movie(_) => EntityKind::Movie,
            Self::Tv(_) => EntityKind::Tv,
        }
    }

    #[must_use]
    pub const fn id(&self) -> CatalogId {
        match self {
            Self::Movie(bundle) => CatalogId::new(bundle.movie.id),
            Self::Tv(bundle) => CatalogId::new(bundle.show.id),
        }
    }

    /// Cast plus crew rows carried by this record.
    #[must_use]
    pub fn association_count(&self) -> usize {
        match self {
            Self::Movie(bundle) => bundle.cast.len() + bundle.crew.len(),
            Self::Tv(bundle) => bundle.cast.len() + bundle.crew.len(),
        }
    }
}

/// Upstream dates are `YYYY-MM-DD`, but empty strings and malformed values
/// occur; both are stored as NULL.
#[must_use]
pub fn normalize_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Names of nested objects (genres, networks) as a JSON array string.
fn names_json<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let names: Vec<&str> = names.collect();
    if names.is_empty() {
        None
    } else {
        serde_json::to_string(&names).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_date_handles_bad_values() {
        assert_eq!(normalize_date(Some("2025-03-07")), Some("2025-03-07".into()));
        assert_eq!(normalize_date(Some("")), None);
        assert_eq!(normalize_date(Some("   ")), None);
        assert_eq!(normalize_date(Some("0000-00-00")), None);
        assert_eq!(normalize_date(Some("2025-13-01")), None);
        assert_eq!(normalize_date(None), None);
    }

    #[test]
    fn names_json_empty_is_none() {
        assert_eq!(names_json(std::iter::empty()), None);
        assert_eq!(
            names_json(["Drama", "Crime"].into_iter()),
            Some(r#"["Drama","Crime"]"#.to_string())
        );
    }
}
