//! Upstream catalog access.
//!
//! [`Catalog`] is the seam between the update engine and the third-party API;
//! [`tmdb::TmdbClient`] is the production implementation and tests plug in
//! in-memory fakes.

pub mod tmdb;

use crate::domain::{CatalogId, DateWindow, EntityKind};
use std::time::Duration;
use thiserror::Error;
use tmdb::{ChangesPage, MovieDetails, TvDetails};

/// Errors returned by a catalog request. Not-found on a detail endpoint is not
/// an error: it is reported as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Catalog API error: {status} - {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("Failed to decode catalog response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CatalogError {
    /// Timeouts, connection failures, rate limiting and server errors are worth
    /// retrying; everything else fails the same way on every attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// Server-provided delay before the next attempt, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// One page (1-based) of the change feed for `kind` within `window`.
    /// `window` must not exceed the feed's maximum span.
    async fn changes(
        &self,
        kind: EntityKind,
        window: DateWindow,
        page: u32,
    ) -> Result<ChangesPage, CatalogError>;

    /// Movie details with credits appended; `None` when removed upstream.
    async fn movie(&self, id: CatalogId) -> Result<Option<MovieDetails>, CatalogError>;

    /// TV show details with aggregate credits appended; `None` when removed
    /// upstream.
    async fn tv_show(&self, id: CatalogId) -> Result<Option<TvDetails>, CatalogError>;
}
