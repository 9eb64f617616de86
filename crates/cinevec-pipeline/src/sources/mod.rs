//! Catalog source clients.

pub mod tmdb;

use async_trait::async_trait;
use thiserror::Error;

use cinevec_common::CinevecError;

use crate::models::{DiscoverFilters, DiscoverPage};

/// Errors at the source boundary. Connectivity problems are fatal to a
/// staging run; malformed records are quarantined per record.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Catalog API unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("Catalog API rejected credentials: HTTP {status}")]
    Auth { status: u16 },

    #[error("Catalog API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed record {id}: missing {field}")]
    MalformedRecord { id: i64, field: &'static str },

    #[error(transparent)]
    Sandbox(#[from] CinevecError),
}

/// Common interface for paginated catalog sources.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page of discover results. Stateless; no retries here —
    /// the caller decides whether a failed page aborts the run.
    async fn fetch_page(
        &self,
        page: u32,
        filters: &DiscoverFilters,
    ) -> Result<DiscoverPage, SourceError>;
}
