//! Store traits at the repository seam.
//!
//! The pipeline crates depend on these traits, not on PostgreSQL directly,
//! so loader and transform logic is testable against in-memory stores.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::schema::{NewStagingMovie, ProductionMovieRecord, StagingMovieRow};

/// Write/read access to the staging relation.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Upsert one page of extracted records, replacing each record's genre
    /// associations. Atomic per page. Returns the number of records written.
    async fn upsert_page(&self, records: &[NewStagingMovie]) -> Result<usize>;

    /// Read every staged row for the transform stage.
    async fn fetch_all(&self) -> Result<Vec<StagingMovieRow>>;
}

/// Write access to the production relation.
#[async_trait]
pub trait ProductionStore: Send + Sync {
    /// Full-row upsert keyed by id, atomic per batch.
    /// Returns the number of rows written.
    async fn upsert_batch(&self, rows: &[ProductionMovieRecord]) -> Result<usize>;

    /// Map of id → embedding input text hash for every production row that
    /// has one, so unchanged rows can skip the embedding call on re-runs.
    async fn fetch_text_hashes(&self) -> Result<HashMap<i64, String>>;
}
