//! Cinevec pipeline — the two-stage ELT flow.
//!
//! Stage one (`extract`) walks the paginated catalog API and merges raw
//! records into the staging relation. Stage two (`transform`) reads the
//! staged rows back, derives the production-shape fields, requests
//! embeddings under a requests-per-minute token bucket, and upserts full
//! rows into the production relation.
//!
//! The stages are invoked independently (see `cinevec-cli`): extraction is
//! cheap and safe to re-run; the embedding transform is the expensive,
//! rate-limited, potentially-partial phase.

pub mod embedding;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod ratelimit;
pub mod sources;
pub mod transform;

#[cfg(test)]
pub(crate) mod testutil;

pub use embedding::{Embedder, EmbeddingBackend, EmbeddingClient, EmbeddingConfig, EmbedError};
pub use extract::{load_all, LoadSummary};
pub use models::{DiscoverFilters, DiscoverPage, RawSourceMovie};
pub use normalize::NormalizedMovie;
pub use ratelimit::{RateLimiter, TokenBucket};
pub use sources::{tmdb::TmdbClient, CatalogSource, SourceError};
pub use transform::{run_transform, TransformOptions, TransformSummary};
