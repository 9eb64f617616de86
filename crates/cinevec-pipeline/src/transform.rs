//! Transform stage: staged rows → normalized fields → embeddings →
//! production upsert.
//!
//! This is the expensive, rate-limited half of the pipeline, so it is
//! non-destructive and resumable: rows whose embedding text is unchanged
//! are skipped, failed rows are recorded and skipped, and every write is a
//! full-row upsert a later run can overwrite.

use anyhow::Context;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use cinevec_db::{ProductionMovieRecord, ProductionStore, StagingStore};

use crate::embedding::{embed_with_retry, Embedder};
use crate::normalize::{self, NormalizedMovie};
use crate::ratelimit::RateLimiter;

/// Knobs for one transform run.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub max_retries: u32,
    /// Skip rows whose embedding input text already matches production.
    pub skip_unchanged: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            max_retries: 4,
            skip_unchanged: true,
        }
    }
}

/// Outcome of one transform run.
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub run_id: Uuid,
    pub rows_read: u64,
    pub rows_upserted: u64,
    /// Rows skipped because their embedding text was unchanged.
    pub rows_unchanged: u64,
    /// Rows skipped because their embedding could not be computed.
    pub rows_skipped: u64,
    /// Rows skipped because required fields were missing.
    pub rows_malformed: u64,
    pub duration_ms: u64,
}

impl TransformSummary {
    /// Rows that did not make it to production for cause.
    pub fn failures(&self) -> u64 {
        self.rows_skipped + self.rows_malformed
    }
}

/// Run the full transform over everything currently staged.
///
/// Connectivity failures to the database abort the run; row-level failures
/// (malformed rows, exhausted embedding retries) are isolated, logged with
/// the row id, and tallied in the summary.
#[instrument(skip_all)]
pub async fn run_transform(
    staging: &dyn StagingStore,
    production: &dyn ProductionStore,
    embedder: &dyn Embedder,
    limiter: &RateLimiter,
    opts: &TransformOptions,
) -> anyhow::Result<TransformSummary> {
    let run_id = Uuid::new_v4();
    let t0 = std::time::Instant::now();

    let rows = staging
        .fetch_all()
        .await
        .context("transform aborted: staging read failed")?;
    info!(run_id = %run_id, n = rows.len(), "Starting transform");

    let mut summary = TransformSummary {
        run_id,
        rows_read: rows.len() as u64,
        rows_upserted: 0,
        rows_unchanged: 0,
        rows_skipped: 0,
        rows_malformed: 0,
        duration_ms: 0,
    };

    let existing_hashes = if opts.skip_unchanged {
        production
            .fetch_text_hashes()
            .await
            .context("transform aborted: production read failed")?
    } else {
        Default::default()
    };

    // Normalize up front; embedding only sees well-formed rows.
    let mut pending: Vec<(NormalizedMovie, String)> = Vec::with_capacity(rows.len());
    for row in &rows {
        match normalize::normalize(row) {
            Ok(normalized) => {
                let sha = normalize::text_sha(&normalized.embedding_input);
                if existing_hashes.get(&normalized.id) == Some(&sha) {
                    summary.rows_unchanged += 1;
                } else {
                    pending.push((normalized, sha));
                }
            }
            Err(e) => {
                warn!(id = row.id, error = %e, "Skipping malformed staged row");
                summary.rows_malformed += 1;
            }
        }
    }

    for chunk in pending.chunks(embedder.batch_size().max(1)) {
        let texts: Vec<String> = chunk.iter().map(|(m, _)| m.embedding_input.clone()).collect();

        limiter.acquire().await;
        match embed_with_retry(embedder, &texts, opts.max_retries).await {
            Ok(vectors) => {
                let records: Vec<ProductionMovieRecord> = chunk
                    .iter()
                    .zip(vectors)
                    .map(|((m, sha), embedding)| to_production(m, sha, embedding))
                    .collect();
                let written = production
                    .upsert_batch(&records)
                    .await
                    .context("transform aborted: production write failed")?;
                summary.rows_upserted += written as u64;
            }
            Err(e) => {
                // The batch as a whole failed; fall back to per-row calls so
                // one poisoned row cannot sink its batch-mates.
                warn!(n = chunk.len(), error = %e,
                      "Batch embedding failed; retrying rows individually");
                for (movie, sha) in chunk {
                    limiter.acquire().await;
                    let single = std::slice::from_ref(&movie.embedding_input);
                    match embed_with_retry(embedder, single, opts.max_retries).await {
                        Ok(mut vectors) => {
                            let record = to_production(movie, sha, vectors.remove(0));
                            let written = production
                                .upsert_batch(std::slice::from_ref(&record))
                                .await
                                .context("transform aborted: production write failed")?;
                            summary.rows_upserted += written as u64;
                        }
                        Err(row_err) => {
                            warn!(id = movie.id, error = %row_err,
                                  "Embedding failed after retries; skipping row");
                            summary.rows_skipped += 1;
                        }
                    }
                }
            }
        }
    }

    summary.duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        run_id = %run_id,
        read = summary.rows_read,
        upserted = summary.rows_upserted,
        unchanged = summary.rows_unchanged,
        skipped = summary.rows_skipped,
        malformed = summary.rows_malformed,
        duration_ms = summary.duration_ms,
        "Transform complete"
    );

    Ok(summary)
}

fn to_production(movie: &NormalizedMovie, sha: &str, embedding: Vec<f32>) -> ProductionMovieRecord {
    ProductionMovieRecord {
        id: movie.id,
        title: movie.title.clone(),
        overview: movie.overview.clone(),
        release_year: movie.release_year,
        rating: movie.rating,
        poster_url: movie.poster_url.clone(),
        embedding,
        embedding_text_sha: sha.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use cinevec_db::EMBEDDING_DIM;

    use crate::embedding::EmbedError;
    use crate::testutil::{movie, MemProductionStore, MemStagingStore};

    /// Deterministic embedder that fails any input mentioning a poison
    /// marker with a non-retryable error.
    struct MarkedEmbedder {
        poison: Option<String>,
        batch_size: usize,
    }

    #[async_trait]
    impl Embedder for MarkedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if let Some(ref poison) = self.poison {
                if texts.iter().any(|t| t.contains(poison)) {
                    return Err(EmbedError::Service {
                        status: 400,
                        message: "poisoned input".to_string(),
                    });
                }
            }
            Ok(texts.iter().map(|_| vec![0.25; EMBEDDING_DIM]).collect())
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }
    }

    async fn seeded_staging(n: i64) -> MemStagingStore {
        let store = MemStagingStore::default();
        let records: Vec<_> = (1..=n).map(|i| movie(i, 8.0, 500)).collect();
        store.upsert_page(&records).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_every_staged_row_reaches_production() {
        let staging = seeded_staging(60).await;
        let production = MemProductionStore::default();
        let embedder = MarkedEmbedder { poison: None, batch_size: 25 };
        let limiter = RateLimiter::per_minute(6000);

        let summary = run_transform(
            &staging,
            &production,
            &embedder,
            &limiter,
            &TransformOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.rows_read, 60);
        assert_eq!(summary.rows_upserted, 60);
        assert_eq!(summary.failures(), 0);

        let rows = production.rows.lock().unwrap();
        assert_eq!(rows.len(), 60);
        assert!(rows.values().all(|r| r.embedding.len() == EMBEDDING_DIM));
    }

    #[tokio::test]
    async fn test_one_poisoned_row_skips_exactly_one() {
        let staging = seeded_staging(10).await;
        let production = MemProductionStore::default();
        // Row 7's embedding input contains "Movie 7".
        let embedder = MarkedEmbedder {
            poison: Some("Movie 7.".to_string()),
            batch_size: 10,
        };
        let limiter = RateLimiter::per_minute(6000);

        let summary = run_transform(
            &staging,
            &production,
            &embedder,
            &limiter,
            &TransformOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.rows_upserted, 9);
        assert_eq!(summary.rows_skipped, 1);

        let rows = production.rows.lock().unwrap();
        assert_eq!(rows.len(), 9);
        assert!(!rows.contains_key(&7));
        assert!(rows.values().all(|r| r.embedding.len() == EMBEDDING_DIM));
    }

    #[tokio::test]
    async fn test_unchanged_rows_are_not_re_embedded() {
        let staging = seeded_staging(12).await;
        let production = MemProductionStore::default();
        let embedder = MarkedEmbedder { poison: None, batch_size: 100 };
        let limiter = RateLimiter::per_minute(6000);
        let opts = TransformOptions::default();

        run_transform(&staging, &production, &embedder, &limiter, &opts)
            .await
            .unwrap();
        let second = run_transform(&staging, &production, &embedder, &limiter, &opts)
            .await
            .unwrap();

        assert_eq!(second.rows_unchanged, 12);
        assert_eq!(second.rows_upserted, 0);
        assert_eq!(production.rows.lock().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_derived_fields_land_in_production() {
        let staging = seeded_staging(1).await;
        let production = MemProductionStore::default();
        let embedder = MarkedEmbedder { poison: None, batch_size: 100 };
        let limiter = RateLimiter::per_minute(6000);

        run_transform(
            &staging,
            &production,
            &embedder,
            &limiter,
            &TransformOptions::default(),
        )
        .await
        .unwrap();

        let rows = production.rows.lock().unwrap();
        let row = &rows[&1];
        assert_eq!(row.release_year, Some(1994));
        assert_eq!(row.rating, 8.0);
        assert_eq!(
            row.poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/poster-1.jpg")
        );
        assert!(!row.embedding_text_sha.is_empty());
    }
}
