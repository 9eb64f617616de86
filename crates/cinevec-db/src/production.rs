//! PostgreSQL production repository.
//!
//! Every upsert writes the full row — derived fields, embedding and text
//! hash together — so an interrupted run can never leave a row whose fields
//! and vector come from different pipeline passes.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::error::Result;
use crate::repository::ProductionStore;
use crate::schema::{self, ProductionMovieRecord, TABLE_MOVIES_PRODUCTION};

/// PostgreSQL-backed production store.
#[derive(Clone)]
pub struct PgProductionRepository {
    pool: PgPool,
    movies_production: String,
}

impl PgProductionRepository {
    pub fn new(pool: PgPool, dataset: &str) -> Result<Self> {
        schema::validate_ident(dataset)?;
        Ok(Self {
            pool,
            movies_production: format!("{}.{}", dataset, TABLE_MOVIES_PRODUCTION),
        })
    }

    /// Total production rows.
    pub async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.movies_production))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl ProductionStore for PgProductionRepository {
    async fn upsert_batch(&self, rows: &[ProductionMovieRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            schema::validate_production(row)?;
        }

        let upsert = format!(
            r#"
            INSERT INTO {}
                (id, title, overview, release_year, rating, poster_url,
                 embedding, embedding_text_sha, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (id) DO UPDATE SET
                title              = EXCLUDED.title,
                overview           = EXCLUDED.overview,
                release_year       = EXCLUDED.release_year,
                rating             = EXCLUDED.rating,
                poster_url         = EXCLUDED.poster_url,
                embedding          = EXCLUDED.embedding,
                embedding_text_sha = EXCLUDED.embedding_text_sha,
                updated_at         = now()
            "#,
            self.movies_production
        );

        let mut tx = self.pool.begin().await?;
        let mut count = 0usize;

        for row in rows {
            sqlx::query(&upsert)
                .bind(row.id)
                .bind(&row.title)
                .bind(&row.overview)
                .bind(row.release_year)
                .bind(row.rating)
                .bind(&row.poster_url)
                .bind(Vector::from(row.embedding.clone()))
                .bind(&row.embedding_text_sha)
                .execute(&mut *tx)
                .await?;
            count += 1;
        }

        tx.commit().await?;
        tracing::debug!("upsert_batch: committed {count} production rows");
        Ok(count)
    }

    async fn fetch_text_hashes(&self) -> Result<HashMap<i64, String>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(&format!(
            "SELECT id, embedding_text_sha FROM {} WHERE embedding_text_sha IS NOT NULL",
            self.movies_production
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
