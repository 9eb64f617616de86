//! PostgreSQL staging repository.
//!
//! Handles:
//! - Merge upsert of raw catalog records keyed by source id
//! - Full replacement of genre associations per record (delete-then-insert)
//! - Reading staged rows back for the transform stage

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::repository::StagingStore;
use crate::schema::{
    self, NewStagingMovie, StagingMovieRow, TABLE_RAW_MOVIES, TABLE_RAW_MOVIE_GENRES,
};

/// PostgreSQL-backed staging store.
#[derive(Clone)]
pub struct PgStagingRepository {
    pool: PgPool,
    raw_movies: String,
    raw_movie_genres: String,
}

impl PgStagingRepository {
    pub fn new(pool: PgPool, dataset: &str) -> Result<Self> {
        schema::validate_ident(dataset)?;
        Ok(Self {
            pool,
            raw_movies: format!("{}.{}", dataset, TABLE_RAW_MOVIES),
            raw_movie_genres: format!("{}.{}", dataset, TABLE_RAW_MOVIE_GENRES),
        })
    }

    /// Total staged rows.
    pub async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.raw_movies))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl StagingStore for PgStagingRepository {
    async fn upsert_page(&self, records: &[NewStagingMovie]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        for record in records {
            schema::validate_staging(record)?;
        }

        let upsert = format!(
            r#"
            INSERT INTO {}
                (id, title, overview, release_date, vote_average, vote_count, poster_path, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (id) DO UPDATE SET
                title        = EXCLUDED.title,
                overview     = EXCLUDED.overview,
                release_date = EXCLUDED.release_date,
                vote_average = EXCLUDED.vote_average,
                vote_count   = EXCLUDED.vote_count,
                poster_path  = EXCLUDED.poster_path,
                fetched_at   = now()
            "#,
            self.raw_movies
        );
        let delete_genres = format!("DELETE FROM {} WHERE movie_id = $1", self.raw_movie_genres);
        let insert_genre = format!(
            "INSERT INTO {} (movie_id, position, genre_id) VALUES ($1, $2, $3)",
            self.raw_movie_genres
        );

        let mut tx = self.pool.begin().await?;
        let mut count = 0usize;

        for record in records {
            sqlx::query(&upsert)
                .bind(record.id)
                .bind(&record.title)
                .bind(&record.overview)
                .bind(&record.release_date)
                .bind(record.vote_average)
                .bind(record.vote_count)
                .bind(&record.poster_path)
                .execute(&mut *tx)
                .await?;

            // Stale associations must not survive a re-extraction, so the
            // child rows are replaced wholesale per parent id.
            sqlx::query(&delete_genres)
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
            for (position, genre_id) in record.genre_ids.iter().enumerate() {
                sqlx::query(&insert_genre)
                    .bind(record.id)
                    .bind(position as i32)
                    .bind(genre_id)
                    .execute(&mut *tx)
                    .await?;
            }
            count += 1;
        }

        tx.commit().await?;
        tracing::debug!("upsert_page: committed {count} staging records");
        Ok(count)
    }

    async fn fetch_all(&self) -> Result<Vec<StagingMovieRow>> {
        let rows = sqlx::query_as::<_, StagingMovieRow>(&format!(
            "SELECT id, title, overview, release_date, vote_average, vote_count, poster_path \
             FROM {} ORDER BY id",
            self.raw_movies
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
