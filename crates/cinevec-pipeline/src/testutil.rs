//! In-memory doubles for the store and source seams, shared across the
//! pipeline's unit tests. Semantics mirror the PostgreSQL repositories:
//! merge-by-id upserts, full-row writes, validation before write.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use cinevec_db::{
    schema, DbError, NewStagingMovie, ProductionMovieRecord, ProductionStore, StagingMovieRow,
    StagingStore,
};

use crate::models::{DiscoverFilters, DiscoverPage};
use crate::sources::{CatalogSource, SourceError};

/// In-memory staging store with the same merge semantics as PostgreSQL.
#[derive(Default)]
pub struct MemStagingStore {
    pub rows: Mutex<HashMap<i64, NewStagingMovie>>,
}

#[async_trait]
impl StagingStore for MemStagingStore {
    async fn upsert_page(&self, records: &[NewStagingMovie]) -> Result<usize, DbError> {
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            schema::validate_staging(record)?;
            rows.insert(record.id, record.clone());
        }
        Ok(records.len())
    }

    async fn fetch_all(&self) -> Result<Vec<StagingMovieRow>, DbError> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<StagingMovieRow> = rows
            .values()
            .map(|r| StagingMovieRow {
                id: r.id,
                title: r.title.clone(),
                overview: r.overview.clone(),
                release_date: r.release_date.clone(),
                vote_average: r.vote_average,
                vote_count: r.vote_count,
                poster_path: r.poster_path.clone(),
            })
            .collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }
}

/// In-memory production store.
#[derive(Default)]
pub struct MemProductionStore {
    pub rows: Mutex<HashMap<i64, ProductionMovieRecord>>,
}

#[async_trait]
impl ProductionStore for MemProductionStore {
    async fn upsert_batch(&self, batch: &[ProductionMovieRecord]) -> Result<usize, DbError> {
        let mut rows = self.rows.lock().unwrap();
        for row in batch {
            schema::validate_production(row)?;
            rows.insert(row.id, row.clone());
        }
        Ok(batch.len())
    }

    async fn fetch_text_hashes(&self) -> Result<HashMap<i64, String>, DbError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .map(|(id, row)| (*id, row.embedding_text_sha.clone()))
            .collect())
    }
}

/// A qualifying staging record with derivable fields filled in.
pub fn movie(id: i64, vote_average: f64, vote_count: i32) -> NewStagingMovie {
    NewStagingMovie {
        id,
        title: format!("Movie {id}"),
        overview: Some(format!("Overview of movie {id}")),
        release_date: Some("1994-09-23".to_string()),
        vote_average,
        vote_count,
        poster_path: Some(format!("/poster-{id}.jpg")),
        genre_ids: vec![18],
    }
}

/// Scripted source: a fixed sequence of pages, optionally failing at one.
pub struct ScriptedSource {
    pub pages: Vec<Vec<NewStagingMovie>>,
    pub fail_at: Option<u32>,
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn fetch_page(
        &self,
        page: u32,
        _filters: &DiscoverFilters,
    ) -> Result<DiscoverPage, SourceError> {
        if self.fail_at == Some(page) {
            return Err(SourceError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        let records = self.pages[(page - 1) as usize].clone();
        Ok(DiscoverPage {
            page,
            total_pages: self.pages.len() as u32,
            records,
            quarantined: 0,
        })
    }
}
