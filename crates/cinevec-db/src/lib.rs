//! Cinevec database layer.
//!
//! PostgreSQL (with the pgvector extension) holds both relations the
//! pipeline touches: the staging table of raw catalog records and the
//! production table of enriched, embedding-carrying rows. The schema is
//! declared by hand in [`schema`] and applied with plain
//! `CREATE ... IF NOT EXISTS` DDL — no migration framework.

pub mod database;
pub mod error;
pub mod production;
pub mod repository;
pub mod schema;
pub mod staging;

pub use sqlx::PgPool;

pub use database::connect;
pub use error::{DbError, Result};
pub use production::PgProductionRepository;
pub use repository::{ProductionStore, StagingStore};
pub use schema::{
    NewStagingMovie, ProductionMovieRecord, StagingMovieRow, EMBEDDING_DIM,
    TABLE_MOVIES_PRODUCTION, TABLE_RAW_MOVIES, TABLE_RAW_MOVIE_GENRES,
};
pub use staging::PgStagingRepository;

/// Apply the dataset's DDL. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool, dataset: &str) -> Result<()> {
    for statement in schema::ddl(dataset)? {
        sqlx::query(&statement).execute(pool).await?;
    }
    tracing::info!(dataset, "Database schema ready");
    Ok(())
}
