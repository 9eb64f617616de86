//! Hand-declared schema for the staging and production relations.
//!
//! Column name → PostgreSQL type → nullability is written out explicitly
//! here and used both to emit DDL and to validate rows before they are
//! written. Nothing is inferred at runtime.

use crate::error::{DbError, Result};

/// Embedding dimension (Gemini embedding-001 outputs 768-dim vectors).
pub const EMBEDDING_DIM: usize = 768;

pub const TABLE_RAW_MOVIES: &str = "raw_movies";
pub const TABLE_RAW_MOVIE_GENRES: &str = "raw_movie_genres";
pub const TABLE_MOVIES_PRODUCTION: &str = "movies_production";

// ── Column declarations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub pg_type: &'static str,
    pub nullable: bool,
}

const fn col(name: &'static str, pg_type: &'static str, nullable: bool) -> ColumnSpec {
    ColumnSpec { name, pg_type, nullable }
}

pub const RAW_MOVIES_COLUMNS: &[ColumnSpec] = &[
    col("id", "BIGINT PRIMARY KEY", false),
    col("title", "TEXT", false),
    col("overview", "TEXT", true),
    col("release_date", "TEXT", true),
    col("vote_average", "DOUBLE PRECISION", false),
    col("vote_count", "INTEGER", false),
    col("poster_path", "TEXT", true),
    col("fetched_at", "TIMESTAMPTZ NOT NULL DEFAULT now()", false),
];

pub const RAW_MOVIE_GENRES_COLUMNS: &[ColumnSpec] = &[
    col("movie_id", "BIGINT", false),
    col("position", "INTEGER", false),
    col("genre_id", "INTEGER", false),
];

pub const MOVIES_PRODUCTION_COLUMNS: &[ColumnSpec] = &[
    col("id", "BIGINT PRIMARY KEY", false),
    col("title", "TEXT", false),
    col("overview", "TEXT", true),
    col("release_year", "INTEGER", true),
    col("rating", "REAL", true),
    col("poster_url", "TEXT", true),
    col("embedding", "vector(768)", true),
    col("embedding_text_sha", "TEXT", true),
    col("updated_at", "TIMESTAMPTZ NOT NULL DEFAULT now()", false),
];

// ── Row types ─────────────────────────────────────────────────────────────────

/// A raw catalog record headed for the staging relation.
/// Genre ids ride along and land in the child relation, ordered.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NewStagingMovie {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: i32,
    pub poster_path: Option<String>,
    pub genre_ids: Vec<i32>,
}

/// A staged row as the transform stage reads it back.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StagingMovieRow {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: i32,
    pub poster_path: Option<String>,
}

/// An enriched row headed for the production relation. The upsert always
/// writes every column, so this struct is the full row, not a patch.
#[derive(Debug, Clone)]
pub struct ProductionMovieRecord {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_year: Option<i32>,
    pub rating: f32,
    pub poster_url: Option<String>,
    pub embedding: Vec<f32>,
    pub embedding_text_sha: String,
}

// ── Write-time validation ─────────────────────────────────────────────────────

/// A staging row must carry its required (NOT NULL, non-blank) fields.
pub fn validate_staging(row: &NewStagingMovie) -> Result<()> {
    if row.title.trim().is_empty() {
        return Err(DbError::InvalidRow(format!(
            "staging row {} has a blank title",
            row.id
        )));
    }
    Ok(())
}

/// A production row must carry a title and a full-dimension embedding.
/// Zero vectors are rejected: a failed embedding call must surface as a
/// skipped row, never as an all-zeros vector in the table.
pub fn validate_production(row: &ProductionMovieRecord) -> Result<()> {
    if row.title.trim().is_empty() {
        return Err(DbError::InvalidRow(format!(
            "production row {} has a blank title",
            row.id
        )));
    }
    if row.embedding.len() != EMBEDDING_DIM {
        return Err(DbError::InvalidEmbeddingDimension {
            expected: EMBEDDING_DIM,
            actual: row.embedding.len(),
        });
    }
    if row.embedding.iter().all(|x| *x == 0.0) {
        return Err(DbError::InvalidRow(format!(
            "production row {} has a zero-vector embedding",
            row.id
        )));
    }
    Ok(())
}

// ── DDL ───────────────────────────────────────────────────────────────────────

/// Dataset (schema) names are interpolated into SQL, so they are restricted
/// to plain identifiers.
pub fn validate_ident(ident: &str) -> Result<()> {
    let ok = !ident.is_empty()
        && ident.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(ident.to_string()))
    }
}

fn create_table_sql(dataset: &str, table: &str, columns: &[ColumnSpec], extra: &str) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| {
            let already_constrained =
                c.pg_type.contains("NOT NULL") || c.pg_type.contains("PRIMARY KEY");
            let null = if c.nullable || already_constrained { "" } else { " NOT NULL" };
            format!("{} {}{}", c.name, c.pg_type, null)
        })
        .collect();
    let mut body = cols.join(",\n    ");
    if !extra.is_empty() {
        body.push_str(",\n    ");
        body.push_str(extra);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\n    {}\n)",
        dataset, table, body
    )
}

/// Full DDL for one dataset, in execution order.
pub fn ddl(dataset: &str) -> Result<Vec<String>> {
    validate_ident(dataset)?;
    Ok(vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", dataset),
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        create_table_sql(dataset, TABLE_RAW_MOVIES, RAW_MOVIES_COLUMNS, ""),
        create_table_sql(
            dataset,
            TABLE_RAW_MOVIE_GENRES,
            RAW_MOVIE_GENRES_COLUMNS,
            "PRIMARY KEY (movie_id, position)",
        ),
        create_table_sql(dataset, TABLE_MOVIES_PRODUCTION, MOVIES_PRODUCTION_COLUMNS, ""),
    ])
}
