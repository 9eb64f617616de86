//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension { expected: usize, actual: usize },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}
