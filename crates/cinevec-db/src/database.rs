//! Connection pool construction.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;

/// Build the shared connection pool. Both pipeline phases go through this;
/// failure here is `DestinationUnavailable` and fatal to the run.
pub async fn connect(url: &str, max_connections: u32, min_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .connect(url)
        .await?;
    Ok(pool)
}
