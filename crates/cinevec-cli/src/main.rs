//! Cinevec — movie catalog → semantic search ELT pipeline.
//! Entry point for the pipeline binary.
//!
//! Two invocations, matching the two pipeline phases:
//!   cinevec load        — fetch the catalog and merge into staging
//!   cinevec transform   — derive, embed and upsert the production rows
//!
//! Exit codes: 0 on full success; 1 when a phase fails or the transform's
//! row-failure count exceeds pipeline.max_row_failures; 2 on usage errors.

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cinevec_config::Config;
use cinevec_db::{PgPool, PgProductionRepository, PgStagingRepository};
use cinevec_pipeline::{
    load_all, run_transform, DiscoverFilters, EmbeddingBackend, EmbeddingClient, EmbeddingConfig,
    RateLimiter, TmdbClient, TransformOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cinevec=debug,info")),
        )
        .init();

    let mode = match std::env::args().nth(1) {
        Some(m) => m,
        None => {
            eprintln!("usage: cinevec <load|transform>");
            std::process::exit(2);
        }
    };

    info!("Cinevec starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("configuration invalid")?;
    if config.embedding.dim != cinevec_db::EMBEDDING_DIM {
        anyhow::bail!(
            "embedding.dim = {} does not match the production schema's vector({})",
            config.embedding.dim,
            cinevec_db::EMBEDDING_DIM
        );
    }

    let pool = cinevec_db::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .context("database unreachable")?;
    cinevec_db::ensure_schema(&pool, &config.database.dataset).await?;

    match mode.as_str() {
        "load" => load_phase(&config, pool).await,
        "transform" => transform_phase(&config, pool).await,
        other => {
            eprintln!("unknown command: {other}\nusage: cinevec <load|transform>");
            std::process::exit(2);
        }
    }
}

async fn load_phase(config: &Config, pool: PgPool) -> anyhow::Result<()> {
    let token = config
        .source
        .api_token
        .as_ref()
        .map(|t| t.expose_secret().to_string())
        .unwrap_or_default();
    let source = TmdbClient::new(token)?;
    let staging = PgStagingRepository::new(pool, &config.database.dataset)?;
    let filters = DiscoverFilters {
        min_vote_count: config.source.min_vote_count,
        language: config.source.language.clone(),
    };

    let summary = load_all(&source, &staging, &filters, config.source.max_pages).await?;
    info!(
        pages = summary.pages_fetched,
        written = summary.records_written,
        "Staging load finished"
    );
    Ok(())
}

async fn transform_phase(config: &Config, pool: PgPool) -> anyhow::Result<()> {
    let staging = PgStagingRepository::new(pool.clone(), &config.database.dataset)?;
    let production = PgProductionRepository::new(pool, &config.database.dataset)?;

    let backend = match config.embedding.backend.as_str() {
        "gemini" => EmbeddingBackend::Gemini,
        "openai_compatible" => EmbeddingBackend::OpenAiCompatible,
        other => anyhow::bail!("unknown embedding backend: {other}"),
    };
    let embedder = EmbeddingClient::new(EmbeddingConfig {
        backend,
        api_key: config
            .embedding
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string()),
        model: config.embedding.model.clone(),
        dim: config.embedding.dim,
        batch_size: config.embedding.batch_size,
        base_url: config.embedding.base_url.clone(),
        max_retries: config.embedding.max_retries,
    })?;
    let limiter = RateLimiter::per_minute(config.embedding.requests_per_minute);
    let opts = TransformOptions {
        max_retries: config.embedding.max_retries,
        skip_unchanged: config.pipeline.skip_unchanged,
    };

    let summary = run_transform(&staging, &production, &embedder, &limiter, &opts).await?;
    info!(
        upserted = summary.rows_upserted,
        unchanged = summary.rows_unchanged,
        "Transform finished"
    );

    if summary.failures() > config.pipeline.max_row_failures {
        error!(
            failures = summary.failures(),
            allowed = config.pipeline.max_row_failures,
            "Transform exceeded the acceptable row-failure count"
        );
        std::process::exit(1);
    }
    Ok(())
}
