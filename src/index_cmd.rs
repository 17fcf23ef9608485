//! Config-driven indexing entry points.
//!
//! Each `run_*` call opens the configured database, builds the SQLite
//! store and vector index around the configured embedding provider, and
//! drives one [`Indexer`] run. The schema must already exist (see
//! [`crate::migrate::run_migrations`]).

use std::sync::Arc;

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use tokio::sync::watch;

use skill_index_core::progress::{IndexOutcome, IndexProgressReporter};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::indexer::Indexer;
use crate::sqlite_store::{SqliteStore, SqliteVectorIndex};

/// Build an indexer over `pool` using the configured provider.
pub fn build_indexer(config: &Config, pool: SqlitePool) -> Result<Indexer> {
    if !config.embedding.is_enabled() {
        bail!("Embeddings are disabled. Set [embedding] provider in config.");
    }
    let provider = create_provider(&config.embedding)?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let vectors = Arc::new(SqliteVectorIndex::new(pool, provider));
    Ok(Indexer::new(store, vectors, &config.indexer))
}

/// Re-check every skill and embed the ones that changed.
pub async fn run_index_all(
    config: &Config,
    cancel: watch::Receiver<bool>,
    reporter: &dyn IndexProgressReporter,
) -> Result<IndexOutcome> {
    let pool = db::connect(config).await?;
    let result = match build_indexer(config, pool.clone()) {
        Ok(indexer) => indexer.index_all(cancel, reporter).await,
        Err(e) => Err(e),
    };
    pool.close().await;
    result
}

/// Embed skills that have never been indexed (or were edited since).
pub async fn run_index_pending(
    config: &Config,
    cancel: watch::Receiver<bool>,
    reporter: &dyn IndexProgressReporter,
) -> Result<IndexOutcome> {
    let pool = db::connect(config).await?;
    let result = match build_indexer(config, pool.clone()) {
        Ok(indexer) => indexer.index_pending(cancel, reporter).await,
        Err(e) => Err(e),
    };
    pool.close().await;
    result
}

/// Number of skills waiting for an embedding. Works with embeddings disabled.
pub async fn pending_count(config: &Config) -> Result<u64> {
    use skill_index_core::store::DocumentStore;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let count = store.count_without_fingerprint().await;
    pool.close().await;
    count
}
