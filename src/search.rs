//! Config-driven hybrid search over the SQLite skill database.
//!
//! [`build_search_service`] wires the FTS5 lexical index, the document
//! store (for snippet extraction) and, when an embedding provider is
//! configured, the SQLite vector index into a [`HybridSearchService`].

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use skill_index_core::models::SearchResultSet;
use skill_index_core::search::{HybridSearchService, SearchQuery};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sqlite_store::{SqliteStore, SqliteVectorIndex};

/// Per-call adjustments to the `[search]` defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOverrides {
    pub limit: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub include_lexical: Option<bool>,
    pub include_semantic: Option<bool>,
}

impl SearchOverrides {
    pub fn apply(&self, mut query: SearchQuery) -> SearchQuery {
        if let Some(limit) = self.limit {
            query.limit = limit;
        }
        if let Some(threshold) = self.similarity_threshold {
            query.similarity_threshold = threshold;
        }
        if let Some(lexical) = self.include_lexical {
            query.include_lexical = lexical;
        }
        if let Some(semantic) = self.include_semantic {
            query.include_semantic = semantic;
        }
        query
    }
}

/// Build the search service for `pool`.
///
/// Semantic search is attached only when `[embedding]` names a provider;
/// with the provider disabled every query is answered lexically.
pub fn build_search_service(config: &Config, pool: SqlitePool) -> Result<HybridSearchService> {
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let mut service = HybridSearchService::new(store.clone())
        .with_documents(store)
        .with_snippet_options(config.search.snippet_options());

    if config.embedding.is_enabled() {
        let provider = create_provider(&config.embedding)?;
        let vectors = Arc::new(SqliteVectorIndex::new(pool, provider.clone()));
        service = service.with_semantic(provider, vectors);
    }

    Ok(service)
}

/// Search the configured database for `text`.
pub async fn search_skills(
    config: &Config,
    text: &str,
    overrides: &SearchOverrides,
) -> Result<SearchResultSet> {
    if text.trim().is_empty() {
        return Ok(SearchResultSet::default());
    }

    let query = overrides.apply(config.search.query(text));
    let pool = db::connect(config).await?;
    let result = match build_search_service(config, pool.clone()) {
        Ok(service) => service.search(&query).await,
        Err(e) => Err(e),
    };
    pool.close().await;
    result
}
