//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "data/skills.sqlite"
//!
//! [indexer]
//! batch_size = 50
//! retry_attempts = 3
//! retry_base_delay_ms = 1000
//!
//! [search]
//! limit = 20
//! similarity_threshold = 0.5
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Only `[db]` is required. Everything else falls back to the defaults
//! documented on each field.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use skill_index_core::retry::RetryPolicy;
use skill_index_core::search::SearchQuery;
use skill_index_core::snippet::SnippetOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    /// Documents per provider call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upsert attempts per batch, first attempt included.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Documents fetched per store page during a full run.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Capacity of the progress channel used by spawned runs.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            page_size: default_page_size(),
            progress_buffer: default_progress_buffer(),
        }
    }
}

impl IndexerConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_base_delay())
    }

    /// Page size for an incremental run.
    pub fn pending_page(&self) -> usize {
        self.batch_size.saturating_mul(10)
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_page_size() -> usize {
    1000
}
fn default_progress_buffer() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_true")]
    pub include_lexical: bool,
    #[serde(default = "default_true")]
    pub include_semantic: bool,
    #[serde(default = "default_snippet_radius")]
    pub snippet_radius: usize,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            similarity_threshold: default_similarity_threshold(),
            include_lexical: true,
            include_semantic: true,
            snippet_radius: default_snippet_radius(),
            max_snippets: default_max_snippets(),
        }
    }
}

impl SearchConfig {
    /// A query for `text` carrying the configured defaults.
    pub fn query(&self, text: &str) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            limit: self.limit,
            similarity_threshold: self.similarity_threshold,
            include_lexical: self.include_lexical,
            include_semantic: self.include_semantic,
        }
    }

    pub fn snippet_options(&self) -> SnippetOptions {
        SnippetOptions {
            radius: self.snippet_radius,
            max_snippets: self.max_snippets,
        }
    }
}

fn default_limit() -> usize {
    20
}
fn default_similarity_threshold() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_snippet_radius() -> usize {
    60
}
fn default_max_snippets() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, `ollama`, or `hash`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    /// One JSON object per line instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate indexer
    if config.indexer.batch_size == 0 {
        anyhow::bail!("indexer.batch_size must be > 0");
    }
    if config.indexer.retry_attempts == 0 {
        anyhow::bail!("indexer.retry_attempts must be >= 1");
    }
    if config.indexer.page_size == 0 {
        anyhow::bail!("indexer.page_size must be > 0");
    }
    if config.indexer.progress_buffer == 0 {
        anyhow::bail!("indexer.progress_buffer must be > 0");
    }

    // Validate search
    if config.search.limit < 1 {
        anyhow::bail!("search.limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.search.similarity_threshold) {
        anyhow::bail!("search.similarity_threshold must be in [0.0, 1.0]");
    }
    if !config.search.include_lexical && !config.search.include_semantic {
        anyhow::bail!("search.include_lexical and search.include_semantic cannot both be false");
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.unwrap_or(0) == 0 {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
        "hash" => {
            if embedding.dims.unwrap_or(0) == 0 {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hash.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!("[db]\npath = \"/tmp/skills.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.indexer.batch_size, 50);
        assert_eq!(config.indexer.retry_attempts, 3);
        assert_eq!(config.indexer.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.indexer.pending_page(), 500);
        assert_eq!(config.search.limit, 20);
        assert!((config.search.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_search_query_from_config() {
        let config = parse("[search]\nlimit = 5\ninclude_semantic = false\n").unwrap();
        let q = config.search.query("docker");
        assert_eq!(q.text, "docker");
        assert_eq!(q.limit, 5);
        assert!(q.include_lexical);
        assert!(!q.include_semantic);
    }

    #[test]
    fn test_rejects_bad_indexer_values() {
        assert!(parse("[indexer]\nbatch_size = 0\n").is_err());
        assert!(parse("[indexer]\nretry_attempts = 0\n").is_err());
    }

    #[test]
    fn test_rejects_bad_search_values() {
        assert!(parse("[search]\nsimilarity_threshold = 1.5\n").is_err());
        assert!(parse("[search]\nlimit = 0\n").is_err());
        assert!(parse("[search]\ninclude_lexical = false\ninclude_semantic = false\n").is_err());
    }

    #[test]
    fn test_embedding_validation() {
        assert!(parse("[embedding]\nprovider = \"openai\"\ndims = 8\n").is_err());
        assert!(parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n").is_err());
        assert!(parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\ndims = 8\n").is_ok());
        assert!(parse("[embedding]\nprovider = \"hash\"\ndims = 64\n").is_ok());
        assert!(parse("[embedding]\nprovider = \"hash\"\n").is_err());
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/skills.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
