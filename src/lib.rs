//! # Skill Index
//!
//! Hybrid lexical and semantic search over a corpus of skills, with an
//! embedding indexer that re-embeds only what changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ skills table │──▶│   Indexer   │──▶│  skill_vectors   │
//! │  + skills_fts│   │ batch+retry │   │  (cosine, BLOB)  │
//! └──────┬───────┘   └──────┬──────┘   └────────┬─────────┘
//!        │                  │ EmbeddingProvider │
//!        │                  ▼                   │
//!        │          OpenAI / Ollama / hash      │
//!        ▼                                      ▼
//!   ┌─────────────────────────────────────────────────┐
//!   │ HybridSearchService: title > content > semantic │
//!   └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use skill_index::{config, index_cmd, migrate, progress::NoProgress, search};
//!
//! let config = config::load_config(std::path::Path::new("config/skills.toml"))?;
//! migrate::run_migrations(&config).await?;
//!
//! let (_cancel, cancel_rx) = tokio::sync::watch::channel(false);
//! let outcome = index_cmd::run_index_pending(&config, cancel_rx, &NoProgress).await?;
//! println!("embedded {} skills", outcome.progress.completed);
//!
//! let hits = search::search_skills(&config, "docker", &Default::default()).await?;
//! for hit in hits.iter() {
//!     println!("{:?} {}", hit.match_category, hit.document_id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document store, FTS5 lexical index, vector index |
//! | [`embedding`] | Embedding provider backends |
//! | [`indexer`] | Batched, retrying, cancellable embedding sync |
//! | [`index_cmd`] | Config-driven indexing entry points |
//! | [`search`] | Config-driven hybrid search |
//! | [`progress`] | Indexing progress reporters |
//! | [`logging`] | Tracing subscriber setup |
//!
//! The runtime-agnostic model, traits and merge logic live in
//! `skill-index-core`, re-exported here as [`skill_index_core`].

pub mod config;
pub mod db;
pub mod embedding;
pub mod index_cmd;
pub mod indexer;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;

pub use skill_index_core;
