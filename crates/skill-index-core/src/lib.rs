//! # Skill Index Core
//!
//! Shared, runtime-agnostic logic for Skill Index: the skill document model,
//! content fingerprinting, retry and progress bookkeeping, the collaborator
//! traits (document store, embedding provider, vector index, lexical index),
//! snippet extraction, and the hybrid search service.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. The indexing driver and the SQLite-backed
//! collaborators live in the `skill-index` app crate.

pub mod embedding;
pub mod fingerprint;
pub mod models;
pub mod progress;
pub mod retry;
pub mod search;
pub mod snippet;
pub mod store;
