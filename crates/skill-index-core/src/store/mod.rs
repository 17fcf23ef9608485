//! Collaborator contracts consumed by the indexer and the search service.
//!
//! | Trait | Role |
//! |-------|------|
//! | [`DocumentStore`] | Source of skill documents and home of the fingerprint watermark |
//! | [`VectorIndex`] | Stores one embedding per document and answers similarity queries |
//! | [`LexicalIndex`] | Full-text index over title, tags, description, and body |
//!
//! Implementations must be `Send + Sync`; the write path (indexing) and the
//! read path (search) may run concurrently, and any locking needed for one
//! writer plus concurrent readers is the implementation's business.
//! [`memory`] provides in-process implementations of all three.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::fingerprint::Fingerprint;
use crate::models::{Document, MatchCategory};

/// Source of skill documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One page of all documents in a stable order.
    async fn list_all(&self, page_size: usize, offset: usize) -> Result<Vec<Document>>;

    /// Up to `limit` documents with no fingerprint watermark.
    async fn list_without_fingerprint(&self, limit: usize) -> Result<Vec<Document>>;

    /// Number of documents with no fingerprint watermark.
    async fn count_without_fingerprint(&self) -> Result<u64>;

    /// Persist the watermark for one document. Fails, leaving the
    /// watermark untouched, when the stored content no longer hashes to
    /// `fingerprint`.
    async fn update_fingerprint(&self, document_id: &str, fingerprint: &Fingerprint)
        -> Result<()>;

    /// Fetch a single document by id.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;
}

/// A document the vector index could not embed or store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentError {
    pub document_id: String,
    pub message: String,
}

impl DocumentError {
    pub fn new(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            message: message.into(),
        }
    }
}

/// Result of a batched upsert: which documents made it in, and why the
/// others did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub succeeded: Vec<String>,
    pub errors: Vec<DocumentError>,
}

impl UpsertReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub document_id: String,
    /// Cosine similarity of the stored vector to the query vector.
    pub score: f32,
    /// Short description suitable as a snippet, when the index has one.
    pub summary: Option<String>,
}

/// Document-level vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and store vectors for `documents`.
    ///
    /// `Err` means the whole call failed (transport, auth, provider down)
    /// and nothing can be assumed stored. `Ok` reports per document.
    async fn upsert_batch(&self, documents: &[Document]) -> Result<UpsertReport>;

    /// Up to `limit` hits with `score >= similarity_threshold`, best first.
    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<VectorHit>>;

    /// Whether similarity queries can currently return anything useful.
    async fn is_available(&self) -> bool;
}

/// A full-text hit, classified by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub document_id: String,
    pub category: MatchCategory,
    /// Engine-supplied excerpt; `None` lets the caller extract one.
    pub snippet: Option<String>,
    /// Engine relevance, higher is better.
    pub score: f64,
}

/// Full-text index.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Ranked hits, at most `limit`, best first within each category.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<LexicalHit>>;
}
