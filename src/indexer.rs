//! Embedding sync: bring the vector index in line with the skill store.
//!
//! # Algorithm
//!
//! 1. Load the document set (all documents, or only never-indexed ones).
//! 2. Split it into batches of `batch_size`, processed one after another.
//! 3. Per batch, drop documents whose watermark already matches their
//!    current fingerprint (counted as `skipped`).
//! 4. Upsert the rest. Documents the index reports as stored get their
//!    watermark written; the others are retried with exponential backoff
//!    until the attempt budget runs out, then counted as `failed`.
//! 5. Hand a cumulative [`IndexProgress`] snapshot to the reporter.
//!
//! A failed provider call counts as zero successes for that attempt. It
//! never aborts the run.
//!
//! # Cancellation
//!
//! Cancellation is a `tokio::sync::watch` flag. It is honoured at batch
//! boundaries and during backoff sleeps. An upsert already in flight is
//! allowed to finish so every watermark written matches a stored vector.
//! Documents still outstanding when a backoff is interrupted count as
//! `failed`; batches never started are left untouched.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use skill_index_core::fingerprint::Fingerprint;
use skill_index_core::models::Document;
use skill_index_core::progress::{IndexOutcome, IndexProgress, IndexProgressReporter};
use skill_index_core::retry::RetryPolicy;
use skill_index_core::store::{DocumentStore, VectorIndex};

use crate::config::IndexerConfig;
use crate::progress::ChannelProgress;

/// Sequential batch indexer over a document store and a vector index.
pub struct Indexer {
    store: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorIndex>,
    batch_size: usize,
    page_size: usize,
    pending_page: usize,
    progress_buffer: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Default)]
struct BatchResult {
    completed: u64,
    failed: u64,
    cancelled: bool,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorIndex>,
        config: &IndexerConfig,
    ) -> Self {
        Self {
            store,
            vectors,
            batch_size: config.batch_size.max(1),
            page_size: config.page_size.max(1),
            pending_page: config.pending_page().max(1),
            progress_buffer: config.progress_buffer.max(1),
            retry: config.retry_policy(),
        }
    }

    /// Re-check every document in the store.
    ///
    /// Only a failure to read the document set is an `Err`; embedding
    /// failures are reported through the counters.
    pub async fn index_all(
        &self,
        cancel: watch::Receiver<bool>,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<IndexOutcome> {
        let docs = self.load_all().await?;
        info!(documents = docs.len(), "full index run starting");
        Ok(self.run(docs, cancel, reporter).await)
    }

    /// Index up to one page of never-indexed documents.
    pub async fn index_pending(
        &self,
        cancel: watch::Receiver<bool>,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<IndexOutcome> {
        let docs = self
            .store
            .list_without_fingerprint(self.pending_page)
            .await
            .context("Failed to list pending skills")?;
        info!(documents = docs.len(), "pending index run starting");
        Ok(self.run(docs, cancel, reporter).await)
    }

    /// Number of documents with no watermark.
    pub async fn pending_count(&self) -> Result<u64> {
        self.store
            .count_without_fingerprint()
            .await
            .context("Failed to count pending skills")
    }

    /// Run [`index_all`](Self::index_all) on a task, streaming progress
    /// through a bounded channel.
    pub fn spawn_index_all(
        self: Arc<Self>,
        cancel: watch::Receiver<bool>,
    ) -> (mpsc::Receiver<IndexProgress>, JoinHandle<Result<IndexOutcome>>) {
        let (tx, rx) = mpsc::channel(self.progress_buffer);
        let handle = tokio::spawn(async move {
            let reporter = ChannelProgress::new(tx);
            self.index_all(cancel, &reporter).await
        });
        (rx, handle)
    }

    /// Run [`index_pending`](Self::index_pending) on a task, streaming
    /// progress through a bounded channel.
    pub fn spawn_index_pending(
        self: Arc<Self>,
        cancel: watch::Receiver<bool>,
    ) -> (mpsc::Receiver<IndexProgress>, JoinHandle<Result<IndexOutcome>>) {
        let (tx, rx) = mpsc::channel(self.progress_buffer);
        let handle = tokio::spawn(async move {
            let reporter = ChannelProgress::new(tx);
            self.index_pending(cancel, &reporter).await
        });
        (rx, handle)
    }

    async fn load_all(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        loop {
            let page = self
                .store
                .list_all(self.page_size, docs.len())
                .await
                .context("Failed to list skills")?;
            let short = page.len() < self.page_size;
            docs.extend(page);
            if short {
                break;
            }
        }
        Ok(docs)
    }

    async fn run(
        &self,
        docs: Vec<Document>,
        mut cancel: watch::Receiver<bool>,
        reporter: &dyn IndexProgressReporter,
    ) -> IndexOutcome {
        let start = Instant::now();
        let mut outcome = IndexOutcome {
            progress: IndexProgress::new(docs.len() as u64),
            ..IndexOutcome::default()
        };
        if docs.is_empty() {
            return outcome;
        }

        for (i, batch) in docs.chunks(self.batch_size).enumerate() {
            let batch_no = i + 1;
            if *cancel.borrow() {
                info!(batch = batch_no, "cancelled before batch");
                outcome.cancelled = true;
                break;
            }

            let mut work: Vec<(&Document, Fingerprint)> = Vec::with_capacity(batch.len());
            for doc in batch {
                let fp = doc.fingerprint();
                if doc.last_indexed_fingerprint.as_ref() == Some(&fp) {
                    debug!(document_id = %doc.id, "unchanged, skipping");
                    outcome.progress.skipped += 1;
                } else {
                    work.push((doc, fp));
                }
            }

            if !work.is_empty() {
                let result = self.embed_batch(batch_no, work, &mut cancel).await;
                outcome.progress.completed += result.completed;
                outcome.progress.failed += result.failed;
                outcome.cancelled = result.cancelled;
            }

            outcome.progress.elapsed = start.elapsed();
            outcome.batches += 1;
            debug!(
                batch = batch_no,
                completed = outcome.progress.completed,
                failed = outcome.progress.failed,
                skipped = outcome.progress.skipped,
                "batch done"
            );
            reporter.report(&outcome.progress);

            if outcome.cancelled {
                break;
            }
        }

        outcome.progress.elapsed = start.elapsed();
        info!(
            total = outcome.progress.total,
            completed = outcome.progress.completed,
            failed = outcome.progress.failed,
            skipped = outcome.progress.skipped,
            cancelled = outcome.cancelled,
            elapsed_ms = outcome.progress.elapsed.as_millis() as u64,
            "index run finished"
        );
        outcome
    }

    async fn embed_batch(
        &self,
        batch_no: usize,
        work: Vec<(&Document, Fingerprint)>,
        cancel: &mut watch::Receiver<bool>,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let mut outstanding = work;
        let attempts = self.retry.max_attempts();

        for attempt in 1..=attempts {
            if let Some(delay) = self.retry.delay_before(attempt) {
                let interrupted = tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    _ = wait_for_cancel(cancel) => true,
                };
                if interrupted {
                    warn!(
                        batch = batch_no,
                        attempt,
                        outstanding = outstanding.len(),
                        "cancelled during backoff"
                    );
                    result.failed += outstanding.len() as u64;
                    result.cancelled = true;
                    return result;
                }
            }

            let docs: Vec<Document> = outstanding.iter().map(|(d, _)| (*d).clone()).collect();
            let stored: HashSet<String> = match self.vectors.upsert_batch(&docs).await {
                Ok(report) => {
                    for error in &report.errors {
                        debug!(
                            batch = batch_no,
                            attempt,
                            document_id = %error.document_id,
                            error = %error.message,
                            "document not embedded"
                        );
                    }
                    report.succeeded.into_iter().collect()
                }
                Err(error) => {
                    warn!(batch = batch_no, attempt, %error, "upsert failed");
                    HashSet::new()
                }
            };

            let mut still_outstanding = Vec::with_capacity(outstanding.len());
            for (doc, fp) in outstanding {
                if !stored.contains(&doc.id) {
                    still_outstanding.push((doc, fp));
                    continue;
                }
                match self.store.update_fingerprint(&doc.id, &fp).await {
                    Ok(()) => result.completed += 1,
                    Err(error) => {
                        warn!(document_id = %doc.id, %error, "fingerprint write failed");
                        result.failed += 1;
                    }
                }
            }
            outstanding = still_outstanding;

            if outstanding.is_empty() {
                return result;
            }
            if attempt < attempts {
                warn!(
                    batch = batch_no,
                    attempt,
                    outstanding = outstanding.len(),
                    "retrying batch"
                );
            }
        }

        warn!(
            batch = batch_no,
            failed = outstanding.len(),
            attempts,
            "retry budget exhausted"
        );
        result.failed += outstanding.len() as u64;
        result
    }
}

/// Resolves once the flag is `true`. Never resolves if the sender is
/// dropped without setting it.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
