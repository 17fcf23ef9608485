//! Indexing progress reporters.
//!
//! The indexer hands an [`IndexProgress`] snapshot to its reporter after
//! every batch. Human and JSON output go to **stderr** so stdout stays free
//! for whatever the embedding program prints.
//!
//! [`ChannelProgress`] forwards snapshots over a bounded tokio channel and
//! drops them when the consumer falls behind. Snapshots are cumulative, so
//! a dropped one loses nothing the next one does not carry.

use std::io::Write;

use tokio::sync::mpsc;

pub use skill_index_core::progress::{IndexOutcome, IndexProgress, IndexProgressReporter};

/// Human-friendly progress on stderr: "index  1,200 / 5,000 skills  (3 failed, 40 skipped)  2.1s".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, progress: &IndexProgress) {
        let line = format!(
            "index  {} / {} skills  ({} failed, {} skipped)  {:.1}s\n",
            format_number(progress.processed()),
            format_number(progress.total),
            format_number(progress.failed),
            format_number(progress.skipped),
            progress.elapsed.as_secs_f64()
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, progress: &IndexProgress) {
        if let Ok(line) = serde_json::to_string(&progress_json(progress)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn progress_json(progress: &IndexProgress) -> serde_json::Value {
    serde_json::json!({
        "event": "progress",
        "total": progress.total,
        "completed": progress.completed,
        "failed": progress.failed,
        "skipped": progress.skipped,
        "elapsed_ms": progress.elapsed.as_millis() as u64,
    })
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _progress: &IndexProgress) {}
}

/// Forwards snapshots into a bounded channel without ever waiting.
pub struct ChannelProgress {
    tx: mpsc::Sender<IndexProgress>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<IndexProgress>) -> Self {
        Self { tx }
    }
}

impl IndexProgressReporter for ChannelProgress {
    fn report(&self, progress: &IndexProgress) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(*progress) {
            tracing::trace!(processed = progress.processed(), "progress consumer lagging, snapshot dropped");
        }
    }
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress output mode: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
