//! # Bulk Ingestion
//!
//! Streams a delimited source file into the store in fixed-size chunks.
//! Each chunk is checked against the record ceiling, written as one batch,
//! and reported to a [`ChunkListener`]. A chunk that fails hard stops the
//! import; chunks committed before it stay committed.

pub mod indexer;
pub mod reader;

pub use indexer::BulkIndexer;

use serde::Serialize;
use tq_core::{ErrorReport, TrafficError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// Every parsed row in the chunk was written.
    Committed,
    /// Nothing was written: the ceiling was reached, or no row in the
    /// chunk parsed.
    Skipped,
    /// The batch write or the ceiling check failed, or a bad row aborted
    /// the import.
    Failed,
}

impl ChunkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkOutcome::Committed => "committed",
            ChunkOutcome::Skipped => "skipped",
            ChunkOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    /// Zero-based chunk number.
    pub index: usize,
    /// Data rows read into this chunk.
    pub rows: usize,
    /// Rows dropped because they did not parse.
    pub parse_skips: usize,
    pub written: usize,
    pub outcome: ChunkOutcome,
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub job_id: String,
    pub source: String,
    pub rows_read: usize,
    pub rows_committed: usize,
    /// Parse skips plus rows in ceiling-skipped chunks.
    pub rows_skipped: usize,
    /// Parsed rows in the chunk that failed hard.
    pub rows_failed: usize,
    pub chunks: Vec<ChunkReport>,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_ms: u64,
    pub error: Option<ErrorReport>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn chunks_with(&self, outcome: ChunkOutcome) -> usize {
        self.chunks.iter().filter(|c| c.outcome == outcome).count()
    }
}

/// Callbacks around each chunk. All methods default to no-ops.
pub trait ChunkListener: Send + Sync {
    fn before_chunk(&self, _job_id: &str, _index: usize, _rows: usize) {}

    fn on_row_skipped(&self, _job_id: &str, _line: u64, _error: &TrafficError) {}

    fn after_chunk(&self, _job_id: &str, _chunk: &ChunkReport) {}
}

/// Logs every chunk outcome and every skipped row.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl ChunkListener for LoggingListener {
    fn before_chunk(&self, job_id: &str, index: usize, rows: usize) {
        tracing::debug!("[{}] chunk {} starting with {} rows", job_id, index, rows);
    }

    fn on_row_skipped(&self, job_id: &str, line: u64, error: &TrafficError) {
        tracing::warn!("[{}] skipped line {}: {}", job_id, line, error);
    }

    fn after_chunk(&self, job_id: &str, chunk: &ChunkReport) {
        match chunk.outcome {
            ChunkOutcome::Committed => tracing::info!(
                "[{}] chunk {} committed {} records ({} rows skipped)",
                job_id,
                chunk.index,
                chunk.written,
                chunk.parse_skips
            ),
            ChunkOutcome::Skipped if chunk.parse_skips == chunk.rows => tracing::info!(
                "[{}] chunk {} skipped: no row parsed",
                job_id,
                chunk.index
            ),
            ChunkOutcome::Skipped => tracing::info!(
                "[{}] chunk {} skipped: record ceiling reached",
                job_id,
                chunk.index
            ),
            ChunkOutcome::Failed => tracing::error!(
                "[{}] chunk {} failed: {}",
                job_id,
                chunk.index,
                chunk.error.as_ref().map_or("unknown error", |e| e.message.as_str())
            ),
        }
    }
}
