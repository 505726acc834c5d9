use super::reader::ChunkReader;
use super::{ChunkListener, ChunkOutcome, ChunkReport, ImportReport, LoggingListener};
use crate::drivers::{RecordWrite, StoreDriver};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tq_core::{ErrorReport, IngestConfig, ParseErrorPolicy, Result, TrafficError, TrafficObservation};

/// Chunked file-to-store importer.
pub struct BulkIndexer {
    driver: Arc<dyn StoreDriver>,
    prefix: String,
    config: IngestConfig,
    listener: Arc<dyn ChunkListener>,
}

impl BulkIndexer {
    pub fn new(driver: Arc<dyn StoreDriver>, prefix: &str, config: IngestConfig) -> Self {
        Self {
            driver,
            prefix: prefix.to_string(),
            config,
            listener: Arc::new(LoggingListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChunkListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Import under a fresh job id.
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let job_id = format!("import-{}", uuid::Uuid::new_v4().as_simple());
        self.import_as(&job_id, path).await
    }

    /// Import `path`, reporting under `job_id`.
    ///
    /// Fails with `FileNotFound` before any chunk runs. Everything after
    /// that ends in a report: a hard chunk failure, or a bad row under
    /// [`ParseErrorPolicy::Abort`], stops the import and is carried in
    /// [`ImportReport::error`]. Chunks committed before the stop stay
    /// committed; the chunk holding the bad row is not written.
    pub async fn import_as(&self, job_id: &str, path: &Path) -> Result<ImportReport> {
        let chunks = ChunkReader::open(path, self.config.chunk_size)?;
        let started_at = chrono::Utc::now();
        let clock = Instant::now();

        tracing::info!(
            "[{}] importing {} into '{}' (chunk size {}, ceiling {})",
            job_id,
            path.display(),
            self.prefix,
            self.config.chunk_size,
            self.config.ceiling
        );

        let mut report = ImportReport {
            job_id: job_id.to_string(),
            source: path.display().to_string(),
            rows_read: 0,
            rows_committed: 0,
            rows_skipped: 0,
            rows_failed: 0,
            chunks: Vec::new(),
            started_at: started_at.to_rfc3339(),
            finished_at: String::new(),
            elapsed_ms: 0,
            error: None,
        };

        for (index, rows) in chunks.enumerate() {
            self.listener.before_chunk(job_id, index, rows.len());
            report.rows_read += rows.len();

            let mut batch: Vec<TrafficObservation> = Vec::with_capacity(rows.len());
            let mut parse_skips = 0;
            let mut aborted = None;
            for row in &rows {
                match &row.observation {
                    Ok(observation) => batch.push(observation.clone()),
                    Err(e) => match self.config.on_parse_error {
                        ParseErrorPolicy::Skip => {
                            parse_skips += 1;
                            self.listener.on_row_skipped(job_id, row.line, e);
                        }
                        ParseErrorPolicy::Abort => {
                            tracing::error!("[{}] aborting at line {}: {}", job_id, row.line, e);
                            aborted = Some(TrafficError::parse(row.line, parse_message(e)));
                            break;
                        }
                    },
                }
            }
            report.rows_skipped += parse_skips;

            let chunk = match aborted {
                Some(e) => ChunkReport {
                    index,
                    rows: rows.len(),
                    parse_skips,
                    written: 0,
                    outcome: ChunkOutcome::Failed,
                    error: Some(ErrorReport::from(&e)),
                },
                None => self.commit(index, rows.len(), parse_skips, &batch).await,
            };
            match chunk.outcome {
                ChunkOutcome::Committed => report.rows_committed += chunk.written,
                ChunkOutcome::Skipped => report.rows_skipped += batch.len(),
                ChunkOutcome::Failed => {
                    report.rows_failed += batch.len();
                    report.error = chunk.error.clone();
                }
            }
            self.listener.after_chunk(job_id, &chunk);
            report.chunks.push(chunk);

            if report.error.is_some() {
                break;
            }
        }

        report.finished_at = chrono::Utc::now().to_rfc3339();
        report.elapsed_ms = clock.elapsed().as_millis() as u64;

        tracing::info!(
            "[{}] finished: read={} committed={} skipped={} failed={} in {}ms",
            job_id,
            report.rows_read,
            report.rows_committed,
            report.rows_skipped,
            report.rows_failed,
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Ceiling check, then one batch write.
    async fn commit(
        &self,
        index: usize,
        rows: usize,
        parse_skips: usize,
        batch: &[TrafficObservation],
    ) -> ChunkReport {
        let mut chunk = ChunkReport {
            index,
            rows,
            parse_skips,
            written: 0,
            outcome: ChunkOutcome::Committed,
            error: None,
        };
        if batch.is_empty() {
            if rows > 0 {
                chunk.outcome = ChunkOutcome::Skipped;
            }
            return chunk;
        }

        let result = match self.driver.set_cardinality(&self.prefix).await {
            Ok(existing) if existing >= self.config.ceiling => {
                chunk.outcome = ChunkOutcome::Skipped;
                return chunk;
            }
            Ok(_) => {
                let writes: Vec<RecordWrite> = batch
                    .iter()
                    .map(|o| RecordWrite::for_observation(&self.prefix, o))
                    .collect();
                self.driver.write_records(&writes).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => chunk.written = batch.len(),
            Err(e) => {
                let failure = TrafficError::PartialChunkFailure {
                    chunk: index,
                    message: e.to_string(),
                };
                chunk.outcome = ChunkOutcome::Failed;
                chunk.error = Some(ErrorReport::from(&failure));
            }
        }
        chunk
    }
}

fn parse_message(err: &TrafficError) -> String {
    match err {
        TrafficError::Parse { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
