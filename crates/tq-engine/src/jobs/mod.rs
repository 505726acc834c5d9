//! # Import Jobs
//!
//! In-memory registry of import runs. Each submission runs to completion
//! and is recorded with a terminal status and its report.

use crate::ingest::{BulkIndexer, ImportReport};
use serde::Serialize;
use std::path::Path;
use tokio::sync::RwLock;
use tq_core::ErrorReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportJob {
    pub id: String,
    pub source: String,
    pub status: JobStatus,
    pub submitted_at: String,
    /// Absent when the job failed before its first chunk.
    pub report: Option<ImportReport>,
    pub error: Option<ErrorReport>,
}

#[derive(Default)]
pub struct JobManager {
    jobs: RwLock<Vec<ImportJob>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an import to completion and record it.
    pub async fn submit_import(&self, indexer: &BulkIndexer, path: &Path) -> ImportJob {
        let id = format!("import-{}", uuid::Uuid::new_v4().as_simple());
        let submitted_at = chrono::Utc::now().to_rfc3339();

        let (status, report, error) = match indexer.import_as(&id, path).await {
            Ok(report) => {
                let status = if report.is_success() {
                    JobStatus::Completed
                } else {
                    JobStatus::Failed
                };
                let error = report.error.clone();
                (status, Some(report), error)
            }
            Err(e) => {
                tracing::error!("[{}] import of {} failed: {}", id, path.display(), e);
                (JobStatus::Failed, None, Some(ErrorReport::from(&e)))
            }
        };

        let job = ImportJob {
            id,
            source: path.display().to_string(),
            status,
            submitted_at,
            report,
            error,
        };
        tracing::info!("[{}] {}", job.id, job.status);

        self.jobs.write().await.push(job.clone());
        job
    }

    pub async fn get(&self, id: &str) -> Option<ImportJob> {
        self.jobs.read().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn get_report(&self, id: &str) -> Option<ImportReport> {
        self.get(id).await.and_then(|job| job.report)
    }

    pub async fn list(&self) -> Vec<ImportJob> {
        self.jobs.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;
    use std::io::Write;
    use std::sync::Arc;
    use tq_core::{ErrorKind, IngestConfig};

    fn indexer(store: Arc<MemoryStore>) -> BulkIndexer {
        BulkIndexer::new(store, "traffic", IngestConfig::default())
    }

    #[tokio::test]
    async fn test_completed_job_has_report() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DATE_TIME,LATITUDE,LONGITUDE,GEOHASH,MINIMUM_SPEED,MAXIMUM_SPEED,AVERAGE_SPEED,NUMBER_OF_VEHICLES").unwrap();
        writeln!(file, "2020-01-01 00:00:00,41.0,28.9,sxk3,1,90,40,5").unwrap();
        file.flush().unwrap();

        let manager = JobManager::new();
        let job = manager
            .submit_import(&indexer(Arc::new(MemoryStore::default())), file.path())
            .await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());

        let report = manager.get_report(&job.id).await.unwrap();
        assert_eq!(report.job_id, job.id);
        assert_eq!(report.rows_committed, 1);
        assert_eq!(manager.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_failed_job_without_report() {
        let manager = JobManager::new();
        let job = manager
            .submit_import(
                &indexer(Arc::new(MemoryStore::default())),
                Path::new("/nonexistent/traffic.csv"),
            )
            .await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.status.as_str(), "FAILED");
        assert_eq!(job.error.map(|e| e.kind), Some(ErrorKind::FileNotFound));
        assert!(manager.get_report(&job.id).await.is_none());
        assert!(manager.get(&job.id).await.is_some());
    }

    #[tokio::test]
    async fn test_aborted_import_is_failed_job_with_report() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DATE_TIME,LATITUDE,LONGITUDE,GEOHASH,MINIMUM_SPEED,MAXIMUM_SPEED,AVERAGE_SPEED,NUMBER_OF_VEHICLES").unwrap();
        writeln!(file, "2020-01-01 00:00:00,41.0,28.9,sxk3,1,90,40,5").unwrap();
        writeln!(file, "2020-01-01 00:01:00,41.1,28.9,sxk3,1,90,45,5").unwrap();
        writeln!(file, "2020-01-01 00:02:00,41.2,28.9,sxk3,1,90,fast,5").unwrap();
        file.flush().unwrap();

        let indexer = BulkIndexer::new(
            Arc::new(MemoryStore::default()),
            "traffic",
            IngestConfig {
                chunk_size: 1,
                ceiling: 100,
                on_parse_error: tq_core::ParseErrorPolicy::Abort,
            },
        );
        let manager = JobManager::new();
        let job = manager.submit_import(&indexer, file.path()).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.map(|e| e.kind), Some(ErrorKind::Parse));
        let report = manager.get_report(&job.id).await.unwrap();
        assert_eq!(report.rows_committed, 2);
        assert_eq!(report.rows_read, 3);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let manager = JobManager::new();
        assert!(manager.get_report("import-nope").await.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }
}
