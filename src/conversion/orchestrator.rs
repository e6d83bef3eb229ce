//! Job orchestration.
//!
//! A submission is checked against the device quota, handed to the
//! [`PageConverter`], and recorded in the tracking store once it finishes.
//! Progress flows back to the caller over an mpsc channel that always ends
//! with one terminal [`ProgressEvent`].

use chrono::Utc;
use readly_common::{DocumentFormat, Error, JobId, Result};
use readly_db::models::{JobArtifacts, NewConversion};
use readly_db::pool::{get_conn, DbPool};
use readly_db::queries::conversions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cache::JobCache;
use super::converter::{
    ConversionError, ConversionOutput, ConversionRequest, PageConverter, ProgressReporter,
    DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};
use super::events::{CompletedJob, ProgressEvent};
use crate::rate_limit::RateLimiter;

const CHANNEL_CAPACITY: usize = 32;

/// Sent in place of storage or internal failure details.
const STORAGE_FAILURE: &str = "Internal server error: the conversion could not be recorded";
const INTERNAL_FAILURE: &str = "Internal server error: the conversion stopped unexpectedly";

/// A request to convert one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_id: Option<String>,
}

impl Submission {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            device_id: None,
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Empty identifiers count as absent.
    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id.filter(|d| !d.is_empty());
        self
    }
}

/// Drives conversions and resolves finished jobs.
pub struct Orchestrator {
    pool: DbPool,
    converter: Arc<dyn PageConverter>,
    cache: Arc<dyn JobCache>,
    rate_limiter: RateLimiter,
    max_per_day: u32,
    output_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        converter: Arc<dyn PageConverter>,
        cache: Arc<dyn JobCache>,
        max_per_day: u32,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(pool.clone()),
            pool,
            converter,
            cache,
            max_per_day,
            output_dir: output_dir.into(),
        }
    }

    pub fn max_per_day(&self) -> u32 {
        self.max_per_day
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Start a conversion and return its progress stream.
    ///
    /// Dropping the receiver before the terminal event cancels the
    /// conversion; nothing is recorded for it. If the conversion task
    /// panics, the stream still ends with one `Error` event.
    pub fn submit(self: &Arc<Self>, submission: Submission) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        let run_tx = tx.clone();

        tokio::spawn(async move {
            let url = submission.url.clone();
            let task = tokio::spawn(async move { this.run(submission, run_tx).await });
            if let Err(e) = task.await {
                error!(url = %url, "Conversion task failed: {}", e);
                let _ = tx.send(ProgressEvent::error(INTERNAL_FAILURE)).await;
            }
        });
        rx
    }

    /// Run a conversion to completion without progress and return its
    /// terminal event.
    pub async fn convert(self: &Arc<Self>, submission: Submission) -> ProgressEvent {
        let mut rx = self.submit(submission);
        while let Some(event) = rx.recv().await {
            if event.is_terminal() {
                return event;
            }
        }
        ProgressEvent::error("Conversion ended without a result")
    }

    async fn run(&self, submission: Submission, tx: mpsc::Sender<ProgressEvent>) {
        // Admission reserves nothing: rows exist only for finished jobs, so
        // streams from one device that start together are all counted
        // against the same total and can overshoot the quota by the number
        // in flight.
        if let Some(device_id) = &submission.device_id {
            match self.rate_limiter.admit(device_id, self.max_per_day) {
                Ok(true) => {}
                Ok(false) => {
                    info!(device_id = %device_id, "Rate limit reached, rejecting conversion");
                    let _ = tx.send(ProgressEvent::rate_limited(self.max_per_day)).await;
                    return;
                }
                Err(e) => {
                    error!("Rate limit check failed: {}", e);
                    let _ = tx.send(ProgressEvent::error(STORAGE_FAILURE)).await;
                    return;
                }
            }
        }

        let request = ConversionRequest {
            url: submission.url.clone(),
            viewport_width: submission.viewport_width,
            viewport_height: submission.viewport_height,
            output_dir: self.output_dir.clone(),
        };
        let reporter = ProgressReporter::new(tx.clone());

        info!(url = %submission.url, "Starting conversion");

        let outcome = tokio::select! {
            outcome = self.converter.convert(&request, &reporter) => outcome,
            _ = tx.closed() => {
                info!(url = %submission.url, "Client disconnected, conversion cancelled");
                return;
            }
        };

        // From here on the row is written even if the client has gone away.
        let event = self.finish(&submission, outcome);
        if tx.send(event).await.is_err() {
            debug!(url = %submission.url, "Stream closed before terminal event");
        }
    }

    fn finish(
        &self,
        submission: &Submission,
        outcome: std::result::Result<ConversionOutput, ConversionError>,
    ) -> ProgressEvent {
        let job_id = JobId::new();
        let now = Utc::now();
        let viewport = (
            Some(i64::from(submission.viewport_width)),
            Some(i64::from(submission.viewport_height)),
        );

        match outcome {
            Ok(output) => {
                let mut row = NewConversion::success(
                    submission.url.clone(),
                    output.title.clone(),
                    output.pdf_path.clone(),
                    output.epub_path.clone(),
                    now,
                )
                .with_job_id(job_id.clone())
                .with_device(submission.device_id.clone())
                .with_viewport(viewport.0, viewport.1);
                row.page_size = Some(output.page_size.clone()).filter(|s| !s.is_empty());
                row.pdf_size_bytes = file_size(Path::new(&output.pdf_path));
                row.epub_size_bytes = file_size(Path::new(&output.epub_path));
                row.conversion_time = Some(output.conversion_time);

                if let Err(e) = self.record(&row) {
                    error!(job_id = %job_id, "Failed to record conversion: {}", e);
                    return ProgressEvent::error(STORAGE_FAILURE);
                }

                self.cache.insert(
                    job_id.as_str(),
                    JobArtifacts {
                        title: output.title.clone(),
                        pdf_path: Some(output.pdf_path.clone()),
                        epub_path: Some(output.epub_path.clone()),
                    },
                );

                info!(job_id = %job_id, title = %output.title, "Conversion complete");

                let viewport_dimensions = if output.viewport_dimensions.is_empty() {
                    format!("{}x{}", submission.viewport_width, submission.viewport_height)
                } else {
                    output.viewport_dimensions
                };

                ProgressEvent::Completed(Box::new(CompletedJob {
                    pdf_url: DocumentFormat::Pdf.download_path(job_id.as_str()),
                    epub_url: DocumentFormat::Epub.download_path(job_id.as_str()),
                    job_id: job_id.to_string(),
                    title: output.title,
                    source_url: output.source_url,
                    viewport_dimensions,
                    page_size: output.page_size,
                    conversion_time: output.conversion_time,
                }))
            }
            Err(failure) => {
                let message = failure.to_string();
                warn!(job_id = %job_id, url = %submission.url, "Conversion failed: {}", message);

                let row = NewConversion::failed(submission.url.clone(), message.clone(), now)
                    .with_job_id(job_id.clone())
                    .with_device(submission.device_id.clone())
                    .with_viewport(viewport.0, viewport.1);

                if let Err(e) = self.record(&row) {
                    error!(job_id = %job_id, "Failed to record failed conversion: {}", e);
                    return ProgressEvent::error(STORAGE_FAILURE);
                }

                ProgressEvent::error(message)
            }
        }
    }

    fn record(&self, row: &NewConversion) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conversions::insert_conversion(&conn, row)
    }

    /// Look up a finished job, fast path first.
    pub fn resolve(&self, job_id: &str) -> Result<JobArtifacts> {
        if let Some(artifacts) = self.cache.get(job_id) {
            return Ok(artifacts);
        }

        let conn = get_conn(&self.pool)?;
        conversions::get_artifacts(&conn, job_id)?
            .ok_or_else(|| Error::not_found(format!("job {}", job_id)))
    }

    /// Count a download in the background.
    ///
    /// Failures are logged and dropped. The handle is only useful to callers
    /// that need to wait for the update.
    pub fn record_download(&self, job_id: &str, format: DocumentFormat) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let job_id = job_id.to_string();

        tokio::task::spawn_blocking(move || {
            let result = get_conn(&pool)
                .and_then(|conn| conversions::increment_download(&conn, &job_id, format));
            match result {
                Ok(true) => debug!(job_id = %job_id, %format, "Download recorded"),
                Ok(false) => warn!(job_id = %job_id, %format, "Download for unknown job"),
                Err(e) => warn!(job_id = %job_id, %format, "Failed to record download: {}", e),
            }
        })
    }
}

fn file_size(path: &Path) -> Option<i64> {
    std::fs::metadata(path).ok().map(|meta| meta.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{BoundedJobCache, NoopJobCache};
    use async_trait::async_trait;
    use readly_common::JobStatus;
    use readly_db::pool::init_memory_pool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedConverter {
        result: std::result::Result<ConversionOutput, ConversionError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageConverter for FixedConverter {
        async fn convert(
            &self,
            _request: &ConversionRequest,
            progress: &ProgressReporter,
        ) -> std::result::Result<ConversionOutput, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.report(50, "Rendering").await;
            self.result.clone()
        }
    }

    fn output(dir: &Path) -> ConversionOutput {
        let pdf = dir.join("page.pdf");
        std::fs::write(&pdf, b"%PDF-1.7").unwrap();
        ConversionOutput {
            title: "Page".into(),
            pdf_path: pdf.to_string_lossy().into_owned(),
            epub_path: dir.join("missing.epub").to_string_lossy().into_owned(),
            source_url: "https://example.com/page".into(),
            page_size: "A5".into(),
            viewport_dimensions: String::new(),
            conversion_time: 3.2,
        }
    }

    fn orchestrator(
        pool: DbPool,
        result: std::result::Result<ConversionOutput, ConversionError>,
        cache: Arc<dyn JobCache>,
        max_per_day: u32,
    ) -> (Arc<Orchestrator>, Arc<FixedConverter>) {
        let converter = Arc::new(FixedConverter {
            result,
            calls: AtomicUsize::new(0),
        });
        let orch = Orchestrator::new(pool, converter.clone(), cache, max_per_day, "/tmp");
        (Arc::new(orch), converter)
    }

    async fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_success_records_row_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_pool().unwrap();
        let cache = Arc::new(BoundedJobCache::new(8));
        let (orch, _) = orchestrator(pool.clone(), Ok(output(dir.path())), cache.clone(), 5);

        let events = drain(orch.submit(Submission::new("https://example.com/page"))).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ProgressEvent::progress(50, "Rendering"));
        let job = match &events[1] {
            ProgressEvent::Completed(job) => job.clone(),
            other => panic!("expected completion, got {:?}", other),
        };
        assert_eq!(job.pdf_url, format!("/download/{}/pdf", job.job_id));
        assert_eq!(job.viewport_dimensions, "430x932");

        let conn = pool.get().unwrap();
        let row = conversions::get_conversion(&conn, &job.job_id).unwrap();
        assert_eq!(row.status, JobStatus::Success);
        assert_eq!(row.pdf_size_bytes, Some(8));
        assert_eq!(row.epub_size_bytes, None);
        assert_eq!(row.page_size.as_deref(), Some("A5"));
        assert!(cache.get(&job.job_id).is_some());
    }

    #[tokio::test]
    async fn test_failure_records_message_verbatim() {
        let pool = init_memory_pool().unwrap();
        let failure = ConversionError::Failed("net::ERR_CONNECTION_REFUSED".into());
        let cache = Arc::new(BoundedJobCache::new(8));
        let (orch, _) = orchestrator(pool.clone(), Err(failure), cache.clone(), 5);

        let events = drain(orch.submit(Submission::new("https://down.test/"))).await;

        assert_eq!(
            events.last(),
            Some(&ProgressEvent::error("net::ERR_CONNECTION_REFUSED"))
        );
        let conn = pool.get().unwrap();
        let rows = conversions::list_recent(&conn, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, JobStatus::Failed);
        assert_eq!(
            rows[0].error_message.as_deref(),
            Some("net::ERR_CONNECTION_REFUSED")
        );
        assert!(cache.is_empty());
    }

    struct PanickingConverter;

    #[async_trait]
    impl PageConverter for PanickingConverter {
        async fn convert(
            &self,
            _request: &ConversionRequest,
            progress: &ProgressReporter,
        ) -> std::result::Result<ConversionOutput, ConversionError> {
            progress.report(10, "Loading").await;
            panic!("renderer adapter bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_converter_still_ends_with_error() {
        let pool = init_memory_pool().unwrap();
        let orch = Arc::new(Orchestrator::new(
            pool.clone(),
            Arc::new(PanickingConverter),
            Arc::new(NoopJobCache),
            5,
            "/tmp",
        ));

        let events = drain(orch.submit(Submission::new("https://example.com/page"))).await;

        assert_eq!(
            events,
            vec![
                ProgressEvent::progress(10, "Loading"),
                ProgressEvent::error(INTERNAL_FAILURE),
            ]
        );
        let conn = pool.get().unwrap();
        assert!(conversions::list_recent(&conn, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_generically() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = [
            Ok(output(dir.path())),
            Err(ConversionError::Failed("goto failed".into())),
        ];

        for outcome in outcomes {
            let pool = init_memory_pool().unwrap();
            pool.get()
                .unwrap()
                .execute_batch("DROP TABLE conversions")
                .unwrap();
            let cache = Arc::new(BoundedJobCache::new(8));
            let (orch, _) = orchestrator(pool, outcome, cache.clone(), 5);

            let events = drain(orch.submit(Submission::new("https://example.com/page"))).await;

            let last = events.last().unwrap();
            assert_eq!(last, &ProgressEvent::error(STORAGE_FAILURE));
            assert!(!last.to_wire().to_string().contains("Database error"));
            assert!(cache.is_empty());
        }
    }

    #[tokio::test]
    async fn test_rate_limited_submission_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_pool().unwrap();
        let (orch, converter) =
            orchestrator(pool.clone(), Ok(output(dir.path())), Arc::new(NoopJobCache), 1);

        let submission =
            Submission::new("https://example.com/page").with_device(Some("dev".into()));
        let first = drain(orch.submit(submission.clone())).await;
        assert!(matches!(first.last(), Some(ProgressEvent::Completed(_))));

        let second = drain(orch.submit(submission)).await;
        assert_eq!(second, vec![ProgressEvent::rate_limited(1)]);

        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
        let conn = pool.get().unwrap();
        assert_eq!(conversions::list_recent(&conn, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_device_is_unmetered() {
        let submission = Submission::new("https://a.test").with_device(Some(String::new()));
        assert!(submission.device_id.is_none());
    }

    #[tokio::test]
    async fn test_resolve_same_shape_from_cache_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_pool().unwrap();
        let (cached, _) = orchestrator(
            pool.clone(),
            Ok(output(dir.path())),
            Arc::new(BoundedJobCache::new(8)),
            5,
        );

        let job_id = match cached.convert(Submission::new("https://example.com/page")).await {
            ProgressEvent::Completed(job) => job.job_id,
            other => panic!("expected completion, got {:?}", other),
        };

        let (uncached, _) =
            orchestrator(pool, Ok(output(dir.path())), Arc::new(NoopJobCache), 5);

        let from_cache = cached.resolve(&job_id).unwrap();
        let from_store = uncached.resolve(&job_id).unwrap();
        assert_eq!(from_cache, from_store);
    }

    #[tokio::test]
    async fn test_resolve_unknown_job() {
        let (orch, _) = orchestrator(
            init_memory_pool().unwrap(),
            Err(ConversionError::Failed("x".into())),
            Arc::new(NoopJobCache),
            5,
        );
        assert!(matches!(orch.resolve("nope"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_record_download_increments() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_pool().unwrap();
        let (orch, _) =
            orchestrator(pool.clone(), Ok(output(dir.path())), Arc::new(NoopJobCache), 5);

        let job_id = match orch.convert(Submission::new("https://example.com/page")).await {
            ProgressEvent::Completed(job) => job.job_id,
            other => panic!("expected completion, got {:?}", other),
        };

        orch.record_download(&job_id, DocumentFormat::Pdf).await.unwrap();
        orch.record_download(&job_id, DocumentFormat::Pdf).await.unwrap();
        orch.record_download(&job_id, DocumentFormat::Epub).await.unwrap();
        orch.record_download("unknown", DocumentFormat::Epub).await.unwrap();

        let conn = pool.get().unwrap();
        let row = conversions::get_conversion(&conn, &job_id).unwrap();
        assert_eq!(row.pdf_downloads, 2);
        assert_eq!(row.epub_downloads, 1);
    }
}
