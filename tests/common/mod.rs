//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] over a
//! temporary data directory and a [`ScriptedConverter`] standing in for the
//! external renderer. Requests go through the router in-process with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use readly::config::Config;
use readly::conversion::{
    BoundedJobCache, ConversionError, ConversionOutput, ConversionRequest, JobCache,
    NoopJobCache, PageConverter, ProgressReporter,
};
use readly::server::{create_router, AppContext};
use readly_db::models::ConversionRecord;
use readly_db::pool::{init_pool, DbPool};
use readly_db::queries::conversions;
use tempfile::TempDir;
use tower::ServiceExt;

/// What the scripted converter does with every request.
#[derive(Debug, Clone)]
pub enum Script {
    /// Write both artifacts and succeed.
    Succeed { title: String },
    /// Report a failure with this message.
    Fail(String),
    /// Never finish.
    Hang,
    /// Panic after reporting progress.
    Panic,
}

/// Sets a flag when dropped, i.e. when a hanging conversion is cancelled.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedConverter {
    script: Script,
    pub calls: AtomicUsize,
    pub started: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
}

impl ScriptedConverter {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            started: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageConverter for ScriptedConverter {
    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &ProgressReporter,
    ) -> Result<ConversionOutput, ConversionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        progress.report(10, "Loading page").await;
        progress.report(60, "Generating PDF").await;

        match &self.script {
            Script::Succeed { title } => {
                std::fs::create_dir_all(&request.output_dir).unwrap();
                let pdf = request.output_dir.join(format!("job-{}.pdf", call));
                let epub = request.output_dir.join(format!("job-{}.epub", call));
                std::fs::write(&pdf, format!("%PDF {}", title)).unwrap();
                std::fs::write(&epub, format!("EPUB {}", title)).unwrap();
                progress.report(90, "Generating EPUB").await;

                Ok(ConversionOutput {
                    title: title.clone(),
                    pdf_path: pdf.to_string_lossy().into_owned(),
                    epub_path: epub.to_string_lossy().into_owned(),
                    source_url: request.url.clone(),
                    page_size: "A5".to_string(),
                    viewport_dimensions: format!(
                        "{}x{}",
                        request.viewport_width, request.viewport_height
                    ),
                    conversion_time: 1.2,
                })
            }
            Script::Fail(message) => Err(ConversionError::Failed(message.clone())),
            Script::Hang => {
                let _flag = DropFlag(Arc::clone(&self.cancelled));
                self.started.store(true, Ordering::SeqCst);
                std::future::pending().await
            }
            Script::Panic => panic!("scripted converter panic"),
        }
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] backed by a
/// database in a temporary directory.
pub struct TestHarness {
    pub ctx: AppContext,
    pub app: Router,
    pub pool: DbPool,
    pub converter: Arc<ScriptedConverter>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new(script: Script) -> Self {
        Self::build(script, Config::default(), true)
    }

    pub fn with_config(script: Script, config: Config) -> Self {
        Self::build(script, config, true)
    }

    /// Harness whose fast-path cache never hits.
    pub fn without_cache(script: Script) -> Self {
        Self::build(script, Config::default(), false)
    }

    fn build(script: Script, mut config: Config, cached: bool) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.data_dir = dir.path().to_path_buf();

        let db_path = config.storage.db_path();
        let pool = init_pool(&db_path.to_string_lossy()).expect("failed to create pool");

        let converter = Arc::new(ScriptedConverter::new(script));
        let cache: Arc<dyn JobCache> = if cached {
            Arc::new(BoundedJobCache::new(config.cache.max_entries))
        } else {
            Arc::new(NoopJobCache)
        };

        let ctx = AppContext::new(config, pool.clone(), converter.clone(), cache);
        let app = create_router(ctx.clone());

        Self {
            ctx,
            app,
            pool,
            converter,
            dir,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub fn rows(&self) -> Vec<ConversionRecord> {
        let conn = self.pool.get().unwrap();
        conversions::list_recent(&conn, 1000).unwrap()
    }

    pub fn row(&self, job_id: &str) -> ConversionRecord {
        let conn = self.pool.get().unwrap();
        conversions::get_conversion(&conn, job_id).unwrap()
    }

    pub fn artifact_dir(&self) -> std::path::PathBuf {
        self.ctx.config.storage.artifact_dir()
    }

    /// Wait until the job's counters reach the expected values.
    pub async fn wait_for_downloads(&self, job_id: &str, pdf: i64, epub: i64) -> ConversionRecord {
        for _ in 0..100 {
            let row = self.row(job_id);
            if row.pdf_downloads == pdf && row.epub_downloads == epub {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.row(job_id)
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// JSON payloads of the `data:` lines in an SSE body.
pub fn sse_events(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

pub fn exists(path: &str) -> bool {
    Path::new(path).exists()
}
