use crate::analytics::format_local;
use crate::server::{error::AppError, AppContext};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use readly_common::{DocumentFormat, Error};
use readly_db::models::ConversionRecord;
use readly_db::pool::get_conn;
use readly_db::queries::conversions;
use serde::{Deserialize, Serialize};

const DEVICE_JOB_LIMIT: usize = 50;

pub fn jobs_routes() -> Router<AppContext> {
    Router::new().route("/jobs", get(list_jobs))
}

#[derive(Debug, Deserialize)]
pub struct JobsParams {
    pub device_id: Option<String>,
}

/// A device's job with download links instead of filesystem paths.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceJob {
    pub job_id: String,
    pub url: String,
    pub title: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub pdf_url: Option<String>,
    pub epub_url: Option<String>,
    pub pdf_size_bytes: Option<i64>,
    pub epub_size_bytes: Option<i64>,
    pub conversion_time: Option<f64>,
    pub created_at: String,
}

impl DeviceJob {
    fn from_record(record: ConversionRecord, utc_offset_hours: i32) -> Self {
        let job_id = record.job_id.to_string();
        let link = |path: &Option<String>, format: DocumentFormat| {
            path.as_ref().map(|_| format.download_path(&job_id))
        };

        Self {
            pdf_url: link(&record.pdf_path, DocumentFormat::Pdf),
            epub_url: link(&record.epub_path, DocumentFormat::Epub),
            url: record.url,
            title: record.title,
            status: record.status.to_string(),
            error_message: record.error_message,
            pdf_size_bytes: record.pdf_size_bytes,
            epub_size_bytes: record.epub_size_bytes,
            conversion_time: record.conversion_time,
            created_at: format_local(record.created_at, utc_offset_hours),
            job_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub max_per_day: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobsResponse {
    pub jobs: Vec<DeviceJob>,
    pub rate_limit: RateLimitStatus,
}

/// List a device's jobs, newest first, with its remaining quota.
async fn list_jobs(
    State(ctx): State<AppContext>,
    Query(params): Query<JobsParams>,
) -> Result<Json<JobsResponse>, AppError> {
    let device_id = params
        .device_id
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::invalid_input("device_id is required"))?;

    let records = {
        let conn = get_conn(&ctx.pool)?;
        conversions::list_device_jobs(&conn, &device_id, DEVICE_JOB_LIMIT)?
    };

    let offset = ctx.config.analytics.utc_offset_hours;
    let jobs = records
        .into_iter()
        .map(|record| DeviceJob::from_record(record, offset))
        .collect();

    let max_per_day = ctx.orchestrator.max_per_day();
    let remaining = ctx
        .orchestrator
        .rate_limiter()
        .remaining(&device_id, max_per_day)?;

    Ok(Json(JobsResponse {
        jobs,
        rate_limit: RateLimitStatus {
            remaining,
            max_per_day,
        },
    }))
}
