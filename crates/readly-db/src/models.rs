//! Rust models matching the database schema.
//!
//! Timestamps are stored as UTC text in `YYYY-MM-DD HH:MM:SS.mmm` form. That
//! format sorts lexicographically in time order and is understood by SQLite's
//! date functions, which the daily trend query relies on.

use chrono::{DateTime, NaiveDateTime, Utc};
use readly_common::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// Storage format for `created_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format a UTC timestamp for storage or comparison.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts values with or without fractional seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A finished conversion as stored in the `conversions` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionRecord {
    pub job_id: JobId,
    pub url: String,
    pub title: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub viewport_width: Option<i64>,
    pub viewport_height: Option<i64>,
    pub page_size: Option<String>,
    pub pdf_path: Option<String>,
    pub epub_path: Option<String>,
    pub pdf_size_bytes: Option<i64>,
    pub epub_size_bytes: Option<i64>,
    pub pdf_downloads: i64,
    pub epub_downloads: i64,
    pub conversion_time: Option<f64>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Values for inserting a finished conversion.
///
/// Success-only fields stay `None` on failed rows; `error_message` is only
/// set on failed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversion {
    pub job_id: JobId,
    pub url: String,
    pub title: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub viewport_width: Option<i64>,
    pub viewport_height: Option<i64>,
    pub page_size: Option<String>,
    pub pdf_path: Option<String>,
    pub epub_path: Option<String>,
    pub pdf_size_bytes: Option<i64>,
    pub epub_size_bytes: Option<i64>,
    pub conversion_time: Option<f64>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewConversion {
    /// A successful conversion with its artifacts. Remaining optional fields
    /// can be filled in by the caller.
    pub fn success(
        url: impl Into<String>,
        title: impl Into<String>,
        pdf_path: impl Into<String>,
        epub_path: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            url: url.into(),
            title: Some(title.into()),
            status: JobStatus::Success,
            error_message: None,
            viewport_width: None,
            viewport_height: None,
            page_size: None,
            pdf_path: Some(pdf_path.into()),
            epub_path: Some(epub_path.into()),
            pdf_size_bytes: None,
            epub_size_bytes: None,
            conversion_time: None,
            device_id: None,
            created_at,
        }
    }

    /// A failed conversion carrying the failure message verbatim.
    pub fn failed(
        url: impl Into<String>,
        error_message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            url: url.into(),
            title: None,
            status: JobStatus::Failed,
            error_message: Some(error_message.into()),
            viewport_width: None,
            viewport_height: None,
            page_size: None,
            pdf_path: None,
            epub_path: None,
            pdf_size_bytes: None,
            epub_size_bytes: None,
            conversion_time: None,
            device_id: None,
            created_at,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_viewport(mut self, width: Option<i64>, height: Option<i64>) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }
}

/// What a download needs to locate a job's artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobArtifacts {
    pub title: String,
    pub pdf_path: Option<String>,
    pub epub_path: Option<String>,
}

/// A row selected for retention cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredConversion {
    pub job_id: JobId,
    pub pdf_path: Option<String>,
    pub epub_path: Option<String>,
}

/// Whole-table counters for the summary statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryCounts {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub today: u64,
    pub this_week: u64,
    pub avg_conversion_time: Option<f64>,
    pub avg_pdf_size_bytes: Option<f64>,
    pub avg_epub_size_bytes: Option<f64>,
    pub total_pdf_downloads: u64,
    pub total_epub_downloads: u64,
}

/// Device-level counters for engagement metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementCounts {
    pub active_devices_7d: u64,
    pub active_devices_30d: u64,
    pub total_devices: u64,
    pub repeat_devices: u64,
    pub avg_jobs_per_device: Option<f64>,
}

/// Jobs grouped by exact source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCount {
    pub url: String,
    pub count: u64,
    pub success_count: u64,
}

/// Jobs grouped by local calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub unique_devices: u64,
}

/// Failed jobs grouped by exact error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessageCount {
    pub message: String,
    pub count: u64,
}
