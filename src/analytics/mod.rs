//! Reporting over the tracking store.
//!
//! All of this is read-only. The store returns raw counts; this module turns
//! them into rates, megabytes, domain groups, daily trends and the failure
//! taxonomy. Every ratio with a zero denominator reports 0 and every derived
//! figure is rounded to one decimal place.

pub mod calendar;
pub mod taxonomy;

use chrono::{DateTime, Duration, Utc};
use readly_common::Result;
use readly_db::models::{ConversionRecord, DailyCount, UrlCount};
use readly_db::pool::{get_conn, DbPool};
use readly_db::queries::{analytics as queries, conversions};
use serde::Serialize;
use std::collections::HashMap;

pub use calendar::{format_local, local_day_boundary};
pub use taxonomy::{breakdown, classify, ErrorBreakdown, ErrorCategory};

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

fn megabytes(bytes: Option<f64>) -> f64 {
    round1(bytes.unwrap_or(0.0) / BYTES_PER_MB)
}

/// Authority part of a URL: the text between `://` and the next `/`.
///
/// This is a literal split, not a URL parse. Input without `://` is
/// returned whole.
pub fn url_authority(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest),
        None => url,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_conversions: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub today: u64,
    pub this_week: u64,
    pub avg_conversion_time: f64,
    pub avg_pdf_size_mb: f64,
    pub avg_epub_size_mb: f64,
    pub total_pdf_downloads: u64,
    pub total_epub_downloads: u64,
    pub total_downloads: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Engagement {
    pub active_devices_7d: u64,
    pub active_devices_30d: u64,
    pub total_devices: u64,
    pub repeat_devices: u64,
    pub retention_rate: f64,
    pub avg_jobs_per_device: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u64,
    pub success_count: u64,
}

/// A job as listed on the reporting surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentJob {
    pub job_id: String,
    pub url: String,
    pub title: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub viewport_width: Option<i64>,
    pub viewport_height: Option<i64>,
    pub page_size: Option<String>,
    pub pdf_size_bytes: Option<i64>,
    pub epub_size_bytes: Option<i64>,
    pub pdf_downloads: i64,
    pub epub_downloads: i64,
    pub conversion_time: Option<f64>,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub created_at: String,
}

impl RecentJob {
    pub fn from_record(record: ConversionRecord, utc_offset_hours: i32) -> Self {
        Self {
            job_id: record.job_id.to_string(),
            url: record.url,
            title: record.title,
            status: record.status.to_string(),
            error_message: record.error_message,
            viewport_width: record.viewport_width,
            viewport_height: record.viewport_height,
            page_size: record.page_size,
            pdf_size_bytes: record.pdf_size_bytes,
            epub_size_bytes: record.epub_size_bytes,
            pdf_downloads: record.pdf_downloads,
            epub_downloads: record.epub_downloads,
            conversion_time: record.conversion_time,
            created_at: format_local(record.created_at, utc_offset_hours),
        }
    }
}

/// Group per-URL counts by authority, largest first, at most `limit` entries.
///
/// Ties are broken by domain name so the order is stable.
pub fn group_domains(urls: Vec<UrlCount>, limit: usize) -> Vec<DomainCount> {
    let mut grouped: HashMap<String, (u64, u64)> = HashMap::new();
    for row in urls {
        let entry = grouped.entry(url_authority(&row.url).to_string()).or_default();
        entry.0 += row.count;
        entry.1 += row.success_count;
    }

    let mut domains: Vec<DomainCount> = grouped
        .into_iter()
        .map(|(domain, (count, success_count))| DomainCount {
            domain,
            count,
            success_count,
        })
        .collect();
    domains.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
    domains.truncate(limit);
    domains
}

/// Read-side aggregator bound to one store and one local offset.
#[derive(Clone)]
pub struct Analytics {
    pool: DbPool,
    utc_offset_hours: i32,
}

impl Analytics {
    pub fn new(pool: DbPool, utc_offset_hours: i32) -> Self {
        Self {
            pool,
            utc_offset_hours,
        }
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }

    pub fn summary(&self, now: DateTime<Utc>) -> Result<SummaryStats> {
        let (day_start, week_start) = local_day_boundary(now, self.utc_offset_hours);
        let conn = get_conn(&self.pool)?;
        let counts = queries::summary_counts(&conn, day_start, week_start)?;

        Ok(SummaryStats {
            total_conversions: counts.total,
            successful: counts.success,
            failed: counts.failed,
            success_rate: percentage(counts.success, counts.total),
            today: counts.today,
            this_week: counts.this_week,
            avg_conversion_time: round1(counts.avg_conversion_time.unwrap_or(0.0)),
            avg_pdf_size_mb: megabytes(counts.avg_pdf_size_bytes),
            avg_epub_size_mb: megabytes(counts.avg_epub_size_bytes),
            total_pdf_downloads: counts.total_pdf_downloads,
            total_epub_downloads: counts.total_epub_downloads,
            total_downloads: counts.total_pdf_downloads + counts.total_epub_downloads,
        })
    }

    pub fn engagement(&self, now: DateTime<Utc>) -> Result<Engagement> {
        let conn = get_conn(&self.pool)?;
        let counts = queries::engagement_counts(&conn, now)?;

        Ok(Engagement {
            active_devices_7d: counts.active_devices_7d,
            active_devices_30d: counts.active_devices_30d,
            total_devices: counts.total_devices,
            repeat_devices: counts.repeat_devices,
            retention_rate: percentage(counts.repeat_devices, counts.total_devices),
            avg_jobs_per_device: round1(counts.avg_jobs_per_device.unwrap_or(0.0)),
        })
    }

    pub fn top_domains(&self, limit: usize) -> Result<Vec<DomainCount>> {
        let conn = get_conn(&self.pool)?;
        Ok(group_domains(queries::url_counts(&conn)?, limit))
    }

    /// Per-day counts for the trailing `days`, oldest first.
    pub fn daily_trend(&self, days: u32, now: DateTime<Utc>) -> Result<Vec<DailyCount>> {
        let conn = get_conn(&self.pool)?;
        queries::daily_counts(
            &conn,
            now - Duration::days(i64::from(days)),
            self.utc_offset_hours,
        )
    }

    pub fn error_breakdown(&self) -> Result<Vec<ErrorBreakdown>> {
        let conn = get_conn(&self.pool)?;
        let messages = queries::error_message_counts(&conn)?;
        Ok(breakdown(
            messages.iter().map(|row| (row.message.as_str(), row.count)),
        ))
    }

    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<RecentJob>> {
        let conn = get_conn(&self.pool)?;
        Ok(conversions::list_recent(&conn, limit)?
            .into_iter()
            .map(|record| RecentJob::from_record(record, self.utc_offset_hours))
            .collect())
    }
}
