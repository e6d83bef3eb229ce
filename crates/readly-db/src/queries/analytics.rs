//! Read-only aggregate queries over the conversions table.
//!
//! These return raw counts and averages. Rounding, ratios, domain grouping
//! and error classification happen in the service's analytics layer.

use chrono::{DateTime, Duration, Utc};
use readly_common::{Error, Result};
use rusqlite::{params, Connection};

use crate::models::{
    format_timestamp, DailyCount, EngagementCounts, ErrorMessageCount, SummaryCounts, UrlCount,
};

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<u64> {
    let value: i64 = conn
        .query_row(sql, params, |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(value.max(0) as u64)
}

fn average(conn: &Connection, sql: &str) -> Result<Option<f64>> {
    conn.query_row(sql, [], |row| row.get::<_, Option<f64>>(0))
        .map_err(|e| Error::database(e.to_string()))
}

/// Whole-table counters, with "today" and "this week" measured from the
/// given UTC boundaries.
pub fn summary_counts(
    conn: &Connection,
    day_start: DateTime<Utc>,
    week_start: DateTime<Utc>,
) -> Result<SummaryCounts> {
    let total = count(conn, "SELECT COUNT(*) FROM conversions", [])?;
    let success = count(
        conn,
        "SELECT COUNT(*) FROM conversions WHERE status = 'success'",
        [],
    )?;
    let failed = count(
        conn,
        "SELECT COUNT(*) FROM conversions WHERE status = 'failed'",
        [],
    )?;
    let today = count(
        conn,
        "SELECT COUNT(*) FROM conversions WHERE created_at >= ?",
        [format_timestamp(day_start)],
    )?;
    let this_week = count(
        conn,
        "SELECT COUNT(*) FROM conversions WHERE created_at >= ?",
        [format_timestamp(week_start)],
    )?;

    let avg_conversion_time = average(
        conn,
        "SELECT AVG(conversion_time) FROM conversions
         WHERE status = 'success' AND conversion_time IS NOT NULL",
    )?;
    let avg_pdf_size_bytes = average(
        conn,
        "SELECT AVG(pdf_size_bytes) FROM conversions
         WHERE status = 'success' AND pdf_size_bytes IS NOT NULL",
    )?;
    let avg_epub_size_bytes = average(
        conn,
        "SELECT AVG(epub_size_bytes) FROM conversions
         WHERE status = 'success' AND epub_size_bytes IS NOT NULL",
    )?;

    let total_pdf_downloads = count(
        conn,
        "SELECT COALESCE(SUM(pdf_downloads), 0) FROM conversions",
        [],
    )?;
    let total_epub_downloads = count(
        conn,
        "SELECT COALESCE(SUM(epub_downloads), 0) FROM conversions",
        [],
    )?;

    Ok(SummaryCounts {
        total,
        success,
        failed,
        today,
        this_week,
        avg_conversion_time,
        avg_pdf_size_bytes,
        avg_epub_size_bytes,
        total_pdf_downloads,
        total_epub_downloads,
    })
}

/// Device activity counters relative to `now`.
pub fn engagement_counts(conn: &Connection, now: DateTime<Utc>) -> Result<EngagementCounts> {
    let active_since = |days: i64| {
        count(
            conn,
            "SELECT COUNT(DISTINCT device_id) FROM conversions
             WHERE device_id IS NOT NULL AND created_at >= ?",
            [format_timestamp(now - Duration::days(days))],
        )
    };

    let active_devices_7d = active_since(7)?;
    let active_devices_30d = active_since(30)?;

    let total_devices = count(
        conn,
        "SELECT COUNT(DISTINCT device_id) FROM conversions WHERE device_id IS NOT NULL",
        [],
    )?;

    let repeat_devices = count(
        conn,
        "SELECT COUNT(*) FROM (
            SELECT device_id FROM conversions
            WHERE device_id IS NOT NULL
            GROUP BY device_id
            HAVING COUNT(*) > 1
         )",
        [],
    )?;

    let avg_jobs_per_device = average(
        conn,
        "SELECT AVG(cnt) FROM (
            SELECT COUNT(*) AS cnt FROM conversions
            WHERE device_id IS NOT NULL
            GROUP BY device_id
         )",
    )?;

    Ok(EngagementCounts {
        active_devices_7d,
        active_devices_30d,
        total_devices,
        repeat_devices,
        avg_jobs_per_device,
    })
}

/// Job and success counts per exact source URL.
pub fn url_counts(conn: &Connection) -> Result<Vec<UrlCount>> {
    let mut stmt = conn
        .prepare(
            "SELECT url,
                    COUNT(*),
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END)
             FROM conversions
             GROUP BY url",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(UrlCount {
                url: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
                success_count: row.get::<_, i64>(2)? as u64,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows)
}

/// Per-day counts for conversions created at or after `since`, grouped by the
/// calendar date at `utc_offset_hours`, ascending.
pub fn daily_counts(
    conn: &Connection,
    since: DateTime<Utc>,
    utc_offset_hours: i32,
) -> Result<Vec<DailyCount>> {
    let modifier = format!("{:+} hours", utc_offset_hours);

    let mut stmt = conn
        .prepare(
            "SELECT DATE(created_at, ?1) AS day,
                    COUNT(*),
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    COUNT(DISTINCT device_id)
             FROM conversions
             WHERE created_at >= ?2
             GROUP BY day
             ORDER BY day ASC",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map(params![modifier, format_timestamp(since)], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                total: row.get::<_, i64>(1)? as u64,
                success: row.get::<_, i64>(2)? as u64,
                failed: row.get::<_, i64>(3)? as u64,
                unique_devices: row.get::<_, i64>(4)? as u64,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows)
}

/// Failed jobs grouped by their exact error message.
pub fn error_message_counts(conn: &Connection) -> Result<Vec<ErrorMessageCount>> {
    let mut stmt = conn
        .prepare(
            "SELECT error_message, COUNT(*) FROM conversions
             WHERE status = 'failed' AND error_message IS NOT NULL
             GROUP BY error_message",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ErrorMessageCount {
                message: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows)
}
