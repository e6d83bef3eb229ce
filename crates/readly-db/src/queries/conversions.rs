//! Conversion record query operations.
//!
//! Rows are inserted once, when a conversion finishes. After that the only
//! mutations are the download counters and retention deletes.

use chrono::{DateTime, Utc};
use readly_common::{DocumentFormat, Error, JobId, JobStatus, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    format_timestamp, parse_timestamp, ConversionRecord, ExpiredConversion, JobArtifacts,
    NewConversion,
};

const RECORD_COLUMNS: &str = "job_id, url, title, status, error_message, viewport_width,
    viewport_height, page_size, pdf_path, epub_path, pdf_size_bytes, epub_size_bytes,
    pdf_downloads, epub_downloads, conversion_time, device_id, created_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ConversionRecord> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(16)?;

    Ok(ConversionRecord {
        job_id: JobId::from(row.get::<_, String>(0)?),
        url: row.get(1)?,
        title: row.get(2)?,
        status: status.parse().unwrap_or(JobStatus::Failed),
        error_message: row.get(4)?,
        viewport_width: row.get(5)?,
        viewport_height: row.get(6)?,
        page_size: row.get(7)?,
        pdf_path: row.get(8)?,
        epub_path: row.get(9)?,
        pdf_size_bytes: row.get(10)?,
        epub_size_bytes: row.get(11)?,
        pdf_downloads: row.get(12)?,
        epub_downloads: row.get(13)?,
        conversion_time: row.get(14)?,
        device_id: row.get(15)?,
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
    })
}

/// Insert a finished conversion.
///
/// Fails with a database error if the job id already exists.
pub fn insert_conversion(conn: &Connection, job: &NewConversion) -> Result<()> {
    conn.execute(
        "INSERT INTO conversions
         (job_id, url, title, status, error_message, viewport_width, viewport_height,
          page_size, pdf_path, epub_path, pdf_size_bytes, epub_size_bytes,
          conversion_time, device_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            job.job_id.as_str(),
            &job.url,
            &job.title,
            job.status.as_str(),
            &job.error_message,
            job.viewport_width,
            job.viewport_height,
            &job.page_size,
            &job.pdf_path,
            &job.epub_path,
            job.pdf_size_bytes,
            job.epub_size_bytes,
            job.conversion_time,
            &job.device_id,
            format_timestamp(job.created_at),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Get a full conversion record by job id.
pub fn get_conversion(conn: &Connection, job_id: &str) -> Result<ConversionRecord> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM conversions WHERE job_id = ?"),
        [job_id],
        row_to_record,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("job {}", job_id)),
        _ => Error::database(e.to_string()),
    })
}

/// Look up the title and artifact paths of a job.
///
/// Failed jobs have no title and resolve to an empty one, matching what a
/// download of a missing artifact needs: the path check fails afterwards.
pub fn get_artifacts(conn: &Connection, job_id: &str) -> Result<Option<JobArtifacts>> {
    conn.query_row(
        "SELECT title, pdf_path, epub_path FROM conversions WHERE job_id = ?",
        [job_id],
        |row| {
            Ok(JobArtifacts {
                title: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                pdf_path: row.get(1)?,
                epub_path: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Atomically increment the download counter for one format.
///
/// Returns whether a row was updated.
pub fn increment_download(
    conn: &Connection,
    job_id: &str,
    format: DocumentFormat,
) -> Result<bool> {
    let sql = match format {
        DocumentFormat::Pdf => {
            "UPDATE conversions SET pdf_downloads = pdf_downloads + 1 WHERE job_id = ?"
        }
        DocumentFormat::Epub => {
            "UPDATE conversions SET epub_downloads = epub_downloads + 1 WHERE job_id = ?"
        }
    };

    let affected = conn
        .execute(sql, [job_id])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}

/// Most recent conversions, newest first.
pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<ConversionRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM conversions
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let records = stmt
        .query_map(params![limit as i64], row_to_record)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(records)
}

/// Conversions submitted by one device, newest first.
pub fn list_device_jobs(
    conn: &Connection,
    device_id: &str,
    limit: usize,
) -> Result<Vec<ConversionRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM conversions
             WHERE device_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let records = stmt
        .query_map(params![device_id, limit as i64], row_to_record)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(records)
}

/// Count a device's conversions created at or after `since`.
pub fn count_device_jobs_since(
    conn: &Connection,
    device_id: &str,
    since: DateTime<Utc>,
) -> Result<u64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM conversions WHERE device_id = ? AND created_at >= ?",
            params![device_id, format_timestamp(since)],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(count as u64)
}

/// Conversions created at or before `cutoff`.
pub fn list_created_up_to(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ExpiredConversion>> {
    let mut stmt = conn
        .prepare(
            "SELECT job_id, pdf_path, epub_path FROM conversions
             WHERE created_at <= ?
             ORDER BY created_at ASC",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([format_timestamp(cutoff)], |row| {
            Ok(ExpiredConversion {
                job_id: JobId::from(row.get::<_, String>(0)?),
                pdf_path: row.get(1)?,
                epub_path: row.get(2)?,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows)
}

/// Delete the given jobs in one transaction. Returns the number of rows removed;
/// ids that no longer exist are skipped.
pub fn delete_conversions(conn: &Connection, job_ids: &[JobId]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut deleted = 0;
    {
        let mut stmt = tx
            .prepare("DELETE FROM conversions WHERE job_id = ?")
            .map_err(|e| Error::database(e.to_string()))?;
        for job_id in job_ids {
            deleted += stmt
                .execute([job_id.as_str()])
                .map_err(|e| Error::database(e.to_string()))?;
        }
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(deleted)
}
