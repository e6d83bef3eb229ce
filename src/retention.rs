//! Retention cleanup.
//!
//! Deletes conversions at least the configured age old together with their
//! artifact files. Files go first and best-effort; a file that is already
//! gone is not an error. Rows inserted while a pass runs are newer than the
//! cutoff and are never selected.

use chrono::{DateTime, Duration, Utc};
use readly_common::Result;
use readly_db::pool::{get_conn, DbPool};
use readly_db::queries::conversions;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::RetentionConfig;

/// Run one retention pass and return the number of rows deleted.
pub fn run_cleanup(pool: &DbPool, max_age_days: u32, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now - Duration::days(i64::from(max_age_days));

    let expired = {
        let conn = get_conn(pool)?;
        conversions::list_created_up_to(&conn, cutoff)?
    };

    if expired.is_empty() {
        debug!("No conversions older than {} days", max_age_days);
        return Ok(0);
    }

    for job in &expired {
        for path in [&job.pdf_path, &job.epub_path].into_iter().flatten() {
            remove_artifact(Path::new(path));
        }
    }

    let ids: Vec<_> = expired.into_iter().map(|job| job.job_id).collect();
    let conn = get_conn(pool)?;
    let deleted = conversions::delete_conversions(&conn, &ids)?;

    info!(deleted, max_age_days, "Retention cleanup removed old conversions");
    Ok(deleted)
}

fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed artifact {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove artifact {:?}: {}", path, e),
    }
}

/// Start the periodic retention task.
pub fn start_retention_task(pool: DbPool, config: RetentionConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let pool = pool.clone();
            let max_age_days = config.max_age_days;
            let result =
                tokio::task::spawn_blocking(move || run_cleanup(&pool, max_age_days, Utc::now()))
                    .await;

            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Retention cleanup failed: {}", e),
                Err(e) => error!("Retention cleanup task panicked: {}", e),
            }
        }
    })
}
