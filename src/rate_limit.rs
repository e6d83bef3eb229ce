//! Per-device conversion quota.
//!
//! The window is the trailing 24 hours, counted from the tracking store at
//! call time. Nothing is reset or decayed; old rows simply fall outside the
//! window.

use chrono::{DateTime, Duration, Utc};
use readly_common::Result;
use readly_db::pool::{get_conn, DbPool};
use readly_db::queries::conversions;

/// Length of the sliding window.
pub const WINDOW_HOURS: i64 = 24;

#[derive(Clone)]
pub struct RateLimiter {
    pool: DbPool,
}

impl RateLimiter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Whether `device_id` may start another conversion now.
    pub fn admit(&self, device_id: &str, max_per_day: u32) -> Result<bool> {
        self.admit_at(device_id, max_per_day, Utc::now())
    }

    /// Conversions left for `device_id` in the current window. Never negative.
    pub fn remaining(&self, device_id: &str, max_per_day: u32) -> Result<u32> {
        self.remaining_at(device_id, max_per_day, Utc::now())
    }

    pub fn admit_at(&self, device_id: &str, max_per_day: u32, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.recent_count(device_id, now)? < u64::from(max_per_day))
    }

    pub fn remaining_at(
        &self,
        device_id: &str,
        max_per_day: u32,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let used = self.recent_count(device_id, now)?;
        Ok(u64::from(max_per_day).saturating_sub(used) as u32)
    }

    fn recent_count(&self, device_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        conversions::count_device_jobs_since(&conn, device_id, now - Duration::hours(WINDOW_HOURS))
    }
}
