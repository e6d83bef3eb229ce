//! Progress events emitted while a conversion runs.
//!
//! Each stream carries zero or more [`ProgressEvent::Progress`] updates
//! followed by exactly one terminal event.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Final payload of a successful conversion, as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJob {
    pub job_id: String,
    pub title: String,
    pub pdf_url: String,
    pub epub_url: String,
    pub source_url: String,
    pub viewport_dimensions: String,
    pub page_size: String,
    pub conversion_time: f64,
}

/// One message on a progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress { progress: u8, message: String },
    Completed(Box<CompletedJob>),
    RateLimited { message: String, max_per_day: u32 },
    Error { message: String },
}

impl ProgressEvent {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self::Progress {
            progress: progress.min(100),
            message: message.into(),
        }
    }

    pub fn rate_limited(max_per_day: u32) -> Self {
        Self::RateLimited {
            message: readly_common::Error::RateLimited { max_per_day }.to_string(),
            max_per_day,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// JSON object sent as the `data:` field of a server-sent event.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Progress { progress, message } => json!({
                "progress": progress,
                "message": message,
            }),
            Self::Completed(job) => json!({
                "progress": 100,
                "message": "Complete!",
                "complete": true,
                "job_id": job.job_id,
                "title": job.title,
                "pdf_url": job.pdf_url,
                "epub_url": job.epub_url,
                "source_url": job.source_url,
                "viewport_dimensions": job.viewport_dimensions,
                "page_size": job.page_size,
                "conversion_time": job.conversion_time,
            }),
            Self::RateLimited { message, .. } => json!({
                "progress": 0,
                "message": message,
                "error": true,
                "rate_limited": true,
            }),
            Self::Error { message } => json!({
                "progress": 0,
                "message": message,
                "error": true,
            }),
        }
    }
}
