//! The external page renderer.
//!
//! Rendering a page into PDF and EPUB is done by a separate program. The
//! service only drives it: it passes the URL, viewport and output
//! directory, relays the progress lines it prints, and picks up the final
//! result line.
//!
//! Renderer stdout protocol, one JSON object per line:
//!
//! ```text
//! {"progress": 30, "message": "Loading page"}
//! {"result": {"title": "...", "pdf_path": "...", "epub_path": "...",
//!             "source_url": "...", "page_size": "...",
//!             "viewport_dimensions": "430x932", "conversion_time": 4.2}}
//! {"error": "net::ERR_NAME_NOT_RESOLVED"}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::events::ProgressEvent;
use crate::config::ConverterConfig;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 430;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 932;

/// Input for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub output_dir: PathBuf,
}

/// What the renderer produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub title: String,
    pub pdf_path: String,
    pub epub_path: String,
    pub source_url: String,
    #[serde(default)]
    pub page_size: String,
    #[serde(default)]
    pub viewport_dimensions: String,
    #[serde(default)]
    pub conversion_time: f64,
}

/// A conversion that did not produce artifacts.
///
/// The display text is what gets stored on the failed row and sent to the
/// client, so renderer messages pass through untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("{0}")]
    Failed(String),

    #[error("Timeout: conversion did not finish within {0} seconds")]
    Timeout(u64),

    #[error("Converter not configured: {0}")]
    NotConfigured(String),
}

/// Forwards progress updates from a running conversion to its stream.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that discards updates.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn report(&self, progress: u8, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            if tx.send(ProgressEvent::progress(progress, message)).await.is_err() {
                debug!("Progress receiver dropped");
            }
        }
    }
}

/// Something that turns a URL into document artifacts.
#[async_trait]
pub trait PageConverter: Send + Sync {
    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &ProgressReporter,
    ) -> Result<ConversionOutput, ConversionError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RendererLine {
    Result { result: ConversionOutput },
    Error { error: String },
    Progress { progress: f64, message: String },
}

/// Runs the configured renderer program as a child process.
///
/// The child is killed when the conversion future is dropped, which is how a
/// disconnected client stops its conversion.
pub struct CommandConverter {
    program: Option<PathBuf>,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandConverter {
    pub fn new(program: Option<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(
        &self,
        program: &Path,
        request: &ConversionRequest,
        progress: &ProgressReporter,
    ) -> Result<ConversionOutput, ConversionError> {
        let mut child = Command::new(program)
            .args(&self.args)
            .arg("--url")
            .arg(&request.url)
            .arg("--viewport-width")
            .arg(request.viewport_width.to_string())
            .arg("--viewport-height")
            .arg(request.viewport_height.to_string())
            .arg("--output-dir")
            .arg(&request.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::Failed(format!("Failed to start renderer: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConversionError::Failed("Renderer stdout unavailable".into()))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut result = None;
        let mut failure = None;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ConversionError::Failed(format!("Failed to read renderer output: {}", e)))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<RendererLine>(line) {
                Ok(RendererLine::Progress { progress: pct, message }) => {
                    progress.report(pct.clamp(0.0, 100.0) as u8, message).await;
                }
                Ok(RendererLine::Result { result: output }) => result = Some(output),
                Ok(RendererLine::Error { error }) => failure = Some(error),
                Err(_) => debug!(line, "Ignoring renderer output line"),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ConversionError::Failed(format!("Failed to wait for renderer: {}", e)))?;

        if let Some(message) = failure {
            return Err(ConversionError::Failed(message));
        }

        if !status.success() {
            warn!(%status, url = %request.url, "Renderer exited unsuccessfully");
            return Err(ConversionError::Failed(format!(
                "Renderer exited with {}",
                status
            )));
        }

        result.ok_or_else(|| ConversionError::Failed("Renderer produced no result".into()))
    }
}

#[async_trait]
impl PageConverter for CommandConverter {
    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &ProgressReporter,
    ) -> Result<ConversionOutput, ConversionError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| ConversionError::NotConfigured("converter.program is not set".into()))?;

        match tokio::time::timeout(self.timeout, self.run(program, request, progress)).await {
            Ok(result) => result,
            Err(_) => Err(ConversionError::Timeout(self.timeout.as_secs())),
        }
    }
}
