//! Conversion submission routes.

use crate::conversion::{ProgressEvent, Submission, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH};
use crate::server::{error::AppError, AppContext};
use axum::{
    extract::{Query, State},
    http::{header, HeaderName},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use readly_common::Error;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;

pub fn convert_routes() -> Router<AppContext> {
    Router::new()
        .route("/convert", post(convert))
        .route("/convert/stream", get(convert_stream))
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub job_id: String,
    pub title: String,
    pub pdf_url: String,
    pub epub_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub url: String,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub device_id: Option<String>,
}

/// Accept only absolute http(s) URLs.
fn validate_url(raw: &str) -> Result<(), Error> {
    let parsed = reqwest::Url::parse(raw)
        .map_err(|e| Error::invalid_input(format!("Invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::invalid_input(format!(
            "Unsupported URL scheme: {}",
            other
        ))),
    }
}

/// Convert a page and wait for the result.
async fn convert(
    State(ctx): State<AppContext>,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>, AppError> {
    validate_url(&request.url)?;

    match ctx.orchestrator.convert(Submission::new(request.url)).await {
        ProgressEvent::Completed(job) => Ok(Json(ConvertResponse {
            job_id: job.job_id,
            title: job.title,
            pdf_url: job.pdf_url,
            epub_url: job.epub_url,
        })),
        ProgressEvent::RateLimited { max_per_day, .. } => {
            Err(Error::RateLimited { max_per_day }.into())
        }
        ProgressEvent::Error { message } => Err(Error::conversion(message).into()),
        ProgressEvent::Progress { .. } => Err(Error::internal("Conversion ended early").into()),
    }
}

/// Turn a progress channel into SSE events, ending after the terminal one.
fn event_stream(
    rx: mpsc::Receiver<ProgressEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((rx, false), |(mut rx, finished)| async move {
        if finished {
            return None;
        }
        let event = rx.recv().await?;
        let terminal = event.is_terminal();
        let sse = Event::default().data(event.to_wire().to_string());
        Some((Ok(sse), (rx, terminal)))
    })
}

/// Convert a page, streaming progress as server-sent events.
async fn convert_stream(
    State(ctx): State<AppContext>,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, AppError> {
    validate_url(&params.url)?;

    let submission = Submission::new(params.url)
        .with_viewport(
            params.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
            params.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
        )
        .with_device(params.device_id);

    let rx = ctx.orchestrator.submit(submission);

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()),
    ))
}
