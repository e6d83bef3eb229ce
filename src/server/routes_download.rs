use crate::server::{error::AppError, AppContext};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use readly_common::{DocumentFormat, Error};
use tokio_util::io::ReaderStream;
use tracing::debug;

pub fn download_routes() -> Router<AppContext> {
    Router::new().route("/download/:job_id/:format", get(download))
}

/// `attachment; filename="{title}.{ext}"`, with characters that cannot
/// appear in a quoted header value replaced.
fn content_disposition(title: &str, format: DocumentFormat) -> HeaderValue {
    let name: String = title
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let name = if name.trim().is_empty() {
        "download".to_string()
    } else {
        name
    };

    let value = format!("attachment; filename=\"{}.{}\"", name, format.extension());
    HeaderValue::from_bytes(value.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Serve a job's artifact and count the download.
async fn download(
    State(ctx): State<AppContext>,
    Path((job_id, format)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let format: DocumentFormat = format.parse().map_err(Error::invalid_input)?;

    let artifacts = ctx
        .orchestrator
        .resolve(&job_id)
        .map_err(|e| match e {
            Error::NotFound(_) => Error::not_found("Conversion not found"),
            other => other,
        })?;

    let path = match format {
        DocumentFormat::Pdf => artifacts.pdf_path,
        DocumentFormat::Epub => artifacts.epub_path,
    }
    .filter(|p| !p.is_empty())
    .ok_or_else(|| Error::not_found("File not found"))?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::not_found("File not found"))?;
    let length = file.metadata().await.ok().map(|m| m.len());

    debug!(job_id = %job_id, %format, "Serving artifact");
    // Detached: the transfer never waits on the counter.
    drop(ctx.orchestrator.record_download(&job_id, format));

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.media_type()),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&artifacts.title, format),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("My Article", DocumentFormat::Pdf),
            "attachment; filename=\"My Article.pdf\""
        );
        assert_eq!(
            content_disposition("say \"hi\"", DocumentFormat::Epub),
            "attachment; filename=\"say _hi_.epub\""
        );
        assert_eq!(
            content_disposition("", DocumentFormat::Pdf),
            "attachment; filename=\"download.pdf\""
        );
    }

    #[test]
    fn test_content_disposition_keeps_unicode() {
        let value = content_disposition("Grüße", DocumentFormat::Pdf);
        assert_eq!(
            value.as_bytes(),
            "attachment; filename=\"Grüße.pdf\"".as_bytes()
        );
    }
}
