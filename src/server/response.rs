//! Response shapes shared by the handlers.

use crate::error::{RelayError, Result};
use axum::Json;
use axum::body::Body;
use axum::http::{HeaderName, StatusCode};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use std::time::SystemTime;

/// Asks reverse proxies not to buffer the streamed body.
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Error message for every failed generation.
pub const GENERATE_ERROR: &str = "Error generating response";

#[derive(Debug, Serialize)]
pub struct GenerateErrorBody {
    pub error: &'static str,
    pub details: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct TranscribeErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptBody {
    pub transcript: String,
}

/// Current time as RFC 3339 with millisecond precision.
pub fn timestamp() -> String {
    humantime::format_rfc3339_millis(SystemTime::now()).to_string()
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Chunked plain-text response whose body is `fragments`, flushed as they
/// arrive.
pub fn text_stream<S>(fragments: S) -> Response
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache, no-transform"),
            (X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(fragments),
    )
        .into_response()
}

/// Uncached JSON error for a generation that failed before streaming began.
pub fn generate_error(error: &RelayError) -> Response {
    let body = GenerateErrorBody {
        error: GENERATE_ERROR,
        details: error.to_string(),
        timestamp: timestamp(),
    };
    (
        status_of(error.status_code()),
        [(CACHE_CONTROL, "no-store")],
        Json(body),
    )
        .into_response()
}

/// JSON error for a failed transcription. Always 500, whatever the cause.
pub fn transcribe_error(error: &RelayError) -> Response {
    let message = match error {
        RelayError::BadRequest { message } | RelayError::Configuration { message } => {
            message.clone()
        }
        RelayError::Upstream { status, body } => {
            let reason = StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown status");
            format!("Transcription failed: {reason}. {body}")
        }
        other => format!("Transcription failed: {other}"),
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(TranscribeErrorBody { error: message }),
    )
        .into_response()
}

/// Successful transcription.
pub fn transcript(text: String) -> Response {
    (StatusCode::OK, Json(TranscriptBody { transcript: text })).into_response()
}
