//! `POST /api/transcribe`: forward an uploaded audio file for transcription.
//!
//! The upload is staged in a uniquely named temporary file which is removed
//! on every exit path, success or failure.

use super::AppState;
use super::response;
use crate::config::TranscriptionConfig;
use crate::defaults;
use crate::error::{RelayError, Result};
use crate::upstream::azure::{self, TranscriptionResponse};
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::extract::multipart::MultipartError;
use axum::response::Response;
use bytes::Bytes;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Name of the multipart field carrying the audio.
pub const FILE_FIELD: &str = "file";

pub async fn transcribe(State(state): State<AppState>, request: Request) -> Response {
    match forward_upload(&state, request).await {
        Ok(text) => response::transcript(text),
        Err(error) => {
            tracing::error!(error = %error, "Error in transcribe handler");
            response::transcribe_error(&error)
        }
    }
}

async fn forward_upload(state: &AppState, request: Request) -> Result<String> {
    // Checked before the body is touched.
    let credentials = state.config.upstream.transcription_credentials()?;

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| RelayError::bad_request(rejection.body_text()))?;
    let transcription = &state.config.transcription;
    let staged = stage_upload(&mut multipart, &transcription.upload_dir(), transcription).await?;

    let audio = tokio::fs::read(staged.path()).await?;
    tracing::info!(
        file_name = %staged.file_name,
        mime_type = %staged.mime_type,
        bytes = audio.len(),
        "Forwarding upload for transcription"
    );

    let request = azure::transcription_request(
        &credentials,
        Bytes::from(audio),
        &staged.file_name,
        &staged.mime_type,
    )?;
    let policy = state.config.retry.transcription_policy();
    let upstream = state.fetcher.fetch_with_retry(&request, &policy).await?;

    let parsed: TranscriptionResponse = upstream.json().await.map_err(|e| {
        RelayError::Other(format!("Invalid transcription response: {}", e.without_url()))
    })?;
    Ok(parsed.text)
}

/// An upload written to a temporary file. The file is deleted on drop.
#[derive(Debug)]
pub struct StagedUpload {
    file: Option<NamedTempFile>,
    pub file_name: String,
    pub mime_type: String,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file
            .as_ref()
            .map_or_else(|| Path::new(""), |file| file.path())
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let path = file.path().to_path_buf();
        match file.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed staged upload"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Error cleaning up temp file"
            ),
        }
    }
}

fn multipart_error(error: MultipartError) -> RelayError {
    RelayError::bad_request(format!("Invalid multipart body: {}", error.body_text()))
}

/// Stream the `file` field of `multipart` into a new file under `dir`.
///
/// Fields before it are skipped. The staged file is removed if writing
/// fails part-way.
pub async fn stage_upload(
    multipart: &mut Multipart,
    dir: &Path,
    transcription: &TranscriptionConfig,
) -> Result<StagedUpload> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .map_or_else(|| transcription.file_name.clone(), str::to_string);
        let mime_type = field
            .content_type()
            .filter(|mime| !mime.trim().is_empty())
            .map_or_else(|| transcription.mime_type.clone(), str::to_string);

        let temp = tempfile::Builder::new()
            .prefix(defaults::UPLOAD_PREFIX)
            .tempfile_in(dir)?;
        let writer = temp.reopen()?;
        let staged = StagedUpload {
            file: Some(temp),
            file_name,
            mime_type,
        };

        let mut writer = tokio::fs::File::from_std(writer);
        let mut written = 0usize;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            writer.write_all(&chunk).await?;
            written += chunk.len();
        }
        writer.flush().await?;

        tracing::debug!(path = %staged.path().display(), bytes = written, "Staged upload");
        return Ok(staged);
    }

    Err(RelayError::bad_request("No file in the request"))
}
