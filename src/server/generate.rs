//! `POST /api/generate`: stream a chat completion back as plain text.

use super::AppState;
use super::response;
use crate::error::{RelayError, Result};
use crate::stream::relay_fragments;
use crate::upstream::azure;
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Extract a non-blank prompt from a JSON request body.
pub fn parse_prompt(body: &[u8]) -> Result<String> {
    let request: GenerateRequest = if body.is_empty() {
        GenerateRequest::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| RelayError::bad_request(format!("Invalid JSON body: {e}")))?
    };

    match request.prompt {
        Some(prompt) if !prompt.trim().is_empty() => Ok(prompt),
        _ => Err(RelayError::bad_request("No prompt in the request")),
    }
}

pub async fn generate(State(state): State<AppState>, body: Bytes) -> Response {
    match start_stream(&state, &body).await {
        Ok(response) => response,
        Err(error) => {
            if matches!(error, RelayError::BadRequest { .. }) {
                tracing::debug!(error = %error, "Rejected generate request");
            } else {
                tracing::error!(error = %error, "Error in generate handler");
            }
            response::generate_error(&error)
        }
    }
}

/// Validate, connect upstream, and hand back the streaming response. Nothing
/// is streamed until the upstream call has succeeded.
async fn start_stream(state: &AppState, body: &[u8]) -> Result<Response> {
    let prompt = parse_prompt(body)?;
    let credentials = state.config.upstream.chat_credentials()?;
    let request = azure::chat_request(&credentials, &state.config.generation, &prompt)?;
    let policy = state.config.retry.generation_policy();

    tracing::info!(
        deployment = %credentials.deployment,
        prompt_chars = prompt.chars().count(),
        "Generating response"
    );
    let upstream = state.fetcher.fetch_with_retry(&request, &policy).await?;

    Ok(response::text_stream(relay_fragments(upstream.bytes_stream())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_ok() {
        assert_eq!(
            parse_prompt(br#"{"prompt":"Tell me about Rust"}"#).unwrap(),
            "Tell me about Rust"
        );
    }

    #[test]
    fn test_parse_prompt_keeps_surrounding_whitespace() {
        assert_eq!(parse_prompt(br#"{"prompt":"  hi  "}"#).unwrap(), "  hi  ");
    }

    #[test]
    fn test_missing_prompt_is_bad_request() {
        let err = parse_prompt(b"{}").unwrap_err();
        assert!(matches!(err, RelayError::BadRequest { .. }));
        assert_eq!(err.to_string(), "No prompt in the request");
    }

    #[test]
    fn test_blank_prompt_is_bad_request() {
        assert!(matches!(
            parse_prompt(br#"{"prompt":"   \n\t"}"#),
            Err(RelayError::BadRequest { .. })
        ));
        assert!(matches!(
            parse_prompt(br#"{"prompt":""}"#),
            Err(RelayError::BadRequest { .. })
        ));
        assert!(matches!(
            parse_prompt(br#"{"prompt":null}"#),
            Err(RelayError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_empty_body_is_missing_prompt() {
        assert_eq!(
            parse_prompt(b"").unwrap_err().to_string(),
            "No prompt in the request"
        );
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let err = parse_prompt(b"{prompt:").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Invalid JSON body"));
    }

    #[test]
    fn test_non_string_prompt_is_bad_request() {
        assert_eq!(parse_prompt(br#"{"prompt":42}"#).unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        assert_eq!(
            parse_prompt(br#"{"prompt":"x","temperature":2}"#).unwrap(),
            "x"
        );
    }
}
