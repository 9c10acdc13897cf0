//! Azure OpenAI request shapes.

use super::request::{MultipartBody, OutboundRequest};
use crate::config::{Credentials, GenerationConfig};
use crate::error::Result;
use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderName};
use serde::{Deserialize, Serialize};

/// Authentication header understood by Azure OpenAI.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

/// Streaming chat-completions URL for a deployment.
pub fn chat_completions_url(credentials: &Credentials) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        credentials.endpoint, credentials.deployment, credentials.api_version
    )
}

/// Audio transcription URL for a deployment.
pub fn transcriptions_url(credentials: &Credentials) -> String {
    format!(
        "{}/openai/deployments/{}/audio/transcriptions?api-version={}",
        credentials.endpoint, credentials.deployment, credentials.api_version
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body of a streaming chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub n: u32,
}

impl ChatCompletionRequest {
    /// A single-choice streaming request: system message, then the prompt.
    pub fn streaming(deployment: &str, generation: &GenerationConfig, prompt: &str) -> Self {
        Self {
            model: deployment.to_string(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: generation.system_prompt.clone(),
                },
                ChatMessage {
                    role: Role::User,
                    content: prompt.to_string(),
                },
            ],
            temperature: generation.temperature,
            top_p: generation.top_p,
            frequency_penalty: generation.frequency_penalty,
            presence_penalty: generation.presence_penalty,
            max_tokens: generation.max_tokens,
            stream: true,
            n: 1,
        }
    }
}

/// Build the outbound streaming chat-completion request.
pub fn chat_request(
    credentials: &Credentials,
    generation: &GenerationConfig,
    prompt: &str,
) -> Result<OutboundRequest> {
    let payload = ChatCompletionRequest::streaming(&credentials.deployment, generation, prompt);
    OutboundRequest::post(chat_completions_url(credentials))
        .header(API_KEY_HEADER, &credentials.api_key)?
        .header(ACCEPT, "text/event-stream")?
        .json(&payload)
}

/// Build the outbound transcription request: the audio part, then the model.
pub fn transcription_request(
    credentials: &Credentials,
    audio: Bytes,
    file_name: &str,
    mime_type: &str,
) -> Result<OutboundRequest> {
    let form = MultipartBody::new()
        .file("file", file_name, mime_type, audio)
        .text("model", credentials.deployment.clone());
    Ok(OutboundRequest::post(transcriptions_url(credentials))
        .header(API_KEY_HEADER, &credentials.api_key)?
        .multipart(form))
}

/// Body of a successful transcription response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}
