//! Default configuration constants for tokenrelay.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Maximum number of upstream attempts for a streaming generation call.
///
/// One initial attempt plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry, in milliseconds.
///
/// Each subsequent retry doubles the delay up to [`MAX_RETRY_DELAY_MS`].
pub const INITIAL_RETRY_DELAY_MS: u64 = 1000;

/// Upper bound on the delay between two attempts, in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 5000;

/// Factor applied to the retry delay after each failed attempt.
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Attempts made for a transcription call.
///
/// Uploads are forwarded once unless configured otherwise.
pub const TRANSCRIPTION_MAX_ATTEMPTS: u32 = 1;

/// Deadline for a single upstream attempt, in seconds.
///
/// Applies to connecting, sending, and receiving the response head. It does
/// not bound the lifetime of a streamed body.
pub const ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Azure OpenAI REST API version sent with every upstream call.
pub const API_VERSION: &str = "2024-02-15-preview";

/// Default listen address for the HTTP server.
pub const BIND_ADDR: &str = "127.0.0.1:3000";

/// Largest accepted upload, in bytes.
///
/// Matches the 25 MB file limit of the Whisper transcription API.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Longest event-stream line the parser will buffer, in bytes.
///
/// Chat-completion events are a few hundred bytes; anything this large is a
/// broken upstream.
pub const MAX_EVENT_LINE_BYTES: usize = 1024 * 1024;

/// Prefix of an event-stream data line.
pub const EVENT_DATA_PREFIX: &str = "data: ";

/// Line that terminates a chat-completion event stream.
pub const EVENT_STREAM_DONE: &str = "data: [DONE]";

/// System message prepended to every generation request.
pub const SYSTEM_PROMPT: &str = "You are a tech hiring manager. You are to only provide feedback on the interview candidate's transcript. If it is not relevant and does not answer the question, make sure to say that. Do not be overly verbose and focus on the candidate's response.";

/// Sampling temperature for generation.
pub const TEMPERATURE: f32 = 0.7;

/// Nucleus sampling parameter for generation.
pub const TOP_P: f32 = 1.0;

/// Frequency penalty for generation.
pub const FREQUENCY_PENALTY: f32 = 0.0;

/// Presence penalty for generation.
pub const PRESENCE_PENALTY: f32 = 0.0;

/// Token limit for one generated answer.
pub const MAX_TOKENS: u32 = 1500;

/// File name given to forwarded audio when the upload carries none.
pub const AUDIO_FILE_NAME: &str = "audio.mp3";

/// Content type given to forwarded audio when the upload carries none.
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Prefix for staged upload files.
pub const UPLOAD_PREFIX: &str = "tokenrelay-upload-";
