//! tokenrelay - streaming relay for Azure OpenAI
//!
//! Forwards chat-completion prompts and audio uploads to Azure OpenAI,
//! retries transient upstream failures with bounded exponential backoff, and
//! re-emits streamed completions as plain-text fragments.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod diagnostics;
pub mod error;
pub mod server;
pub mod stream;
pub mod upstream;

// Error handling
pub use error::{ErrorKind, RelayError, Result};

// Config
pub use config::Config;

// Upstream
pub use upstream::{Fetcher, OutboundRequest, RetryObserver, RetryPolicy};

// Streaming
pub use stream::{EventParser, relay_fragments};

// Server
pub use server::{AppState, router, serve};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
