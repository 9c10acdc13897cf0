//! Upstream (Azure OpenAI) client: replayable requests, per-attempt
//! deadlines and bounded exponential-backoff retries.

pub mod azure;
pub mod fetcher;
pub mod request;
pub mod retry;

pub use fetcher::Fetcher;
pub use request::{MultipartBody, OutboundRequest, RequestBody};
pub use retry::{LogObserver, RecordingObserver, RetryObserver, RetryPolicy, retry_with_backoff};
