//! Turns an upstream event-stream body into a stream of plain-text
//! fragments.
//!
//! The returned stream is pull-driven: upstream chunks are read only when the
//! consumer asks for the next fragment, so a slow client applies
//! backpressure all the way to the upstream connection. Dropping the stream
//! drops the parser and the upstream body, which releases the connection.

use super::parser::EventParser;
use crate::error::{RelayError, Result};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

struct RelayState<S> {
    body: Pin<Box<S>>,
    /// `None` once the stream has ended or failed.
    parser: Option<EventParser>,
    ready: VecDeque<String>,
    emitted: usize,
}

/// Relay the content fragments of `body`, one stream item per fragment.
///
/// A body error is yielded as a single [`RelayError::Stream`] item, after
/// which the stream ends. Fragments already yielded are unaffected.
pub fn relay_fragments<S, E>(body: S) -> impl Stream<Item = Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = RelayState {
        body: Box::pin(body),
        parser: Some(EventParser::new()),
        ready: VecDeque::new(),
        emitted: 0,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.ready.pop_front() {
                state.emitted += 1;
                return Some((Ok(Bytes::from(fragment)), state));
            }

            let parser = state.parser.as_mut()?;
            match state.body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => {}
                Some(Ok(chunk)) => match parser.feed(&chunk) {
                    Ok(fragments) => state.ready.extend(fragments),
                    Err(error) => {
                        tracing::error!(error = %error, "Aborting upstream stream");
                        state.parser = None;
                        return Some((Err(error), state));
                    }
                },
                Some(Err(error)) => {
                    tracing::error!(error = %error, emitted = state.emitted, "Upstream body failed");
                    state.parser = None;
                    let error = RelayError::Stream {
                        message: format!("upstream body failed: {error}"),
                    };
                    return Some((Err(error), state));
                }
                None => {
                    match parser.finish() {
                        Ok(fragments) => state.ready.extend(fragments),
                        Err(error) => {
                            tracing::error!(error = %error, "Aborting upstream stream");
                            state.parser = None;
                            return Some((Err(error), state));
                        }
                    }
                    if !parser.is_done() {
                        tracing::warn!("Upstream stream ended without [DONE]");
                    }
                    tracing::debug!(
                        fragments = state.emitted + state.ready.len(),
                        malformed = parser.malformed_lines(),
                        "Upstream stream finished"
                    );
                    state.parser = None;
                }
            }
        }
    })
}
