//! Event-stream parsing and relay.

pub mod parser;
pub mod pipeline;

pub use parser::{EventLine, EventParser, parse_line};
pub use pipeline::relay_fragments;
