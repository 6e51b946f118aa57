//! Developer tooling: stream inspector, summaries, human-readable listings.
//!
//! # Invariants
//! - Tools only read; they never append to a stream.

mod inspector;

pub use inspector::{EntryLine, StreamInspector, StreamSummary};
