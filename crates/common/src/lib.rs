//! Shared value types for the stockpile workspace.

mod types;

pub use types::{StreamId, Timestamp};
