//! Stockpile kernel: append-only event stream, snapshots, state reconstruction.
//!
//! A tracked quantity is never stored directly. It is derived by folding an
//! ordered log of change events; snapshots checkpoint the folded value so
//! recent reads can start from the nearest checkpoint instead of the head.
//!
//! # Invariants
//! - The stream is append-only. Entries are never removed or mutated.
//! - Full replay and snapshot-assisted replay yield the same state for every
//!   stream; snapshots only change the cost of a read.
//! - Each reconstruction folds through its own accumulator.

pub mod accumulator;
pub mod entry;
pub mod replay;
pub mod stream;

pub use accumulator::StateAccumulator;
pub use entry::{EntryError, EntryKind, Event, EventType, LogEntry, Snapshot};
pub use replay::{
    Reconstruction, reconstruct_from_nearest_snapshot, reconstruct_from_start,
    replay_from_nearest_snapshot, replay_from_start,
};
pub use stream::{EventStream, Iter, MIN_SNAPSHOT_LEN, StreamConfig};
