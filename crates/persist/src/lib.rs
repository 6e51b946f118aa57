//! Persistence: segmented event log on disk with an integrity manifest.
//!
//! # Invariants
//! - Segments are append-only; a persisted entry is never rewritten.
//! - Every segment is hash-chained in the manifest and verified on load.
//! - Reloading reproduces the stream entry-for-entry, including its identity.

mod store;

pub use store::{IntegrityManifest, ManifestEntry, StoreError, StreamMeta, StreamStore};
