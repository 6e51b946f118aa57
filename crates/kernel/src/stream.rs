use serde::{Deserialize, Serialize};
use std::iter::{FusedIterator, Rev};
use stockpile_common::StreamId;

use crate::entry::{EntryError, Event, EventType, LogEntry, Snapshot};
use crate::replay;

/// Smallest stream length at which a snapshot may be inserted.
pub const MIN_SNAPSHOT_LEN: usize = 2;

/// Snapshot policy for an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Minimum stream length before a snapshot is taken. Raised to
    /// [`MIN_SNAPSHOT_LEN`] if configured lower.
    pub snapshot_min_len: usize,
    /// Attempt a snapshot after this many recorded events since the last one.
    pub auto_snapshot_every: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            snapshot_min_len: MIN_SNAPSHOT_LEN,
            auto_snapshot_every: None,
        }
    }
}

impl StreamConfig {
    /// Clamp values that would break the snapshot policy.
    pub fn normalized(mut self) -> Self {
        self.snapshot_min_len = self.snapshot_min_len.max(MIN_SNAPSHOT_LEN);
        self.auto_snapshot_every = self.auto_snapshot_every.filter(|n| *n > 0);
        self
    }
}

#[derive(Debug, Clone)]
struct Node<D> {
    entry: LogEntry<D>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Append-only, doubly linked sequence of log entries.
///
/// Entries live in an arena and link to their neighbours by index, so both
/// directions can be walked without reference cycles. Nothing is ever removed
/// or mutated once appended.
#[derive(Debug, Clone)]
pub struct EventStream<D = String> {
    id: StreamId,
    config: StreamConfig,
    nodes: Vec<Node<D>>,
    head: Option<usize>,
    tail: Option<usize>,
    snapshots: usize,
    events_since_snapshot: usize,
}

impl<D> Default for EventStream<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> EventStream<D> {
    /// Create an empty stream with the default snapshot policy.
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self::with_id(StreamId::new(), config)
    }

    /// Create an empty stream with a known identity (used when reloading).
    pub fn with_id(id: StreamId, config: StreamConfig) -> Self {
        Self {
            id,
            config: config.normalized(),
            nodes: Vec::new(),
            head: None,
            tail: None,
            snapshots: 0,
            events_since_snapshot: 0,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of entries in the stream.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots
    }

    /// Events appended after the most recent snapshot.
    pub fn events_since_snapshot(&self) -> usize {
        self.events_since_snapshot
    }

    pub fn head(&self) -> Option<&LogEntry<D>> {
        self.head.map(|idx| &self.nodes[idx].entry)
    }

    pub fn tail(&self) -> Option<&LogEntry<D>> {
        self.tail.map(|idx| &self.nodes[idx].entry)
    }

    /// Entry at a zero-based append position.
    pub fn get(&self, position: usize) -> Option<&LogEntry<D>> {
        self.nodes.get(position).map(|node| &node.entry)
    }

    /// Link an entry after the current tail. Never rejects.
    pub fn append(&mut self, entry: impl Into<LogEntry<D>>) {
        let entry = entry.into();
        let idx = self.nodes.len();

        if entry.is_snapshot() {
            self.snapshots += 1;
            self.events_since_snapshot = 0;
        } else {
            self.events_since_snapshot += 1;
        }
        tracing::debug!(position = idx, tag = entry.tag(), "append");

        self.nodes.push(Node {
            entry,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Create and append an event, then apply the auto-snapshot policy.
    pub fn record(&mut self, kind: EventType, details: D) {
        self.append(Event::new(kind, details));
        self.maybe_auto_snapshot();
    }

    /// Like [`record`](Self::record) but from a textual tag. An unknown tag
    /// is rejected and nothing is appended.
    pub fn record_tagged(&mut self, tag: &str, details: D) -> Result<(), EntryError> {
        let kind = tag.parse::<EventType>()?;
        self.record(kind, details);
        Ok(())
    }

    /// Snapshot the current state if the stream is long enough.
    ///
    /// The state is computed by full replay, so this costs O(len). Returns
    /// whether a snapshot was appended.
    pub fn insert_snapshot(&mut self) -> bool {
        if self.len() < self.config.snapshot_min_len {
            tracing::debug!(len = self.len(), "stream too short to snapshot");
            return false;
        }
        let Some(state) = replay::reconstruct_from_start(self) else {
            return false;
        };
        self.append(Snapshot::new(state));
        tracing::info!(state, len = self.len(), "snapshot inserted");
        true
    }

    fn maybe_auto_snapshot(&mut self) {
        let due = self
            .config
            .auto_snapshot_every
            .is_some_and(|every| self.events_since_snapshot >= every);
        if due {
            self.insert_snapshot();
        }
    }

    /// Walk entries head to tail in append order.
    pub fn iter_forward(&self) -> Iter<'_, D> {
        Iter {
            nodes: &self.nodes,
            front: self.head,
            back: self.tail,
            remaining: self.nodes.len(),
        }
    }

    /// Walk entries tail to head in reverse append order.
    pub fn iter_backward(&self) -> Rev<Iter<'_, D>> {
        self.iter_forward().rev()
    }
}

impl<'a, D> IntoIterator for &'a EventStream<D> {
    type Item = &'a LogEntry<D>;
    type IntoIter = Iter<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_forward()
    }
}

/// Cursor over an [`EventStream`] following the prev/next links.
#[derive(Debug)]
pub struct Iter<'a, D> {
    nodes: &'a [Node<D>],
    front: Option<usize>,
    back: Option<usize>,
    remaining: usize,
}

impl<D> Clone for Iter<'_, D> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<'a, D> Iterator for Iter<'a, D> {
    type Item = &'a LogEntry<D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.front?];
        self.front = node.next;
        self.remaining -= 1;
        Some(&node.entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<D> DoubleEndedIterator for Iter<'_, D> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.back?];
        self.back = node.prev;
        self.remaining -= 1;
        Some(&node.entry)
    }
}

impl<D> ExactSizeIterator for Iter<'_, D> {}

impl<D> FusedIterator for Iter<'_, D> {}
