//! State reconstruction.
//!
//! Two algorithms fold a stream into its current state. Full replay walks
//! every entry from the head; snapshot-assisted replay walks back from the
//! tail to the nearest snapshot and folds only that suffix. Both must agree
//! on every stream; the second only changes the cost.

use crate::accumulator::StateAccumulator;
use crate::entry::LogEntry;
use crate::stream::{EventStream, MIN_SNAPSHOT_LEN};

/// Result of a reconstruction together with what it cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconstruction {
    /// Derived state.
    pub state: i64,
    /// Entries folded into the accumulator.
    pub entries_walked: usize,
    /// Whether the fold started from a snapshot rather than the head.
    pub anchored_on_snapshot: bool,
    /// Snapshots that disagreed with the folded total and overrode it.
    pub corrections: usize,
}

/// Fold every entry head to tail. `None` for an empty stream.
pub fn reconstruct_from_start<D>(stream: &EventStream<D>) -> Option<i64> {
    replay_from_start(stream).map(|r| r.state)
}

/// Fold from the nearest snapshot to the tail. `None` for an empty stream.
pub fn reconstruct_from_nearest_snapshot<D>(stream: &EventStream<D>) -> Option<i64> {
    replay_from_nearest_snapshot(stream).map(|r| r.state)
}

/// Instrumented form of [`reconstruct_from_start`].
pub fn replay_from_start<D>(stream: &EventStream<D>) -> Option<Reconstruction> {
    if stream.is_empty() {
        return None;
    }
    let _span = tracing::debug_span!("replay_from_start", len = stream.len()).entered();

    let mut acc = StateAccumulator::new();
    for entry in stream.iter_forward() {
        acc.apply_entry(entry);
    }
    let state = acc.finalize();

    Some(Reconstruction {
        state,
        entries_walked: stream.len(),
        anchored_on_snapshot: false,
        corrections: acc.corrections(),
    })
}

/// Instrumented form of [`reconstruct_from_nearest_snapshot`].
///
/// Streams shorter than two entries cannot hold a meaningful snapshot and
/// fall back to full replay. A stream without any snapshot is walked back to
/// the head, which is equivalent to full replay.
pub fn replay_from_nearest_snapshot<D>(stream: &EventStream<D>) -> Option<Reconstruction> {
    if stream.len() < MIN_SNAPSHOT_LEN {
        return replay_from_start(stream);
    }
    let _span = tracing::debug_span!("replay_from_nearest_snapshot", len = stream.len()).entered();

    let mut stack: Vec<&LogEntry<D>> = Vec::new();
    let mut anchored_on_snapshot = false;
    for entry in stream.iter_backward() {
        stack.push(entry);
        if entry.is_snapshot() {
            anchored_on_snapshot = true;
            break;
        }
    }

    let entries_walked = stack.len();
    let mut acc = StateAccumulator::new();
    while let Some(entry) = stack.pop() {
        acc.apply_entry(entry);
    }
    let state = acc.finalize();
    tracing::debug!(state, entries_walked, anchored_on_snapshot, "replayed suffix");

    Some(Reconstruction {
        state,
        entries_walked,
        anchored_on_snapshot,
        corrections: acc.corrections(),
    })
}

impl<D> EventStream<D> {
    /// Current state by full replay.
    pub fn current_state(&self) -> Option<i64> {
        reconstruct_from_start(self)
    }

    /// Current state by snapshot-assisted replay.
    pub fn state_from_snapshot(&self) -> Option<i64> {
        reconstruct_from_nearest_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Event, EventType, Snapshot};
    use stockpile_common::Timestamp;

    fn fridge() -> EventStream<&'static str> {
        let mut stream = EventStream::new();
        stream.record(EventType::AddedSixPack, "brought a six pack");
        stream.record(EventType::RemovedSingleBeer, "thirsty");
        stream.record(EventType::RemovedSingleBeer, "beer two");
        stream.record(EventType::RemovedSingleBeer, "chug");
        stream
    }

    #[test]
    fn empty_stream_has_no_state() {
        let stream: EventStream = EventStream::new();
        assert_eq!(reconstruct_from_start(&stream), None);
        assert_eq!(reconstruct_from_nearest_snapshot(&stream), None);
    }

    #[test]
    fn single_event_stream() {
        let mut stream = EventStream::new();
        stream.record(EventType::AddedSixPack, "only");
        assert_eq!(stream.current_state(), Some(6));
        assert_eq!(stream.state_from_snapshot(), Some(6));

        // Full replay reaches the snapshot with a drifted total of 12;
        // the assisted walk starts on it.
        assert_eq!(replay_from_start(&stream).unwrap().corrections, 1);
        assert_eq!(replay_from_nearest_snapshot(&stream).unwrap().corrections, 0);
    }

    #[test]
    fn consistent_stream_reports_no_corrections() {
        let mut stream = fridge();
        stream.insert_snapshot();
        stream.record(EventType::RemovedSingleBeer, "last one");
        assert_eq!(replay_from_start(&stream).unwrap().corrections, 0);
        assert_eq!(replay_from_nearest_snapshot(&stream).unwrap().corrections, 0);
    }

    #[test]
    fn state_saturates_instead_of_overflowing() {
        let mut stream: EventStream<&str> = EventStream::new();
        stream.append(Snapshot::at(i64::MAX, Timestamp(1)));
        stream.append(Event::at(EventType::AddedSixPack, "one too many", Timestamp(2)));

        assert_eq!(stream.current_state(), Some(i64::MAX));
        assert_eq!(stream.state_from_snapshot(), Some(i64::MAX));
    }

    #[test]
    fn full_replay_sums_deltas() {
        let stream = fridge();
        assert_eq!(stream.current_state(), Some(3));
    }

    #[test]
    fn full_replay_is_idempotent() {
        let stream = fridge();
        assert_eq!(stream.current_state(), stream.current_state());
    }

    #[test]
    fn assisted_replay_walks_only_the_suffix() {
        let mut stream = fridge();
        assert!(stream.insert_snapshot());
        assert_eq!(stream.tail().unwrap().as_snapshot().unwrap().state, 3);

        stream.record(EventType::RemovedSingleBeer, "go go go");
        stream.record(EventType::RemovedSingleBeer, "one more");

        let full = replay_from_start(&stream).unwrap();
        let assisted = replay_from_nearest_snapshot(&stream).unwrap();
        assert_eq!(full.state, 1);
        assert_eq!(assisted.state, 1);
        assert_eq!(full.entries_walked, 7);
        assert_eq!(assisted.entries_walked, 3);
        assert!(assisted.anchored_on_snapshot);
    }

    #[test]
    fn snapshot_at_tail_walks_one_entry() {
        let mut stream = fridge();
        stream.insert_snapshot();
        let assisted = replay_from_nearest_snapshot(&stream).unwrap();
        assert_eq!(assisted.state, 3);
        assert_eq!(assisted.entries_walked, 1);
    }

    #[test]
    fn no_snapshot_walks_whole_stream() {
        let stream = fridge();
        let assisted = replay_from_nearest_snapshot(&stream).unwrap();
        assert_eq!(assisted.state, 3);
        assert_eq!(assisted.entries_walked, stream.len());
        assert!(!assisted.anchored_on_snapshot);
    }

    #[test]
    fn nearest_snapshot_wins_over_older_ones() {
        let mut stream = fridge();
        stream.insert_snapshot();
        stream.record(EventType::AddedSixPack, "restock");
        stream.insert_snapshot();
        stream.record(EventType::ShotgunnedBeer, "shotgun");

        let assisted = replay_from_nearest_snapshot(&stream).unwrap();
        assert_eq!(assisted.state, 8);
        assert_eq!(assisted.entries_walked, 2);
        assert_eq!(stream.current_state(), Some(8));
    }

    #[test]
    fn drifted_snapshot_is_authoritative_for_both_replays() {
        let mut stream: EventStream<&str> = EventStream::new();
        stream.append(Event::at(EventType::AddedSixPack, "a", Timestamp(1)));
        stream.append(Event::at(EventType::AddedSixPack, "b", Timestamp(2)));
        stream.append(Snapshot::at(5, Timestamp(3)));
        stream.append(Event::at(EventType::AddedSingleBeer, "c", Timestamp(4)));

        assert_eq!(stream.current_state(), Some(6));
        assert_eq!(stream.state_from_snapshot(), Some(6));
    }
}
