use std::fmt::{self, Display};
use stockpile_common::Timestamp;
use stockpile_kernel::{EventStream, LogEntry, replay_from_nearest_snapshot, replay_from_start};

/// Stream inspector for developer tooling.
///
/// Provides read-only views of an event stream for debugging and for the
/// command-line listings.
pub struct StreamInspector;

impl StreamInspector {
    /// Produce a summary of the stream state.
    pub fn summary<D>(stream: &EventStream<D>) -> StreamSummary {
        let full = replay_from_start(stream);
        let assisted = replay_from_nearest_snapshot(stream);
        let summary = StreamSummary {
            length: stream.len(),
            events: stream.len() - stream.snapshot_count(),
            snapshots: stream.snapshot_count(),
            events_since_snapshot: stream.events_since_snapshot(),
            state: full.map(|r| r.state),
            state_from_snapshot: assisted.map(|r| r.state),
            entries_walked: assisted.map_or(0, |r| r.entries_walked),
            corrections: full.map_or(0, |r| r.corrections),
        };
        tracing::debug!(?summary, "stream summary");
        summary
    }

    /// Entries oldest first.
    pub fn chronological<D: Display>(stream: &EventStream<D>) -> Vec<EntryLine> {
        stream.iter_forward().map(EntryLine::from_entry).collect()
    }

    /// Entries newest first.
    pub fn reverse_chronological<D: Display>(stream: &EventStream<D>) -> Vec<EntryLine> {
        stream.iter_backward().map(EntryLine::from_entry).collect()
    }
}

/// Summary of stream state for the inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub length: usize,
    pub events: usize,
    pub snapshots: usize,
    pub events_since_snapshot: usize,
    pub state: Option<i64>,
    pub state_from_snapshot: Option<i64>,
    /// Entries folded by the snapshot-assisted read.
    pub entries_walked: usize,
    /// Drifted snapshots met by full replay.
    pub corrections: usize,
}

impl Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stream: length={} events={} snapshots={} since_snapshot={} state={} (from snapshot: {}, walked {}) corrections={}",
            self.length,
            self.events,
            self.snapshots,
            self.events_since_snapshot,
            OptState(self.state),
            OptState(self.state_from_snapshot),
            self.entries_walked,
            self.corrections,
        )
    }
}

struct OptState(Option<i64>);

impl Display for OptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(state) => write!(f, "{state}"),
            None => f.write_str("none"),
        }
    }
}

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLine {
    pub tag: &'static str,
    /// Event details, or the snapshot's absolute state.
    pub text: String,
    pub timestamp: Timestamp,
}

impl EntryLine {
    fn from_entry<D: Display>(entry: &LogEntry<D>) -> Self {
        let text = match entry {
            LogEntry::Event(event) => event.details.to_string(),
            LogEntry::Snapshot(snapshot) => snapshot.state.to_string(),
        };
        Self {
            tag: entry.tag(),
            text,
            timestamp: entry.timestamp(),
        }
    }
}

impl Display for EntryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}   {}", self.tag, self.text, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpile_kernel::{Event, EventType, Snapshot};

    fn fixed_stream() -> EventStream<&'static str> {
        let mut stream: EventStream<&'static str> = EventStream::new();
        stream.append(Event::at(EventType::AddedSixPack, "brought it", Timestamp(10)));
        stream.append(Event::at(EventType::RemovedSingleBeer, "thirsty", Timestamp(20)));
        stream.append(Snapshot::at(5, Timestamp(30)));
        stream.append(Event::at(EventType::ShotgunnedBeer, "party", Timestamp(40)));
        stream
    }

    #[test]
    fn summary_counts_entries() {
        let summary = StreamInspector::summary(&fixed_stream());
        assert_eq!(summary.length, 4);
        assert_eq!(summary.events, 3);
        assert_eq!(summary.snapshots, 1);
        assert_eq!(summary.events_since_snapshot, 1);
        assert_eq!(summary.state, Some(4));
        assert_eq!(summary.state_from_snapshot, Some(4));
        assert_eq!(summary.entries_walked, 2);
        assert_eq!(summary.corrections, 0);
    }

    #[test]
    fn summary_reports_drifted_snapshot() {
        let mut stream = fixed_stream();
        stream.append(Snapshot::at(9, Timestamp(50)));
        let summary = StreamInspector::summary(&stream);
        assert_eq!(summary.corrections, 1);
        assert_eq!(summary.state, Some(9));
        assert!(summary.to_string().ends_with("corrections=1"));
    }

    #[test]
    fn summary_of_empty_stream() {
        let stream: EventStream = EventStream::new();
        let summary = StreamInspector::summary(&stream);
        assert_eq!(summary.state, None);
        assert_eq!(summary.entries_walked, 0);
        assert!(summary.to_string().contains("state=none"));
    }

    #[test]
    fn chronological_lines() {
        let lines = StreamInspector::chronological(&fixed_stream());
        let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "ADDED_SIX_PACK: brought it   10ms",
                "REMOVED_SINGLE_BEER: thirsty   20ms",
                "SNAPSHOT: 5   30ms",
                "SHOTGUNNED_BEER: party   40ms",
            ]
        );
    }

    #[test]
    fn reverse_chronological_is_reversed() {
        let stream = fixed_stream();
        let mut forward = StreamInspector::chronological(&stream);
        forward.reverse();
        assert_eq!(StreamInspector::reverse_chronological(&stream), forward);
    }
}
