use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stockpile_common::Timestamp;

/// Errors raised while building log entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("unknown event type: {0:?}")]
    UnknownEventType(String),
}

/// The closed vocabulary of changes the stream understands.
///
/// Each variant maps to a fixed delta. Tags are written in
/// SCREAMING_SNAKE_CASE both on the wire and in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    AddedSixPack,
    AddedSingleBeer,
    RemovedSingleBeer,
    ShotgunnedBeer,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::AddedSixPack,
        EventType::AddedSingleBeer,
        EventType::RemovedSingleBeer,
        EventType::ShotgunnedBeer,
    ];

    /// Signed change this event type contributes to the running total.
    pub const fn delta(self) -> i64 {
        match self {
            EventType::AddedSixPack => 6,
            EventType::AddedSingleBeer => 1,
            EventType::RemovedSingleBeer => -1,
            EventType::ShotgunnedBeer => -1,
        }
    }

    pub const fn tag(self) -> &'static str {
        match self {
            EventType::AddedSixPack => "ADDED_SIX_PACK",
            EventType::AddedSingleBeer => "ADDED_SINGLE_BEER",
            EventType::RemovedSingleBeer => "REMOVED_SINGLE_BEER",
            EventType::ShotgunnedBeer => "SHOTGUNNED_BEER",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EventType {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| EntryError::UnknownEventType(s.to_string()))
    }
}

/// A single discrete change to the tracked quantity.
///
/// `delta` is derived from `kind` at construction and never recomputed; the
/// stored value is what replay folds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<D = String> {
    pub kind: EventType,
    pub details: D,
    pub delta: i64,
    pub timestamp: Timestamp,
}

impl<D> Event<D> {
    pub fn new(kind: EventType, details: D) -> Self {
        Self::at(kind, details, Timestamp::now())
    }

    /// Build an event with an explicit timestamp (used by replay tooling and tests).
    pub fn at(kind: EventType, details: D, timestamp: Timestamp) -> Self {
        Self {
            kind,
            details,
            delta: kind.delta(),
            timestamp,
        }
    }

    /// Build an event from a textual type tag, rejecting tags outside the vocabulary.
    pub fn from_tag(tag: &str, details: D) -> Result<Self, EntryError> {
        let kind = tag.parse::<EventType>()?;
        Ok(Self::new(kind, details))
    }
}

/// An absolute checkpoint of the accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: i64,
    pub timestamp: Timestamp,
}

impl Snapshot {
    pub fn new(state: i64) -> Self {
        Self::at(state, Timestamp::now())
    }

    pub fn at(state: i64, timestamp: Timestamp) -> Self {
        Self { state, timestamp }
    }
}

/// Discriminates how an entry's value is folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Value is a delta added to the running total.
    Event,
    /// Value is an absolute state.
    Snapshot,
}

/// One element of an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry<D = String> {
    Event(Event<D>),
    Snapshot(Snapshot),
}

impl<D> LogEntry<D> {
    /// The `(kind, value)` pair fed into a [`StateAccumulator`](crate::StateAccumulator).
    pub fn value(&self) -> (EntryKind, i64) {
        match self {
            LogEntry::Event(event) => (EntryKind::Event, event.delta),
            LogEntry::Snapshot(snapshot) => (EntryKind::Snapshot, snapshot.state),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.value().0
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, LogEntry::Snapshot(_))
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            LogEntry::Event(event) => event.timestamp,
            LogEntry::Snapshot(snapshot) => snapshot.timestamp,
        }
    }

    /// Tag used in listings: the event type tag, or `SNAPSHOT`.
    pub fn tag(&self) -> &'static str {
        match self {
            LogEntry::Event(event) => event.kind.tag(),
            LogEntry::Snapshot(_) => "SNAPSHOT",
        }
    }

    pub fn as_event(&self) -> Option<&Event<D>> {
        match self {
            LogEntry::Event(event) => Some(event),
            LogEntry::Snapshot(_) => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            LogEntry::Snapshot(snapshot) => Some(snapshot),
            LogEntry::Event(_) => None,
        }
    }
}

impl<D> From<Event<D>> for LogEntry<D> {
    fn from(event: Event<D>) -> Self {
        LogEntry::Event(event)
    }
}

impl<D> From<Snapshot> for LogEntry<D> {
    fn from(snapshot: Snapshot) -> Self {
        LogEntry::Snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_table() {
        assert_eq!(EventType::AddedSixPack.delta(), 6);
        assert_eq!(EventType::AddedSingleBeer.delta(), 1);
        assert_eq!(EventType::RemovedSingleBeer.delta(), -1);
        assert_eq!(EventType::ShotgunnedBeer.delta(), -1);
    }

    #[test]
    fn tags_parse_back_to_their_type() {
        for kind in EventType::ALL {
            assert_eq!(kind.tag().parse::<EventType>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_tag_fails_fast() {
        let err = Event::from_tag("STOLE_THE_FRIDGE", "oops".to_string()).unwrap_err();
        assert_eq!(err, EntryError::UnknownEventType("STOLE_THE_FRIDGE".into()));
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert!("added_six_pack".parse::<EventType>().is_err());
    }

    #[test]
    fn event_delta_follows_type() {
        let event = Event::new(EventType::AddedSixPack, "restock");
        assert_eq!(event.delta, 6);
        assert_eq!(event.details, "restock");
    }

    #[test]
    fn entry_values() {
        let event: LogEntry<()> = Event::at(EventType::ShotgunnedBeer, (), Timestamp(1)).into();
        let snapshot: LogEntry<()> = Snapshot::at(3, Timestamp(2)).into();
        assert_eq!(event.value(), (EntryKind::Event, -1));
        assert_eq!(snapshot.value(), (EntryKind::Snapshot, 3));
        assert!(snapshot.is_snapshot());
        assert_eq!(snapshot.tag(), "SNAPSHOT");
        assert_eq!(event.tag(), "SHOTGUNNED_BEER");
        assert_eq!(event.timestamp(), Timestamp(1));
    }

    #[test]
    fn serde_uses_wire_tags() {
        let json = serde_json::to_string(&EventType::RemovedSingleBeer).unwrap();
        assert_eq!(json, "\"REMOVED_SINGLE_BEER\"");
        let back: EventType = serde_json::from_str("\"ADDED_SIX_PACK\"").unwrap();
        assert_eq!(back, EventType::AddedSixPack);
    }
}
