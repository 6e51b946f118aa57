//! A reloaded stream must reconstruct the same state, at the same cost, as
//! the stream that was written.

use stockpile_kernel::{EventStream, EventType, StreamConfig, replay_from_nearest_snapshot};
use stockpile_persist::StreamStore;

#[test]
fn reload_preserves_both_replays() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("fridge");

    let mut fridge = EventStream::new();
    fridge.record(EventType::AddedSixPack, "brought it".to_string());
    for details in ["thirsty", "beer two", "chug"] {
        fridge.record(EventType::RemovedSingleBeer, details.to_string());
    }
    fridge.insert_snapshot();
    fridge.record(EventType::RemovedSingleBeer, "go go go".to_string());
    fridge.record(EventType::RemovedSingleBeer, "one more".to_string());

    let mut store = StreamStore::open(&path).unwrap();
    store.persist(&fridge).unwrap();

    let reopened = StreamStore::open(&path).unwrap();
    reopened.verify_integrity().unwrap();
    let loaded: EventStream = reopened.load(StreamConfig::default()).unwrap();

    assert_eq!(loaded.current_state(), fridge.current_state());
    assert_eq!(loaded.state_from_snapshot(), Some(1));
    assert_eq!(
        replay_from_nearest_snapshot(&loaded),
        replay_from_nearest_snapshot(&fridge)
    );
}

#[test]
fn loading_does_not_trigger_auto_snapshots() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("fridge");

    let mut fridge = EventStream::new();
    for _ in 0..4 {
        fridge.record(EventType::AddedSingleBeer, "one".to_string());
    }
    let mut store = StreamStore::open(&path).unwrap();
    store.persist(&fridge).unwrap();

    let eager = StreamConfig {
        auto_snapshot_every: Some(2),
        ..StreamConfig::default()
    };
    let loaded: EventStream = store.load(eager).unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded.snapshot_count(), 0);
    assert_eq!(loaded.events_since_snapshot(), 4);
}
