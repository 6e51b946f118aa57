use crate::entry::{EntryKind, LogEntry};

/// Running-total fold over `(kind, value)` pairs.
///
/// The total is private: the only read is [`finalize`](Self::finalize), which
/// also resets it. Reconstructions create one accumulator per call so no state
/// leaks between reads.
#[derive(Debug, Default)]
pub struct StateAccumulator {
    total: i64,
    folded: bool,
    corrections: usize,
}

impl StateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one value into the running total.
    ///
    /// Events add their delta, saturating at the `i64` bounds. A snapshot is authoritative: if the total has
    /// drifted from the snapshot's state it is overwritten. A snapshot folded
    /// first simply seeds the total; a disagreement after other values have
    /// been folded is reported as a correction.
    pub fn apply(&mut self, kind: EntryKind, value: i64) {
        match kind {
            EntryKind::Event => {
                let total = self.total;
                self.total = match total.checked_add(value) {
                    Some(sum) => sum,
                    None => {
                        tracing::warn!(total, delta = value, "state overflow; saturating");
                        total.saturating_add(value)
                    }
                };
            }
            EntryKind::Snapshot if self.total != value => {
                if self.folded {
                    // Only reachable from an inconsistent log.
                    tracing::warn!(
                        accumulated = self.total,
                        snapshot = value,
                        "accumulated state disagrees with snapshot; adopting snapshot"
                    );
                    self.corrections += 1;
                }
                self.total = value;
            }
            EntryKind::Snapshot => {}
        }
        self.folded = true;
    }

    pub fn apply_entry<D>(&mut self, entry: &LogEntry<D>) {
        let (kind, value) = entry.value();
        self.apply(kind, value);
    }

    /// Return the running total and reset it to zero.
    pub fn finalize(&mut self) -> i64 {
        self.folded = false;
        std::mem::take(&mut self.total)
    }

    /// Number of times a snapshot overrode a drifted total.
    pub fn corrections(&self) -> usize {
        self.corrections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_accumulate() {
        let mut acc = StateAccumulator::new();
        acc.apply(EntryKind::Event, 6);
        acc.apply(EntryKind::Event, -1);
        acc.apply(EntryKind::Event, -1);
        assert_eq!(acc.finalize(), 4);
    }

    #[test]
    fn finalize_resets() {
        let mut acc = StateAccumulator::new();
        acc.apply(EntryKind::Event, 6);
        assert_eq!(acc.finalize(), 6);
        assert_eq!(acc.finalize(), 0);
    }

    #[test]
    fn agreeing_snapshot_is_a_no_op() {
        let mut acc = StateAccumulator::new();
        acc.apply(EntryKind::Event, 3);
        acc.apply(EntryKind::Snapshot, 3);
        assert_eq!(acc.corrections(), 0);
        assert_eq!(acc.finalize(), 3);
    }

    #[test]
    fn snapshot_overrides_drift() {
        let mut acc = StateAccumulator::new();
        acc.apply(EntryKind::Event, 10);
        acc.apply(EntryKind::Snapshot, 4);
        acc.apply(EntryKind::Event, -1);
        assert_eq!(acc.corrections(), 1);
        assert_eq!(acc.finalize(), 3);
    }

    #[test]
    fn overflow_saturates() {
        let mut acc = StateAccumulator::new();
        acc.apply(EntryKind::Snapshot, i64::MAX);
        acc.apply(EntryKind::Event, 6);
        assert_eq!(acc.finalize(), i64::MAX);

        acc.apply(EntryKind::Snapshot, i64::MIN);
        acc.apply(EntryKind::Event, -1);
        assert_eq!(acc.finalize(), i64::MIN);
    }

    #[test]
    fn snapshot_seeds_an_empty_total() {
        let mut acc = StateAccumulator::new();
        acc.apply(EntryKind::Snapshot, 7);
        acc.apply(EntryKind::Event, 1);
        assert_eq!(acc.corrections(), 0);
        assert_eq!(acc.finalize(), 8);
    }
}
