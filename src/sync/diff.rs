use crate::models::Snapshot;

/// Identity-based difference between two snapshots.
///
/// `added` follows the new snapshot's order and `removed` the previous one's.
/// `changed` lists ids present in both whose modification time differs; it is
/// informational only and never drives field updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    /// Number of ids present in both snapshots.
    pub unchanged: usize,
}

impl SnapshotDiff {
    /// Compares `previous` against `next` by id.
    pub fn between(previous: &Snapshot, next: &Snapshot) -> Self {
        let mut diff = SnapshotDiff::default();

        for record in next.records() {
            match previous.get(&record.id) {
                None => diff.added.push(record.id.clone()),
                Some(old) => {
                    diff.unchanged += 1;
                    if old.modified_time != record.modified_time {
                        diff.changed.push(record.id.clone());
                    }
                }
            }
        }

        diff.removed = previous
            .ids()
            .filter(|id| !next.contains(id))
            .map(str::to_string)
            .collect();

        diff
    }

    /// True when membership did not change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
