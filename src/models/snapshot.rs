use std::collections::HashMap;

use xxhash_rust::xxh3::xxh3_64;

use crate::models::PhotoRecord;

/// An ordered photo collection produced by one synchronization cycle.
///
/// Never contains two records with the same id: construction keeps the first
/// occurrence and drops later duplicates.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Vec<PhotoRecord>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot, preserving input order and dropping duplicate ids.
    pub fn from_records(records: Vec<PhotoRecord>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());

        for record in records {
            if index.contains_key(&record.id) {
                continue;
            }
            index.insert(record.id.clone(), unique.len());
            unique.push(record);
        }

        Self {
            records: unique,
            index,
        }
    }

    pub fn records(&self) -> &[PhotoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PhotoRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Fast hash of id, name, modified time and thumbnail for every record in
    /// order.
    ///
    /// Two snapshots with equal fingerprints render the same: same photos, in
    /// the same order, at the same revision.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher_input = Vec::with_capacity(self.records.len() * 64);

        for record in &self.records {
            hasher_input.extend_from_slice(record.id.as_bytes());
            hasher_input.push(0);
            hasher_input.extend_from_slice(record.name.as_bytes());
            hasher_input.push(0);
            if let Some(modified) = &record.modified_time {
                hasher_input.extend_from_slice(modified.as_bytes());
            }
            hasher_input.push(0);
            hasher_input.extend_from_slice(record.urls.thumbnail.as_bytes());
            hasher_input.push(0);
        }

        xxh3_64(&hasher_input)
    }
}
