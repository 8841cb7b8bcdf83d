use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::{PhotoRecord, Snapshot, SortDirection, SortField, SortOrder};

/// Precomputed comparison key for one record.
///
/// Names compare with accents stripped and case folded first, then with
/// accents kept, then by the raw string, so two names only tie when they are
/// identical. A missing or unparseable timestamp
/// is `None`, which orders before every instant: the oldest when ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Name {
        folded: String,
        lower: String,
        raw: String,
    },
    Instant(Option<DateTime<Utc>>),
}

impl SortKey {
    fn for_record(record: &PhotoRecord, field: SortField) -> Self {
        match field {
            SortField::Name => SortKey::Name {
                folded: fold_name(&record.name),
                lower: record.name.to_lowercase(),
                raw: record.name.clone(),
            },
            SortField::CreatedTime => SortKey::Instant(record.created_at()),
            SortField::ModifiedTime => SortKey::Instant(record.modified_at()),
        }
    }
}

/// Decomposes, drops combining marks and lowercases, so `Éclair` files next
/// to `eclair` rather than after `z`.
fn fold_name(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Returns `records` ordered by `order`.
///
/// The sort is stable: records with equal keys keep their input order, which
/// makes sorting an already sorted list a no-op.
pub fn sort_photos(records: Vec<PhotoRecord>, order: SortOrder) -> Vec<PhotoRecord> {
    if records.len() < 2 {
        return records;
    }

    // Parse each timestamp once rather than on every comparison.
    let mut keyed: Vec<(SortKey, PhotoRecord)> = records
        .into_iter()
        .map(|record| (SortKey::for_record(&record, order.field), record))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| directed(a.cmp(b), order.direction));

    keyed.into_iter().map(|(_, record)| record).collect()
}

/// Re-sorts a snapshot into a new one.
pub fn sort_snapshot(snapshot: &Snapshot, order: SortOrder) -> Snapshot {
    Snapshot::from_records(sort_photos(snapshot.records().to_vec(), order))
}
