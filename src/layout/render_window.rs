use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::models::{PhotoRecord, Snapshot};
use crate::sync::SnapshotDiff;

/// Entries appended per growth step.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Distance from the end of the rendered content, in pixels, at which the
/// next batch is requested.
pub const DEFAULT_PROXIMITY_MARGIN: f64 = 300.0;

/// Where photos that appear in a newer snapshot go in a non-empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NewPhotoPlacement {
    /// In front of everything already shown, regardless of sort order.
    #[default]
    Prepend,
    /// Wherever the sort order puts them; the window stays a snapshot prefix.
    SortOrder,
}

/// Configuration for the render window.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub batch_size: usize,
    pub proximity_margin: f64,
    pub placement: NewPhotoPlacement,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            proximity_margin: DEFAULT_PROXIMITY_MARGIN,
            placement: NewPhotoPlacement::Prepend,
        }
    }
}

/// One visible photo and its zero-based slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    pub id: String,
    pub position: usize,
}

/// Scroll geometry reported by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub offset: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl ScrollMetrics {
    /// Pixels between the bottom of the viewport and the end of the content.
    pub fn distance_to_end(&self) -> f64 {
        (self.content_height - (self.offset + self.viewport_height)).max(0.0)
    }

    pub fn is_near_end(&self, margin: f64) -> bool {
        self.distance_to_end() <= margin
    }
}

/// What a snapshot update did to the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowChange {
    pub inserted: usize,
    pub removed: usize,
    /// True when the window was (re)built from the first batch.
    pub reset: bool,
}

/// The growing subset of the snapshot that is actually rendered.
///
/// Every id in the window exists in the snapshot it was last reconciled
/// against, and positions are always `0..len`.
#[derive(Debug, Clone)]
pub struct RenderWindow {
    config: WindowConfig,
    entries: Vec<WindowEntry>,
    members: HashSet<String>,
}

impl RenderWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            members: HashSet::new(),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn entries(&self) -> &[WindowEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    /// Whether `snapshot` has photos not yet in the window.
    pub fn has_more(&self, snapshot: &Snapshot) -> bool {
        self.entries.len() < snapshot.len()
    }

    /// Resolves the window against `snapshot`, in window order.
    pub fn visible<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a PhotoRecord> {
        self.entries
            .iter()
            .filter_map(|entry| snapshot.get(&entry.id))
            .collect()
    }

    /// Empties the window.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
    }

    /// Discards the window and takes the first batch of `snapshot`.
    pub fn reset(&mut self, snapshot: &Snapshot) -> usize {
        self.clear();
        let added = self.load_more(snapshot);
        debug!("Render window reset to {} of {}", added, snapshot.len());
        added
    }

    /// Appends the next batch of snapshot entries not yet shown.
    ///
    /// Returns how many were appended; zero once the window covers the
    /// whole snapshot.
    pub fn load_more(&mut self, snapshot: &Snapshot) -> usize {
        if !self.has_more(snapshot) {
            return 0;
        }

        let start = self.entries.len();
        let batch: Vec<String> = snapshot
            .ids()
            .filter(|id| !self.members.contains(*id))
            .take(self.config.batch_size)
            .map(str::to_string)
            .collect();

        for (offset, id) in batch.into_iter().enumerate() {
            self.members.insert(id.clone());
            self.entries.push(WindowEntry {
                id,
                position: start + offset,
            });
        }

        let appended = self.entries.len() - start;
        trace!("Render window grew by {} to {}", appended, self.entries.len());
        appended
    }

    /// Scroll-proximity signal: loads the next batch when the viewport is
    /// within the configured margin of the end.
    pub fn on_scroll(&mut self, snapshot: &Snapshot, metrics: ScrollMetrics) -> usize {
        if !metrics.is_near_end(self.config.proximity_margin) {
            return 0;
        }
        self.load_more(snapshot)
    }

    /// Folds a snapshot update into the window.
    ///
    /// An empty window takes the first batch. Otherwise removed ids are
    /// dropped and added ids are placed per [`NewPhotoPlacement`]; whatever
    /// was already visible stays visible.
    pub fn apply_update(&mut self, snapshot: &Snapshot, diff: &SnapshotDiff) -> WindowChange {
        if self.entries.is_empty() {
            let inserted = self.reset(snapshot);
            return WindowChange {
                inserted,
                removed: 0,
                reset: true,
            };
        }

        let removed_ids: HashSet<&str> = diff.removed.iter().map(String::as_str).collect();
        let before = self.entries.len();
        // Anything the snapshot no longer has goes too, even if the diff
        // did not name it.
        self.entries
            .retain(|e| !removed_ids.contains(e.id.as_str()) && snapshot.contains(&e.id));
        let removed = before - self.entries.len();

        let fresh: Vec<String> = diff
            .added
            .iter()
            .filter(|id| snapshot.contains(id) && !self.members.contains(id.as_str()))
            .cloned()
            .collect();

        let inserted = match self.config.placement {
            NewPhotoPlacement::Prepend => {
                let inserted = fresh.len();
                let mut entries: Vec<WindowEntry> = fresh
                    .into_iter()
                    .map(|id| WindowEntry { id, position: 0 })
                    .collect();
                entries.append(&mut self.entries);
                self.entries = entries;
                inserted
            }
            NewPhotoPlacement::SortOrder => {
                let target = (self.entries.len() + fresh.len()).min(snapshot.len());
                let retained = self.entries.len();
                self.entries = snapshot
                    .ids()
                    .take(target)
                    .map(|id| WindowEntry {
                        id: id.to_string(),
                        position: 0,
                    })
                    .collect();
                target - retained
            }
        };

        self.rebuild_index();

        if inserted > 0 || removed > 0 {
            debug!(
                "Render window: {} inserted, {} removed, {} visible",
                inserted,
                removed,
                self.entries.len()
            );
        }

        WindowChange {
            inserted,
            removed,
            reset: false,
        }
    }

    /// Renumbers positions to `0..len` and rebuilds the membership set.
    fn rebuild_index(&mut self) {
        self.members.clear();
        for (position, entry) in self.entries.iter_mut().enumerate() {
            entry.position = position;
            self.members.insert(entry.id.clone());
        }
    }
}

impl Default for RenderWindow {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ids: &[String]) -> Snapshot {
        Snapshot::from_records(ids.iter().map(|id| PhotoRecord::new(id.clone(), id.clone())).collect())
    }

    fn numbered(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("{prefix}{i:03}")).collect()
    }

    fn window_with(batch_size: usize, placement: NewPhotoPlacement) -> RenderWindow {
        RenderWindow::new(WindowConfig {
            batch_size,
            placement,
            ..Default::default()
        })
    }

    fn assert_consistent(window: &RenderWindow, snapshot: &Snapshot) {
        let mut seen = HashSet::new();
        for (i, entry) in window.entries().iter().enumerate() {
            assert_eq!(entry.position, i, "positions must be contiguous");
            assert!(snapshot.contains(&entry.id), "{} not in snapshot", entry.id);
            assert!(seen.insert(entry.id.clone()), "{} listed twice", entry.id);
            assert!(window.contains(&entry.id));
        }
        assert!(window.len() <= snapshot.len());
    }

    /// Advances an LCG; enough to shuffle test inputs deterministically.
    fn next_seed(seed: &mut u64) -> u64 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *seed >> 33
    }

    #[test]
    fn test_first_batch_then_scroll() {
        let ids = numbered("p", 0..50);
        let snap = snapshot(&ids);
        let mut window = RenderWindow::default();

        let change = window.apply_update(&snap, &SnapshotDiff::between(&Snapshot::empty(), &snap));
        assert!(change.reset);
        assert_eq!(window.len(), 32);
        assert_eq!(window.ids().collect::<Vec<_>>(), ids[..32].iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(window.entries()[31].position, 31);

        assert_eq!(window.load_more(&snap), 18);
        assert_eq!(window.len(), 50);
        assert_eq!(window.entries()[49], WindowEntry { id: ids[49].clone(), position: 49 });

        assert_eq!(window.load_more(&snap), 0);
        assert_eq!(window.len(), 50);
        assert_consistent(&window, &snap);
    }

    #[test]
    fn test_empty_snapshot_keeps_window_empty() {
        let mut window = RenderWindow::default();
        let empty = Snapshot::empty();
        window.apply_update(&empty, &SnapshotDiff::default());
        assert!(window.is_empty());
        assert_eq!(window.load_more(&empty), 0);
    }

    #[test]
    fn test_scroll_proximity() {
        let snap = snapshot(&numbered("p", 0..100));
        let mut window = RenderWindow::default();
        window.reset(&snap);

        let far = ScrollMetrics {
            offset: 0.0,
            viewport_height: 800.0,
            content_height: 4000.0,
        };
        assert_eq!(window.on_scroll(&snap, far), 0);

        let near = ScrollMetrics {
            offset: 2950.0,
            ..far
        };
        assert_eq!(near.distance_to_end(), 250.0);
        assert_eq!(window.on_scroll(&snap, near), 32);
        assert_eq!(window.len(), 64);

        let past_end = ScrollMetrics {
            offset: 5000.0,
            ..far
        };
        assert_eq!(past_end.distance_to_end(), 0.0);
        assert!(past_end.is_near_end(0.0));
    }

    #[test]
    fn test_added_photos_are_prepended() {
        let old = snapshot(&["a", "b", "c"].map(String::from));
        let mut window = window_with(2, NewPhotoPlacement::Prepend);
        window.reset(&old);
        assert_eq!(window.ids().collect::<Vec<_>>(), vec!["a", "b"]);

        let new = snapshot(&["b", "c", "d", "e"].map(String::from));
        let diff = SnapshotDiff::between(&old, &new);
        let change = window.apply_update(&new, &diff);

        assert_eq!(
            change,
            WindowChange {
                inserted: 2,
                removed: 1,
                reset: false
            }
        );
        assert_eq!(window.ids().collect::<Vec<_>>(), vec!["d", "e", "b"]);
        assert_eq!(
            window.entries().iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        // "c" was never shown; the next batch picks it up
        assert_eq!(window.load_more(&new), 1);
        assert_eq!(window.ids().last(), Some("c"));
        assert_consistent(&window, &new);
    }

    #[test]
    fn test_added_photos_follow_sort_order_when_configured() {
        let old = snapshot(&["b", "d", "f", "h"].map(String::from));
        let mut window = window_with(2, NewPhotoPlacement::SortOrder);
        window.reset(&old);

        let new = snapshot(&["a", "b", "f", "h"].map(String::from));
        let diff = SnapshotDiff::between(&old, &new);
        window.apply_update(&new, &diff);

        // "d" dropped, "a" added: still a prefix of the snapshot
        assert_eq!(window.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_consistent(&window, &new);
    }

    #[test]
    fn test_reset_on_resort() {
        let ids = numbered("p", 0..40);
        let snap = snapshot(&ids);
        let mut window = RenderWindow::default();
        window.reset(&snap);
        window.load_more(&snap);
        assert_eq!(window.len(), 40);

        let mut reversed = ids.clone();
        reversed.reverse();
        let resorted = snapshot(&reversed);
        window.reset(&resorted);

        assert_eq!(window.len(), 32);
        assert_eq!(window.entries()[0].id, "p039");
    }

    #[test]
    fn test_stale_ids_pruned_without_diff() {
        let old = snapshot(&["a", "b", "c"].map(String::from));
        let mut window = RenderWindow::default();
        window.reset(&old);

        let new = snapshot(&["c"].map(String::from));
        window.apply_update(&new, &SnapshotDiff::default());
        assert_eq!(window.ids().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_visible_resolves_latest_records() {
        let old = Snapshot::from_records(vec![PhotoRecord::new("a", "before.jpg")]);
        let mut window = RenderWindow::default();
        window.reset(&old);

        let new = Snapshot::from_records(vec![PhotoRecord::new("a", "after.jpg")]);
        window.apply_update(&new, &SnapshotDiff::between(&old, &new));

        let visible = window.visible(&new);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "after.jpg");
    }

    #[test]
    fn test_invariants_hold_across_random_updates() {
        for placement in [NewPhotoPlacement::Prepend, NewPhotoPlacement::SortOrder] {
            let mut seed = 42u64;
            let mut window = window_with(8, placement);
            let mut current = Snapshot::empty();
            let universe = numbered("u", 0..60);

            for _ in 0..200 {
                match next_seed(&mut seed) % 4 {
                    0 => {
                        let before = window.len();
                        window.load_more(&current);
                        assert!(window.len() >= before);
                    }
                    1 => {
                        window.reset(&current);
                    }
                    _ => {
                        let ids: Vec<String> = universe
                            .iter()
                            .filter(|_| next_seed(&mut seed) % 3 != 0)
                            .cloned()
                            .collect();
                        let next = snapshot(&ids);
                        let diff = SnapshotDiff::between(&current, &next);
                        let before = window.len();
                        let change = window.apply_update(&next, &diff);
                        if !change.reset {
                            assert_eq!(window.len(), before + change.inserted - change.removed);
                        }
                        current = next;
                    }
                }
                assert_consistent(&window, &current);
            }
        }
    }
}
