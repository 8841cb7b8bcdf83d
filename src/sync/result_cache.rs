use std::time::Duration;

use tokio::time::Instant;

use crate::models::PhotoRecord;

/// Default freshness window.
pub const DEFAULT_CACHE_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
struct CachedResult {
    photos: Vec<PhotoRecord>,
    fetched_at: Instant,
}

/// Short-lived memo of the last successful listing.
///
/// Collapses fetch requests that arrive within `window` of the last completed
/// fetch into a replay of its result. Owned by one engine instance.
#[derive(Debug, Clone)]
pub struct ResultCache {
    window: Duration,
    entry: Option<CachedResult>,
}

impl ResultCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entry: None,
        }
    }

    /// The cached listing, if it completed less than `window` ago.
    pub fn fresh(&self) -> Option<Vec<PhotoRecord>> {
        self.entry
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.window)
            .map(|entry| entry.photos.clone())
    }

    /// Records a successful listing, stamped now.
    pub fn store(&mut self, photos: Vec<PhotoRecord>) {
        self.entry = Some(CachedResult {
            photos,
            fetched_at: Instant::now(),
        });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Time since the cached listing completed.
    pub fn age(&self) -> Option<Duration> {
        self.entry.as_ref().map(|entry| entry.fetched_at.elapsed())
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_within_window_only() {
        let mut cache = ResultCache::default();
        assert!(cache.fresh().is_none());

        cache.store(vec![PhotoRecord::new("a", "a.jpg")]);
        assert_eq!(cache.fresh().unwrap().len(), 1);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(cache.fresh().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.fresh().is_none());
        assert_eq!(cache.age(), Some(Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate() {
        let mut cache = ResultCache::new(Duration::from_secs(5));
        cache.store(Vec::new());
        assert!(cache.fresh().is_some());

        cache.invalidate();
        assert!(cache.fresh().is_none());
        assert!(cache.age().is_none());
    }
}
