//! The polling loop that keeps the photo snapshot current.
//!
//! Each cycle moves `Idle -> Fetching -> Reconciling -> Idle`; a failed fetch
//! goes straight back to `Idle` with the error kept as a side-channel. Every
//! fetch takes a generation number when it is issued, and a result only
//! replaces the snapshot if no newer fetch has already been applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, SyncError};
use crate::models::{PhotoRecord, Snapshot, SortOrder};
use crate::remote::{Credentials, PhotoSource};
use crate::sync::diff::SnapshotDiff;
use crate::sync::result_cache::{ResultCache, DEFAULT_CACHE_WINDOW};
use crate::sync::sort::{sort_photos, sort_snapshot};

/// Shortest allowed delay between scheduled cycles.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Default delay between scheduled cycles.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay from the end of one cycle to the start of the next.
    pub refresh_interval: Duration,
    /// Requests within this long of the last completed fetch replay it.
    pub cache_window: Duration,
}

impl SyncConfig {
    /// The refresh interval with the one-second floor applied.
    pub fn effective_interval(&self) -> Duration {
        self.refresh_interval.max(MIN_REFRESH_INTERVAL)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cache_window: DEFAULT_CACHE_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Reconciling,
}

/// A point-in-time view of the engine for the presentation layer.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Why the most recent cycle failed; cleared by the next success.
    pub last_error: Option<String>,
    pub photo_count: usize,
    pub applied_generation: u64,
    pub last_success: Option<Instant>,
}

/// Notifications sent to the presentation layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A fetch result replaced the snapshot.
    Updated {
        generation: u64,
        snapshot: Arc<Snapshot>,
        diff: SnapshotDiff,
        from_cache: bool,
    },
    /// The sort order changed; the snapshot has the same members, reordered.
    Resorted {
        snapshot: Arc<Snapshot>,
        order: SortOrder,
    },
    /// The credentials changed and the snapshot was emptied.
    Cleared,
    /// A cycle failed. The previous snapshot is still current.
    Failed {
        generation: u64,
        error: String,
        kind: ErrorKind,
    },
}

/// What a single refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied {
        generation: u64,
        photo_count: usize,
        added: usize,
        removed: usize,
        from_cache: bool,
    },
    /// A newer fetch was applied first; this result was dropped.
    Stale { generation: u64 },
    Failed {
        generation: u64,
        error: String,
        kind: ErrorKind,
    },
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Applied { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RefreshOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

struct EngineState {
    credentials: Credentials,
    sort_order: SortOrder,
    snapshot: Arc<Snapshot>,
    cache: ResultCache,
    applied_generation: u64,
    in_flight: usize,
    reconciling: bool,
    last_error: Option<String>,
    last_success: Option<Instant>,
    /// Whether an `Updated` event has gone out for the current credentials.
    published: bool,
}

/// Decrements the in-flight count when a fetch settles or is dropped.
struct InFlightGuard<'a> {
    state: &'a Mutex<EngineState>,
}

impl<'a> InFlightGuard<'a> {
    fn enter(state: &'a Mutex<EngineState>) -> Self {
        state.lock().in_flight += 1;
        Self { state }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().in_flight -= 1;
    }
}

/// Owns the current snapshot and keeps it in step with the remote folder.
pub struct SyncEngine {
    source: Arc<dyn PhotoSource>,
    config: SyncConfig,
    state: Mutex<EngineState>,
    next_generation: AtomicU64,
    events: mpsc::UnboundedSender<SyncEvent>,
    credentials_changed: Notify,
}

impl SyncEngine {
    /// Creates an engine and the receiver its events are delivered on.
    pub fn new(
        source: Arc<dyn PhotoSource>,
        credentials: Credentials,
        sort_order: SortOrder,
        config: SyncConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = EngineState {
            credentials,
            sort_order,
            snapshot: Arc::new(Snapshot::empty()),
            cache: ResultCache::new(config.cache_window),
            applied_generation: 0,
            in_flight: 0,
            reconciling: false,
            last_error: None,
            last_success: None,
            published: false,
        };

        let engine = Arc::new(Self {
            source,
            config,
            state: Mutex::new(state),
            next_generation: AtomicU64::new(0),
            events,
            credentials_changed: Notify::new(),
        });
        (engine, rx)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.lock().snapshot)
    }

    pub fn sort_order(&self) -> SortOrder {
        self.state.lock().sort_order
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.state.lock();
        let phase = if state.reconciling {
            SyncPhase::Reconciling
        } else if state.in_flight > 0 {
            SyncPhase::Fetching
        } else {
            SyncPhase::Idle
        };
        SyncStatus {
            phase,
            last_error: state.last_error.clone(),
            photo_count: state.snapshot.len(),
            applied_generation: state.applied_generation,
            last_success: state.last_success,
        }
    }

    /// Runs one fetch-sort-replace cycle.
    ///
    /// Safe to call while another cycle is in flight; the result cache and the
    /// generation check keep overlapping calls from regressing the snapshot.
    pub async fn refresh(&self) -> RefreshOutcome {
        // Numbered under the lock so a credential switch cannot slip between
        // the generation and the credentials it fetches with.
        let (generation, credentials, cached) = {
            let state = self.state.lock();
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cached = state.cache.fresh().map(|photos| (photos, state.cache.age()));
            (generation, state.credentials.clone(), cached)
        };

        if let Err(err) = credentials.validate() {
            return self.fail(generation, err);
        }

        if let Some((photos, age)) = cached {
            debug!(
                "Generation {}: replaying listing fetched {:?} ago",
                generation,
                age.unwrap_or_default()
            );
            return self.apply(generation, photos, true);
        }

        let result = {
            let _guard = InFlightGuard::enter(&self.state);
            debug!("Generation {}: fetching {:?}", generation, credentials);
            self.source.list_photos(&credentials).await
        };

        match result {
            Ok(photos) => self.apply(generation, photos, false),
            Err(err) => self.fail(generation, err),
        }
    }

    /// Sorts a fetch result and makes it the current snapshot, unless a newer
    /// generation got there first.
    fn apply(&self, generation: u64, photos: Vec<PhotoRecord>, from_cache: bool) -> RefreshOutcome {
        let order = {
            let mut state = self.state.lock();
            if generation < state.applied_generation {
                return self.stale(generation);
            }
            state.reconciling = true;
            state.sort_order
        };

        let raw = if from_cache { None } else { Some(photos.clone()) };
        let mut sorted = Snapshot::from_records(sort_photos(photos, order));

        let mut state = self.state.lock();
        state.reconciling = false;
        if generation < state.applied_generation {
            drop(state);
            return self.stale(generation);
        }
        if state.sort_order != order {
            sorted = sort_snapshot(&sorted, state.sort_order);
        }

        let diff = SnapshotDiff::between(&state.snapshot, &sorted);
        let unchanged = state.published
            && diff.is_empty()
            && state.snapshot.fingerprint() == sorted.fingerprint();

        state.applied_generation = generation;
        state.last_error = None;
        state.last_success = Some(Instant::now());
        if let Some(raw) = raw {
            state.cache.store(raw);
        }

        let outcome = RefreshOutcome::Applied {
            generation,
            photo_count: sorted.len(),
            added: diff.added.len(),
            removed: diff.removed.len(),
            from_cache,
        };

        if unchanged {
            debug!("Generation {}: listing unchanged, nothing to publish", generation);
            return outcome;
        }

        let snapshot = Arc::new(sorted);
        state.snapshot = Arc::clone(&snapshot);
        state.published = true;

        info!(
            "Generation {}: {} photos ({} added, {} removed, {} changed, {} kept){}",
            generation,
            snapshot.len(),
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len(),
            diff.unchanged,
            if from_cache { " from cache" } else { "" }
        );

        // Sent before unlocking so events arrive in the order the snapshot
        // changed.
        let _ = self.events.send(SyncEvent::Updated {
            generation,
            snapshot,
            diff,
            from_cache,
        });

        outcome
    }

    fn fail(&self, generation: u64, err: SyncError) -> RefreshOutcome {
        let kind = err.kind();
        let error = err.to_string();

        let mut state = self.state.lock();
        if generation < state.applied_generation {
            drop(state);
            debug!(
                "Generation {}: ignoring failure from superseded fetch: {}",
                generation, error
            );
            return RefreshOutcome::Stale { generation };
        }
        state.last_error = Some(error.clone());

        warn!(error = %error, "Generation {}: refresh failed", generation);

        let _ = self.events.send(SyncEvent::Failed {
            generation,
            error: error.clone(),
            kind,
        });
        drop(state);

        RefreshOutcome::Failed {
            generation,
            error,
            kind,
        }
    }

    fn stale(&self, generation: u64) -> RefreshOutcome {
        debug!("Generation {}: superseded by a newer fetch, dropping", generation);
        RefreshOutcome::Stale { generation }
    }

    /// Re-sorts the current snapshot. No fetch is made.
    pub fn set_sort_order(&self, order: SortOrder) {
        let mut state = self.state.lock();
        if state.sort_order == order {
            return;
        }
        state.sort_order = order;
        let snapshot = Arc::new(sort_snapshot(&state.snapshot, order));
        state.snapshot = Arc::clone(&snapshot);

        info!("Sort order changed to {}", order);
        let _ = self.events.send(SyncEvent::Resorted { snapshot, order });
    }

    /// Switches to new credentials.
    ///
    /// The snapshot is emptied, the cache dropped, and any fetch still in flight
    /// for the old credentials becomes stale.
    pub fn set_credentials(&self, credentials: Credentials) {
        {
            let mut state = self.state.lock();
            if state.credentials == credentials {
                return;
            }
            state.credentials = credentials;
            state.cache.invalidate();
            state.snapshot = Arc::new(Snapshot::empty());
            state.last_error = None;
            state.published = false;
            // Every generation issued so far belongs to the old credentials.
            state.applied_generation = self.next_generation.load(Ordering::SeqCst) + 1;

            info!("Credentials changed, starting over");
            let _ = self.events.send(SyncEvent::Cleared);
        }

        self.credentials_changed.notify_one();
    }

    /// The scheduled loop. Runs until `shutdown` flips to true or its sender
    /// is dropped.
    ///
    /// The next cycle starts `refresh_interval` after the previous one
    /// settled, so cycles never overlap. After a configuration error the loop
    /// waits for new credentials instead of the interval.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.effective_interval();
        info!("Sync loop started, refreshing every {:?}", interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = self.refresh() => outcome,
                _ = shutdown.changed() => break,
            };

            let wait_for_config = matches!(
                &outcome,
                RefreshOutcome::Failed { kind, .. } if !kind.retry_on_schedule()
            );

            if wait_for_config {
                debug!("Waiting for credentials before the next cycle");
                tokio::select! {
                    _ = self.credentials_changed.notified() => {}
                    _ = shutdown.changed() => break,
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        info!("Sync loop stopped");
    }
}
