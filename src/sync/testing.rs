//! Scriptable `PhotoSource` for exercising the engine without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::models::PhotoRecord;
use crate::remote::{Credentials, PhotoSource};

pub fn photo(id: &str, name: &str, modified: &str) -> PhotoRecord {
    PhotoRecord::new(id, name).with_modified_time(modified)
}

/// One scripted response.
#[derive(Debug, Clone)]
pub struct Scripted {
    delay: Duration,
    result: Result<Vec<PhotoRecord>, u16>,
}

impl Scripted {
    pub fn ok(photos: Vec<PhotoRecord>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(photos),
        }
    }

    /// Fails with a transport error carrying `status`.
    pub fn fail(status: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(status),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays scripted responses in order; the last one repeats once the
/// script runs out.
pub struct FakeSource {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    starts: Mutex<Vec<Instant>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSource {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(response: Scripted) -> Self {
        Self::new(vec![response])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of listings that were in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// When each listing started.
    pub fn starts(&self) -> Vec<Instant> {
        self.starts.lock().clone()
    }

    fn next_response(&self) -> Scripted {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or_else(|| Scripted::ok(Vec::new()))
        }
    }
}

#[async_trait]
impl PhotoSource for FakeSource {
    async fn list_photos(&self, _credentials: &Credentials) -> Result<Vec<PhotoRecord>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.starts.lock().push(Instant::now());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let response = self.next_response();
        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }

        response.result.map_err(|status| SyncError::Transport {
            status,
            message: "scripted failure".to_string(),
        })
    }
}
