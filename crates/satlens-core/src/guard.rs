//! Call gating for the fetch-and-classify flow and stale-result detection
//! for the enrichment path.
//!
//! Both are explicitly constructed objects owned by whoever drives the
//! flow (one per UI session or test), never process-wide singletons.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bitcoin::Txid;
use tracing::debug;

/// Minimum spacing between starts of the address fetch flow.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(2000);

// ==============================================================================
// Call Guard
// ==============================================================================

/// A monotonic-time gate. An attempt made before `min_interval` has elapsed
/// since the last *permitted* attempt is dropped, not queued; dropped
/// attempts do not push the window forward.
#[derive(Debug)]
pub struct CallGuard {
    min_interval: Duration,
    last_permitted: Mutex<Option<Instant>>,
}

impl CallGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_permitted: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Gate an attempt happening now.
    pub fn should_run(&self) -> bool {
        self.should_run_at(Instant::now())
    }

    /// Gate an attempt happening at `now`. Records `now` only when the
    /// attempt is permitted.
    pub fn should_run_at(&self, now: Instant) -> bool {
        let mut last = self
            .last_permitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let permitted = match *last {
            None => true,
            Some(previous) => now.saturating_duration_since(previous) > self.min_interval,
        };
        if permitted {
            *last = Some(now);
        } else {
            debug!(
                min_interval_ms = self.min_interval.as_millis() as u64,
                "call dropped by guard"
            );
        }
        permitted
    }

    /// Run `f` if the guard permits it, otherwise return `None` without
    /// calling it.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        self.should_run().then(f)
    }
}

impl Default for CallGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

// ==============================================================================
// Selection Generation
// ==============================================================================

/// Identifies one enrichment invocation. Results carrying a token that is
/// no longer current belong to a superseded selection and must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionToken {
    generation: u64,
    txid: Txid,
}

impl SelectionToken {
    pub fn txid(&self) -> Txid {
        self.txid
    }
}

/// Tracks which transaction is currently selected through a monotonically
/// increasing generation counter.
#[derive(Debug, Default)]
pub struct Selection {
    generation: AtomicU64,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `txid`, invalidating every token handed out before.
    pub fn begin(&self, txid: Txid) -> SelectionToken {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        SelectionToken { generation, txid }
    }

    /// Invalidate outstanding tokens without selecting anything new, e.g.
    /// when the watched address changes.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_current(&self, token: &SelectionToken) -> bool {
        self.generation.load(Ordering::Acquire) == token.generation
    }

    /// Hand `value` back only if `token` is still current.
    pub fn apply<T>(&self, token: &SelectionToken, value: T) -> Option<T> {
        self.is_current(token).then_some(value)
    }
}
