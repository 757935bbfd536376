//! Version stamping.
//!
//! Block versions are wall-clock milliseconds, but every stamp handed out by
//! a [`Clock`] must be strictly greater than the previous one so that two
//! edits within the same millisecond still order deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::model::block::Version;

/// Source of block versions.
pub trait Clock: Send + Sync {
    /// Return a fresh version, strictly greater than any previously returned.
    fn now_version(&self) -> Version;
}

/// Wall-clock versions in milliseconds since the Unix epoch.
///
/// `offset_ms` corrects for a known skew between this host and the server
/// that stores the document.
#[derive(Debug, Default)]
pub struct SystemClock {
    offset_ms: i64,
    last: AtomicI64,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_offset(offset_ms: i64) -> Self {
        Self {
            offset_ms,
            last: AtomicI64::new(0),
        }
    }
}

impl Clock for SystemClock {
    fn now_version(&self) -> Version {
        let wall = Utc::now().timestamp_millis().saturating_add(self.offset_ms);
        Version(bump(&self.last, wall))
    }
}

/// Manually driven clock for tests and simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    last: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn starting_at(version: i64) -> Self {
        Self {
            last: AtomicI64::new(version),
        }
    }

    /// The most recently issued version.
    #[must_use]
    pub fn current(&self) -> Version {
        Version(self.last.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now_version(&self) -> Version {
        Version(self.last.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }
}

fn bump(last: &AtomicI64, candidate: i64) -> i64 {
    let mut prev = last.load(Ordering::SeqCst);
    loop {
        let next = candidate.max(prev.saturating_add(1));
        match last.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}
