//! Autosave timing as a pure state machine.
//!
//! The coordinator never sleeps or does I/O. The host calls
//! [`SaveCoordinator::mark_dirty`] on every edit and
//! [`SaveCoordinator::poll`] whenever it wakes up (see
//! [`SaveCoordinator::next_deadline`]); a returned [`SaveTicket`] means
//! "run a save round now", and the host reports back with
//! [`SaveCoordinator::succeeded`] or [`SaveCoordinator::failed`].
//!
//! Rules:
//! - a save starts once edits have been quiet for the debounce window;
//! - at most one save is in flight;
//! - after the first failure the coordinator waits out a grace period; if
//!   saving still fails after it, retries run on an exponential backoff
//!   timer and bypass both the debounce and the in-flight gate;
//! - while retrying, ordinary debounced saves are held back.

use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SaveConfig;

/// Ceiling for one backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Standby,
    Saving,
    Saved,
    Failed,
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standby => "standby",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Failed => "failed",
        })
    }
}

/// Permission to run one save round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTicket {
    generation: u64,
    forced: bool,
}

impl SaveTicket {
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.generation
    }

    /// Issued by the retry timer rather than the debounce.
    #[must_use]
    pub const fn is_forced(self) -> bool {
        self.forced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Retry {
    due: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct SaveCoordinator {
    config: SaveConfig,
    status: SaveStatus,
    saved_at: Option<Instant>,
    dirty_since: Option<Instant>,
    in_flight: Option<SaveTicket>,
    generation: u64,
    error_since: Option<Instant>,
    retry: Option<Retry>,
    rng: StdRng,
}

impl SaveCoordinator {
    #[must_use]
    pub fn new(config: SaveConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Coordinator whose backoff jitter is reproducible.
    #[must_use]
    pub fn seeded(config: SaveConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SaveConfig, rng: StdRng) -> Self {
        Self {
            config,
            status: SaveStatus::Standby,
            saved_at: None,
            dirty_since: None,
            in_flight: None,
            generation: 0,
            error_since: None,
            retry: None,
            rng,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SaveConfig {
        &self.config
    }

    /// Status as of the last transition.
    #[must_use]
    pub const fn status(&self) -> SaveStatus {
        self.status
    }

    /// Status at `now`: `Saved` reads as `Standby` once it has been shown
    /// for the configured time.
    #[must_use]
    pub fn status_at(&self, now: Instant) -> SaveStatus {
        match (self.status, self.saved_at) {
            (SaveStatus::Saved, Some(at)) if now >= at + self.config.saved_display() => {
                SaveStatus::Standby
            }
            (status, _) => status,
        }
    }

    #[must_use]
    pub const fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// True while failures have outlasted the grace period and saves run on
    /// the retry timer.
    #[must_use]
    pub const fn has_save_error(&self) -> bool {
        self.retry.is_some()
    }

    /// Number of retries fired since the persistent error began.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry.map_or(0, |r| r.count.saturating_sub(1))
    }

    /// Restart the debounce window.
    pub const fn mark_dirty(&mut self, now: Instant) {
        self.dirty_since = Some(now);
    }

    /// Earliest instant at which [`Self::poll`] or [`Self::status_at`] may
    /// give a different answer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let debounce = self
            .dirty_since
            .filter(|_| self.retry.is_none() && self.in_flight.is_none())
            .map(|at| at + self.config.debounce());
        let retry = self.retry.map(|r| r.due);
        let saved = self
            .saved_at
            .filter(|_| self.status == SaveStatus::Saved)
            .map(|at| at + self.config.saved_display());
        [debounce, retry, saved].into_iter().flatten().min()
    }

    /// Hand out a ticket if a save should start at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<SaveTicket> {
        self.status = self.status_at(now);

        if let Some(retry) = self.retry {
            if now < retry.due {
                return None;
            }
            let delay = self.backoff(retry.count);
            self.retry = Some(Retry {
                due: now + delay,
                count: retry.count + 1,
            });
            info!(
                attempt = retry.count,
                next_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying save"
            );
            return Some(self.issue(true));
        }

        if self.in_flight.is_some() {
            return None;
        }
        let due = self.dirty_since? + self.config.debounce();
        (now >= due).then(|| self.issue(false))
    }

    fn issue(&mut self, forced: bool) -> SaveTicket {
        self.generation += 1;
        let ticket = SaveTicket {
            generation: self.generation,
            forced,
        };
        if let Some(stale) = self.in_flight.replace(ticket) {
            debug!(superseded = stale.generation, by = ticket.generation, "save superseded");
        }
        self.dirty_since = None;
        self.status = SaveStatus::Saving;
        ticket
    }

    fn take_in_flight(&mut self, ticket: SaveTicket) -> bool {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
            true
        } else {
            debug!(generation = ticket.generation, "ignoring completion of a superseded save");
            false
        }
    }

    /// Record a successful save. Returns `false` for a superseded ticket.
    pub fn succeeded(&mut self, ticket: SaveTicket, now: Instant) -> bool {
        if !self.take_in_flight(ticket) {
            return false;
        }
        if self.retry.is_some() {
            info!("save recovered");
        }
        self.status = SaveStatus::Saved;
        self.saved_at = Some(now);
        self.error_since = None;
        self.retry = None;
        true
    }

    /// Record a failed save. Returns `false` for a superseded ticket.
    pub fn failed(&mut self, ticket: SaveTicket, now: Instant) -> bool {
        if !self.take_in_flight(ticket) {
            return false;
        }
        self.status = SaveStatus::Failed;
        // the edits are still unsaved
        self.dirty_since.get_or_insert(now);
        let since = *self.error_since.get_or_insert(now);

        if self.retry.is_none() && now.duration_since(since) > self.config.failure_grace() {
            warn!(
                failing_for_ms = u64::try_from(now.duration_since(since).as_millis()).unwrap_or(u64::MAX),
                "saving keeps failing, switching to retries"
            );
            self.retry = Some(Retry {
                due: now + self.config.first_retry(),
                count: 1,
            });
        }
        true
    }

    /// Back to a fresh coordinator, keeping config and RNG.
    pub fn reset(&mut self) {
        self.status = SaveStatus::Standby;
        self.saved_at = None;
        self.dirty_since = None;
        self.in_flight = None;
        self.error_since = None;
        self.retry = None;
    }

    /// `base + floor(r * factor^count)` seconds with `r` in `[0, 1)`.
    fn backoff(&mut self, count: u32) -> Duration {
        let r: f64 = self.rng.r#gen();
        let exponent = i32::try_from(count).unwrap_or(i32::MAX);
        let jitter = (r * self.config.backoff_factor.powi(exponent)).floor();
        let secs = (self.config.backoff_base_secs + jitter).min(MAX_BACKOFF.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn coordinator() -> (SaveCoordinator, Instant) {
        (SaveCoordinator::seeded(SaveConfig::default(), 42), Instant::now())
    }

    /// Fail saves until the persistent error state is reached; returns the
    /// instant of the failure that triggered it.
    fn fail_past_grace(c: &mut SaveCoordinator, t0: Instant) -> Instant {
        c.mark_dirty(t0);
        let first = c.poll(t0 + ms(3_000)).expect("debounced save");
        assert!(c.failed(first, t0 + ms(3_100)));
        assert!(!c.has_save_error());

        let second = c.poll(t0 + ms(6_100)).expect("re-armed save");
        let at = t0 + ms(13_200);
        assert!(c.failed(second, at));
        assert!(c.has_save_error());
        at
    }

    #[test]
    fn debounce_waits_for_quiet() {
        let (mut c, t0) = coordinator();
        assert_eq!(c.poll(t0), None);
        c.mark_dirty(t0);
        assert_eq!(c.poll(t0 + ms(2_999)), None);
        c.mark_dirty(t0 + ms(2_000));
        assert_eq!(c.poll(t0 + ms(4_000)), None);
        assert_eq!(c.next_deadline(), Some(t0 + ms(5_000)));

        let ticket = c.poll(t0 + ms(5_000)).expect("save starts");
        assert!(!ticket.is_forced());
        assert_eq!(c.status(), SaveStatus::Saving);
        assert!(!c.is_dirty());
    }

    #[test]
    fn only_one_save_in_flight() {
        let (mut c, t0) = coordinator();
        c.mark_dirty(t0);
        let ticket = c.poll(t0 + ms(3_000)).expect("first");
        c.mark_dirty(t0 + ms(3_100));
        assert_eq!(c.poll(t0 + ms(10_000)), None);

        assert!(c.succeeded(ticket, t0 + ms(10_500)));
        let next = c.poll(t0 + ms(10_500)).expect("edit made during the save");
        assert!(next.generation() > ticket.generation());
    }

    #[test]
    fn saved_returns_to_standby() {
        let (mut c, t0) = coordinator();
        c.mark_dirty(t0);
        let ticket = c.poll(t0 + ms(3_000)).expect("save");
        assert!(c.succeeded(ticket, t0 + ms(3_500)));
        assert_eq!(c.status_at(t0 + ms(5_400)), SaveStatus::Saved);
        assert_eq!(c.status_at(t0 + ms(5_500)), SaveStatus::Standby);
        assert_eq!(c.poll(t0 + ms(6_000)), None);
        assert_eq!(c.status(), SaveStatus::Standby);
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let (mut c, t0) = coordinator();
        let at = fail_past_grace(&mut c, t0);

        let stuck = c.poll(at + ms(3_000)).expect("first retry");
        assert!(stuck.is_forced());
        let retry_due = c.next_deadline().expect("next retry scheduled");
        let fresh = c.poll(retry_due).expect("second retry supersedes");
        assert_ne!(stuck, fresh);

        assert!(!c.succeeded(stuck, retry_due + ms(1)));
        assert!(c.has_save_error());
        assert!(c.succeeded(fresh, retry_due + ms(2)));
        assert!(!c.has_save_error());
        assert_eq!(c.status(), SaveStatus::Saved);
    }

    #[test]
    fn failures_within_grace_do_not_trigger_retries() {
        let (mut c, t0) = coordinator();
        c.mark_dirty(t0);
        let ticket = c.poll(t0 + ms(3_000)).expect("save");
        assert!(c.failed(ticket, t0 + ms(3_100)));
        assert_eq!(c.status(), SaveStatus::Failed);
        assert!(!c.has_save_error());
        assert!(c.is_dirty());

        let again = c.poll(t0 + ms(6_100)).expect("debounce still works");
        assert!(c.failed(again, t0 + ms(13_100)));
        assert!(!c.has_save_error(), "exactly at the grace boundary");
    }

    #[test]
    fn persistent_error_holds_back_debounced_saves() {
        let (mut c, t0) = coordinator();
        let at = fail_past_grace(&mut c, t0);
        c.mark_dirty(at);
        assert_eq!(c.poll(at + ms(2_999)), None);
        let retry = c.poll(at + ms(3_000)).expect("first retry after 3 s");
        assert!(retry.is_forced());
        assert_eq!(c.retry_count(), 1);
    }

    #[test]
    fn backoff_stays_within_bounds() {
        let (mut c, t0) = coordinator();
        let mut now = fail_past_grace(&mut c, t0) + ms(3_000);
        for count in 1..=6_u32 {
            let ticket = c.poll(now).expect("retry due");
            assert!(c.failed(ticket, now));
            let due = c.next_deadline().expect("scheduled");
            let delay = due.duration_since(now);
            let max = 5.0 + 2.5_f64.powi(i32::try_from(count).expect("small"));
            assert!(delay >= Duration::from_secs(5), "count {count}: {delay:?}");
            assert!(delay.as_secs_f64() <= max, "count {count}: {delay:?}");
            now = due;
        }
    }

    #[test]
    fn same_seed_same_schedule() {
        let schedule = |seed| {
            let mut c = SaveCoordinator::seeded(SaveConfig::default(), seed);
            let t0 = Instant::now();
            let mut now = fail_past_grace(&mut c, t0) + ms(3_000);
            let mut delays = Vec::new();
            for _ in 0..4 {
                let ticket = c.poll(now).expect("retry");
                c.failed(ticket, now);
                let due = c.next_deadline().expect("due");
                delays.push(due.duration_since(now));
                now = due;
            }
            delays
        };
        assert_eq!(schedule(7), schedule(7));
    }

    #[test]
    fn reset_clears_error_state() {
        let (mut c, t0) = coordinator();
        fail_past_grace(&mut c, t0);
        c.reset();
        assert!(!c.has_save_error());
        assert!(!c.is_saving());
        assert_eq!(c.status(), SaveStatus::Standby);
        assert_eq!(c.next_deadline(), None);
    }
}
