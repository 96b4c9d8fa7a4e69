//! State synchronizer: keeps the freshest known host state in memory.
//!
//! Freshness comes from a hybrid of event-triggered pulls and two polling
//! cadences: a fast cadence that covers the volatile start-up window and
//! self-cancels after six seconds, and a slow steady cadence for the rest of
//! the session. Before any of that, an availability probe retries on a short
//! interval until the adapter answers. Multiple pull triggers landing on the
//! same tick collapse into a single pull; each pull replaces the cached
//! snapshot whole.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use deck_protocol::HostState;

use crate::host::HostAdapter;

const PROBE_RETRY_MS: i64 = 250;
const EARLY_REFRESH_MS: i64 = 150;
const STATUS_REQUEST_MS: i64 = 400;
const FAST_POLL_MS: i64 = 250;
const FAST_POLL_WINDOW_MS: i64 = 6000;
const SLOW_POLL_MS: i64 = 2000;

/// What a tick did, for the engine to act on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncTick {
    /// The adapter just became available and the cadences were armed.
    pub just_attached: bool,
    /// A pull ran (successfully or not) this tick.
    pub pulled: bool,
    /// The snapshot was replaced this tick.
    pub refreshed: bool,
    /// The engine should issue a `request_status` command to coax a fresh
    /// push out of the host.
    pub want_status_request: bool,
}

#[derive(Debug, Default)]
pub struct StateSynchronizer {
    snapshot: Option<HostState>,
    attached: bool,
    probe_due: Option<DateTime<Utc>>,
    early_refresh_due: Option<DateTime<Utc>>,
    status_request_due: Option<DateTime<Utc>>,
    fast_poll_due: Option<DateTime<Utc>>,
    fast_poll_until: Option<DateTime<Utc>>,
    slow_poll_due: Option<DateTime<Utc>>,
    refresh_requested: bool,
}

impl StateSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts probing for adapter availability.
    pub fn attach(&mut self, now: DateTime<Utc>) {
        self.probe_due = Some(now);
    }

    /// Cancels every deadline. The last snapshot is kept for consumers; no
    /// pull fires after this.
    pub fn detach(&mut self) {
        self.attached = false;
        self.probe_due = None;
        self.early_refresh_due = None;
        self.status_request_due = None;
        self.fast_poll_due = None;
        self.fast_poll_until = None;
        self.slow_poll_due = None;
        self.refresh_requested = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn snapshot(&self) -> Option<&HostState> {
        self.snapshot.as_ref()
    }

    /// Requests an out-of-band pull on the next tick (event fan-in).
    pub fn request_refresh(&mut self, reason: &str) {
        debug!(reason, "refresh requested");
        self.refresh_requested = true;
    }

    pub fn tick(&mut self, now: DateTime<Utc>, adapter: &mut dyn HostAdapter) -> SyncTick {
        let mut outcome = SyncTick::default();

        if !self.attached {
            let Some(due) = self.probe_due else {
                return outcome;
            };
            if now < due {
                return outcome;
            }
            if !adapter.available() {
                self.probe_due = Some(now + Duration::milliseconds(PROBE_RETRY_MS));
                return outcome;
            }
            self.attached = true;
            self.probe_due = None;
            outcome.just_attached = true;
            // Immediate pull, a second one shortly after to catch the host
            // finishing initialization mid-probe, and a status request to
            // coax a fresh push.
            self.early_refresh_due = Some(now + Duration::milliseconds(EARLY_REFRESH_MS));
            self.status_request_due = Some(now + Duration::milliseconds(STATUS_REQUEST_MS));
            self.fast_poll_due = Some(now + Duration::milliseconds(FAST_POLL_MS));
            self.fast_poll_until = Some(now + Duration::milliseconds(FAST_POLL_WINDOW_MS));
            self.slow_poll_due = Some(now + Duration::milliseconds(SLOW_POLL_MS));
            self.pull(adapter, &mut outcome);
            return outcome;
        }

        let mut want_pull = self.refresh_requested;
        self.refresh_requested = false;

        if due(&mut self.early_refresh_due, now) {
            want_pull = true;
        }
        if let Some(until) = self.fast_poll_until {
            if now >= until {
                self.fast_poll_due = None;
                self.fast_poll_until = None;
            } else if let Some(fast_due) = self.fast_poll_due {
                if now >= fast_due {
                    want_pull = true;
                    self.fast_poll_due = Some(now + Duration::milliseconds(FAST_POLL_MS));
                }
            }
        }
        if let Some(slow_due) = self.slow_poll_due {
            if now >= slow_due {
                want_pull = true;
                self.slow_poll_due = Some(now + Duration::milliseconds(SLOW_POLL_MS));
            }
        }
        if due(&mut self.status_request_due, now) {
            outcome.want_status_request = true;
        }

        if want_pull {
            self.pull(adapter, &mut outcome);
        }
        outcome
    }

    fn pull(&mut self, adapter: &mut dyn HostAdapter, outcome: &mut SyncTick) {
        outcome.pulled = true;
        match adapter.pull() {
            Some(state) => {
                self.snapshot = Some(state);
                outcome.refreshed = true;
            }
            // Transport hiccup: keep the last known snapshot.
            None => debug!("pull failed; keeping last known state"),
        }
    }
}

fn due(deadline: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match *deadline {
        Some(at) if now >= at => {
            *deadline = None;
            true
        }
        _ => false,
    }
}
