//! Preference persistence bridge.
//!
//! Preferences (rule set + link maps) live host-side and travel as text
//! through the generic save/load commands. On attach the bridge enters a
//! hydrating state and waits for the correlated load result or a timeout;
//! until hydration completes no save may fire, so transient in-memory
//! defaults can never overwrite host-held preferences. After hydration,
//! edits persist through a debounced save to avoid write storms.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use deck_protocol::{parse_scene_prefs, ActionResult, ActionStatus, ScenePrefs};

pub const HYDRATION_TIMEOUT_MS: i64 = 1500;
pub const SAVE_DEBOUNCE_MS: i64 = 300;

/// What a tick decided, for the engine to act on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefsTick {
    /// Hydration gave up waiting; in-memory defaults stand.
    pub hydration_timed_out: bool,
    /// The debounce window closed; the engine should issue a save now.
    pub save_due: bool,
}

#[derive(Debug, Default)]
pub struct PrefsBridge {
    hydrated: bool,
    hydration_deadline: Option<DateTime<Utc>>,
    load_request_id: Option<String>,
    save_due: Option<DateTime<Utc>>,
}

impl PrefsBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hydrated(&self) -> bool {
        self.hydrated
    }

    /// Enters the hydrating state; the engine has issued a load command with
    /// the given request id.
    pub fn begin_hydration(&mut self, now: DateTime<Utc>, load_request_id: String) {
        self.hydrated = false;
        self.load_request_id = Some(load_request_id);
        self.hydration_deadline = Some(now + Duration::milliseconds(HYDRATION_TIMEOUT_MS));
    }

    /// Marks hydration done without a load round-trip (hosts without
    /// preference support).
    pub fn mark_hydrated(&mut self) {
        self.hydrated = true;
        self.hydration_deadline = None;
        self.load_request_id = None;
    }

    /// Consumes the load result if it correlates. Returns the parsed payload
    /// when one arrived intact; hydration completes either way. A malformed
    /// payload keeps the in-memory defaults.
    pub fn note_result(&mut self, result: &ActionResult) -> Option<ScenePrefs> {
        if self.load_request_id.as_deref() != Some(result.request_id.as_str()) {
            return None;
        }
        if !result.status.is_terminal() {
            return None;
        }
        self.mark_hydrated();

        if result.status != ActionStatus::Completed || result.ok != Some(true) {
            debug!(status = ?result.status, "preference load did not complete; keeping defaults");
            return None;
        }
        let raw = result.detail.as_deref().unwrap_or("{}");
        match parse_scene_prefs(raw) {
            Ok(prefs) => Some(prefs),
            Err(err) => {
                warn!(code = %err.code, raw, "persisted preference payload is malformed; keeping defaults");
                None
            }
        }
    }

    /// Notes an edit to links or rules. Starts (or restarts) the debounce
    /// window, but never before hydration completes.
    pub fn mark_dirty(&mut self, now: DateTime<Utc>) {
        if !self.hydrated {
            return;
        }
        self.save_due = Some(now + Duration::milliseconds(SAVE_DEBOUNCE_MS));
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> PrefsTick {
        let mut outcome = PrefsTick::default();

        if let Some(deadline) = self.hydration_deadline {
            if now >= deadline {
                self.mark_hydrated();
                outcome.hydration_timed_out = true;
            }
        }
        if let Some(due) = self.save_due {
            if now >= due {
                self.save_due = None;
                outcome.save_due = true;
            }
        }
        outcome
    }

    /// Cancels outstanding deadlines; no save fires after detach.
    pub fn detach(&mut self) {
        self.hydration_deadline = None;
        self.load_request_id = None;
        self.save_due = None;
    }
}
