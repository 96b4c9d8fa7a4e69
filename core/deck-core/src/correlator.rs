//! Fire-track-forget command correlation.
//!
//! Every outbound command gets a generated request id when it lacks one, is
//! recorded as optimistic, and is dispatched immediately. A later result
//! notification bearing the same id updates the tracked entry in place;
//! terminal entries are deleted after a grace window so callers can poll the
//! outcome by id without a separate subscription, and memory stays bounded.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use deck_protocol::{ActionResult, ActionStatus};

/// How long a terminal entry stays queryable before deletion.
pub const RESULT_RETENTION_MS: i64 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct InFlightAction {
    pub action_type: String,
    pub request_id: String,
    pub status: ActionStatus,
    pub ok: Option<bool>,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Tracks at most one entry per request id and schedules exactly one deletion
/// per terminal entry.
#[derive(Debug, Default)]
pub struct ActionCorrelator {
    entries: HashMap<String, InFlightAction>,
    expiries: Vec<(DateTime<Utc>, String)>,
    counter: u64,
}

impl ActionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the next request id: `dock_<timestamp>_<monotonic counter>`.
    pub fn next_request_id(&mut self, now: DateTime<Utc>) -> String {
        self.counter += 1;
        format!("dock_{}_{}", now.timestamp_millis(), self.counter)
    }

    pub fn track(&mut self, now: DateTime<Utc>, action_type: &str, request_id: &str) {
        self.entries.insert(
            request_id.to_string(),
            InFlightAction {
                action_type: action_type.to_string(),
                request_id: request_id.to_string(),
                status: ActionStatus::Optimistic,
                ok: None,
                error: None,
                sent_at: now,
            },
        );
    }

    /// Applies a correlated result. Unmatched results are silently ignored;
    /// returns whether an entry was updated.
    pub fn apply_result(&mut self, now: DateTime<Utc>, result: &ActionResult) -> bool {
        let Some(entry) = self.entries.get_mut(&result.request_id) else {
            debug!(request_id = %result.request_id, "ignoring unmatched action result");
            return false;
        };
        entry.status = result.status;
        entry.ok = result.ok;
        entry.error = result.error.clone();
        if result.status.is_terminal() {
            self.expiries.push((
                now + Duration::milliseconds(RESULT_RETENTION_MS),
                result.request_id.clone(),
            ));
        }
        true
    }

    pub fn get(&self, request_id: &str) -> Option<&InFlightAction> {
        self.entries.get(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries whose retention window has elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let mut due = Vec::new();
        self.expiries.retain(|(deadline, request_id)| {
            if now >= *deadline {
                due.push(request_id.clone());
                false
            } else {
                true
            }
        });
        for request_id in due {
            self.entries.remove(&request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    fn completed(request_id: &str) -> ActionResult {
        ActionResult {
            action_type: "switch_scene".to_string(),
            request_id: request_id.to_string(),
            status: ActionStatus::Completed,
            ok: Some(true),
            error: None,
            detail: None,
        }
    }

    #[test]
    fn request_ids_are_unique_and_monotonic() {
        let mut correlator = ActionCorrelator::new();
        let now = at("2026-03-01T12:00:00Z");
        let first = correlator.next_request_id(now);
        let second = correlator.next_request_id(now);
        assert_ne!(first, second);
        assert!(first.starts_with("dock_"));
    }

    #[test]
    fn entry_transitions_optimistic_to_completed() {
        let mut correlator = ActionCorrelator::new();
        let now = at("2026-03-01T12:00:00Z");
        correlator.track(now, "switch_scene", "dock_1_1");
        assert_eq!(
            correlator.get("dock_1_1").unwrap().status,
            ActionStatus::Optimistic
        );

        assert!(correlator.apply_result(now, &completed("dock_1_1")));
        let entry = correlator.get("dock_1_1").unwrap();
        assert_eq!(entry.status, ActionStatus::Completed);
        assert_eq!(entry.ok, Some(true));
    }

    #[test]
    fn terminal_entry_expires_after_the_grace_window() {
        let mut correlator = ActionCorrelator::new();
        let now = at("2026-03-01T12:00:00Z");
        correlator.track(now, "switch_scene", "dock_1_1");
        correlator.apply_result(now, &completed("dock_1_1"));

        correlator.tick(now + Duration::milliseconds(2999));
        assert!(correlator.get("dock_1_1").is_some());

        correlator.tick(now + Duration::milliseconds(3001));
        assert!(correlator.get("dock_1_1").is_none());
        assert!(correlator.is_empty());
    }

    #[test]
    fn optimistic_entries_are_not_expired() {
        let mut correlator = ActionCorrelator::new();
        let now = at("2026-03-01T12:00:00Z");
        correlator.track(now, "relay_start", "dock_1_1");
        correlator.tick(now + Duration::seconds(60));
        assert!(correlator.get("dock_1_1").is_some());
    }

    #[test]
    fn unmatched_result_is_ignored() {
        let mut correlator = ActionCorrelator::new();
        let now = at("2026-03-01T12:00:00Z");
        assert!(!correlator.apply_result(now, &completed("dock_9_9")));
        assert!(correlator.is_empty());
    }
}
