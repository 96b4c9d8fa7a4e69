//! Per-action-key cooldown governor.
//!
//! A pure rate limiter over user- and loop-initiated command submission: it
//! prevents double-clicks and optimistic retries from duplicating commands,
//! and keeps the auto-switch loop from oscillating when bitrate hovers near a
//! threshold boundary. It is not a correctness lock; the single-threaded tick
//! loop serializes callers.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Cooldown for a manual scene switch, keyed per scene.
pub const SWITCH_SCENE_COOLDOWN_MS: i64 = 500;
/// Cooldown for the arm/disarm toggle.
pub const AUTO_SWITCH_TOGGLE_COOLDOWN_MS: i64 = 500;
/// Cooldown for settings writes, including the manual-override lockout.
pub const SET_SETTING_COOLDOWN_MS: i64 = 350;
/// Cooldown for auto-triggered switches, keyed per target scene.
pub const AUTO_SWITCH_COOLDOWN_MS: i64 = 2500;

/// Fixed key guarding the disengage-arming write that precedes a manual
/// switch.
pub const MANUAL_LOCKOUT_KEY: &str = "manual_scene_lockout";
/// Fixed key guarding the arm/disarm toggle.
pub const AUTO_SWITCH_TOGGLE_KEY: &str = "set_setting:auto_scene_switch";

pub fn switch_scene_key(scene_id: &str) -> String {
    format!("switch_scene:{}", scene_id)
}

pub fn set_setting_key(setting_key: &str) -> String {
    format!("set_setting:{}", setting_key)
}

pub fn auto_switch_key(scene_id: &str) -> String {
    format!("auto_switch:{}", scene_id)
}

/// Map of gate key to the earliest instant the next entry is allowed.
/// Process-local; discarded with its owner on detach.
#[derive(Debug, Default)]
pub struct ActionGate {
    deadlines: HashMap<String, DateTime<Utc>>,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and advances the deadline to `now + cooldown` only when
    /// the key's cooldown has elapsed; otherwise leaves the deadline as is.
    pub fn try_enter(&mut self, now: DateTime<Utc>, key: &str, cooldown_ms: i64) -> bool {
        if let Some(deadline) = self.deadlines.get(key) {
            if now < *deadline {
                return false;
            }
        }
        self.deadlines
            .insert(key.to_string(), now + Duration::milliseconds(cooldown_ms));
        true
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

    #[test]
    fn first_entry_passes_then_blocks_until_cooldown_elapses() {
        let mut gate = ActionGate::new();
        let start = at("2026-03-01T12:00:00Z");

        assert!(gate.try_enter(start, "k", 500));
        assert!(!gate.try_enter(start + Duration::milliseconds(1), "k", 500));
        assert!(!gate.try_enter(start + Duration::milliseconds(499), "k", 500));
        assert!(gate.try_enter(start + Duration::milliseconds(500), "k", 500));
    }

    #[test]
    fn blocked_entry_does_not_extend_the_deadline() {
        let mut gate = ActionGate::new();
        let start = at("2026-03-01T12:00:00Z");

        assert!(gate.try_enter(start, "k", 500));
        assert!(!gate.try_enter(start + Duration::milliseconds(400), "k", 500));
        // The failed attempt at +400 must not push the deadline to +900.
        assert!(gate.try_enter(start + Duration::milliseconds(500), "k", 500));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let mut gate = ActionGate::new();
        let start = at("2026-03-01T12:00:00Z");

        assert!(gate.try_enter(start, &switch_scene_key("scene_1"), 500));
        assert!(gate.try_enter(start, &switch_scene_key("scene_2"), 500));
        assert!(gate.try_enter(start, AUTO_SWITCH_TOGGLE_KEY, 500));
        assert!(!gate.try_enter(start, &switch_scene_key("scene_1"), 500));
    }
}
