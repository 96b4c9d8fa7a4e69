//! Client-side interpretation of a host snapshot.
//!
//! Hosts of different vintages expose the same fact under different fields
//! (an explicit armed boolean, derived enabled booleans, or raw settings
//! entries). Each resolution here is one precedence-ordered function instead
//! of ad hoc fallbacks at call sites.

use deck_protocol::{HostState, RelayInfo};

/// Setting key for the automatic switching toggle.
pub const AUTO_SCENE_SWITCH_KEY: &str = "auto_scene_switch";
/// Setting key for the manual override lockout.
pub const MANUAL_OVERRIDE_KEY: &str = "manual_override";

/// Tri-state lookup of a setting by key: `None` when the host has not
/// reported it.
pub fn setting_value(state: &HostState, key: &str) -> Option<bool> {
    state
        .settings
        .items
        .iter()
        .find(|item| item.key == key)
        .and_then(|item| item.value)
}

/// Which underlying setting is authoritative for arming and disarming.
///
/// Manual-override and auto-switch share one physical toggle; the setting the
/// host actually exposes decides which key the deck writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmSource {
    ManualOverride,
    AutoSceneSwitch,
}

impl ArmSource {
    pub fn setting_key(self) -> &'static str {
        match self {
            ArmSource::ManualOverride => MANUAL_OVERRIDE_KEY,
            ArmSource::AutoSceneSwitch => AUTO_SCENE_SWITCH_KEY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmState {
    pub armed: bool,
    pub source: ArmSource,
    pub auto_switch_enabled: Option<bool>,
    pub manual_override_enabled: Option<bool>,
}

/// Resolves the armed state. Precedence, highest first:
///
/// 1. `scenes.auto_switch_armed` reported by the host.
/// 2. Derived: auto-switch enabled (`scenes.auto_switch_enabled`, else the
///    `auto_scene_switch` setting) AND manual override not engaged
///    (`scenes.manual_override_enabled`, else the `manual_override` setting).
///    Manual override wins when both settings are present.
/// 3. Unknown auto-switch state resolves to disarmed.
pub fn resolve_arm_state(state: &HostState) -> ArmState {
    let auto_switch_enabled = state
        .scenes
        .auto_switch_enabled
        .or_else(|| setting_value(state, AUTO_SCENE_SWITCH_KEY));
    let manual_override_enabled = state
        .scenes
        .manual_override_enabled
        .or_else(|| setting_value(state, MANUAL_OVERRIDE_KEY));

    let armed = state.scenes.auto_switch_armed.unwrap_or(
        matches!(auto_switch_enabled, Some(true)) && manual_override_enabled != Some(true),
    );
    let source = if manual_override_enabled.is_some() {
        ArmSource::ManualOverride
    } else {
        ArmSource::AutoSceneSwitch
    };

    ArmState {
        armed,
        source,
        auto_switch_enabled,
        manual_override_enabled,
    }
}

/// Bitrate figure the decision loop evaluates: the relay bonded feed while
/// the relay is active, the local bonded feed otherwise.
pub fn auto_switch_bitrate_kbps(state: &HostState) -> f64 {
    if state.relay.active && state.bitrate.relay_bonded_kbps > 0.0 {
        state.bitrate.relay_bonded_kbps
    } else {
        state.bitrate.bonded_kbps
    }
}

/// Maps the raw relay status to its presentation value.
pub fn relay_display_status(relay: &RelayInfo) -> &str {
    match relay.status.to_lowercase().as_str() {
        "provisioning" => "connecting",
        "" => "inactive",
        _ => relay.status.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_protocol::SettingItem;

    fn state_with_settings(items: Vec<(&str, Option<bool>)>) -> HostState {
        let mut state = HostState::default();
        state.settings.items = items
            .into_iter()
            .map(|(key, value)| SettingItem {
                key: key.to_string(),
                label: key.to_string(),
                value,
            })
            .collect();
        state
    }

    #[test]
    fn explicit_armed_flag_wins() {
        let mut state = state_with_settings(vec![(AUTO_SCENE_SWITCH_KEY, Some(false))]);
        state.scenes.auto_switch_armed = Some(true);
        assert!(resolve_arm_state(&state).armed);
    }

    #[test]
    fn derived_from_settings_when_no_explicit_flag() {
        let state = state_with_settings(vec![(AUTO_SCENE_SWITCH_KEY, Some(true))]);
        let arm = resolve_arm_state(&state);
        assert!(arm.armed);
        assert_eq!(arm.source, ArmSource::AutoSceneSwitch);
    }

    #[test]
    fn manual_override_wins_when_both_present() {
        let state = state_with_settings(vec![
            (AUTO_SCENE_SWITCH_KEY, Some(true)),
            (MANUAL_OVERRIDE_KEY, Some(true)),
        ]);
        let arm = resolve_arm_state(&state);
        assert!(!arm.armed);
        assert_eq!(arm.source, ArmSource::ManualOverride);
        assert_eq!(arm.source.setting_key(), MANUAL_OVERRIDE_KEY);
    }

    #[test]
    fn unknown_auto_switch_resolves_to_disarmed() {
        let state = state_with_settings(vec![(AUTO_SCENE_SWITCH_KEY, None)]);
        let arm = resolve_arm_state(&state);
        assert!(!arm.armed);
        assert_eq!(arm.auto_switch_enabled, None);
    }

    #[test]
    fn scenes_section_booleans_take_precedence_over_settings() {
        let mut state = state_with_settings(vec![
            (AUTO_SCENE_SWITCH_KEY, Some(false)),
            (MANUAL_OVERRIDE_KEY, Some(true)),
        ]);
        state.scenes.auto_switch_enabled = Some(true);
        state.scenes.manual_override_enabled = Some(false);
        assert!(resolve_arm_state(&state).armed);
    }

    #[test]
    fn relay_bitrate_used_only_while_relay_active() {
        let mut state = HostState::default();
        state.bitrate.bonded_kbps = 7000.0;
        state.bitrate.relay_bonded_kbps = 5000.0;
        assert_eq!(auto_switch_bitrate_kbps(&state), 7000.0);

        state.relay.active = true;
        assert_eq!(auto_switch_bitrate_kbps(&state), 5000.0);
    }

    #[test]
    fn relay_status_maps_provisioning_to_connecting() {
        let mut relay = RelayInfo::default();
        relay.status = "provisioning".to_string();
        assert_eq!(relay_display_status(&relay), "connecting");
        relay.status = String::new();
        assert_eq!(relay_display_status(&relay), "inactive");
        relay.status = "active".to_string();
        assert_eq!(relay_display_status(&relay), "active");
    }
}
