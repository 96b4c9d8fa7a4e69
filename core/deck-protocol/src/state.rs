//! Host state snapshot schema.
//!
//! A snapshot is produced whole by a host adapter pull and replaces the
//! previous one; the deck never mutates a snapshot in place. Every section
//! defaults so partial snapshots from older hosts still parse.

use serde::{Deserialize, Serialize};

/// Full host state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HostState {
    pub header: HeaderInfo,
    pub live: LiveInfo,
    pub scenes: ScenesSection,
    pub connections: ConnectionsSection,
    pub bitrate: BitrateInfo,
    pub outputs: OutputsSection,
    pub relay: RelayInfo,
    pub failover: FailoverInfo,
    pub settings: SettingsSection,
    pub events: Vec<EventEntry>,
    pub pipe: PipeInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderInfo {
    pub title: String,
    pub subtitle: String,
    pub mode: String,
    pub modes: Vec<String>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveInfo {
    pub is_live: bool,
    pub elapsed_sec: u64,
}

/// Scene inventory plus the host's view of the switching state.
///
/// The armed/enabled booleans are optional: older hosts only expose the
/// underlying settings, newer ones report the derived values directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenesSection {
    pub items: Vec<Scene>,
    pub active_scene_id: Option<String>,
    pub pending_scene_id: Option<String>,
    pub auto_switch_armed: Option<bool>,
    pub auto_switch_enabled: Option<bool>,
    pub manual_override_enabled: Option<bool>,
}

/// A scene owned by the host. Identity is `id`; `name` is only used for
/// heuristic matching and persisted link recovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub intent: Option<SceneIntent>,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SceneIntent {
    #[serde(alias = "live")]
    Live,
    #[serde(alias = "brb")]
    Brb,
    #[serde(alias = "hold")]
    Hold,
    #[serde(alias = "offline")]
    Offline,
}

impl SceneIntent {
    /// Case-insensitive parse; returns `None` for unrecognized intents.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "LIVE" => Some(SceneIntent::Live),
            "BRB" => Some(SceneIntent::Brb),
            "HOLD" => Some(SceneIntent::Hold),
            "OFFLINE" => Some(SceneIntent::Offline),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SceneIntent::Live => "LIVE",
            SceneIntent::Brb => "BRB",
            SceneIntent::Hold => "HOLD",
            SceneIntent::Offline => "OFFLINE",
        }
    }
}

/// A user-defined auto-switching rule.
///
/// When `threshold_enabled`, `threshold_mbps` must be finite and >= 0; when
/// disabled the rule never participates in threshold comparison but remains
/// selectable as the fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoSceneRule {
    pub id: String,
    pub label: String,
    pub intent: SceneIntent,
    pub threshold_enabled: bool,
    #[serde(default)]
    pub threshold_mbps: Option<f64>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub bg_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionsSection {
    pub items: Vec<ConnectionLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionLink {
    pub name: String,
    #[serde(rename = "type")]
    pub link_type: String,
    pub signal: u8,
    pub bitrate: f64,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Degraded,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BitrateInfo {
    pub bonded_kbps: f64,
    pub relay_bonded_kbps: f64,
    pub max_per_link_kbps: f64,
    pub max_bonded_kbps: f64,
    pub low_threshold_mbps: f64,
    pub brb_threshold_mbps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputsSection {
    pub groups: Vec<OutputGroup>,
    pub hidden: Vec<HiddenOutput>,
}

/// A named encoder pool and its outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputGroup {
    pub name: String,
    pub encoder: String,
    pub resolution: String,
    pub total_bitrate_kbps: Option<f64>,
    pub avg_lag_ms: Option<f64>,
    pub items: Vec<EncoderOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EncoderOutput {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub kbps: f64,
    pub fps: Option<f64>,
    pub drop_pct: Option<f64>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HiddenOutput {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayInfo {
    pub licensed: bool,
    pub active: bool,
    pub status: String,
    pub region: Option<String>,
    pub latency_ms: Option<f64>,
    pub uptime_sec: Option<u64>,
    pub grace_remaining_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FailoverInfo {
    pub health: HealthLevel,
    pub state: String,
    pub states: Vec<String>,
    pub response_budget_ms: Option<u64>,
    pub last_failover_label: Option<String>,
    pub total_failovers_label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    #[default]
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsSection {
    pub items: Vec<SettingItem>,
}

/// A toggleable host setting. `value` is tri-state: `None` means the host has
/// not reported it (unknown), and the deck must not write through it blindly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingItem {
    pub key: String,
    pub label: String,
    pub value: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EventEntry {
    pub id: String,
    pub time: String,
    pub ts_unix_ms: Option<i64>,
    #[serde(rename = "type")]
    pub level: EventLevel,
    pub msg: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// Transport/pipe health between the host shell and the core process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PipeInfo {
    pub status: PipeHealth,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipeHealth {
    Ok,
    Degraded,
    #[default]
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_parses_to_default_snapshot() {
        let state: HostState = serde_json::from_str("{}").unwrap();
        assert!(state.scenes.items.is_empty());
        assert!(state.scenes.active_scene_id.is_none());
        assert_eq!(state.pipe.status, PipeHealth::Down);
        assert_eq!(state.failover.health, HealthLevel::Offline);
    }

    #[test]
    fn scene_intent_accepts_both_cases_on_the_wire() {
        let upper: Scene = serde_json::from_str(
            r#"{"id":"s1","name":"Live - Main","intent":"LIVE","index":0}"#,
        )
        .unwrap();
        let lower: Scene = serde_json::from_str(
            r#"{"id":"s1","name":"Live - Main","intent":"live","index":0}"#,
        )
        .unwrap();
        assert_eq!(upper.intent, Some(SceneIntent::Live));
        assert_eq!(lower.intent, Some(SceneIntent::Live));
    }

    #[test]
    fn scene_intent_parse_is_case_insensitive() {
        assert_eq!(SceneIntent::parse("brb"), Some(SceneIntent::Brb));
        assert_eq!(SceneIntent::parse("Hold"), Some(SceneIntent::Hold));
        assert_eq!(SceneIntent::parse("mystery"), None);
    }

    #[test]
    fn scenes_section_uses_camel_case_keys() {
        let section: ScenesSection = serde_json::from_str(
            r#"{
                "items": [{"id": "s1", "name": "Main", "index": 0}],
                "activeSceneId": "s1",
                "pendingSceneId": null,
                "autoSwitchArmed": true
            }"#,
        )
        .unwrap();
        assert_eq!(section.active_scene_id.as_deref(), Some("s1"));
        assert_eq!(section.auto_switch_armed, Some(true));
        assert!(section.items[0].intent.is_none());
    }

    #[test]
    fn snapshot_round_trips() {
        let mut state = HostState::default();
        state.relay.active = true;
        state.relay.status = "active".to_string();
        state.bitrate.bonded_kbps = 4200.0;
        state.settings.items.push(SettingItem {
            key: "manual_override".to_string(),
            label: "Manual Override".to_string(),
            value: None,
        });

        let json = serde_json::to_string(&state).unwrap();
        let back: HostState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(back.settings.items[0].value.is_none());
    }
}
