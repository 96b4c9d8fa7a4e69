//! Wire types for the relay deck host boundary.
//!
//! This crate is shared by the deck core and its host adapters to prevent
//! schema drift. The host remains the authority on state; clients reuse these
//! types to construct valid commands and to parse snapshots and asynchronous
//! action results.
//!
//! Field names on the wire are camelCase (the host bridge contract); Rust
//! field names stay snake_case via serde renames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod state;

pub use state::*;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands (deck → host)
// ─────────────────────────────────────────────────────────────────────────────

/// A command pushed through the generic dispatch entry point.
///
/// Every command accepts an optional `requestId`; the dispatcher stamps one
/// when absent so asynchronous results can be correlated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DeckCommand {
    #[serde(rename_all = "camelCase")]
    SwitchScene {
        scene_id: String,
        scene_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetMode {
        mode: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetSetting {
        key: String,
        value: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RelayStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RelayStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RequestStatus {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LoadScenePrefs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SaveScenePrefs {
        prefs_json: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl DeckCommand {
    /// The wire tag for this command, also used as the tracked action type.
    pub fn kind(&self) -> &'static str {
        match self {
            DeckCommand::SwitchScene { .. } => "switch_scene",
            DeckCommand::SetMode { .. } => "set_mode",
            DeckCommand::SetSetting { .. } => "set_setting",
            DeckCommand::RelayStart { .. } => "relay_start",
            DeckCommand::RelayStop { .. } => "relay_stop",
            DeckCommand::RequestStatus { .. } => "request_status",
            DeckCommand::LoadScenePrefs { .. } => "load_scene_prefs",
            DeckCommand::SaveScenePrefs { .. } => "save_scene_prefs",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            DeckCommand::SwitchScene { request_id, .. }
            | DeckCommand::SetMode { request_id, .. }
            | DeckCommand::SetSetting { request_id, .. }
            | DeckCommand::RelayStart { request_id }
            | DeckCommand::RelayStop { request_id }
            | DeckCommand::RequestStatus { request_id }
            | DeckCommand::LoadScenePrefs { request_id }
            | DeckCommand::SaveScenePrefs { request_id, .. } => request_id.as_deref(),
        }
    }

    pub fn set_request_id(&mut self, id: String) {
        match self {
            DeckCommand::SwitchScene { request_id, .. }
            | DeckCommand::SetMode { request_id, .. }
            | DeckCommand::SetSetting { request_id, .. }
            | DeckCommand::RelayStart { request_id }
            | DeckCommand::RelayStop { request_id }
            | DeckCommand::RequestStatus { request_id }
            | DeckCommand::LoadScenePrefs { request_id }
            | DeckCommand::SaveScenePrefs { request_id, .. } => *request_id = Some(id),
        }
    }
}

/// Immediate, synchronous result of pushing a command.
///
/// Accepted commands may still fail later; the terminal outcome arrives as an
/// [`ActionResult`] correlated by request id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn accepted(request_id: impl Into<String>) -> Self {
        Self {
            ok: true,
            request_id: Some(request_id.into()),
            error: None,
        }
    }

    pub fn rejected(error: &str) -> Self {
        Self {
            ok: false,
            request_id: None,
            error: Some(error.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Asynchronous action results (host → deck)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Optimistic,
    Completed,
    Failed,
    Rejected,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Rejected
        )
    }
}

/// Terminal (or progress) outcome of an accepted command, delivered through
/// the push-notification channel and correlated by `requestId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_type: String,
    pub request_id: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Serialized payload for results that carry one (e.g. loaded prefs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub fn parse_action_result(json_text: &str) -> Result<ActionResult, ErrorInfo> {
    let result: ActionResult = serde_json::from_str(json_text).map_err(|err| {
        ErrorInfo::new(
            "invalid_action_result",
            format!("action result payload is invalid JSON: {}", err),
        )
    })?;
    if result.request_id.trim().is_empty() {
        return Err(ErrorInfo::new("invalid_request_id", "requestId is required"));
    }
    Ok(result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// Which command types the current host supports.
///
/// Hosts may report this explicitly; adapters without explicit support infer
/// it from which generic entry points exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HostCapabilities {
    pub get_state: bool,
    pub switch_scene: bool,
    pub set_mode: bool,
    pub set_setting: bool,
    pub relay_control: bool,
    pub scene_prefs: bool,
}

impl HostCapabilities {
    /// Everything a full bridge host exposes.
    pub fn full() -> Self {
        Self {
            get_state: true,
            switch_scene: true,
            set_mode: true,
            set_setting: true,
            relay_control: true,
            scene_prefs: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persisted preferences payload
// ─────────────────────────────────────────────────────────────────────────────

/// Preference payload carried as text through the generic save/load commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenePrefs {
    pub scene_intent_links: std::collections::BTreeMap<String, String>,
    pub scene_intent_links_by_name: std::collections::BTreeMap<String, String>,
    pub auto_scene_rules: Vec<AutoSceneRule>,
}

impl ScenePrefs {
    pub fn to_json(&self) -> Result<String, ErrorInfo> {
        serde_json::to_string(self).map_err(|err| {
            ErrorInfo::new(
                "serialize_failed",
                format!("failed to serialize scene prefs: {}", err),
            )
        })
    }
}

pub fn parse_scene_prefs(json_text: &str) -> Result<ScenePrefs, ErrorInfo> {
    serde_json::from_str(json_text).map_err(|err| {
        ErrorInfo::new(
            "invalid_scene_prefs",
            format!("scene prefs payload is invalid JSON: {}", err),
        )
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge socket framing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMethod {
    GetState,
    GetCapabilities,
    Command,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub protocol_version: u32,
    pub method: BridgeMethod,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl BridgeResponse {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_with_snake_case_tag_and_camel_case_fields() {
        let cmd = DeckCommand::SwitchScene {
            scene_id: "scene_2".to_string(),
            scene_name: "Low Bitrate Fallback".to_string(),
            reason: Some("auto_rule_low_bitrate_fallback".to_string()),
            request_id: Some("dock_1_1".to_string()),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "switch_scene");
        assert_eq!(json["sceneId"], "scene_2");
        assert_eq!(json["sceneName"], "Low Bitrate Fallback");
        assert_eq!(json["requestId"], "dock_1_1");
    }

    #[test]
    fn command_round_trips() {
        let cmd = DeckCommand::SaveScenePrefs {
            prefs_json: "{}".to_string(),
            request_id: None,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: DeckCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn set_request_id_fills_every_variant() {
        let mut cmd = DeckCommand::RelayStart { request_id: None };
        assert!(cmd.request_id().is_none());
        cmd.set_request_id("dock_9_3".to_string());
        assert_eq!(cmd.request_id(), Some("dock_9_3"));
        assert_eq!(cmd.kind(), "relay_start");
    }

    #[test]
    fn parse_action_result_accepts_valid_payload() {
        let result = parse_action_result(
            r#"{"actionType":"switch_scene","requestId":"dock_1_2","status":"completed","ok":true}"#,
        )
        .unwrap();
        assert_eq!(result.status, ActionStatus::Completed);
        assert!(result.status.is_terminal());
        assert_eq!(result.ok, Some(true));
    }

    #[test]
    fn parse_action_result_rejects_blank_request_id() {
        let err = parse_action_result(
            r#"{"actionType":"switch_scene","requestId":"  ","status":"failed"}"#,
        )
        .unwrap_err();
        assert_eq!(err.code, "invalid_request_id");
    }

    #[test]
    fn parse_action_result_rejects_malformed_json() {
        let err = parse_action_result("{not json").unwrap_err();
        assert_eq!(err.code, "invalid_action_result");
    }

    #[test]
    fn optimistic_is_not_terminal() {
        assert!(!ActionStatus::Optimistic.is_terminal());
        assert!(ActionStatus::Rejected.is_terminal());
    }

    #[test]
    fn scene_prefs_round_trip() {
        let mut prefs = ScenePrefs::default();
        prefs
            .scene_intent_links
            .insert("live_main".to_string(), "scene_1".to_string());
        prefs
            .scene_intent_links_by_name
            .insert("live_main".to_string(), "Live - Main".to_string());
        prefs.auto_scene_rules.push(AutoSceneRule {
            id: "live_main".to_string(),
            label: "Live - Main".to_string(),
            intent: SceneIntent::Live,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: true,
            bg_color: "#2ea043".to_string(),
        });

        let json = prefs.to_json().unwrap();
        assert!(json.contains("sceneIntentLinks"));
        assert!(json.contains("sceneIntentLinksByName"));
        assert!(json.contains("autoSceneRules"));
        assert!(json.contains("thresholdEnabled"));

        let back = parse_scene_prefs(&json).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn scene_prefs_parse_rejects_malformed_text() {
        assert!(parse_scene_prefs("not json at all").is_err());
    }

    #[test]
    fn scene_prefs_missing_sections_default_to_empty() {
        let prefs = parse_scene_prefs("{}").unwrap();
        assert!(prefs.scene_intent_links.is_empty());
        assert!(prefs.auto_scene_rules.is_empty());
    }
}
