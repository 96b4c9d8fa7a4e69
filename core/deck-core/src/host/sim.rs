//! Self-contained simulator host.
//!
//! Produces the exact snapshot shape a bridge host produces and answers the
//! same commands, so the rest of the deck runs unmodified against it. Scene
//! switches and relay activation resolve asynchronously on a short delay,
//! which exercises the pending-switch and correlation paths for real.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use deck_protocol::{
    ActionResult, ActionStatus, BitrateInfo, CommandOutcome, ConnectionLink, ConnectionStatus,
    ConnectionsSection, DeckCommand, EncoderOutput, EventEntry, EventLevel, FailoverInfo,
    HeaderInfo, HealthLevel, HostCapabilities, HostState, LiveInfo, OutputGroup, OutputsSection,
    PipeHealth, PipeInfo, RelayInfo, Scene, SceneIntent, ScenesSection, SettingItem,
    SettingsSection,
};

use crate::clock::Clock;
use crate::host::{HostAdapter, HostEvent};
use crate::snapshot::{AUTO_SCENE_SWITCH_KEY, MANUAL_OVERRIDE_KEY};

const SWITCH_SETTLE_MS: i64 = 400;
const RELAY_ACTIVATE_MS: i64 = 1200;
const WALK_INTERVAL_MS: i64 = 3000;

#[derive(Debug)]
struct PendingSwitch {
    scene_id: String,
    request_id: String,
    due: DateTime<Utc>,
}

pub struct SimHost<C: Clock> {
    clock: C,
    rng: StdRng,
    started_at: DateTime<Utc>,
    next_walk_due: DateTime<Utc>,
    mode: String,
    relay_active: bool,
    active_scene_id: String,
    pending_switch: Option<PendingSwitch>,
    relay_start_due: Option<(DateTime<Utc>, String)>,
    link1_kbps: f64,
    link2_kbps: f64,
    settings: BTreeMap<&'static str, Option<bool>>,
    events: Vec<HostEvent>,
    request_counter: u64,
}

impl<C: Clock> SimHost<C> {
    pub fn new(clock: C) -> Self {
        Self::with_seed(clock, 0x5eed)
    }

    pub fn with_seed(clock: C, seed: u64) -> Self {
        let now = clock.now();
        let mut settings = BTreeMap::new();
        settings.insert(AUTO_SCENE_SWITCH_KEY, Some(true));
        settings.insert("low_quality_fallback", Some(true));
        settings.insert(MANUAL_OVERRIDE_KEY, Some(false));
        settings.insert("chat_bot", None);
        settings.insert("alerts", Some(true));
        Self {
            clock,
            rng: StdRng::seed_from_u64(seed),
            started_at: now,
            next_walk_due: now + Duration::milliseconds(WALK_INTERVAL_MS),
            mode: "irl".to_string(),
            relay_active: true,
            active_scene_id: "scene_1".to_string(),
            pending_switch: None,
            relay_start_due: None,
            link1_kbps: 4200.0,
            link2_kbps: 2800.0,
            settings,
            events: Vec::new(),
            request_counter: 0,
        }
    }

    fn scenes() -> Vec<Scene> {
        let defs: [(&str, &str, Option<SceneIntent>); 5] = [
            ("scene_1", "Live - Main", Some(SceneIntent::Live)),
            ("scene_2", "Low Bitrate Fallback", Some(SceneIntent::Hold)),
            ("scene_3", "BRB - Reconnecting", Some(SceneIntent::Brb)),
            ("scene_4", "Starting Soon", None),
            ("scene_5", "Ending", None),
        ];
        defs.into_iter()
            .enumerate()
            .map(|(index, (id, name, intent))| Scene {
                id: id.to_string(),
                name: name.to_string(),
                intent,
                index: index as u32,
            })
            .collect()
    }

    fn next_request_id(&mut self) -> String {
        self.request_counter += 1;
        format!("sim_{}", self.request_counter)
    }

    /// Advances simulated time: bitrate walk plus resolution of pending
    /// asynchronous work. Called lazily from every adapter entry point.
    fn step(&mut self) {
        let now = self.clock.now();

        while now >= self.next_walk_due {
            self.next_walk_due = self.next_walk_due + Duration::milliseconds(WALK_INTERVAL_MS);
            let drift1: f64 = self.rng.gen::<f64>() - 0.48;
            let drift2: f64 = self.rng.gen::<f64>() - 0.5;
            self.link1_kbps = (self.link1_kbps + drift1 * 800.0).clamp(500.0, 6000.0);
            self.link2_kbps = (self.link2_kbps + drift2 * 600.0).clamp(200.0, 4000.0);
        }

        if let Some(pending) = self.pending_switch.take() {
            if now >= pending.due {
                self.active_scene_id = pending.scene_id;
                self.events.push(HostEvent::SceneSwitchCompleted { accepted: true });
                self.events.push(HostEvent::ActionResult(ActionResult {
                    action_type: "switch_scene".to_string(),
                    request_id: pending.request_id,
                    status: ActionStatus::Completed,
                    ok: Some(true),
                    error: None,
                    detail: None,
                }));
            } else {
                self.pending_switch = Some(pending);
            }
        }

        if let Some((due, request_id)) = self.relay_start_due.take() {
            if now >= due {
                self.relay_active = true;
                self.events.push(HostEvent::ActionResult(ActionResult {
                    action_type: "relay_start".to_string(),
                    request_id,
                    status: ActionStatus::Completed,
                    ok: Some(true),
                    error: None,
                    detail: None,
                }));
            } else {
                self.relay_start_due = Some((due, request_id));
            }
        }
    }

    fn build_state(&self) -> HostState {
        let now = self.clock.now();
        let elapsed = (now - self.started_at).num_seconds().max(0) as u64 + 3847;
        let bonded = self.link1_kbps + self.link2_kbps;
        let manual_override = self.settings.get(MANUAL_OVERRIDE_KEY).copied().flatten();

        HostState {
            header: HeaderInfo {
                title: "RELAY DECK".to_string(),
                subtitle: "Simulated host".to_string(),
                mode: self.mode.clone(),
                modes: vec!["studio".to_string(), "irl".to_string()],
                version: "v0.3.0".to_string(),
            },
            live: LiveInfo {
                is_live: true,
                elapsed_sec: elapsed,
            },
            scenes: ScenesSection {
                items: Self::scenes(),
                active_scene_id: Some(self.active_scene_id.clone()),
                pending_scene_id: self
                    .pending_switch
                    .as_ref()
                    .map(|pending| pending.scene_id.clone()),
                auto_switch_armed: None,
                auto_switch_enabled: None,
                manual_override_enabled: manual_override,
            },
            connections: ConnectionsSection {
                items: vec![
                    ConnectionLink {
                        name: "SIM 1".to_string(),
                        link_type: "5G".to_string(),
                        signal: 4,
                        bitrate: self.link1_kbps,
                        status: ConnectionStatus::Connected,
                    },
                    ConnectionLink {
                        name: "SIM 2".to_string(),
                        link_type: "LTE".to_string(),
                        signal: 3,
                        bitrate: self.link2_kbps,
                        status: ConnectionStatus::Connected,
                    },
                    ConnectionLink {
                        name: "WiFi".to_string(),
                        link_type: "802.11ac".to_string(),
                        signal: 0,
                        bitrate: 0.0,
                        status: ConnectionStatus::Disconnected,
                    },
                ],
            },
            bitrate: BitrateInfo {
                bonded_kbps: bonded,
                relay_bonded_kbps: bonded,
                max_per_link_kbps: 6000.0,
                max_bonded_kbps: 12000.0,
                low_threshold_mbps: 1.5,
                brb_threshold_mbps: 0.5,
            },
            outputs: OutputsSection {
                groups: vec![
                    OutputGroup {
                        name: "Horizontal".to_string(),
                        encoder: "x264".to_string(),
                        resolution: "1920x1080".to_string(),
                        total_bitrate_kbps: Some(bonded * 0.75),
                        avg_lag_ms: Some(2.1),
                        items: vec![
                            sim_output("twitch", "Twitch", bonded * 0.35, true),
                            sim_output("kick", "Kick", bonded * 0.22, self.relay_active),
                            sim_output("yt_horiz", "YT Horizontal", bonded * 0.18, true),
                        ],
                    },
                    OutputGroup {
                        name: "Vertical".to_string(),
                        encoder: "x264".to_string(),
                        resolution: "1080x1920".to_string(),
                        total_bitrate_kbps: Some(bonded * 0.25),
                        avg_lag_ms: Some(3.0),
                        items: vec![
                            sim_output("tiktok", "TikTok", bonded * 0.13, true),
                            sim_output("yt_shorts", "YT Shorts", bonded * 0.12, true),
                        ],
                    },
                ],
                hidden: Vec::new(),
            },
            relay: RelayInfo {
                licensed: true,
                active: self.relay_active,
                status: if self.relay_active {
                    "active".to_string()
                } else {
                    "inactive".to_string()
                },
                region: Some("us-east-1".to_string()),
                latency_ms: self.relay_active.then_some(42.0),
                uptime_sec: self.relay_active.then_some(elapsed),
                grace_remaining_seconds: None,
            },
            failover: FailoverInfo {
                health: HealthLevel::Healthy,
                state: if self.relay_active {
                    "IRL_ACTIVE".to_string()
                } else {
                    "STUDIO".to_string()
                },
                states: Vec::new(),
                response_budget_ms: Some(800),
                last_failover_label: None,
                total_failovers_label: None,
            },
            settings: SettingsSection {
                items: self
                    .settings
                    .iter()
                    .map(|(key, value)| SettingItem {
                        key: (*key).to_string(),
                        label: (*key).replace('_', " "),
                        value: *value,
                    })
                    .collect(),
            },
            events: vec![EventEntry {
                id: "e1".to_string(),
                time: "00:00:01".to_string(),
                ts_unix_ms: Some(self.started_at.timestamp_millis()),
                level: EventLevel::Info,
                msg: "Simulated host started".to_string(),
                source: "sim".to_string(),
            }],
            pipe: PipeInfo {
                status: PipeHealth::Ok,
                label: Some("IPC: OK".to_string()),
            },
        }
    }
}

fn sim_output(id: &str, name: &str, kbps: f64, active: bool) -> EncoderOutput {
    EncoderOutput {
        id: id.to_string(),
        name: name.to_string(),
        platform: name.to_string(),
        kbps: if active { kbps.max(300.0) } else { 0.0 },
        fps: Some(60.0),
        drop_pct: Some(0.01),
        active,
    }
}

impl<C: Clock> HostAdapter for SimHost<C> {
    fn available(&self) -> bool {
        true
    }

    fn pull(&mut self) -> Option<HostState> {
        self.step();
        Some(self.build_state())
    }

    fn push(&mut self, command: DeckCommand) -> Option<CommandOutcome> {
        self.step();
        let now = self.clock.now();
        let outcome = match command {
            DeckCommand::SwitchScene {
                scene_id,
                scene_name,
                request_id,
                ..
            } => {
                let target = Self::scenes()
                    .into_iter()
                    .find(|scene| scene.id == scene_id || scene.name == scene_name);
                let Some(target) = target else {
                    return Some(CommandOutcome::rejected("scene_not_found"));
                };
                let request_id = request_id.unwrap_or_else(|| self.next_request_id());
                self.pending_switch = Some(PendingSwitch {
                    scene_id: target.id,
                    request_id: request_id.clone(),
                    due: now + Duration::milliseconds(SWITCH_SETTLE_MS),
                });
                CommandOutcome::accepted(request_id)
            }
            DeckCommand::SetMode { mode, request_id } => {
                self.mode = mode;
                CommandOutcome {
                    ok: true,
                    request_id,
                    error: None,
                }
            }
            DeckCommand::SetSetting {
                key,
                value,
                request_id,
                ..
            } => {
                if let Some(slot) = self.settings.get_mut(key.as_str()) {
                    *slot = Some(value);
                    CommandOutcome {
                        ok: true,
                        request_id,
                        error: None,
                    }
                } else {
                    CommandOutcome::rejected("unknown_setting")
                }
            }
            DeckCommand::RelayStart { request_id } => {
                let request_id = request_id.unwrap_or_else(|| self.next_request_id());
                self.relay_start_due =
                    Some((now + Duration::milliseconds(RELAY_ACTIVATE_MS), request_id.clone()));
                CommandOutcome::accepted(request_id)
            }
            DeckCommand::RelayStop { request_id } => {
                self.relay_active = false;
                self.relay_start_due = None;
                CommandOutcome {
                    ok: true,
                    request_id,
                    error: None,
                }
            }
            DeckCommand::RequestStatus { request_id } => CommandOutcome {
                ok: true,
                request_id,
                error: None,
            },
            DeckCommand::LoadScenePrefs { .. } | DeckCommand::SaveScenePrefs { .. } => {
                CommandOutcome::rejected("unsupported_action_type")
            }
        };
        Some(outcome)
    }

    fn take_events(&mut self) -> Vec<HostEvent> {
        self.step();
        std::mem::take(&mut self.events)
    }

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            get_state: true,
            switch_scene: true,
            set_mode: true,
            set_setting: true,
            relay_control: true,
            scene_prefs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn switch_settles_after_delay_and_emits_a_result() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let mut sim = SimHost::new(clock.clone());

        let outcome = sim
            .push(DeckCommand::SwitchScene {
                scene_id: "scene_3".to_string(),
                scene_name: String::new(),
                reason: None,
                request_id: Some("dock_1_1".to_string()),
            })
            .unwrap();
        assert!(outcome.ok);

        let state = sim.pull().unwrap();
        assert_eq!(state.scenes.pending_scene_id.as_deref(), Some("scene_3"));
        assert_eq!(state.scenes.active_scene_id.as_deref(), Some("scene_1"));

        clock.advance_ms(SWITCH_SETTLE_MS);
        let state = sim.pull().unwrap();
        assert_eq!(state.scenes.active_scene_id.as_deref(), Some("scene_3"));
        assert!(state.scenes.pending_scene_id.is_none());

        let events = sim.take_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, HostEvent::SceneSwitchCompleted { accepted: true })));
        assert!(events.iter().any(|event| matches!(
            event,
            HostEvent::ActionResult(result) if result.request_id == "dock_1_1"
        )));
    }

    #[test]
    fn unknown_scene_is_rejected() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let mut sim = SimHost::new(clock);
        let outcome = sim
            .push(DeckCommand::SwitchScene {
                scene_id: "nope".to_string(),
                scene_name: String::new(),
                reason: None,
                request_id: None,
            })
            .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("scene_not_found"));
    }

    #[test]
    fn relay_start_activates_after_delay() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let mut sim = SimHost::new(clock.clone());
        sim.push(DeckCommand::RelayStop { request_id: None });
        assert!(!sim.pull().unwrap().relay.active);

        sim.push(DeckCommand::RelayStart { request_id: None });
        assert!(!sim.pull().unwrap().relay.active);
        clock.advance_ms(RELAY_ACTIVATE_MS);
        assert!(sim.pull().unwrap().relay.active);
    }

    #[test]
    fn prefs_commands_are_unsupported() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let mut sim = SimHost::new(clock);
        let outcome = sim
            .push(DeckCommand::LoadScenePrefs { request_id: None })
            .unwrap();
        assert!(!outcome.ok);
        assert!(!sim.capabilities().scene_prefs);
    }

    #[test]
    fn bitrate_walk_stays_within_bounds() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let mut sim = SimHost::new(clock.clone());
        for _ in 0..200 {
            clock.advance_ms(WALK_INTERVAL_MS);
            let state = sim.pull().unwrap();
            let bonded = state.bitrate.bonded_kbps;
            assert!((700.0..=10_000.0).contains(&bonded), "bonded {}", bonded);
        }
    }

    #[test]
    fn manual_override_setting_round_trips_into_the_snapshot() {
        let clock = ManualClock::new(at("2026-03-01T12:00:00Z"));
        let mut sim = SimHost::new(clock);
        sim.push(DeckCommand::SetSetting {
            key: MANUAL_OVERRIDE_KEY.to_string(),
            value: true,
            reason: None,
            request_id: None,
        });
        let state = sim.pull().unwrap();
        assert_eq!(state.scenes.manual_override_enabled, Some(true));
    }
}
