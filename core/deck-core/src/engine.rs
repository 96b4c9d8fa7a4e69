//! DeckEngine, the facade owning the coordination components.
//!
//! One engine instance owns the host adapter, the synchronizer, the action
//! correlator, the gate, the rule set, the link store, and the preference
//! bridge, and drives them from a single cooperative `tick`. Callers embed
//! the engine in their own loop (CLI, UI shell) and provide exterior
//! synchronization; nothing here spawns threads or blocks.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use deck_protocol::{CommandOutcome, DeckCommand, HostCapabilities, HostState, ScenePrefs};

use crate::autoswitch::{self, AutoSwitchInputs};
use crate::clock::{Clock, SystemClock};
use crate::correlator::{ActionCorrelator, InFlightAction};
use crate::error::{DeckError, Result};
use crate::gate::{
    set_setting_key, switch_scene_key, ActionGate, AUTO_SWITCH_TOGGLE_COOLDOWN_MS,
    AUTO_SWITCH_TOGGLE_KEY, MANUAL_LOCKOUT_KEY, SET_SETTING_COOLDOWN_MS,
    SWITCH_SCENE_COOLDOWN_MS,
};
use crate::host::{HostAdapter, HostEvent};
use crate::links::SceneIntentLinks;
use crate::metrics::RollingMaxTracker;
use crate::prefs::PrefsBridge;
use crate::rules::RuleSet;
use crate::snapshot::{resolve_arm_state, auto_switch_bitrate_kbps, ArmSource, ArmState};
use crate::sync::StateSynchronizer;

/// A started-but-unconfirmed relay activation with no terminal event within
/// this window becomes a user-visible error, not a silent retry.
pub const RELAY_ACTIVATION_TIMEOUT_MS: i64 = 15_000;
/// The arm/disarm toggle stays locked until the host confirms the flip or
/// this window lapses.
pub const AUTO_SWITCH_TOGGLE_LOCK_MS: i64 = 1500;

#[derive(Debug)]
struct ToggleLock {
    target_armed: bool,
    deadline: DateTime<Utc>,
}

pub struct DeckEngine<A: HostAdapter, C: Clock = SystemClock> {
    clock: C,
    adapter: A,
    sync: StateSynchronizer,
    correlator: ActionCorrelator,
    gate: ActionGate,
    rules: RuleSet,
    links: SceneIntentLinks,
    prefs: PrefsBridge,
    outputs: RollingMaxTracker,
    prefs_supported: bool,
    relay_activation_deadline: Option<DateTime<Utc>>,
    relay_error: Option<String>,
    toggle_lock: Option<ToggleLock>,
    rule_counter: u64,
}

impl<A: HostAdapter, C: Clock> DeckEngine<A, C> {
    pub fn new(adapter: A, clock: C) -> Self {
        Self {
            clock,
            adapter,
            sync: StateSynchronizer::new(),
            correlator: ActionCorrelator::new(),
            gate: ActionGate::new(),
            rules: RuleSet::default(),
            links: SceneIntentLinks::new(),
            prefs: PrefsBridge::new(),
            outputs: RollingMaxTracker::new(),
            prefs_supported: false,
            relay_activation_deadline: None,
            relay_error: None,
            toggle_lock: None,
            rule_counter: 0,
        }
    }

    /// Starts probing for the host. Hydration begins once the probe lands.
    pub fn attach(&mut self) {
        let now = self.clock.now();
        self.sync.attach(now);
    }

    /// Cancels every outstanding deadline and discards per-attach state. No
    /// timer-driven work runs after this.
    pub fn detach(&mut self) {
        self.sync.detach();
        self.prefs.detach();
        self.gate = ActionGate::new();
        self.outputs = RollingMaxTracker::new();
        self.toggle_lock = None;
        self.relay_activation_deadline = None;
    }

    /// Runs one cooperative turn: drain host events, run due deadlines, and
    /// issue at most one auto-switch.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        for event in self.adapter.take_events() {
            self.handle_event(now, event);
        }

        let sync_tick = self.sync.tick(now, &mut self.adapter);
        if sync_tick.just_attached {
            self.begin_hydration(now);
        }
        if sync_tick.want_status_request {
            self.dispatch(DeckCommand::RequestStatus { request_id: None });
        }
        if sync_tick.refreshed {
            self.after_refresh(now);
        }

        if self.sync.is_attached() {
            self.evaluate_auto_switch(now);
        }

        let prefs_tick = self.prefs.tick(now);
        if prefs_tick.hydration_timed_out {
            debug!("preference hydration timed out; in-memory defaults stand");
        }
        if prefs_tick.save_due && self.prefs_supported {
            self.save_prefs();
        }

        self.correlator.tick(now);

        if let Some(deadline) = self.relay_activation_deadline {
            if now >= deadline {
                self.relay_activation_deadline = None;
                self.relay_error = Some("relay activation timed out".to_string());
                warn!("relay activation produced no result within the timeout");
            }
        }
        if self
            .toggle_lock
            .as_ref()
            .is_some_and(|lock| now >= lock.deadline)
        {
            self.toggle_lock = None;
        }
    }

    fn handle_event(&mut self, now: DateTime<Utc>, event: HostEvent) {
        if let HostEvent::ActionResult(result) = &event {
            self.correlator.apply_result(now, result);
            if let Some(prefs) = self.prefs.note_result(result) {
                self.apply_loaded_prefs(now, prefs);
            }
        }
        // Every push notification funnels into one out-of-band refresh.
        self.sync.request_refresh(event.reason());
    }

    fn begin_hydration(&mut self, now: DateTime<Utc>) {
        self.prefs_supported = self.adapter.capabilities().scene_prefs;
        if self.prefs_supported {
            let request_id = self.correlator.next_request_id(now);
            self.prefs.begin_hydration(now, request_id.clone());
            self.dispatch(DeckCommand::LoadScenePrefs {
                request_id: Some(request_id),
            });
        } else {
            self.prefs.mark_hydrated();
        }
    }

    fn apply_loaded_prefs(&mut self, now: DateTime<Utc>, prefs: ScenePrefs) {
        info!(
            links = prefs.scene_intent_links.len(),
            rules = prefs.auto_scene_rules.len(),
            "loaded scene preferences from host"
        );
        self.rules.replace(prefs.auto_scene_rules);
        self.links = SceneIntentLinks::from_parts(
            prefs.scene_intent_links,
            prefs.scene_intent_links_by_name,
        );
        if let Some(state) = self.sync.snapshot() {
            let changed = self.links.reconcile(self.rules.rules(), &state.scenes.items);
            if changed {
                self.prefs.mark_dirty(now);
            }
        }
    }

    fn after_refresh(&mut self, now: DateTime<Utc>) {
        let Some(state) = self.sync.snapshot() else {
            return;
        };

        self.outputs.observe(&state.outputs);

        let links_changed = self.links.reconcile(self.rules.rules(), &state.scenes.items);

        if state.relay.active && self.relay_activation_deadline.is_some() {
            self.relay_activation_deadline = None;
            self.relay_error = None;
        }

        let lock_confirmed = self
            .toggle_lock
            .as_ref()
            .is_some_and(|lock| resolve_arm_state(state).armed == lock.target_armed);
        if lock_confirmed {
            self.toggle_lock = None;
        }

        if links_changed {
            self.prefs.mark_dirty(now);
        }
    }

    fn evaluate_auto_switch(&mut self, now: DateTime<Utc>) {
        let decision = {
            let Some(state) = self.sync.snapshot() else {
                return;
            };
            let inputs = AutoSwitchInputs {
                relay_active: state.relay.active,
                armed: resolve_arm_state(state).armed,
                bitrate_kbps: auto_switch_bitrate_kbps(state),
                scenes: &state.scenes.items,
                active_scene_id: state.scenes.active_scene_id.as_deref(),
                pending_scene_id: state.scenes.pending_scene_id.as_deref(),
            };
            autoswitch::evaluate(now, inputs, &self.rules, &self.links, &mut self.gate)
        };

        if let Some(decision) = decision {
            info!(
                rule = %decision.rule_id,
                scene = %decision.scene_id,
                "auto-switching scene"
            );
            self.dispatch(DeckCommand::SwitchScene {
                scene_id: decision.scene_id,
                scene_name: decision.scene_name,
                reason: Some(decision.reason),
                request_id: None,
            });
        }
    }

    fn save_prefs(&mut self) {
        let payload = ScenePrefs {
            scene_intent_links: self.links.link_map().clone(),
            scene_intent_links_by_name: self.links.name_map().clone(),
            auto_scene_rules: self.rules.rules().to_vec(),
        };
        match payload.to_json() {
            Ok(prefs_json) => {
                self.dispatch(DeckCommand::SaveScenePrefs {
                    prefs_json,
                    request_id: None,
                });
            }
            Err(err) => warn!(code = %err.code, "failed to serialize scene prefs"),
        }
    }

    // ── Command dispatch ───────────────────────────────────────────────────

    /// The single generic dispatch entry point: stamps a request id when the
    /// command lacks one, records the in-flight entry, pushes, and requests a
    /// follow-up pull. Returns `None` when the transport is unreachable.
    pub fn dispatch(&mut self, mut command: DeckCommand) -> Option<CommandOutcome> {
        let now = self.clock.now();
        if command.request_id().is_none() {
            let request_id = self.correlator.next_request_id(now);
            command.set_request_id(request_id);
        }
        if let Some(request_id) = command.request_id() {
            let request_id = request_id.to_string();
            self.correlator.track(now, command.kind(), &request_id);
        }

        let kind = command.kind();
        let outcome = self.adapter.push(command);
        if outcome.is_none() {
            debug!(kind, "transport unreachable; command degraded to no-op");
        }
        // Re-pull promptly: the host may have mutated state synchronously.
        self.sync.request_refresh("command_dispatched");
        outcome
    }

    // ── User-facing operations ─────────────────────────────────────────────

    /// Manual scene switch. While armed, the authoritative setting is flipped
    /// first so the decision loop cannot immediately reverse the user's
    /// choice. Returns `Ok(None)` when the gate swallowed a duplicate.
    pub fn switch_scene(&mut self, scene_id: &str) -> Result<Option<CommandOutcome>> {
        let now = self.clock.now();
        let (scene_id, scene_name, arm) = {
            let state = self
                .sync
                .snapshot()
                .ok_or(DeckError::TransportUnavailable)?;
            let scene = state
                .scenes
                .items
                .iter()
                .find(|scene| scene.id == scene_id)
                .ok_or_else(|| DeckError::SceneNotFound(scene_id.to_string()))?;
            (scene.id.clone(), scene.name.clone(), resolve_arm_state(state))
        };

        if !self
            .gate
            .try_enter(now, &switch_scene_key(&scene_id), SWITCH_SCENE_COOLDOWN_MS)
        {
            return Ok(None);
        }

        if arm.armed
            && self
                .gate
                .try_enter(now, MANUAL_LOCKOUT_KEY, SET_SETTING_COOLDOWN_MS)
        {
            let (key, value) = match arm.source {
                ArmSource::ManualOverride => (ArmSource::ManualOverride.setting_key(), true),
                ArmSource::AutoSceneSwitch => (ArmSource::AutoSceneSwitch.setting_key(), false),
            };
            self.dispatch(DeckCommand::SetSetting {
                key: key.to_string(),
                value,
                reason: Some("manual_scene_switch".to_string()),
                request_id: None,
            });
        }

        Ok(self.dispatch(DeckCommand::SwitchScene {
            scene_id,
            scene_name,
            reason: None,
            request_id: None,
        }))
    }

    /// Arms or disarms automatic switching through whichever setting is
    /// authoritative. Returns `None` while the previous toggle is still
    /// unconfirmed or the gate is closed.
    pub fn toggle_auto_switch(&mut self) -> Option<CommandOutcome> {
        let now = self.clock.now();
        if self.toggle_lock.is_some() {
            return None;
        }
        if !self
            .gate
            .try_enter(now, AUTO_SWITCH_TOGGLE_KEY, AUTO_SWITCH_TOGGLE_COOLDOWN_MS)
        {
            return None;
        }
        let arm = resolve_arm_state(self.sync.snapshot()?);
        let target_armed = !arm.armed;
        let request_id = self.correlator.next_request_id(now);
        self.toggle_lock = Some(ToggleLock {
            target_armed,
            deadline: now + Duration::milliseconds(AUTO_SWITCH_TOGGLE_LOCK_MS),
        });
        let (key, value) = match arm.source {
            ArmSource::ManualOverride => {
                (ArmSource::ManualOverride.setting_key(), !target_armed)
            }
            ArmSource::AutoSceneSwitch => {
                (ArmSource::AutoSceneSwitch.setting_key(), target_armed)
            }
        };
        self.dispatch(DeckCommand::SetSetting {
            key: key.to_string(),
            value,
            reason: None,
            request_id: Some(request_id),
        })
    }

    /// Starts or stops the relay. Starting arms the activation watchdog.
    pub fn toggle_relay(&mut self) -> Option<CommandOutcome> {
        let now = self.clock.now();
        if self.relay_activation_deadline.is_some() {
            return None;
        }
        let active = self
            .sync
            .snapshot()
            .map(|state| state.relay.active)
            .unwrap_or(false);
        if active {
            self.dispatch(DeckCommand::RelayStop { request_id: None })
        } else {
            self.relay_error = None;
            self.relay_activation_deadline =
                Some(now + Duration::milliseconds(RELAY_ACTIVATION_TIMEOUT_MS));
            self.dispatch(DeckCommand::RelayStart { request_id: None })
        }
    }

    /// Writes a host setting through the per-key gate.
    pub fn set_setting(&mut self, key: &str, value: bool) -> Option<CommandOutcome> {
        let now = self.clock.now();
        if !self
            .gate
            .try_enter(now, &set_setting_key(key), SET_SETTING_COOLDOWN_MS)
        {
            return None;
        }
        self.dispatch(DeckCommand::SetSetting {
            key: key.to_string(),
            value,
            reason: None,
            request_id: None,
        })
    }

    // ── Rule and link editing ──────────────────────────────────────────────

    pub fn set_scene_link(&mut self, rule_id: &str, scene_id: &str) -> Result<()> {
        let now = self.clock.now();
        if self.rules.get(rule_id).is_none() {
            return Err(DeckError::RuleNotFound(rule_id.to_string()));
        }
        let scenes = self
            .sync
            .snapshot()
            .map(|state| state.scenes.items.clone())
            .unwrap_or_default();
        self.links.set_link(rule_id, scene_id, &scenes);
        self.prefs.mark_dirty(now);
        Ok(())
    }

    /// Adds a new rule and returns its generated id.
    pub fn add_rule(&mut self) -> String {
        let now = self.clock.now();
        self.rule_counter += 1;
        let id = format!("rule_{}_{}", now.timestamp_millis(), self.rule_counter);
        self.rules.add(id.clone());
        self.prefs.mark_dirty(now);
        id
    }

    pub fn update_rule<F: FnOnce(&mut deck_protocol::AutoSceneRule)>(
        &mut self,
        rule_id: &str,
        patch: F,
    ) -> Result<()> {
        let now = self.clock.now();
        if !self.rules.update(rule_id, patch) {
            return Err(DeckError::RuleNotFound(rule_id.to_string()));
        }
        self.prefs.mark_dirty(now);
        Ok(())
    }

    /// Removes a rule and its links. Refused for the last remaining rule.
    pub fn remove_rule(&mut self, rule_id: &str) -> Result<()> {
        let now = self.clock.now();
        if self.rules.get(rule_id).is_none() {
            return Err(DeckError::RuleNotFound(rule_id.to_string()));
        }
        if !self.rules.remove(rule_id) {
            return Err(DeckError::LastRule);
        }
        self.links.remove_rule(rule_id);
        self.prefs.mark_dirty(now);
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Option<&HostState> {
        self.sync.snapshot()
    }

    pub fn is_attached(&self) -> bool {
        self.sync.is_attached()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn links(&self) -> &SceneIntentLinks {
        &self.links
    }

    pub fn arm_state(&self) -> Option<ArmState> {
        self.sync.snapshot().map(resolve_arm_state)
    }

    /// Tracked entry for a request id, available for the grace window after
    /// resolution.
    pub fn in_flight(&self, request_id: &str) -> Option<&InFlightAction> {
        self.correlator.get(request_id)
    }

    pub fn relay_activating(&self) -> bool {
        self.relay_activation_deadline.is_some()
    }

    pub fn relay_error(&self) -> Option<&str> {
        self.relay_error.as_deref()
    }

    pub fn prefs_hydrated(&self) -> bool {
        self.prefs.hydrated()
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.adapter.capabilities()
    }

    pub fn output_tracker(&self) -> &RollingMaxTracker {
        &self.outputs
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }
}
