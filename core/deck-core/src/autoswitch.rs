//! Auto scene-switch decision loop.
//!
//! One evaluation runs whenever the inputs may have changed and issues at
//! most one switch. The loop never re-targets the already-active scene, and
//! a per-target cooldown keeps a bitrate hovering at a threshold boundary
//! from flapping between scenes.

use chrono::{DateTime, Utc};

use deck_protocol::{AutoSceneRule, Scene};

use crate::gate::{auto_switch_key, ActionGate, AUTO_SWITCH_COOLDOWN_MS};
use crate::links::SceneIntentLinks;
use crate::rules::RuleSet;

/// Inputs for one evaluation, read off the current snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AutoSwitchInputs<'a> {
    pub relay_active: bool,
    pub armed: bool,
    pub bitrate_kbps: f64,
    pub scenes: &'a [Scene],
    pub active_scene_id: Option<&'a str>,
    pub pending_scene_id: Option<&'a str>,
}

/// A switch the loop decided to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchDecision {
    pub rule_id: String,
    pub scene_id: String,
    pub scene_name: String,
    pub reason: String,
}

/// Picks the target rule for a bitrate: among enabled threshold rules sorted
/// ascending, the first whose threshold the bitrate still satisfies from
/// below (inclusive boundary); otherwise the fallback rule.
pub fn select_rule<'a>(rules: &'a RuleSet, mbps: f64) -> &'a AutoSceneRule {
    let mut threshold_rules: Vec<(&AutoSceneRule, f64)> = rules
        .rules()
        .iter()
        .filter(|rule| rule.threshold_enabled)
        .filter_map(|rule| rule.threshold_mbps.map(|t| (rule, t)))
        .filter(|(_, t)| t.is_finite())
        .collect();
    threshold_rules
        .sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    for (rule, threshold) in threshold_rules {
        if mbps <= threshold {
            return rule;
        }
    }
    rules.fallback()
}

/// Runs one evaluation. `None` means no command should be issued.
pub fn evaluate(
    now: DateTime<Utc>,
    inputs: AutoSwitchInputs<'_>,
    rules: &RuleSet,
    links: &SceneIntentLinks,
    gate: &mut ActionGate,
) -> Option<SwitchDecision> {
    if !inputs.relay_active || !inputs.armed {
        return None;
    }
    if inputs.scenes.is_empty() {
        return None;
    }
    // A switch is already in flight; overlapping switches are never issued.
    if inputs.pending_scene_id.is_some() {
        return None;
    }

    let mbps = inputs.bitrate_kbps / 1000.0;
    let rule = select_rule(rules, mbps);

    // An unlinked rule is a valid steady state, not an error.
    let target_scene_id = links.scene_for(&rule.id)?;
    if inputs.active_scene_id == Some(target_scene_id) {
        return None;
    }
    let target = inputs
        .scenes
        .iter()
        .find(|scene| scene.id == target_scene_id)?;

    if !gate.try_enter(now, &auto_switch_key(target_scene_id), AUTO_SWITCH_COOLDOWN_MS) {
        return None;
    }

    Some(SwitchDecision {
        rule_id: rule.id.clone(),
        scene_id: target.id.clone(),
        scene_name: target.name.clone(),
        reason: format!("auto_rule_{}", rule.id),
    })
}
