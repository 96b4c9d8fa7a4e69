//! Rule-to-scene link store, self-healing against inventory churn.
//!
//! Scene ids are host-owned and can vanish wholesale when the inventory is
//! renamed, reordered, or reloaded. Every reconcile pass runs, in order:
//! prune stale ids, recover by remembered name, heuristic best-guess match,
//! then refresh the remembered names. All passes are idempotent; a rule with
//! a valid link is never touched.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use deck_protocol::{AutoSceneRule, Scene};

/// Name hints for the well-known rule ids, tried in order. Custom rules fall
/// back to their own label as the hint.
const SCENE_NAME_HINTS: &[(&str, &[&str])] = &[
    ("live_main", &["main", "live - main", "live main", "live"]),
    (
        "low_bitrate_fallback",
        &[
            "low bitrate default scene",
            "low bitrate fallback",
            "low bitrate",
            "fallback",
            "low",
        ],
    ),
    (
        "brb_reconnecting",
        &["brb", "brb - reconnecting", "brb reconnecting", "reconnecting"],
    ),
    ("starting_soon", &["starting soon", "starting"]),
    ("ending", &["ending", "end"]),
];

static NON_ALNUM_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static pattern"));

/// Lowercases, collapses non-alphanumeric runs to single spaces, and trims.
pub fn normalize_scene_name(name: &str) -> String {
    NON_ALNUM_RUNS
        .replace_all(&name.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Exact normalized match first, then substring containment in either
/// direction.
pub fn find_scene_id_by_name(scene_name: &str, scenes: &[Scene]) -> Option<String> {
    let target = normalize_scene_name(scene_name);
    if target.is_empty() || scenes.is_empty() {
        return None;
    }
    for scene in scenes {
        if normalize_scene_name(&scene.name) == target {
            return Some(scene.id.clone());
        }
    }
    for scene in scenes {
        let normalized = normalize_scene_name(&scene.name);
        if normalized.is_empty() {
            continue;
        }
        if normalized.contains(&target) || target.contains(&normalized) {
            return Some(scene.id.clone());
        }
    }
    None
}

/// Best-guess scene for a rule from the hint table (exact normalized match
/// preferred over substring).
pub fn best_scene_for_rule(rule: &AutoSceneRule, scenes: &[Scene]) -> Option<String> {
    if scenes.is_empty() {
        return None;
    }
    let hints: Vec<String> = SCENE_NAME_HINTS
        .iter()
        .find(|(id, _)| *id == rule.id)
        .map(|(_, hints)| hints.iter().map(|h| normalize_scene_name(h)).collect())
        .unwrap_or_else(|| vec![normalize_scene_name(&rule.label)]);
    let hints: Vec<String> = hints.into_iter().filter(|h| !h.is_empty()).collect();

    for scene in scenes {
        let normalized = normalize_scene_name(&scene.name);
        if hints.iter().any(|hint| *hint == normalized) {
            return Some(scene.id.clone());
        }
    }
    for scene in scenes {
        let normalized = normalize_scene_name(&scene.name);
        if hints.iter().any(|hint| normalized.contains(hint)) {
            return Some(scene.id.clone());
        }
    }
    None
}

/// Durable rule-id → scene-id mapping plus the name shadow used for recovery.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SceneIntentLinks {
    by_rule: BTreeMap<String, String>,
    names: BTreeMap<String, String>,
}

impl SceneIntentLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        by_rule: BTreeMap<String, String>,
        names: BTreeMap<String, String>,
    ) -> Self {
        let by_rule = by_rule
            .into_iter()
            .filter(|(_, scene_id)| !scene_id.is_empty())
            .collect();
        let names = names
            .into_iter()
            .filter(|(_, name)| !name.is_empty())
            .collect();
        Self { by_rule, names }
    }

    pub fn link_map(&self) -> &BTreeMap<String, String> {
        &self.by_rule
    }

    pub fn name_map(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    pub fn scene_for(&self, rule_id: &str) -> Option<&str> {
        self.by_rule.get(rule_id).map(String::as_str)
    }

    pub fn name_for(&self, rule_id: &str) -> Option<&str> {
        self.names.get(rule_id).map(String::as_str)
    }

    /// Links a rule to a scene (or clears it for an unknown id) and refreshes
    /// the name shadow.
    pub fn set_link(&mut self, rule_id: &str, scene_id: &str, scenes: &[Scene]) {
        let scene = scenes.iter().find(|scene| scene.id == scene_id);
        match scene {
            Some(scene) => {
                self.by_rule
                    .insert(rule_id.to_string(), scene.id.clone());
                self.names.insert(rule_id.to_string(), scene.name.clone());
            }
            None => {
                self.by_rule.remove(rule_id);
            }
        }
    }

    pub fn remove_rule(&mut self, rule_id: &str) {
        self.by_rule.remove(rule_id);
        self.names.remove(rule_id);
    }

    /// Runs the self-healing passes against a fresh inventory. Returns whether
    /// anything changed.
    pub fn reconcile(&mut self, rules: &[AutoSceneRule], scenes: &[Scene]) -> bool {
        let mut changed = false;
        let valid_ids: HashSet<&str> = scenes.iter().map(|scene| scene.id.as_str()).collect();

        // Prune stale ids. Runs even against an empty inventory; the name
        // shadow survives so links recover on the next populated refresh.
        for rule in rules {
            if let Some(current) = self.by_rule.get(&rule.id) {
                if !valid_ids.contains(current.as_str()) {
                    self.by_rule.remove(&rule.id);
                    changed = true;
                }
            }
        }

        if scenes.is_empty() {
            return changed;
        }

        // Recover by remembered name.
        for rule in rules {
            if self.by_rule.contains_key(&rule.id) {
                continue;
            }
            let Some(remembered) = self.names.get(&rule.id) else {
                continue;
            };
            if let Some(scene_id) = find_scene_id_by_name(remembered, scenes) {
                self.by_rule.insert(rule.id.clone(), scene_id);
                changed = true;
            }
        }

        // Heuristic best guess for rules still unlinked.
        for rule in rules {
            if self.by_rule.contains_key(&rule.id) {
                continue;
            }
            if let Some(scene_id) = best_scene_for_rule(rule, scenes) {
                self.by_rule.insert(rule.id.clone(), scene_id);
                changed = true;
            }
        }

        // Refresh the name shadow so recovery keeps working after renames.
        for rule in rules {
            let Some(scene_id) = self.by_rule.get(&rule.id) else {
                continue;
            };
            let Some(scene) = scenes.iter().find(|scene| scene.id == *scene_id) else {
                continue;
            };
            if scene.name.is_empty() {
                continue;
            }
            if self.names.get(&rule.id) != Some(&scene.name) {
                self.names.insert(rule.id.clone(), scene.name.clone());
                changed = true;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;

    fn scene(id: &str, name: &str, index: u32) -> Scene {
        Scene {
            id: id.to_string(),
            name: name.to_string(),
            intent: None,
            index,
        }
    }

    #[test]
    fn normalize_collapses_punctuation_runs() {
        assert_eq!(normalize_scene_name("Live -  Main!"), "live main");
        assert_eq!(normalize_scene_name("  BRB // Reconnecting "), "brb reconnecting");
        assert_eq!(normalize_scene_name("___"), "");
    }

    #[test]
    fn relinks_by_name_after_inventory_reload() {
        let rules = default_rules();
        let mut links = SceneIntentLinks::new();
        links.set_link("live_main", "a", &[scene("a", "Main", 0)]);

        // Inventory reloads without id `a` but with a new id named the same.
        let reloaded = vec![scene("b", "Main", 0)];
        assert!(links.reconcile(&rules, &reloaded));
        assert_eq!(links.scene_for("live_main"), Some("b"));
    }

    #[test]
    fn clears_link_when_no_name_match_exists() {
        let rules = vec![AutoSceneRule {
            id: "custom".to_string(),
            label: "Interview Cam".to_string(),
            intent: deck_protocol::SceneIntent::Hold,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: true,
            bg_color: String::new(),
        }];
        let mut links = SceneIntentLinks::new();
        links.set_link("custom", "a", &[scene("a", "Interview Cam", 0)]);

        let reloaded = vec![scene("z", "Totally Unrelated", 0)];
        links.reconcile(&rules, &reloaded);
        assert_eq!(links.scene_for("custom"), None);
        // The shadow name survives for a future recovery.
        assert_eq!(links.name_for("custom"), Some("Interview Cam"));
    }

    #[test]
    fn heuristic_links_well_known_rules_on_first_sight() {
        let rules = default_rules();
        let scenes = vec![
            scene("s1", "Live - Main", 0),
            scene("s2", "Low Bitrate Fallback", 1),
            scene("s3", "BRB - Reconnecting", 2),
        ];
        let mut links = SceneIntentLinks::new();
        links.reconcile(&rules, &scenes);
        assert_eq!(links.scene_for("live_main"), Some("s1"));
        assert_eq!(links.scene_for("low_bitrate_fallback"), Some("s2"));
        assert_eq!(links.scene_for("brb_reconnecting"), Some("s3"));
    }

    #[test]
    fn heuristic_uses_rule_label_for_custom_rules() {
        let rules = vec![AutoSceneRule {
            id: "custom_podcast".to_string(),
            label: "Podcast".to_string(),
            intent: deck_protocol::SceneIntent::Hold,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: true,
            bg_color: String::new(),
        }];
        let scenes = vec![scene("s1", "Podcast Desk", 0)];
        let mut links = SceneIntentLinks::new();
        links.reconcile(&rules, &scenes);
        assert_eq!(links.scene_for("custom_podcast"), Some("s1"));
    }

    #[test]
    fn reconcile_is_idempotent_and_leaves_valid_links_alone() {
        let rules = default_rules();
        let scenes = vec![scene("s1", "Live - Main", 0), scene("s2", "Main", 1)];
        let mut links = SceneIntentLinks::new();
        links.set_link("live_main", "s2", &scenes);

        // "s2" stays linked even though "s1" would win a fresh heuristic pass.
        let changed = links.reconcile(&rules, &scenes);
        assert_eq!(links.scene_for("live_main"), Some("s2"));

        let changed_again = links.reconcile(&rules, &scenes);
        assert!(!changed_again, "second pass must be a no-op");
        let _ = changed;
    }

    #[test]
    fn exact_name_match_beats_substring_match() {
        let scenes = vec![
            scene("s1", "Live Main Backup", 0),
            scene("s2", "Live Main", 1),
        ];
        assert_eq!(
            find_scene_id_by_name("Live - Main", &scenes),
            Some("s2".to_string())
        );
    }

    #[test]
    fn empty_inventory_prunes_but_keeps_names() {
        let rules = default_rules();
        let scenes = vec![scene("s1", "Live - Main", 0)];
        let mut links = SceneIntentLinks::new();
        links.set_link("live_main", "s1", &scenes);

        links.reconcile(&rules, &[]);
        assert_eq!(links.scene_for("live_main"), None);

        links.reconcile(&rules, &scenes);
        assert_eq!(links.scene_for("live_main"), Some("s1"));
    }
}
