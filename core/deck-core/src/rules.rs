//! Auto-switch rule set: defaults, normalization, and invariant-preserving
//! edits.
//!
//! The rule set always holds at least one rule, and exactly one rule acts as
//! the fallback when no threshold rule matches (`is_default`, else the first
//! rule).

use deck_protocol::{AutoSceneRule, Scene, SceneIntent};

use crate::links::SceneIntentLinks;

const MAX_LABEL_LEN: usize = 40;

pub fn default_rules() -> Vec<AutoSceneRule> {
    vec![
        AutoSceneRule {
            id: "live_main".to_string(),
            label: "Live - Main".to_string(),
            intent: SceneIntent::Live,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: true,
            bg_color: "#2ea043".to_string(),
        },
        AutoSceneRule {
            id: "low_bitrate_fallback".to_string(),
            label: "Low Bitrate Fallback".to_string(),
            intent: SceneIntent::Hold,
            threshold_enabled: true,
            threshold_mbps: Some(1.0),
            is_default: false,
            bg_color: "#d29922".to_string(),
        },
        AutoSceneRule {
            id: "brb_reconnecting".to_string(),
            label: "BRB - Reconnecting".to_string(),
            intent: SceneIntent::Brb,
            threshold_enabled: true,
            threshold_mbps: Some(0.2),
            is_default: false,
            bg_color: "#8b5cf6".to_string(),
        },
        AutoSceneRule {
            id: "starting_soon".to_string(),
            label: "Starting Soon".to_string(),
            intent: SceneIntent::Offline,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: false,
            bg_color: "#8b8f98".to_string(),
        },
        AutoSceneRule {
            id: "ending".to_string(),
            label: "Ending".to_string(),
            intent: SceneIntent::Offline,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: false,
            bg_color: "#8b8f98".to_string(),
        },
    ]
}

pub fn default_bg_color(id: &str, intent: SceneIntent) -> &'static str {
    match (id, intent) {
        ("live_main", _) | (_, SceneIntent::Live) => "#2ea043",
        ("low_bitrate_fallback", _) | (_, SceneIntent::Hold) => "#d29922",
        ("brb_reconnecting", _) | (_, SceneIntent::Brb) => "#8b5cf6",
        _ => "#8b8f98",
    }
}

/// Normalizes a `#rgb`/`#rrggbb` color to lowercase `#rrggbb`, or `None` for
/// anything unparseable.
pub fn normalize_hex_color(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_start_matches('#');
    if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match cleaned.len() {
        3 => cleaned.chars().flat_map(|c| [c, c]).collect(),
        6 => cleaned.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_lowercase()))
}

fn normalize_threshold(raw: Option<f64>) -> Option<f64> {
    raw.filter(|value| value.is_finite() && *value >= 0.0)
}

/// Normalizes a persisted rule list: clamps labels, coerces thresholds, fills
/// bg colors, and backfills blank ids. An empty list falls back to the
/// defaults so the minimum-one invariant holds from the start.
pub fn normalize_rules(raw: Vec<AutoSceneRule>) -> Vec<AutoSceneRule> {
    if raw.is_empty() {
        return default_rules();
    }
    raw.into_iter()
        .enumerate()
        .map(|(idx, rule)| {
            let id = if rule.id.trim().is_empty() {
                format!("rule_{}", idx)
            } else {
                rule.id
            };
            let label = if rule.label.trim().is_empty() {
                format!("Rule {}", idx + 1)
            } else {
                rule.label.chars().take(MAX_LABEL_LEN).collect()
            };
            let threshold_mbps = normalize_threshold(rule.threshold_mbps);
            let bg_color = normalize_hex_color(&rule.bg_color)
                .unwrap_or_else(|| default_bg_color(&id, rule.intent).to_string());
            AutoSceneRule {
                threshold_enabled: rule.threshold_enabled && threshold_mbps.is_some(),
                id,
                label,
                intent: rule.intent,
                threshold_mbps,
                is_default: rule.is_default,
                bg_color,
            }
        })
        .collect()
}

/// The active rule set. Edits preserve the minimum-one invariant.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<AutoSceneRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl RuleSet {
    pub fn new(rules: Vec<AutoSceneRule>) -> Self {
        Self {
            rules: normalize_rules(rules),
        }
    }

    pub fn rules(&self) -> &[AutoSceneRule] {
        &self.rules
    }

    pub fn get(&self, rule_id: &str) -> Option<&AutoSceneRule> {
        self.rules.iter().find(|rule| rule.id == rule_id)
    }

    /// The fallback rule when no threshold rule matches.
    pub fn fallback(&self) -> &AutoSceneRule {
        self.rules
            .iter()
            .find(|rule| rule.is_default)
            .unwrap_or(&self.rules[0])
    }

    /// Replaces the whole set (e.g. from a loaded preference payload).
    pub fn replace(&mut self, rules: Vec<AutoSceneRule>) {
        self.rules = normalize_rules(rules);
    }

    /// Adds a new threshold rule under the given id.
    pub fn add(&mut self, id: String) {
        let label = format!("Custom {}", self.rules.len() + 1);
        self.rules.push(AutoSceneRule {
            id,
            label,
            intent: SceneIntent::Hold,
            threshold_enabled: true,
            threshold_mbps: Some(0.5),
            is_default: false,
            bg_color: default_bg_color("", SceneIntent::Hold).to_string(),
        });
    }

    /// Applies a closure to the named rule; returns false when absent.
    pub fn update<F: FnOnce(&mut AutoSceneRule)>(&mut self, rule_id: &str, patch: F) -> bool {
        match self.rules.iter_mut().find(|rule| rule.id == rule_id) {
            Some(rule) => {
                patch(rule);
                rule.threshold_mbps = normalize_threshold(rule.threshold_mbps);
                if rule.threshold_mbps.is_none() {
                    rule.threshold_enabled = false;
                }
                true
            }
            None => false,
        }
    }

    /// Removes a rule. Refused when it would empty the set.
    pub fn remove(&mut self, rule_id: &str) -> bool {
        if self.rules.len() <= 1 {
            return false;
        }
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != rule_id);
        self.rules.len() != before
    }
}

/// Infers an intent from a scene name when neither a linked rule nor the
/// host-reported intent decides it.
pub fn infer_intent_from_name(name: &str) -> SceneIntent {
    let lower = name.to_lowercase();
    if lower.contains("live") || lower.contains("main") {
        SceneIntent::Live
    } else if lower.contains("brb") || lower.contains("reconnect") {
        SceneIntent::Brb
    } else if lower.contains("low") || lower.contains("fallback") {
        SceneIntent::Hold
    } else {
        SceneIntent::Offline
    }
}

/// Effective intent of a scene: the intent of the rule linked to it, else the
/// scene's own intent, else a name-based guess.
pub fn resolve_scene_intent(
    scene: &Scene,
    rules: &RuleSet,
    links: &SceneIntentLinks,
) -> SceneIntent {
    let linked_rule = rules
        .rules()
        .iter()
        .find(|rule| links.scene_for(&rule.id) == Some(scene.id.as_str()));
    if let Some(rule) = linked_rule {
        return rule.intent;
    }
    scene
        .intent
        .unwrap_or_else(|| infer_intent_from_name(&scene.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_one_fallback_rule() {
        let set = RuleSet::default();
        assert_eq!(set.fallback().id, "live_main");
        assert_eq!(set.rules().len(), 5);
    }

    #[test]
    fn remove_refuses_to_empty_the_set() {
        let mut set = RuleSet::new(vec![AutoSceneRule {
            id: "only".to_string(),
            label: "Only".to_string(),
            intent: SceneIntent::Live,
            threshold_enabled: false,
            threshold_mbps: None,
            is_default: true,
            bg_color: String::new(),
        }]);
        assert!(!set.remove("only"));
        assert_eq!(set.rules().len(), 1);
    }

    #[test]
    fn normalize_coerces_bad_thresholds_and_colors() {
        let rules = normalize_rules(vec![AutoSceneRule {
            id: "r1".to_string(),
            label: "x".repeat(60),
            intent: SceneIntent::Hold,
            threshold_enabled: true,
            threshold_mbps: Some(f64::NAN),
            is_default: false,
            bg_color: "nonsense".to_string(),
        }]);
        assert_eq!(rules[0].label.len(), 40);
        assert_eq!(rules[0].threshold_mbps, None);
        assert!(!rules[0].threshold_enabled);
        assert_eq!(rules[0].bg_color, "#d29922");
    }

    #[test]
    fn normalize_empty_list_falls_back_to_defaults() {
        assert_eq!(normalize_rules(Vec::new()).len(), default_rules().len());
    }

    #[test]
    fn normalize_hex_color_expands_short_form() {
        assert_eq!(normalize_hex_color("#2EA"), Some("#22eeaa".to_string()));
        assert_eq!(normalize_hex_color(" #2ea043 "), Some("#2ea043".to_string()));
        assert_eq!(normalize_hex_color("red"), None);
    }

    #[test]
    fn update_disables_threshold_when_value_cleared() {
        let mut set = RuleSet::default();
        assert!(set.update("low_bitrate_fallback", |rule| {
            rule.threshold_mbps = None;
        }));
        let rule = set.get("low_bitrate_fallback").unwrap();
        assert!(!rule.threshold_enabled);
    }

    #[test]
    fn fallback_uses_first_rule_when_none_marked_default() {
        let mut set = RuleSet::default();
        set.update("live_main", |rule| rule.is_default = false);
        assert_eq!(set.fallback().id, "live_main");
    }

    #[test]
    fn resolve_scene_intent_prefers_linked_rule_over_name() {
        let set = RuleSet::default();
        let scenes = vec![Scene {
            id: "s9".to_string(),
            name: "Totally Custom".to_string(),
            intent: None,
            index: 0,
        }];
        let mut links = SceneIntentLinks::new();
        links.set_link("brb_reconnecting", "s9", &scenes);

        assert_eq!(
            resolve_scene_intent(&scenes[0], &set, &links),
            SceneIntent::Brb
        );

        // Without a link the name decides, and an unknown name is Offline.
        links.remove_rule("brb_reconnecting");
        assert_eq!(
            resolve_scene_intent(&scenes[0], &set, &links),
            SceneIntent::Offline
        );
    }

    #[test]
    fn infer_intent_recognizes_common_names() {
        assert_eq!(infer_intent_from_name("Live - Main"), SceneIntent::Live);
        assert_eq!(infer_intent_from_name("BRB screen"), SceneIntent::Brb);
        assert_eq!(infer_intent_from_name("Low Bitrate"), SceneIntent::Hold);
        assert_eq!(infer_intent_from_name("Credits"), SceneIntent::Offline);
    }
}
