//! Rolling bitrate maxima and output health classification.

use std::collections::HashMap;

use deck_protocol::{EncoderOutput, OutputsSection};

/// Slow decay applied to a stored maximum on every observation, so the
/// reference ceiling tracks long-term conditions instead of a single spike.
const ROLLING_MAX_DECAY: f64 = 0.998;

/// Health of an encoder output relative to its rolling maximum bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputHealth {
    Healthy,
    Good,
    Warning,
    Degraded,
    Critical,
}

pub fn classify_output_health(current_kbps: f64, rolling_max_kbps: f64) -> OutputHealth {
    if rolling_max_kbps <= 0.0 || current_kbps <= 0.0 {
        return OutputHealth::Critical;
    }
    let pct = current_kbps / rolling_max_kbps;
    if pct >= 0.9 {
        OutputHealth::Healthy
    } else if pct >= 0.7 {
        OutputHealth::Good
    } else if pct >= 0.5 {
        OutputHealth::Warning
    } else if pct >= 0.3 {
        OutputHealth::Degraded
    } else {
        OutputHealth::Critical
    }
}

/// Per-output rolling maximum bitrate tracker.
///
/// Constructed on engine attach and discarded on detach; never shared as
/// ambient state.
#[derive(Debug, Default)]
pub struct RollingMaxTracker {
    max_by_key: HashMap<String, f64>,
    section_max: f64,
}

impl RollingMaxTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one snapshot's encoder outputs into the rolling maxima.
    pub fn observe(&mut self, outputs: &OutputsSection) {
        self.section_max = 0.0;
        for group in &outputs.groups {
            for item in &group.items {
                self.observe_output(item);
            }
        }
    }

    fn observe_output(&mut self, item: &EncoderOutput) {
        let key = output_key(item);
        let Some(key) = key else { return };
        if item.kbps > 0.0 {
            let prev = self.max_by_key.get(key).copied().unwrap_or(0.0);
            let decayed = if prev > 0.0 { prev * ROLLING_MAX_DECAY } else { 0.0 };
            self.max_by_key
                .insert(key.to_string(), decayed.max(item.kbps));
        }
        if let Some(max) = self.max_by_key.get(key) {
            if *max > self.section_max {
                self.section_max = *max;
            }
        }
    }

    pub fn max_for(&self, key: &str) -> Option<f64> {
        self.max_by_key.get(key).copied()
    }

    pub fn section_max(&self) -> f64 {
        self.section_max
    }

    pub fn health_for(&self, item: &EncoderOutput) -> OutputHealth {
        let max = output_key(item)
            .and_then(|key| self.max_for(key))
            .unwrap_or(0.0);
        classify_output_health(item.kbps, max)
    }
}

fn output_key(item: &EncoderOutput) -> Option<&str> {
    [&item.id, &item.name, &item.platform]
        .into_iter()
        .map(String::as_str)
        .find(|value| !value.is_empty())
}
