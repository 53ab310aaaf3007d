//! Alert Manager Implementation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Alert type recorded for per-frame count alerts
pub const THRESHOLD_ALERT: &str = "threshold";

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Classes that can raise alerts (default: person, car, truck)
    pub watch_classes: Vec<String>,
    /// Objects of one class in a single frame needed to alert (default: 5)
    pub threshold: usize,
    /// Frames a class stays quiet after alerting; 0 alerts on every qualifying frame
    pub cooldown_frames: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            watch_classes: vec!["person".to_string(), "car".to_string(), "truck".to_string()],
            threshold: 5,
            cooldown_frames: 0,
        }
    }
}

/// Alert raised for one class in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: String,
    pub message: String,
    pub class_name: String,
    pub count: usize,
    pub frame_number: u64,
}

/// Firing history of one class
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertState {
    /// Frame of the most recent alert
    pub last_fired_frame: u64,
    /// Number of alerts raised
    pub fire_count: usize,
}

/// Per-frame threshold evaluation
pub struct AlertManager {
    config: AlertConfig,
    states: HashMap<String, AlertState>,
}

impl AlertManager {
    /// Create a new alert manager; repeated watch classes collapse to one
    pub fn new(mut config: AlertConfig) -> Self {
        let mut seen = HashSet::new();
        config.watch_classes.retain(|class| seen.insert(class.clone()));
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Tally the frame's class names and return the alerts it raises
    ///
    /// Classes are evaluated in name order so the result is deterministic.
    pub fn evaluate<'a>(&mut self, frame_number: u64, class_names: impl IntoIterator<Item = &'a str>) -> Vec<Alert> {
        let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
        for name in class_names {
            *tally.entry(name).or_insert(0) += 1;
        }

        let mut alerts = Vec::new();
        for watched in &self.config.watch_classes.clone() {
            let count = tally.get(watched.as_str()).copied().unwrap_or(0);
            if count == 0 || count < self.config.threshold {
                continue;
            }
            if !self.should_fire(watched, frame_number) {
                continue;
            }
            self.record_fire(watched, frame_number);
            alerts.push(Alert {
                alert_type: THRESHOLD_ALERT.to_string(),
                message: format!("Alert: {} {}(s) detected!", count, watched),
                class_name: watched.clone(),
                count,
                frame_number,
            });
        }
        alerts.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        alerts
    }

    /// Whether the cooldown allows `class_name` to alert at `frame_number`
    pub fn should_fire(&self, class_name: &str, frame_number: u64) -> bool {
        if self.config.cooldown_frames == 0 {
            return true;
        }
        match self.states.get(class_name) {
            Some(state) if state.fire_count > 0 => {
                let since = frame_number.saturating_sub(state.last_fired_frame);
                if since < self.config.cooldown_frames {
                    debug!("Alert for {} suppressed: {} frames since last", class_name, since);
                    false
                } else {
                    true
                }
            }
            _ => true,
        }
    }

    fn record_fire(&mut self, class_name: &str, frame_number: u64) {
        let state = self.states.entry(class_name.to_string()).or_default();
        state.last_fired_frame = frame_number;
        state.fire_count += 1;
        debug!("Alert recorded: {} (count: {})", class_name, state.fire_count);
    }

    pub fn state(&self, class_name: &str) -> Option<&AlertState> {
        self.states.get(class_name)
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Forget firing history
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
