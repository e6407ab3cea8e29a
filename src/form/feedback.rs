use super::safety::SafetyWarning;
use super::scorer::FeedbackMessage;
use crate::landmark::seconds_between;
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::trace;

/// Cool-down and per-frame cap settings for surfaced messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleSettings {
    pub cooldown_seconds: f64,
    pub max_messages_per_frame: usize,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            cooldown_seconds: 3.0,
            max_messages_per_frame: 2,
        }
    }
}

/// De-duplicates messages by text within a cool-down window.
///
/// Time is taken from frame timestamps. An entry whose timestamp lies in the
/// future of the current frame (clock moved backwards) is treated as expired.
#[derive(Debug, Clone)]
pub struct FeedbackThrottle {
    settings: ThrottleSettings,
    last_emitted: HashMap<String, SystemTime>,
}

impl FeedbackThrottle {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            last_emitted: HashMap::new(),
        }
    }

    /// Surface at most `max_messages_per_frame` corrective cues, most severe first
    pub fn admit_feedback(&mut self, mut candidates: Vec<FeedbackMessage>, now: SystemTime) -> Vec<String> {
        self.prune(now);
        candidates.sort_by(|a, b| b.severity.total_cmp(&a.severity));

        let mut surfaced = Vec::new();
        for candidate in candidates {
            if surfaced.len() >= self.settings.max_messages_per_frame {
                break;
            }
            if self.try_admit(&candidate.text, now) {
                surfaced.push(candidate.text);
            }
        }
        surfaced
    }

    /// Safety warnings are cool-down throttled but never capped
    pub fn admit_safety(&mut self, warnings: Vec<SafetyWarning>, now: SystemTime) -> Vec<SafetyWarning> {
        self.prune(now);
        warnings
            .into_iter()
            .filter(|warning| self.try_admit(&warning.text, now))
            .collect()
    }

    /// Admit a single message outside the per-frame cap
    pub fn admit(&mut self, text: &str, now: SystemTime) -> bool {
        self.prune(now);
        self.try_admit(text, now)
    }

    fn try_admit(&mut self, text: &str, now: SystemTime) -> bool {
        if self.last_emitted.contains_key(text) {
            trace!("Suppressing repeated message '{}'", text);
            return false;
        }
        self.last_emitted.insert(text.to_string(), now);
        true
    }

    fn prune(&mut self, now: SystemTime) {
        let cooldown = self.settings.cooldown_seconds;
        self.last_emitted.retain(|_, emitted| {
            let elapsed = seconds_between(*emitted, now);
            (0.0..cooldown).contains(&elapsed)
        });
    }

    pub fn tracked(&self) -> usize {
        self.last_emitted.len()
    }

    pub fn reset(&mut self) {
        self.last_emitted.clear();
    }
}
