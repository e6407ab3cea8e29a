use crate::landmark::{Joint, JointTriple};
use crate::profile::FormTarget;
use std::collections::VecDeque;

pub const SUSTAINED_POOR_FORM_MESSAGE: &str =
    "Form is slipping: slow down and reset your position";

/// Penalty curve and rolling-window settings for form scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormSettings {
    /// Penalty points per degree outside the tolerance band
    pub penalty_multiplier: f64,
    /// Cap on any single target's penalty
    pub max_joint_penalty: f64,
    /// Number of recent scores averaged for the sustained-form check
    pub score_window: usize,
    /// Mean score below which form is considered to be slipping
    pub poor_form_floor: f64,
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            penalty_multiplier: 2.0,
            max_joint_penalty: 30.0,
            score_window: 30,
            poor_form_floor: 60.0,
        }
    }
}

/// Corrective cue for one target, ranked by severity
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackMessage {
    pub text: String,
    /// Penalty points this target cost
    pub severity: f64,
    pub joint: Joint,
}

/// Result of scoring one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FormAssessment {
    pub score: f64,
    /// Candidate messages, most severe first, before throttling
    pub feedback: Vec<FeedbackMessage>,
    /// Window is full and its mean is below the floor
    pub sustained_poor_form: bool,
    pub window_mean: Option<f64>,
}

/// Scores joint angles against the current phase's targets
#[derive(Debug, Clone)]
pub struct FormScorer {
    settings: FormSettings,
    history: VecDeque<f64>,
}

impl FormScorer {
    pub fn new(settings: FormSettings) -> Self {
        let score_window = settings.score_window.max(1);
        Self {
            settings: FormSettings {
                score_window,
                ..settings
            },
            history: VecDeque::with_capacity(score_window),
        }
    }

    /// Score the frame. `angle_of` returns the smoothed angle of a triple, or
    /// `None` when it is unavailable this frame; those targets are skipped.
    pub fn evaluate<F>(&mut self, targets: &[FormTarget], mut angle_of: F) -> FormAssessment
    where
        F: FnMut(&JointTriple) -> Option<f64>,
    {
        let mut total_penalty = 0.0;
        let mut feedback = Vec::new();

        for target in targets {
            let Some(angle) = angle_of(&target.triple) else {
                continue;
            };

            let deviation = angle - target.target;
            let penalty = self.penalty(deviation.abs(), target.tolerance);
            if penalty <= 0.0 {
                continue;
            }

            total_penalty += penalty;
            let joint = target.triple.vertex;
            let cue = if deviation > 0.0 {
                "bend further"
            } else {
                "straighten up"
            };
            feedback.push(FeedbackMessage {
                text: format!("{}: {}", joint.display_name(), cue),
                severity: penalty,
                joint,
            });
        }

        feedback.sort_by(|a, b| b.severity.total_cmp(&a.severity));

        let score = (100.0 - total_penalty).clamp(0.0, 100.0);
        self.history.push_back(score);
        while self.history.len() > self.settings.score_window {
            self.history.pop_front();
        }

        let window_mean = self.window_mean();
        let sustained_poor_form = self.history.len() == self.settings.score_window
            && window_mean.map_or(false, |mean| mean < self.settings.poor_form_floor);

        FormAssessment {
            score,
            feedback,
            sustained_poor_form,
            window_mean,
        }
    }

    fn penalty(&self, deviation: f64, tolerance: f64) -> f64 {
        let excess = (deviation - tolerance).max(0.0);
        (excess * self.settings.penalty_multiplier).min(self.settings.max_joint_penalty)
    }

    pub fn window_mean(&self) -> Option<f64> {
        if self.history.is_empty() {
            None
        } else {
            Some(self.history.iter().sum::<f64>() / self.history.len() as f64)
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNEE: JointTriple = JointTriple::new(Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle);
    const HIP: JointTriple = JointTriple::new(Joint::LeftShoulder, Joint::LeftHip, Joint::LeftKnee);

    fn targets() -> Vec<FormTarget> {
        vec![
            FormTarget {
                target: 90.0,
                tolerance: 15.0,
                triple: KNEE,
            },
            FormTarget {
                target: 80.0,
                tolerance: 20.0,
                triple: HIP,
            },
        ]
    }

    #[test]
    fn test_all_targets_in_band_scores_100() {
        let mut scorer = FormScorer::new(FormSettings::default());
        let assessment = scorer.evaluate(&targets(), |triple| {
            Some(if *triple == KNEE { 100.0 } else { 65.0 })
        });
        assert_eq!(assessment.score, 100.0);
        assert!(assessment.feedback.is_empty());
    }

    #[test]
    fn test_twenty_degrees_off_with_fifteen_tolerance_scores_90() {
        let mut scorer = FormScorer::new(FormSettings::default());
        let assessment = scorer.evaluate(&targets(), |triple| {
            Some(if *triple == KNEE { 110.0 } else { 80.0 })
        });
        assert_eq!(assessment.score, 90.0);
        assert_eq!(assessment.feedback.len(), 1);
        assert_eq!(assessment.feedback[0].text, "left knee: bend further");
        assert_eq!(assessment.feedback[0].severity, 10.0);
    }

    #[test]
    fn test_penalty_is_capped_and_score_clamped() {
        let settings = FormSettings {
            max_joint_penalty: 60.0,
            ..FormSettings::default()
        };
        let mut scorer = FormScorer::new(settings);
        let assessment = scorer.evaluate(&targets(), |triple| {
            Some(if *triple == KNEE { 50.0 } else { 170.0 })
        });
        assert_eq!(assessment.score, 0.0);
        // Most severe first
        assert_eq!(assessment.feedback[0].text, "left hip: bend further");
        assert_eq!(assessment.feedback[1].text, "left knee: straighten up");

        let mut capped = FormScorer::new(FormSettings::default());
        let assessment = capped.evaluate(&targets(), |triple| {
            Some(if *triple == KNEE { 10.0 } else { 80.0 })
        });
        assert_eq!(assessment.score, 70.0);
    }

    #[test]
    fn test_unavailable_and_empty_targets_score_100() {
        let mut scorer = FormScorer::new(FormSettings::default());
        assert_eq!(scorer.evaluate(&targets(), |_| None).score, 100.0);
        assert_eq!(scorer.evaluate(&[], |_| Some(0.0)).score, 100.0);
    }

    #[test]
    fn test_sustained_poor_form_needs_full_window() {
        let settings = FormSettings {
            score_window: 5,
            ..FormSettings::default()
        };
        let mut scorer = FormScorer::new(settings);
        let bad = |triple: &JointTriple| Some(if *triple == KNEE { 10.0 } else { 170.0 });

        for _ in 0..4 {
            assert!(!scorer.evaluate(&targets(), bad).sustained_poor_form);
        }
        let assessment = scorer.evaluate(&targets(), bad);
        assert!(assessment.sustained_poor_form);
        assert_eq!(assessment.window_mean, Some(40.0));
        assert_eq!(scorer.history_len(), 5);

        scorer.reset();
        assert_eq!(scorer.window_mean(), None);
    }
}
