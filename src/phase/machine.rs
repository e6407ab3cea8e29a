use super::types::{Phase, PhaseTransition, PhaseUpdate, RepOutcome, RepRejection};
use crate::angle::AngleSample;
use crate::landmark::seconds_between;
use crate::profile::{ExerciseProfile, PhaseModel, PhaseThresholds, RepTiming};
use std::collections::VecDeque;
use std::time::SystemTime;
use tracing::{debug, info};

/// Hysteresis state machine that classifies movement phases and validates reps.
///
/// One machine serves every exercise; all thresholds come from the profile it
/// was built with.
#[derive(Debug, Clone)]
pub struct PhaseStateMachine {
    thresholds: PhaseThresholds,
    timing: RepTiming,
    model: PhaseModel,
    history_len: usize,

    phase: Phase,
    rep_count: u32,
    min_angle: Option<f64>,
    phase_entered_at: Option<SystemTime>,
    flexion_entered_at: Option<SystemTime>,
    last_rep_at: Option<SystemTime>,
    /// Start of the current uninterrupted stretch at or below `enter`
    hold_started_at: Option<SystemTime>,
    hold_completed: bool,
    history: VecDeque<PhaseTransition>,
}

impl PhaseStateMachine {
    pub fn new(profile: &ExerciseProfile, history_len: usize) -> Self {
        Self {
            thresholds: profile.thresholds.clone(),
            timing: profile.timing.clone(),
            model: profile.model,
            history_len: history_len.max(1),
            phase: Phase::Idle,
            rep_count: 0,
            min_angle: None,
            phase_entered_at: None,
            flexion_entered_at: None,
            last_rep_at: None,
            hold_started_at: None,
            hold_completed: false,
            history: VecDeque::with_capacity(history_len.max(1)),
        }
    }

    /// Advance the machine with one filtered angle sample
    pub fn update(&mut self, sample: &AngleSample) -> PhaseUpdate {
        let previous = self.phase;
        let angle = sample.smoothed;
        let now = sample.timestamp;
        let enter = self.thresholds.enter;
        let exit = self.thresholds.exit;
        let detailed = self.model == PhaseModel::Detailed;
        let mut rep = None;

        match self.phase {
            Phase::Idle => {
                if angle <= enter {
                    self.begin_flexion(angle, now);
                } else {
                    self.transition(Phase::Extended, now);
                }
            }
            Phase::Extended => {
                if angle <= enter {
                    self.begin_flexion(angle, now);
                } else if detailed && angle < exit && sample.velocity < 0.0 {
                    self.min_angle = Some(angle);
                    self.transition(Phase::Flexing, now);
                }
            }
            Phase::Flexing => {
                self.track_min(angle);
                if angle <= enter {
                    self.begin_flexion(angle, now);
                } else if angle >= exit {
                    rep = Some(self.reject_shallow(sample));
                    self.clear_rep_trackers();
                    self.transition(Phase::Extended, now);
                }
            }
            Phase::Flexed | Phase::Holding | Phase::Extending => {
                self.track_min(angle);
                if angle >= exit {
                    rep = Some(self.close_rep(sample));
                    self.clear_rep_trackers();
                    self.transition(Phase::Extended, now);
                } else {
                    self.track_hold(angle, now);
                    if detailed
                        && angle > enter
                        && matches!(self.phase, Phase::Flexed | Phase::Holding)
                        && (!self.timing.requires_hold() || self.phase == Phase::Holding)
                    {
                        self.transition(Phase::Extending, now);
                    }
                }
            }
        }

        PhaseUpdate {
            previous,
            phase: self.phase,
            rep,
        }
    }

    fn begin_flexion(&mut self, angle: f64, now: SystemTime) {
        self.flexion_entered_at = Some(now);
        self.hold_started_at = Some(now);
        self.hold_completed = false;
        self.min_angle = Some(angle);
        self.transition(Phase::Flexed, now);
    }

    fn track_min(&mut self, angle: f64) {
        self.min_angle = Some(self.min_angle.map_or(angle, |min| min.min(angle)));
    }

    fn track_hold(&mut self, angle: f64, now: SystemTime) {
        let Some(hold) = self.timing.hold_seconds else {
            return;
        };
        if self.hold_completed || self.phase != Phase::Flexed {
            return;
        }

        if angle > self.thresholds.enter {
            self.hold_started_at = None;
            return;
        }

        let started = *self.hold_started_at.get_or_insert(now);
        if seconds_between(started, now).max(0.0) >= hold {
            self.hold_completed = true;
            debug!("Hold of {:.2}s completed", hold);
            if self.model == PhaseModel::Detailed {
                self.transition(Phase::Holding, now);
            }
        }
    }

    fn close_rep(&mut self, sample: &AngleSample) -> RepOutcome {
        let now = sample.timestamp;
        let dwell_seconds = self
            .flexion_entered_at
            .map(|entered| seconds_between(entered, now).max(0.0))
            .unwrap_or(0.0);
        let min_angle = self.min_angle.unwrap_or(sample.smoothed);
        let exit_velocity = sample.velocity;

        let mut reasons = Vec::new();
        if dwell_seconds < self.timing.min_dwell_seconds {
            reasons.push(RepRejection::DwellTooShort);
        }
        if min_angle > self.thresholds.bottom_angle {
            reasons.push(RepRejection::BottomNotReached);
        }
        if exit_velocity < self.timing.min_exit_velocity {
            reasons.push(RepRejection::ExitTooSlow);
        }
        if let Some(last) = self.last_rep_at {
            if seconds_between(last, now).max(0.0) < self.timing.min_rep_interval_seconds {
                reasons.push(RepRejection::TooSoon);
            }
        }
        if self.timing.requires_hold() && !self.hold_completed {
            reasons.push(RepRejection::HoldNotCompleted);
        }

        if reasons.is_empty() {
            self.rep_count += 1;
            self.last_rep_at = Some(now);
            info!(
                "Rep {} counted (dwell {:.2}s, bottom {:.1}°, exit {:.1}°/s)",
                self.rep_count, dwell_seconds, min_angle, exit_velocity
            );
            RepOutcome::Accepted {
                rep_count: self.rep_count,
                dwell_seconds,
                min_angle,
                exit_velocity,
            }
        } else {
            info!(
                "Rep rejected: {} (dwell {:.2}s, bottom {:.1}°, exit {:.1}°/s)",
                join_reasons(&reasons),
                dwell_seconds,
                min_angle,
                exit_velocity
            );
            RepOutcome::Rejected {
                reasons,
                dwell_seconds,
                min_angle,
                exit_velocity,
            }
        }
    }

    fn reject_shallow(&self, sample: &AngleSample) -> RepOutcome {
        let min_angle = self.min_angle.unwrap_or(sample.smoothed);
        info!(
            "Rep rejected: {} (shallow movement, deepest {:.1}°)",
            RepRejection::BottomNotReached,
            min_angle
        );
        RepOutcome::Rejected {
            reasons: vec![RepRejection::BottomNotReached],
            dwell_seconds: 0.0,
            min_angle,
            exit_velocity: sample.velocity,
        }
    }

    fn clear_rep_trackers(&mut self) {
        self.min_angle = None;
        self.flexion_entered_at = None;
        self.hold_started_at = None;
        self.hold_completed = false;
    }

    fn transition(&mut self, to: Phase, now: SystemTime) {
        if self.phase == to {
            return;
        }

        debug!("Phase {} -> {}", self.phase, to);
        self.history.push_back(PhaseTransition {
            from: self.phase,
            to,
            timestamp: now,
        });
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }

        self.phase = to;
        self.phase_entered_at = Some(now);
    }

    /// Recovery path: drop the open rep and return to `Idle`.
    ///
    /// The rep count and last-rep timestamp survive so the interval gate
    /// still applies once tracking resumes.
    pub fn force_idle(&mut self, now: SystemTime) {
        self.clear_rep_trackers();
        self.transition(Phase::Idle, now);
    }

    /// Full reinitialisation for a new set
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.rep_count = 0;
        self.phase_entered_at = None;
        self.last_rep_at = None;
        self.clear_rep_trackers();
        self.history.clear();
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    /// Deepest angle since the open excursion began
    pub fn min_angle(&self) -> Option<f64> {
        self.min_angle
    }

    pub fn phase_entered_at(&self) -> Option<SystemTime> {
        self.phase_entered_at
    }

    pub fn flexion_entered_at(&self) -> Option<SystemTime> {
        self.flexion_entered_at
    }

    pub fn last_rep_at(&self) -> Option<SystemTime> {
        self.last_rep_at
    }

    pub fn hold_completed(&self) -> bool {
        self.hold_completed
    }

    /// Most recent transitions, oldest first
    pub fn history(&self) -> impl Iterator<Item = &PhaseTransition> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn join_reasons(reasons: &[RepRejection]) -> String {
    reasons
        .iter()
        .map(RepRejection::description)
        .collect::<Vec<_>>()
        .join(", ")
}
