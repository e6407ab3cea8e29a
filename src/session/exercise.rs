use super::telemetry::{FrameOutcome, FrameStatus, FrameTelemetry};
use crate::angle::{AngleCalculator, AngleFilter, AngleSample};
use crate::config::FormtrackConfig;
use crate::error::ProfileError;
use crate::events::SessionEvent;
use crate::form::{check_safety, FeedbackThrottle, FormScorer, SUSTAINED_POOR_FORM_MESSAGE};
use crate::landmark::{Joint, JointTriple, LandmarkFrame};
use crate::phase::{Phase, PhaseStateMachine, RepOutcome};
use crate::profile::{ExerciseKind, ExerciseProfile};
use crate::visibility::VisibilityGate;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

pub const JOINTS_NOT_VISIBLE_MESSAGE: &str = "Can't see required joints";

/// Last measured raw angle of one primary side
#[derive(Debug, Clone, Copy)]
struct CarriedAngle {
    raw: f64,
    missed: u32,
}

/// All mutable state for tracking one exercise.
///
/// Owns the visibility gate, angle histories, phase machine, form scorer and
/// feedback throttle, and composes them for each frame. Not thread-safe on its
/// own; [`super::SessionController`] provides the single-writer wrapper.
pub struct ExerciseSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    profile: ExerciseProfile,
    /// Every triple measured each frame: primaries first, then form targets
    tracked: Vec<JointTriple>,

    gate: VisibilityGate,
    calculator: AngleCalculator,
    /// Smooths the mean of the primary sides as one signal
    primary_filter: AngleFilter,
    /// Per primary side, in profile order
    carried: Vec<Option<CarriedAngle>>,
    machine: PhaseStateMachine,
    scorer: FormScorer,
    throttle: FeedbackThrottle,

    max_invalid_frames: u32,
    invalid_streak: u32,
    tracking_lost: bool,
}

impl ExerciseSession {
    /// Build a session, rejecting an invalid profile before any frame is seen
    pub fn new(profile: ExerciseProfile, config: &FormtrackConfig) -> Result<Self, ProfileError> {
        profile.validate()?;

        let mut tracked: Vec<JointTriple> = Vec::new();
        let form_triples = profile
            .form
            .iter()
            .flat_map(|phase| phase.targets.iter().map(|target| target.triple));
        for triple in profile.primary.iter().copied().chain(form_triples) {
            if !tracked.contains(&triple) {
                tracked.push(triple);
            }
        }

        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            tracked,
            gate: VisibilityGate::new(profile.visibility.clone()),
            calculator: AngleCalculator::new(
                config.filter_settings(),
                config.engine.angle_confidence_threshold,
            ),
            primary_filter: AngleFilter::new(config.filter_settings()),
            carried: vec![None; profile.primary.len()],
            machine: PhaseStateMachine::new(&profile, config.engine.phase_history_len),
            scorer: FormScorer::new(config.form_settings()),
            throttle: FeedbackThrottle::new(config.throttle_settings()),
            max_invalid_frames: config.engine.max_invalid_frames,
            invalid_streak: 0,
            tracking_lost: false,
            profile,
        };

        debug!(
            "Session {} created for {} tracking {} triples",
            session.id,
            session.profile.kind,
            session.tracked.len()
        );
        Ok(session)
    }

    /// Run one frame through gate, angles, phase machine and form scorer
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> FrameOutcome {
        let report = self.gate.evaluate(frame);
        if !report.passed {
            debug!(
                "Frame {} gated: {}/{} required joints visible",
                frame.id, report.visible, report.min_visible
            );
            return self.invalid_frame(frame, FrameStatus::Gated, report.missing);
        }

        let samples: HashMap<JointTriple, AngleSample> = self
            .tracked
            .iter()
            .filter_map(|triple| {
                self.calculator
                    .measure(frame, triple)
                    .map(|sample| (*triple, sample))
            })
            .collect();

        let Some(combined) = self.combine_primary(frame) else {
            debug!("Frame {} has no measurable primary angle", frame.id);
            return self.invalid_frame(frame, FrameStatus::NoAngle, report.missing);
        };

        self.invalid_streak = 0;
        self.tracking_lost = false;

        let mut events = Vec::new();
        let update = self.machine.update(&combined);
        if update.changed() {
            events.push(SessionEvent::PhaseChanged {
                from: update.previous,
                to: update.phase,
                timestamp: frame.timestamp,
            });
        }

        let mut rejected_rep = None;
        match &update.rep {
            Some(RepOutcome::Accepted {
                rep_count,
                dwell_seconds,
                min_angle,
                ..
            }) => events.push(SessionEvent::RepCompleted {
                rep_count: *rep_count,
                dwell_seconds: *dwell_seconds,
                min_angle: *min_angle,
                timestamp: frame.timestamp,
            }),
            Some(RepOutcome::Rejected {
                reasons,
                dwell_seconds,
                min_angle,
                ..
            }) => {
                rejected_rep = Some(reasons.clone());
                events.push(SessionEvent::RepRejected {
                    reasons: reasons.clone(),
                    dwell_seconds: *dwell_seconds,
                    min_angle: *min_angle,
                    timestamp: frame.timestamp,
                });
            }
            None => {}
        }

        let assessment = self
            .scorer
            .evaluate(self.profile.targets_for(update.phase), |triple| {
                samples.get(triple).map(|sample| sample.smoothed)
            });

        let calculator = &self.calculator;
        let warnings = check_safety(&self.profile.safety, |bound| {
            calculator.reflex_angle(frame, &bound.triple, bound.flexion)
        });
        let warnings = self.throttle.admit_safety(warnings, frame.timestamp);
        let mut safety_warnings = Vec::with_capacity(warnings.len());
        for warning in warnings {
            events.push(SessionEvent::SafetyAlert {
                joint: warning.joint,
                angle: warning.angle,
                max_angle: warning.max_angle,
                message: warning.text.clone(),
                timestamp: frame.timestamp,
            });
            safety_warnings.push(warning.text);
        }

        let mut feedback_messages = self
            .throttle
            .admit_feedback(assessment.feedback, frame.timestamp);
        if assessment.sustained_poor_form
            && self
                .throttle
                .admit(SUSTAINED_POOR_FORM_MESSAGE, frame.timestamp)
        {
            feedback_messages.push(SUSTAINED_POOR_FORM_MESSAGE.to_string());
            events.push(SessionEvent::SustainedPoorForm {
                mean_score: assessment.window_mean.unwrap_or(assessment.score),
                timestamp: frame.timestamp,
            });
        }

        let telemetry = FrameTelemetry {
            frame_id: frame.id,
            timestamp_ms: frame.timestamp_ms(),
            status: FrameStatus::Processed,
            raw_angle: Some(combined.raw),
            smoothed_angle: Some(combined.smoothed),
            velocity: Some(combined.velocity),
            phase: update.phase,
            rep_count: self.machine.rep_count(),
            rep_just_completed: update.rep_completed(),
            form_score: Some(assessment.score),
            feedback_messages,
            safety_warnings,
            missing_joints: report.missing,
            rejected_rep,
        };

        FrameOutcome { telemetry, events }
    }

    fn invalid_frame(
        &mut self,
        frame: &LandmarkFrame,
        status: FrameStatus,
        missing: Vec<Joint>,
    ) -> FrameOutcome {
        self.invalid_streak = self.invalid_streak.saturating_add(1);
        let mut events = Vec::new();

        if self.invalid_streak > self.max_invalid_frames && !self.tracking_lost {
            let previous = self.machine.phase();
            self.machine.force_idle(frame.timestamp);
            self.clear_angles();
            self.tracking_lost = true;

            warn!(
                "Tracking lost after {} unusable frames, returning to idle",
                self.invalid_streak
            );
            if previous != Phase::Idle {
                events.push(SessionEvent::PhaseChanged {
                    from: previous,
                    to: Phase::Idle,
                    timestamp: frame.timestamp,
                });
            }
            events.push(SessionEvent::TrackingLost {
                invalid_frames: self.invalid_streak,
                timestamp: frame.timestamp,
            });
        }

        let mut feedback_messages = Vec::new();
        if self.throttle.admit(JOINTS_NOT_VISIBLE_MESSAGE, frame.timestamp) {
            feedback_messages.push(JOINTS_NOT_VISIBLE_MESSAGE.to_string());
        }

        let telemetry = FrameTelemetry {
            frame_id: frame.id,
            timestamp_ms: frame.timestamp_ms(),
            status,
            raw_angle: None,
            smoothed_angle: None,
            velocity: None,
            phase: self.machine.phase(),
            rep_count: self.machine.rep_count(),
            rep_just_completed: false,
            form_score: None,
            feedback_messages,
            safety_warnings: Vec::new(),
            missing_joints: missing,
            rejected_rep: None,
        };

        FrameOutcome { telemetry, events }
    }

    /// Mean raw angle of the primary sides, smoothed as a single signal.
    ///
    /// A side that drops out keeps contributing its last measured angle for up
    /// to `max_invalid_frames` frames, so one occluded limb does not shift the
    /// mean. `None` when no side is measurable this frame.
    fn combine_primary(&mut self, frame: &LandmarkFrame) -> Option<AngleSample> {
        let mut measured = 0usize;
        let mut total = 0.0;
        let mut sides = 0usize;

        for (triple, carried) in self.profile.primary.iter().zip(self.carried.iter_mut()) {
            match self.calculator.raw_angle(frame, triple) {
                Some(raw) => {
                    *carried = Some(CarriedAngle { raw, missed: 0 });
                    measured += 1;
                    total += raw;
                    sides += 1;
                }
                None => {
                    if let Some(last) = carried.as_mut() {
                        last.missed += 1;
                        if last.missed <= self.max_invalid_frames {
                            total += last.raw;
                            sides += 1;
                        } else {
                            debug!(
                                "No angle for {} in {} frames, dropping it",
                                triple, last.missed
                            );
                            *carried = None;
                        }
                    }
                }
            }
        }

        if measured == 0 {
            return None;
        }

        Some(self.primary_filter.update(total / sides as f64, frame.timestamp))
    }

    fn clear_angles(&mut self) {
        self.calculator.reset();
        self.primary_filter.reset();
        self.carried.iter_mut().for_each(|carried| *carried = None);
    }

    /// Clear counts, histories and trackers; keeps the profile and session id
    pub fn reset(&mut self) {
        self.clear_angles();
        self.machine.reset();
        self.scorer.reset();
        self.throttle.reset();
        self.invalid_streak = 0;
        self.tracking_lost = false;
        debug!("Session {} reset", self.id);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn profile(&self) -> &ExerciseProfile {
        &self.profile
    }

    pub fn exercise(&self) -> ExerciseKind {
        self.profile.kind
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn rep_count(&self) -> u32 {
        self.machine.rep_count()
    }

    pub fn machine(&self) -> &PhaseStateMachine {
        &self.machine
    }

    pub fn invalid_streak(&self) -> u32 {
        self.invalid_streak
    }

    pub fn is_tracking_lost(&self) -> bool {
        self.tracking_lost
    }

    /// Rolling history length for a triple, for diagnostics
    pub fn angle_history_len(&self, triple: &JointTriple) -> usize {
        self.calculator.history_len(triple)
    }
}
