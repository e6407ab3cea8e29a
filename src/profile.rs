//! Exercise profiles: the immutable, per-session configuration that drives
//! the visibility gate, the phase machine and the form scorer.
//!
//! Every threshold the engine uses comes from here. Built-in profiles cover
//! the closed set of [`ExerciseKind`]s and can be replaced wholesale from the
//! configuration file.

use crate::angle::Orientation;
use crate::error::ProfileError;
use crate::landmark::{Joint, JointTriple};
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exercises the engine knows how to track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    BicepCurl,
    Squat,
    PushUp,
    WallSit,
    NeckFlexion,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 5] = [
        ExerciseKind::BicepCurl,
        ExerciseKind::Squat,
        ExerciseKind::PushUp,
        ExerciseKind::WallSit,
        ExerciseKind::NeckFlexion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseKind::BicepCurl => "bicep_curl",
            ExerciseKind::Squat => "squat",
            ExerciseKind::PushUp => "push_up",
            ExerciseKind::WallSit => "wall_sit",
            ExerciseKind::NeckFlexion => "neck_flexion",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ProfileError::UnknownExercise {
                kind: s.to_string(),
            })
    }
}

/// Which phase labels the state machine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseModel {
    /// idle -> extended -> flexing -> flexed -> (holding) -> extending -> extended
    #[default]
    Detailed,
    /// extended <-> flexed only
    Simple,
}

/// Hysteresis thresholds in degrees. Flexion decreases the measured angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseThresholds {
    /// Angle at or below which the movement is considered flexed
    pub enter: f64,
    /// Angle at or above which the movement is considered extended again
    pub exit: f64,
    /// Deepest angle that must be reached while flexed for a rep to count
    pub bottom_angle: f64,
}

/// Temporal gates for rep acceptance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepTiming {
    #[serde(default = "default_min_dwell_seconds")]
    pub min_dwell_seconds: f64,
    #[serde(default = "default_min_rep_interval_seconds")]
    pub min_rep_interval_seconds: f64,
    /// Minimum angular velocity toward extension at the exit crossing (deg/s)
    #[serde(default = "default_min_exit_velocity")]
    pub min_exit_velocity: f64,
    /// Required time in the flexed position before extension may begin
    #[serde(default)]
    pub hold_seconds: Option<f64>,
}

impl RepTiming {
    pub fn requires_hold(&self) -> bool {
        self.hold_seconds.is_some()
    }
}

impl Default for RepTiming {
    fn default() -> Self {
        Self {
            min_dwell_seconds: default_min_dwell_seconds(),
            min_rep_interval_seconds: default_min_rep_interval_seconds(),
            min_exit_velocity: default_min_exit_velocity(),
            hold_seconds: None,
        }
    }
}

/// Joints that must be confidently visible, with an occlusion tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityRequirement {
    pub joints: Vec<Joint>,
    /// Minimum number of `joints` that must be visible
    pub min_visible: usize,
    #[serde(default = "default_visibility_confidence")]
    pub confidence_threshold: f32,
}

/// Target angle with a tolerance band for one joint triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormTarget {
    pub target: f64,
    pub tolerance: f64,
    pub triple: JointTriple,
}

/// Form targets applying while the machine is in `phase`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTargets {
    pub phase: Phase,
    pub targets: Vec<FormTarget>,
}

/// Physiologically plausible limit for a joint's reflex angle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyBound {
    pub max_angle: f64,
    /// Side the joint naturally bends toward, as seen in the image
    pub flexion: Orientation,
    pub triple: JointTriple,
}

/// Complete configuration for tracking one exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProfile {
    pub kind: ExerciseKind,
    pub name: String,
    #[serde(default)]
    pub model: PhaseModel,
    pub thresholds: PhaseThresholds,
    #[serde(default)]
    pub timing: RepTiming,
    pub visibility: VisibilityRequirement,
    /// Triples whose filtered angles drive the phase machine (averaged when several are visible)
    pub primary: Vec<JointTriple>,
    #[serde(default)]
    pub form: Vec<PhaseTargets>,
    #[serde(default)]
    pub safety: Vec<SafetyBound>,
}

impl ExerciseProfile {
    /// Built-in profile for an exercise kind.
    ///
    /// Side-view defaults assume the subject faces image-right.
    pub fn builtin(kind: ExerciseKind) -> Self {
        match kind {
            ExerciseKind::BicepCurl => bicep_curl(),
            ExerciseKind::Squat => squat(),
            ExerciseKind::PushUp => push_up(),
            ExerciseKind::WallSit => wall_sit(),
            ExerciseKind::NeckFlexion => neck_flexion(),
        }
    }

    /// Form targets for a phase; holding falls back to the flexed targets
    pub fn targets_for(&self, phase: Phase) -> &[FormTarget] {
        let found = self.form.iter().find(|entry| entry.phase == phase).or_else(|| {
            if phase == Phase::Holding {
                self.form.iter().find(|entry| entry.phase == Phase::Flexed)
            } else {
                None
            }
        });

        found.map(|entry| entry.targets.as_slice()).unwrap_or(&[])
    }

    /// Check the profile for missing or inconsistent fields
    pub fn validate(&self) -> Result<(), ProfileError> {
        let profile = || self.name.clone();

        if self.primary.is_empty() {
            return Err(ProfileError::MissingPrimaryTriple { profile: profile() });
        }

        let triples = self
            .primary
            .iter()
            .chain(self.form.iter().flat_map(|p| p.targets.iter().map(|t| &t.triple)))
            .chain(self.safety.iter().map(|s| &s.triple));
        for triple in triples {
            if triple.is_degenerate() {
                return Err(ProfileError::DegenerateTriple {
                    profile: profile(),
                    proximal: triple.proximal,
                    vertex: triple.vertex,
                    distal: triple.distal,
                });
            }
        }

        let PhaseThresholds {
            enter,
            exit,
            bottom_angle,
        } = self.thresholds;
        if !(enter.is_finite() && exit.is_finite() && enter > 0.0 && enter < exit && exit <= 180.0)
        {
            return Err(ProfileError::InvalidThresholds {
                profile: profile(),
                enter,
                exit,
            });
        }
        if !(bottom_angle.is_finite() && bottom_angle > 0.0 && bottom_angle < exit) {
            return Err(ProfileError::InvalidBottomAngle {
                profile: profile(),
                bottom: bottom_angle,
            });
        }

        let non_negative = |field: &'static str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ProfileError::InvalidParameter {
                    profile: profile(),
                    field,
                    value,
                })
            }
        };
        non_negative("timing.min_dwell_seconds", self.timing.min_dwell_seconds)?;
        non_negative(
            "timing.min_rep_interval_seconds",
            self.timing.min_rep_interval_seconds,
        )?;
        non_negative("timing.min_exit_velocity", self.timing.min_exit_velocity)?;
        if let Some(hold) = self.timing.hold_seconds {
            if !(hold.is_finite() && hold > 0.0) {
                return Err(ProfileError::InvalidParameter {
                    profile: profile(),
                    field: "timing.hold_seconds",
                    value: hold,
                });
            }
        }

        let visibility = &self.visibility;
        if visibility.joints.is_empty()
            || visibility.min_visible == 0
            || visibility.min_visible > visibility.joints.len()
        {
            return Err(ProfileError::InvalidVisibility {
                profile: profile(),
                min_visible: visibility.min_visible,
                required: visibility.joints.len(),
            });
        }
        let confidence = visibility.confidence_threshold as f64;
        if !(confidence.is_finite() && (0.0..1.0).contains(&confidence)) {
            return Err(ProfileError::InvalidParameter {
                profile: profile(),
                field: "visibility.confidence_threshold",
                value: confidence,
            });
        }

        for target in self.form.iter().flat_map(|p| p.targets.iter()) {
            non_negative("form.tolerance", target.tolerance)?;
            if !(0.0..=180.0).contains(&target.target) {
                return Err(ProfileError::InvalidParameter {
                    profile: profile(),
                    field: "form.target",
                    value: target.target,
                });
            }
        }

        for bound in &self.safety {
            if !(bound.max_angle.is_finite() && bound.max_angle > 0.0 && bound.max_angle < 360.0) {
                return Err(ProfileError::InvalidParameter {
                    profile: profile(),
                    field: "safety.max_angle",
                    value: bound.max_angle,
                });
            }
        }

        Ok(())
    }
}

fn default_min_dwell_seconds() -> f64 {
    0.15
}
fn default_min_rep_interval_seconds() -> f64 {
    1.2
}
fn default_min_exit_velocity() -> f64 {
    20.0
}
fn default_visibility_confidence() -> f32 {
    0.3
}

fn target(triple: JointTriple, target: f64, tolerance: f64) -> FormTarget {
    FormTarget {
        triple,
        target,
        tolerance,
    }
}

const LEFT_ELBOW: JointTriple =
    JointTriple::new(Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist);
const RIGHT_ELBOW: JointTriple =
    JointTriple::new(Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist);
const LEFT_KNEE: JointTriple = JointTriple::new(Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle);
const RIGHT_KNEE: JointTriple =
    JointTriple::new(Joint::RightHip, Joint::RightKnee, Joint::RightAnkle);
const LEFT_HIP: JointTriple = JointTriple::new(Joint::LeftShoulder, Joint::LeftHip, Joint::LeftKnee);
const LEFT_UPPER_ARM: JointTriple =
    JointTriple::new(Joint::LeftHip, Joint::LeftShoulder, Joint::LeftElbow);
const LEFT_BODY_LINE: JointTriple =
    JointTriple::new(Joint::LeftShoulder, Joint::LeftHip, Joint::LeftAnkle);
const LEFT_NECK: JointTriple = JointTriple::new(Joint::LeftEar, Joint::LeftShoulder, Joint::LeftHip);

fn bicep_curl() -> ExerciseProfile {
    ExerciseProfile {
        kind: ExerciseKind::BicepCurl,
        name: "Bicep curl".to_string(),
        primary: vec![LEFT_ELBOW],
        model: PhaseModel::Detailed,
        thresholds: PhaseThresholds {
            enter: 80.0,
            exit: 140.0,
            bottom_angle: 60.0,
        },
        timing: RepTiming::default(),
        visibility: VisibilityRequirement {
            joints: vec![
                Joint::LeftShoulder,
                Joint::LeftElbow,
                Joint::LeftWrist,
                Joint::LeftHip,
            ],
            min_visible: 3,
            confidence_threshold: 0.3,
        },
        form: vec![
            PhaseTargets {
                phase: Phase::Extended,
                targets: vec![target(LEFT_ELBOW, 165.0, 15.0), target(LEFT_UPPER_ARM, 15.0, 20.0)],
            },
            PhaseTargets {
                phase: Phase::Flexed,
                targets: vec![target(LEFT_ELBOW, 45.0, 20.0), target(LEFT_UPPER_ARM, 15.0, 20.0)],
            },
        ],
        safety: vec![SafetyBound {
            triple: LEFT_ELBOW,
            max_angle: 180.0,
            flexion: Orientation::Clockwise,
        }],
    }
}

fn squat() -> ExerciseProfile {
    ExerciseProfile {
        kind: ExerciseKind::Squat,
        name: "Squat".to_string(),
        primary: vec![LEFT_KNEE, RIGHT_KNEE],
        model: PhaseModel::Detailed,
        thresholds: PhaseThresholds {
            enter: 120.0,
            exit: 150.0,
            bottom_angle: 100.0,
        },
        timing: RepTiming::default(),
        visibility: VisibilityRequirement {
            joints: vec![
                Joint::LeftHip,
                Joint::RightHip,
                Joint::LeftKnee,
                Joint::RightKnee,
                Joint::LeftAnkle,
                Joint::RightAnkle,
            ],
            min_visible: 4,
            confidence_threshold: 0.3,
        },
        form: vec![
            PhaseTargets {
                phase: Phase::Extended,
                targets: vec![target(LEFT_KNEE, 170.0, 15.0), target(RIGHT_KNEE, 170.0, 15.0)],
            },
            PhaseTargets {
                phase: Phase::Flexed,
                targets: vec![
                    target(LEFT_KNEE, 90.0, 15.0),
                    target(RIGHT_KNEE, 90.0, 15.0),
                    target(LEFT_HIP, 80.0, 20.0),
                ],
            },
        ],
        safety: vec![
            SafetyBound {
                triple: LEFT_KNEE,
                max_angle: 185.0,
                flexion: Orientation::CounterClockwise,
            },
            SafetyBound {
                triple: RIGHT_KNEE,
                max_angle: 185.0,
                flexion: Orientation::CounterClockwise,
            },
        ],
    }
}

fn push_up() -> ExerciseProfile {
    ExerciseProfile {
        kind: ExerciseKind::PushUp,
        name: "Push-up".to_string(),
        primary: vec![LEFT_ELBOW, RIGHT_ELBOW],
        model: PhaseModel::Simple,
        thresholds: PhaseThresholds {
            enter: 100.0,
            exit: 150.0,
            bottom_angle: 90.0,
        },
        timing: RepTiming::default(),
        visibility: VisibilityRequirement {
            joints: vec![
                Joint::LeftShoulder,
                Joint::RightShoulder,
                Joint::LeftElbow,
                Joint::RightElbow,
                Joint::LeftWrist,
                Joint::RightWrist,
            ],
            min_visible: 4,
            confidence_threshold: 0.3,
        },
        form: vec![
            PhaseTargets {
                phase: Phase::Extended,
                targets: vec![target(LEFT_BODY_LINE, 175.0, 10.0)],
            },
            PhaseTargets {
                phase: Phase::Flexed,
                targets: vec![
                    target(LEFT_ELBOW, 85.0, 15.0),
                    target(RIGHT_ELBOW, 85.0, 15.0),
                    target(LEFT_BODY_LINE, 175.0, 10.0),
                ],
            },
        ],
        safety: vec![
            SafetyBound {
                triple: LEFT_ELBOW,
                max_angle: 185.0,
                flexion: Orientation::Clockwise,
            },
            SafetyBound {
                triple: RIGHT_ELBOW,
                max_angle: 185.0,
                flexion: Orientation::Clockwise,
            },
        ],
    }
}

fn wall_sit() -> ExerciseProfile {
    let mut profile = squat();
    profile.kind = ExerciseKind::WallSit;
    profile.name = "Wall sit".to_string();
    profile.thresholds = PhaseThresholds {
        enter: 110.0,
        exit: 150.0,
        bottom_angle: 100.0,
    };
    profile.timing = RepTiming {
        min_dwell_seconds: 1.0,
        min_rep_interval_seconds: 2.0,
        min_exit_velocity: 10.0,
        hold_seconds: Some(1.0),
    };
    profile
}

fn neck_flexion() -> ExerciseProfile {
    ExerciseProfile {
        kind: ExerciseKind::NeckFlexion,
        name: "Neck flexion".to_string(),
        primary: vec![LEFT_NECK],
        model: PhaseModel::Simple,
        thresholds: PhaseThresholds {
            enter: 145.0,
            exit: 160.0,
            bottom_angle: 140.0,
        },
        timing: RepTiming {
            min_dwell_seconds: 0.3,
            min_rep_interval_seconds: 1.5,
            min_exit_velocity: 10.0,
            hold_seconds: None,
        },
        visibility: VisibilityRequirement {
            joints: vec![Joint::LeftEar, Joint::LeftShoulder, Joint::LeftHip],
            min_visible: 2,
            confidence_threshold: 0.3,
        },
        form: Vec::new(),
        safety: Vec::new(),
    }
}
