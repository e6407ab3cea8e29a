use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Movement phase of the tracked joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No trusted angle yet, or tracking was lost
    Idle,
    Extended,
    /// Moving toward flexion, not yet past the enter threshold
    Flexing,
    Flexed,
    /// Flexed position sustained for the profile's hold duration
    Holding,
    /// Moving back toward extension, not yet past the exit threshold
    Extending,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Extended => "extended",
            Phase::Flexing => "flexing",
            Phase::Flexed => "flexed",
            Phase::Holding => "holding",
            Phase::Extending => "extending",
        }
    }

    /// True while a rep candidate is open (flexion has been entered)
    pub fn in_flexion(&self) -> bool {
        matches!(self, Phase::Flexed | Phase::Holding | Phase::Extending)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gating predicate a candidate rep failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepRejection {
    /// Flexion was held for less than the minimum dwell
    DwellTooShort,
    /// The movement never got as deep as the bottom angle requirement
    BottomNotReached,
    /// Angular velocity at the exit crossing was below the minimum
    ExitTooSlow,
    /// Less than the minimum interval since the previous accepted rep
    TooSoon,
    /// The required hold was not sustained before extending
    HoldNotCompleted,
}

impl RepRejection {
    pub fn description(&self) -> &'static str {
        match self {
            RepRejection::DwellTooShort => "dwell time too short",
            RepRejection::BottomNotReached => "bottom angle not reached",
            RepRejection::ExitTooSlow => "exit velocity too low",
            RepRejection::TooSoon => "too soon after previous rep",
            RepRejection::HoldNotCompleted => "hold not completed",
        }
    }
}

impl fmt::Display for RepRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One recorded phase change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: SystemTime,
}

/// Result of closing a rep candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepOutcome {
    Accepted {
        rep_count: u32,
        dwell_seconds: f64,
        min_angle: f64,
        exit_velocity: f64,
    },
    Rejected {
        reasons: Vec<RepRejection>,
        dwell_seconds: f64,
        min_angle: f64,
        exit_velocity: f64,
    },
}

impl RepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RepOutcome::Accepted { .. })
    }

    pub fn rejections(&self) -> &[RepRejection] {
        match self {
            RepOutcome::Accepted { .. } => &[],
            RepOutcome::Rejected { reasons, .. } => reasons,
        }
    }
}

/// What a single angle sample did to the machine
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseUpdate {
    pub previous: Phase,
    pub phase: Phase,
    pub rep: Option<RepOutcome>,
}

impl PhaseUpdate {
    pub fn changed(&self) -> bool {
        self.previous != self.phase
    }

    pub fn rep_completed(&self) -> bool {
        self.rep.as_ref().map(RepOutcome::is_accepted).unwrap_or(false)
    }
}
