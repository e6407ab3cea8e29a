use crate::events::SessionEvent;
use crate::landmark::Joint;
use crate::phase::{Phase, RepRejection};
use serde::{Deserialize, Serialize};

/// How far a frame got through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// Angle, phase and form were all updated
    Processed,
    /// Too few required joints visible
    Gated,
    /// Required joints visible but no primary angle could be measured
    NoAngle,
}

/// Everything a client needs to render one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTelemetry {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    pub status: FrameStatus,
    pub raw_angle: Option<f64>,
    pub smoothed_angle: Option<f64>,
    pub velocity: Option<f64>,
    pub phase: Phase,
    pub rep_count: u32,
    pub rep_just_completed: bool,
    pub form_score: Option<f64>,
    pub feedback_messages: Vec<String>,
    pub safety_warnings: Vec<String>,
    pub missing_joints: Vec<Joint>,
    pub rejected_rep: Option<Vec<RepRejection>>,
}

/// Telemetry plus the events the frame produced, in emission order
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub telemetry: FrameTelemetry,
    pub events: Vec<SessionEvent>,
}
