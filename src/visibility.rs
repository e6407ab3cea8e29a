//! Visibility gate: decides whether enough of an exercise's required joints
//! are confidently visible to trust a frame.

use crate::landmark::{Joint, LandmarkFrame};
use crate::profile::VisibilityRequirement;
use serde::Serialize;

/// Outcome of gating one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityReport {
    pub passed: bool,
    pub visible: usize,
    /// Visible joints needed to pass
    pub min_visible: usize,
    /// Required joints not visible this frame, in requirement order
    pub missing: Vec<Joint>,
}

/// Occlusion-tolerant visibility check for one exercise
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    requirement: VisibilityRequirement,
}

impl VisibilityGate {
    pub fn new(requirement: VisibilityRequirement) -> Self {
        Self { requirement }
    }

    pub fn evaluate(&self, frame: &LandmarkFrame) -> VisibilityReport {
        let threshold = self.requirement.confidence_threshold;
        let missing: Vec<Joint> = self
            .requirement
            .joints
            .iter()
            .copied()
            .filter(|joint| !frame.is_visible(*joint, threshold))
            .collect();

        let visible = self.requirement.joints.len() - missing.len();

        VisibilityReport {
            passed: visible >= self.requirement.min_visible,
            visible,
            min_visible: self.requirement.min_visible,
            missing,
        }
    }

    pub fn requirement(&self) -> &VisibilityRequirement {
        &self.requirement
    }
}
