use crate::landmark::Joint;
use crate::profile::SafetyBound;
use serde::Serialize;

/// A joint bent past its plausible range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyWarning {
    pub text: String,
    pub joint: Joint,
    pub angle: f64,
    pub max_angle: f64,
}

/// Compare each bound's reflex angle against its maximum.
///
/// Runs independently of the form score; a bound whose triple is
/// unavailable this frame is skipped.
pub fn check_safety<F>(bounds: &[SafetyBound], mut reflex_angle_of: F) -> Vec<SafetyWarning>
where
    F: FnMut(&SafetyBound) -> Option<f64>,
{
    bounds
        .iter()
        .filter_map(|bound| {
            let angle = reflex_angle_of(bound)?;
            if angle <= bound.max_angle {
                return None;
            }

            let joint = bound.triple.vertex;
            Some(SafetyWarning {
                text: format!("{}: hyperextension detected", joint.display_name()),
                joint,
                angle,
                max_angle: bound.max_angle,
            })
        })
        .collect()
}
