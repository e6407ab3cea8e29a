//! Form scoring: joint angles against per-phase targets, rolling form
//! quality, safety bounds and throttled feedback.

mod feedback;
mod safety;
mod scorer;

pub use feedback::{FeedbackThrottle, ThrottleSettings};
pub use safety::{check_safety, SafetyWarning};
pub use scorer::{
    FeedbackMessage, FormAssessment, FormScorer, FormSettings, SUSTAINED_POOR_FORM_MESSAGE,
};
