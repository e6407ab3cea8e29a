//! Exercise sessions: the per-exercise owner of all mutable tracking state,
//! and the single-writer controller that feeds it frames.

mod controller;
mod exercise;
mod stats;
mod telemetry;

#[cfg(test)]
mod tests;

pub use controller::{BusyGuard, SessionController, SessionSummary, SubmitOutcome};
pub use exercise::{ExerciseSession, JOINTS_NOT_VISIBLE_MESSAGE};
pub use stats::SessionStats;
pub use telemetry::{FrameOutcome, FrameStatus, FrameTelemetry};
