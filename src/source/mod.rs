//! Landmark sources: the push side of the pipeline, standing in for the
//! external pose estimator.

mod json_lines;
mod synthetic;

pub use json_lines::{FrameRecord, JsonLinesSource};
pub use synthetic::{pose_for_profile, posed_landmarks, RepPattern, SyntheticSource};

use crate::error::Result;
use crate::landmark::LandmarkFrame;

/// A stream of landmark frames
#[async_trait::async_trait]
pub trait LandmarkSource: Send {
    /// Next frame, or `None` once the source is exhausted
    async fn next_frame(&mut self) -> Result<Option<LandmarkFrame>>;

    /// Name used in logs
    fn name(&self) -> &str;
}
