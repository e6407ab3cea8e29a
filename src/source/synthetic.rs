use super::LandmarkSource;
use crate::angle::Orientation;
use crate::error::Result;
use crate::landmark::{from_timestamp_ms, timestamp_ms, JointTriple, Landmark, LandmarkFrame, JOINT_COUNT};
use crate::profile::ExerciseProfile;
use std::time::{Duration, SystemTime};
use tracing::debug;

const SEGMENT_LENGTH: f32 = 0.2;
const CONFIDENCE: f32 = 0.9;

/// Landmarks in which every triple in `triples` measures exactly `angle`
/// degrees (up to f32 precision), bending toward `bend`.
///
/// Each triple's vertex gets its own column; the proximal joint sits straight
/// above it. Joints not part of any triple stay at the image centre.
pub fn posed_landmarks(
    triples: &[(JointTriple, Orientation)],
    angle: f64,
) -> [Landmark; JOINT_COUNT] {
    let mut landmarks = [Landmark::new(0.5, 0.5, CONFIDENCE); JOINT_COUNT];
    let columns = triples.len().max(1) as f32;
    let radians = angle.to_radians();

    for (i, (triple, bend)) in triples.iter().enumerate() {
        let vx = (i as f32 + 0.5) / columns;
        let vy = 0.5;
        // Positive x puts the distal joint on the clockwise side in y-down coordinates
        let side = match bend {
            Orientation::Clockwise => 1.0,
            Orientation::CounterClockwise => -1.0,
        };

        landmarks[triple.vertex.index()] = Landmark::new(vx, vy, CONFIDENCE);
        landmarks[triple.proximal.index()] = Landmark::new(vx, vy - SEGMENT_LENGTH, CONFIDENCE);
        landmarks[triple.distal.index()] = Landmark::new(
            vx + side * SEGMENT_LENGTH * radians.sin() as f32,
            vy - SEGMENT_LENGTH * radians.cos() as f32,
            CONFIDENCE,
        );
    }

    landmarks
}

/// Pose of a profile's primary triples at `angle`, bent toward each triple's
/// natural flexion side
pub fn pose_for_profile(profile: &ExerciseProfile, angle: f64) -> [Landmark; JOINT_COUNT] {
    let triples: Vec<(JointTriple, Orientation)> = profile
        .primary
        .iter()
        .map(|triple| {
            let bend = profile
                .safety
                .iter()
                .find(|bound| bound.triple == *triple)
                .map(|bound| bound.flexion)
                .unwrap_or(Orientation::Clockwise);
            (*triple, bend)
        })
        .collect();

    posed_landmarks(&triples, angle)
}

/// Shape of one generated repetition, in degrees and frames
#[derive(Debug, Clone, PartialEq)]
pub struct RepPattern {
    pub top_angle: f64,
    pub bottom_angle: f64,
    /// Degrees moved per frame while flexing or extending
    pub step_degrees: f64,
    pub hold_top_frames: u32,
    pub hold_bottom_frames: u32,
}

impl RepPattern {
    /// A pattern that clears every gate of `profile`
    pub fn for_profile(profile: &ExerciseProfile) -> Self {
        let thresholds = &profile.thresholds;
        Self {
            top_angle: (thresholds.exit + 20.0).min(175.0),
            bottom_angle: (thresholds.bottom_angle - 10.0).max(5.0),
            step_degrees: 6.0,
            hold_top_frames: 10,
            hold_bottom_frames: 10,
        }
    }

    /// Angles for one full repetition, starting and ending at the top
    pub fn angles(&self) -> Vec<f64> {
        let step = self.step_degrees.abs().max(0.1);
        let mut angles = Vec::new();
        angles.extend((0..self.hold_top_frames).map(|_| self.top_angle));

        let mut angle = self.top_angle;
        while angle > self.bottom_angle {
            angles.push(angle);
            angle -= step;
        }
        angles.extend((0..self.hold_bottom_frames.max(1)).map(|_| self.bottom_angle));

        angle = self.bottom_angle + step;
        while angle < self.top_angle {
            angles.push(angle);
            angle += step;
        }
        angles.push(self.top_angle);
        angles
    }
}

/// Generates clean repetitions of a profile's primary movement.
///
/// Timestamps advance by the frame interval from `start`, independent of the
/// wall clock, so runs are reproducible.
pub struct SyntheticSource {
    profile: ExerciseProfile,
    angles: Vec<f64>,
    frame_interval: Duration,
    start: SystemTime,
    total_frames: u64,
    next_id: u64,
    realtime: bool,
}

impl SyntheticSource {
    pub fn new(profile: ExerciseProfile, reps: u32, fps: u32) -> Self {
        let angles = RepPattern::for_profile(&profile).angles();
        let total_frames = angles.len() as u64 * reps as u64;
        Self {
            profile,
            angles,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            start: from_timestamp_ms(timestamp_ms(SystemTime::now())),
            total_frames,
            next_id: 0,
            realtime: false,
        }
    }

    pub fn with_pattern(mut self, pattern: &RepPattern, reps: u32) -> Self {
        self.angles = pattern.angles();
        self.total_frames = self.angles.len() as u64 * reps as u64;
        self
    }

    pub fn with_start(mut self, start: SystemTime) -> Self {
        self.start = start;
        self
    }

    /// Pace frames at the frame interval instead of emitting them immediately
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frame `id` of the generated sequence
    pub fn frame_at(&self, id: u64) -> LandmarkFrame {
        let angle = self.angles[(id % self.angles.len() as u64) as usize];
        let timestamp = self.start + self.frame_interval.mul_f64(id as f64);
        LandmarkFrame::new(id, timestamp, pose_for_profile(&self.profile, angle))
    }
}

#[async_trait::async_trait]
impl LandmarkSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<Option<LandmarkFrame>> {
        if self.next_id >= self.total_frames || self.angles.is_empty() {
            debug!("Synthetic source finished after {} frames", self.next_id);
            return Ok(None);
        }

        if self.realtime && self.next_id > 0 {
            tokio::time::sleep(self.frame_interval).await;
        }

        let frame = self.frame_at(self.next_id);
        self.next_id += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
