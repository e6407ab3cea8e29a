use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of joints in the skeleton topology (COCO keypoints)
pub const JOINT_COUNT: usize = 17;

/// Skeletal landmark identifiers over the fixed 17-entry COCO topology.
///
/// The discriminant is the landmark's index in every frame produced by the
/// pose estimator and is never renumbered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Joint {
    /// All joints in index order
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// Stable index of the joint within a landmark frame
    pub fn index(self) -> usize {
        self as usize
    }

    /// Joint for a landmark index, if in range
    pub fn from_index(index: usize) -> Option<Joint> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable name used in feedback messages
    pub fn display_name(self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "left eye",
            Joint::RightEye => "right eye",
            Joint::LeftEar => "left ear",
            Joint::RightEar => "right ear",
            Joint::LeftShoulder => "left shoulder",
            Joint::RightShoulder => "right shoulder",
            Joint::LeftElbow => "left elbow",
            Joint::RightElbow => "right elbow",
            Joint::LeftWrist => "left wrist",
            Joint::RightWrist => "right wrist",
            Joint::LeftHip => "left hip",
            Joint::RightHip => "right hip",
            Joint::LeftKnee => "left knee",
            Joint::RightKnee => "right knee",
            Joint::LeftAnkle => "left ankle",
            Joint::RightAnkle => "right ankle",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Three joints forming the angle measured at `vertex`.
///
/// Also serves as the identity that isolates rolling angle history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointTriple {
    pub proximal: Joint,
    pub vertex: Joint,
    pub distal: Joint,
}

impl JointTriple {
    pub const fn new(proximal: Joint, vertex: Joint, distal: Joint) -> Self {
        Self {
            proximal,
            vertex,
            distal,
        }
    }

    /// True when any joint appears twice
    pub fn is_degenerate(&self) -> bool {
        self.proximal == self.vertex || self.vertex == self.distal || self.proximal == self.distal
    }

    pub fn joints(&self) -> [Joint; 3] {
        [self.proximal, self.vertex, self.distal]
    }
}

impl fmt::Display for JointTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.proximal, self.vertex, self.distal)
    }
}

/// Vertical origin used by a landmark producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YOrigin {
    /// Image-top origin, y grows downward (the internal convention)
    #[default]
    Top,
    /// Bottom origin, y grows upward; flipped at the boundary
    Bottom,
}

/// A joint's estimated 2-D position plus confidence for one frame.
///
/// Coordinates are normalized to [0, 1] with the origin at the image's
/// top-left corner and y growing downward. Producers using a bottom origin
/// must go through [`Landmark::with_origin`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Build a landmark from producer coordinates, normalizing the y axis
    pub fn with_origin(x: f32, y: f32, confidence: f32, origin: YOrigin) -> Self {
        let y = match origin {
            YOrigin::Top => y,
            YOrigin::Bottom => 1.0 - y,
        };
        Self { x, y, confidence }
    }

    /// Visible when coordinates are finite and confidence is strictly above the threshold
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.confidence.is_finite()
            && self.confidence > threshold
    }
}

/// One frame of landmarks from the pose estimator
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    /// Producer frame identifier
    pub id: u64,
    /// Wall-clock capture time
    pub timestamp: SystemTime,
    /// Landmarks indexed by `Joint`
    pub landmarks: [Landmark; JOINT_COUNT],
}

impl LandmarkFrame {
    pub fn new(id: u64, timestamp: SystemTime, landmarks: [Landmark; JOINT_COUNT]) -> Self {
        Self {
            id,
            timestamp,
            landmarks,
        }
    }

    /// Build a frame from a producer's ordered landmark slice
    pub fn from_slice(
        id: u64,
        timestamp: SystemTime,
        landmarks: &[Landmark],
    ) -> Result<Self, FrameError> {
        let landmarks: [Landmark; JOINT_COUNT] =
            landmarks
                .try_into()
                .map_err(|_| FrameError::LandmarkCount {
                    expected: JOINT_COUNT,
                    actual: landmarks.len(),
                })?;
        Ok(Self::new(id, timestamp, landmarks))
    }

    pub fn landmark(&self, joint: Joint) -> &Landmark {
        &self.landmarks[joint.index()]
    }

    pub fn landmark_mut(&mut self, joint: Joint) -> &mut Landmark {
        &mut self.landmarks[joint.index()]
    }

    pub fn is_visible(&self, joint: Joint, threshold: f32) -> bool {
        self.landmark(joint).is_visible(threshold)
    }

    /// Timestamp as milliseconds since the Unix epoch
    pub fn timestamp_ms(&self) -> u64 {
        timestamp_ms(self.timestamp)
    }
}

/// Milliseconds since the Unix epoch, zero for pre-epoch clocks
pub fn timestamp_ms(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Wall-clock time from a millisecond epoch stamp
pub fn from_timestamp_ms(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Signed seconds from `earlier` to `later`; negative when the clock went backwards
pub fn seconds_between(earlier: SystemTime, later: SystemTime) -> f64 {
    match later.duration_since(earlier) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
