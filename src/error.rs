use crate::landmark::Joint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormtrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Exercise profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FormtrackError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Configuration problems in an exercise profile. These are fatal at session
/// start and are reported before any frame is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Profile '{profile}' has no primary joint triple")]
    MissingPrimaryTriple { profile: String },

    #[error("Profile '{profile}' uses a joint triple with repeated joints: {proximal:?}-{vertex:?}-{distal:?}")]
    DegenerateTriple {
        profile: String,
        proximal: Joint,
        vertex: Joint,
        distal: Joint,
    },

    #[error("Profile '{profile}' has invalid thresholds: enter={enter}, exit={exit} (need 0 < enter < exit <= 180)")]
    InvalidThresholds {
        profile: String,
        enter: f64,
        exit: f64,
    },

    #[error("Profile '{profile}' has invalid bottom angle requirement {bottom} (need 0 < bottom < exit)")]
    InvalidBottomAngle { profile: String, bottom: f64 },

    #[error("Profile '{profile}' has invalid value for {field}: {value}")]
    InvalidParameter {
        profile: String,
        field: &'static str,
        value: f64,
    },

    #[error("Profile '{profile}' requires {min_visible} visible joints out of {required}")]
    InvalidVisibility {
        profile: String,
        min_visible: usize,
        required: usize,
    },

    #[error("No exercise profile configured for '{kind}'")]
    UnknownExercise { kind: String },
}

/// Problems decoding a landmark frame at the estimator boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Expected {expected} landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },

    #[error("Malformed frame record at line {line}: {details}")]
    Parse { line: u64, details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,

    #[error("Handler '{handler}' failed: {details}")]
    HandlerFailed { handler: String, details: String },
}

pub type Result<T> = std::result::Result<T, FormtrackError>;
