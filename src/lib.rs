pub mod angle;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod form;
pub mod landmark;
pub mod phase;
pub mod profile;
pub mod session;
pub mod source;
pub mod visibility;

pub use angle::{AngleCalculator, AngleSample, FilterSettings, Orientation};
pub use app::{ComponentState, FormtrackOrchestrator, ShutdownReason, TelemetrySink};
pub use config::FormtrackConfig;
pub use error::{EventBusError, FormtrackError, FrameError, ProfileError, Result};
pub use events::{EventBus, EventFilter, EventHandler, EventReceiver, SessionEvent};
pub use form::{FeedbackThrottle, FormScorer, SafetyWarning};
pub use landmark::{Joint, JointTriple, Landmark, LandmarkFrame, YOrigin, JOINT_COUNT};
pub use phase::{Phase, PhaseStateMachine, RepOutcome, RepRejection};
pub use profile::{ExerciseKind, ExerciseProfile};
pub use session::{
    ExerciseSession, FrameStatus, FrameTelemetry, SessionController, SessionStats,
    SubmitOutcome,
};
pub use source::{JsonLinesSource, LandmarkSource, SyntheticSource};
pub use visibility::{VisibilityGate, VisibilityReport};
