use crate::error::EventBusError;
use crate::landmark::Joint;
use crate::phase::{Phase, RepRejection};
use crate::profile::ExerciseKind;
use crate::session::FrameTelemetry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events emitted by an exercise session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session began tracking an exercise
    SessionStarted {
        session_id: Uuid,
        exercise: ExerciseKind,
        started_at: DateTime<Utc>,
    },
    /// A session was closed
    SessionEnded {
        session_id: Uuid,
        exercise: ExerciseKind,
        rep_count: u32,
        ended_at: DateTime<Utc>,
    },
    /// Counters and trackers were cleared for a new set
    SessionReset {
        session_id: Uuid,
        timestamp: SystemTime,
    },
    /// The movement phase changed
    PhaseChanged {
        from: Phase,
        to: Phase,
        timestamp: SystemTime,
    },
    /// A rep passed every gate and was counted
    RepCompleted {
        rep_count: u32,
        dwell_seconds: f64,
        min_angle: f64,
        timestamp: SystemTime,
    },
    /// A flexion/extension cycle failed one or more gates
    RepRejected {
        reasons: Vec<RepRejection>,
        dwell_seconds: f64,
        min_angle: f64,
        timestamp: SystemTime,
    },
    /// Too many consecutive unusable frames; the session fell back to idle
    TrackingLost {
        invalid_frames: u32,
        timestamp: SystemTime,
    },
    /// A joint exceeded its plausible range
    SafetyAlert {
        joint: Joint,
        angle: f64,
        max_angle: f64,
        message: String,
        timestamp: SystemTime,
    },
    /// Rolling form score stayed below the floor
    SustainedPoorForm {
        mean_score: f64,
        timestamp: SystemTime,
    },
    /// Per-frame telemetry is ready
    Telemetry(FrameTelemetry),
}

impl SessionEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            SessionEvent::SessionStarted { started_at, .. } => SystemTime::from(*started_at),
            SessionEvent::SessionEnded { ended_at, .. } => SystemTime::from(*ended_at),
            SessionEvent::SessionReset { timestamp, .. } => *timestamp,
            SessionEvent::PhaseChanged { timestamp, .. } => *timestamp,
            SessionEvent::RepCompleted { timestamp, .. } => *timestamp,
            SessionEvent::RepRejected { timestamp, .. } => *timestamp,
            SessionEvent::TrackingLost { timestamp, .. } => *timestamp,
            SessionEvent::SafetyAlert { timestamp, .. } => *timestamp,
            SessionEvent::SustainedPoorForm { timestamp, .. } => *timestamp,
            SessionEvent::Telemetry(telemetry) => {
                crate::landmark::from_timestamp_ms(telemetry.timestamp_ms)
            }
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::SessionStarted {
                session_id,
                exercise,
                ..
            } => format!("Session {} started: {}", session_id, exercise),
            SessionEvent::SessionEnded {
                session_id,
                rep_count,
                ..
            } => format!("Session {} ended with {} reps", session_id, rep_count),
            SessionEvent::SessionReset { session_id, .. } => {
                format!("Session {} reset", session_id)
            }
            SessionEvent::PhaseChanged { from, to, .. } => {
                format!("Phase {} -> {}", from, to)
            }
            SessionEvent::RepCompleted { rep_count, .. } => {
                format!("Rep {} completed", rep_count)
            }
            SessionEvent::RepRejected { reasons, .. } => {
                let reasons: Vec<&str> = reasons.iter().map(RepRejection::description).collect();
                format!("Rep rejected: {}", reasons.join(", "))
            }
            SessionEvent::TrackingLost { invalid_frames, .. } => {
                format!("Tracking lost after {} unusable frames", invalid_frames)
            }
            SessionEvent::SafetyAlert { message, angle, .. } => {
                format!("{} ({:.1}°)", message, angle)
            }
            SessionEvent::SustainedPoorForm { mean_score, .. } => {
                format!("Sustained poor form (mean score {:.1})", mean_score)
            }
            SessionEvent::Telemetry(telemetry) => {
                format!("Telemetry for frame {}", telemetry.frame_id)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::SessionEnded { .. } => "session_ended",
            SessionEvent::SessionReset { .. } => "session_reset",
            SessionEvent::PhaseChanged { .. } => "phase_changed",
            SessionEvent::RepCompleted { .. } => "rep_completed",
            SessionEvent::RepRejected { .. } => "rep_rejected",
            SessionEvent::TrackingLost { .. } => "tracking_lost",
            SessionEvent::SafetyAlert { .. } => "safety_alert",
            SessionEvent::SustainedPoorForm { .. } => "sustained_poor_form",
            SessionEvent::Telemetry(_) => "telemetry",
        }
    }
}

/// Event bus for session events using a broadcast channel.
///
/// Publishing never blocks, so it is safe to call from the synchronous frame
/// path; slow receivers lag rather than stall the producer.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter and a name used in logs
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) -> Result<usize, EventBusError> {
        match &event {
            SessionEvent::SessionStarted { .. } | SessionEvent::SessionEnded { .. } => {
                info!("{}", event.description());
            }
            SessionEvent::TrackingLost { .. } | SessionEvent::SafetyAlert { .. } => {
                warn!("{}", event.description());
            }
            SessionEvent::Telemetry(_) => {}
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&SessionEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<SessionEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SessionEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Event handler trait for components that consume session events
#[async_trait::async_trait]
pub trait EventHandler: Send {
    /// Handle one event
    async fn handle_event(&mut self, event: SessionEvent) -> Result<(), EventBusError>;

    /// Name used in logs
    fn handler_name(&self) -> &str;

    /// Events this handler wants
    fn event_filter(&self) -> EventFilter;
}
