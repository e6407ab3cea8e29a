use super::sink::TelemetrySink;
use super::types::{ComponentState, ShutdownReason};
use crate::config::FormtrackConfig;
use crate::error::Result;
use crate::events::{EventBus, EventReceiver};
use crate::profile::ExerciseProfile;
use crate::session::SessionController;
use crate::source::LandmarkSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Destination of the telemetry stream
pub type OutputWriter = Box<dyn AsyncWrite + Unpin + Send>;

pub(super) type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Runs one exercise session end to end: frames from a landmark source go
/// through the session controller, and telemetry goes out as JSON lines.
pub struct FormtrackOrchestrator {
    pub(super) config: FormtrackConfig,
    pub(super) profile: ExerciseProfile,
    pub(super) event_bus: EventBus,
    pub(super) controller: Arc<SessionController>,

    // Components, moved into their tasks on start
    pub(super) source: Option<Box<dyn LandmarkSource>>,
    pub(super) sink: Option<TelemetrySink<OutputWriter>>,
    pub(super) sink_receiver: Option<EventReceiver>,
    pub(super) ingest_task: Option<JoinHandle<u64>>,
    pub(super) telemetry_task: Option<JoinHandle<u64>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: SharedShutdownSender,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) ingest_token: CancellationToken,
    pub(super) telemetry_token: CancellationToken,
}

impl FormtrackOrchestrator {
    /// Create an orchestrator for `profile`, reading from `source` and
    /// writing telemetry to `output`
    pub fn new(
        config: FormtrackConfig,
        profile: ExerciseProfile,
        source: Box<dyn LandmarkSource>,
        output: OutputWriter,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.session.event_bus_capacity);
        let controller = Arc::new(SessionController::new(config.clone(), event_bus.clone()));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let cancellation_token = CancellationToken::new();

        Ok(Self {
            ingest_token: cancellation_token.child_token(),
            telemetry_token: cancellation_token.child_token(),
            cancellation_token,
            config,
            profile,
            event_bus,
            controller,
            source: Some(source),
            sink: Some(TelemetrySink::new(output, false)),
            sink_receiver: None,
            ingest_task: None,
            telemetry_task: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
        })
    }

    /// Write every session event to the output, not just frame telemetry.
    /// Takes effect only before [`Self::initialize`].
    pub fn set_event_output(&mut self, enabled: bool) {
        if let Some(sink) = self.sink.take() {
            self.sink = Some(TelemetrySink::new(sink.into_inner(), enabled));
        }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &FormtrackConfig {
        &self.config
    }

    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states
            .lock()
            .await
            .insert(component.to_string(), state);
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    pub async fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).copied()
    }

    /// Snapshot of every registered component's state
    pub async fn component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }
}
