use super::orchestrator::{OutputWriter, SharedShutdownSender};
use super::shutdown::send_shutdown;
use super::sink::TelemetrySink;
use super::types::{ComponentState, ShutdownReason, INGEST, TELEMETRY};
use super::FormtrackOrchestrator;
use crate::error::{EventBusError, FormtrackError, Result};
use crate::events::{EventHandler, EventReceiver};
use crate::session::{SessionController, SubmitOutcome};
use crate::source::LandmarkSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl FormtrackOrchestrator {
    /// Register components and start the exercise session.
    ///
    /// Fails on an invalid profile before any frame is read.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing formtrack for {}", self.profile.name);

        {
            let mut states = self.component_states.lock().await;
            states.insert(INGEST.to_string(), ComponentState::Stopped);
            states.insert(TELEMETRY.to_string(), ComponentState::Stopped);
        }

        // Subscribe before the session starts so its start event is written too
        if let Some(sink) = &self.sink {
            self.sink_receiver = Some(
                self.event_bus
                    .subscribe_filtered(sink.event_filter(), sink.handler_name()),
            );
        }

        let session_id = self.controller.start_session(self.profile.clone())?;
        info!("Session {} ready for {}", session_id, self.profile.kind);
        Ok(())
    }

    /// Spawn the telemetry sink, then the ingest task
    pub async fn start(&mut self) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| FormtrackError::system("Telemetry sink already started"))?;
        let receiver = match self.sink_receiver.take() {
            Some(receiver) => receiver,
            None => self
                .event_bus
                .subscribe_filtered(sink.event_filter(), sink.handler_name()),
        };
        let source = self
            .source
            .take()
            .ok_or_else(|| FormtrackError::system("Landmark source already started"))?;

        self.set_component_state(TELEMETRY, ComponentState::Starting)
            .await;
        self.telemetry_task = Some(tokio::spawn(run_telemetry(
            sink,
            receiver,
            self.telemetry_token.clone(),
            Arc::clone(&self.shutdown_sender),
        )));
        self.set_component_state(TELEMETRY, ComponentState::Running)
            .await;

        self.set_component_state(INGEST, ComponentState::Starting)
            .await;
        info!("Reading landmark frames from {}", source.name());
        self.ingest_task = Some(tokio::spawn(run_ingest(
            source,
            Arc::clone(&self.controller),
            self.ingest_token.clone(),
            Arc::clone(&self.shutdown_sender),
        )));
        self.set_component_state(INGEST, ComponentState::Running)
            .await;

        info!("formtrack started");
        Ok(())
    }
}

/// Feed frames to the controller until the source ends or the task is
/// cancelled. Returns the number of frames read.
async fn run_ingest(
    mut source: Box<dyn LandmarkSource>,
    controller: Arc<SessionController>,
    token: CancellationToken,
    shutdown: SharedShutdownSender,
) -> u64 {
    let mut frames = 0u64;

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => {
                debug!("Ingest cancelled after {} frames", frames);
                return frames;
            }
            next = source.next_frame() => next,
        };

        match next {
            Ok(Some(frame)) => {
                frames += 1;
                if matches!(controller.submit_frame(&frame), SubmitOutcome::NoSession) {
                    warn!("Frame {} arrived with no active session", frame.id);
                }
                // Let the telemetry sink drain between frames
                tokio::task::yield_now().await;
            }
            Ok(None) => {
                info!("{} exhausted after {} frames", source.name(), frames);
                send_shutdown(&shutdown, ShutdownReason::InputExhausted).await;
                return frames;
            }
            Err(e) => {
                error!("Failed to read frame from {}: {}", source.name(), e);
                send_shutdown(&shutdown, ShutdownReason::Error(e.to_string())).await;
                return frames;
            }
        }
    }
}

/// Write events until cancelled, then drain what is already queued.
/// Returns the number of lines written.
async fn run_telemetry(
    mut sink: TelemetrySink<OutputWriter>,
    mut receiver: EventReceiver,
    token: CancellationToken,
    shutdown: SharedShutdownSender,
) -> u64 {
    loop {
        let event = tokio::select! {
            biased;
            event = receiver.recv() => event,
            _ = token.cancelled() => break,
        };

        match event {
            Ok(event) => {
                if let Err(e) = sink.handle_event(event).await {
                    error!("Telemetry output failed: {}", e);
                    send_shutdown(&shutdown, ShutdownReason::Error(e.to_string())).await;
                    return sink.lines_written();
                }
            }
            Err(EventBusError::Lagged { .. }) => continue,
            Err(_) => break,
        }
    }

    loop {
        match receiver.try_recv() {
            Ok(Some(event)) => {
                if let Err(e) = sink.handle_event(event).await {
                    error!("Telemetry output failed while draining: {}", e);
                    break;
                }
            }
            Err(EventBusError::Lagged { .. }) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    if let Err(e) = sink.flush().await {
        error!("Failed to flush telemetry output: {}", e);
    }
    debug!("{} stopped after {} lines", receiver.name(), sink.lines_written());
    sink.lines_written()
}
