use super::orchestrator::SharedShutdownSender;
use super::types::{ComponentState, ShutdownReason, INGEST, TELEMETRY};
use super::FormtrackOrchestrator;
use crate::error::{FormtrackError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

const INGEST_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const TELEMETRY_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Deliver the first shutdown reason; later ones are ignored
pub(super) async fn send_shutdown(sender: &SharedShutdownSender, reason: ShutdownReason) -> bool {
    match sender.lock().await.take() {
        Some(sender) => sender.send(reason).is_ok(),
        None => {
            debug!("Shutdown already requested, ignoring {:?}", reason);
            false
        }
    }
}

impl FormtrackOrchestrator {
    /// Ask [`Self::run`] to shut down. Returns `false` if a shutdown was
    /// already requested.
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        send_shutdown(&self.shutdown_sender, reason).await
    }

    /// Stop ingest, end the session, then flush and stop the telemetry sink
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = reason.exit_code();

        // The producer stops first so the sink sees everything it published
        self.ingest_token.cancel();
        if let Err(e) = self.stop_component(INGEST).await {
            error!("Error stopping ingest: {}", e);
            exit_code = 1;
        }

        if let Some(summary) = self.controller.end_session() {
            info!(
                "Session {} ({}) finished with {} reps",
                summary.session_id, summary.exercise, summary.rep_count
            );
        }

        self.telemetry_token.cancel();
        if let Err(e) = self.stop_component(TELEMETRY).await {
            error!("Error stopping telemetry: {}", e);
            exit_code = 1;
        }

        self.cancellation_token.cancel();
        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for a component's task to finish, bounded by its stop timeout
    async fn stop_component(&mut self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let (task, limit) = match component {
            INGEST => (self.ingest_task.take(), INGEST_STOP_TIMEOUT),
            TELEMETRY => (self.telemetry_task.take(), TELEMETRY_STOP_TIMEOUT),
            other => {
                return Err(FormtrackError::component(
                    other.to_string(),
                    "unknown component".to_string(),
                ))
            }
        };

        let Some(task) = task else {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
            return Ok(());
        };

        match timeout(limit, task).await {
            Ok(Ok(count)) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped after {} items", component, count);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(FormtrackError::component(component.to_string(), e.to_string()))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(FormtrackError::component(
                    component.to_string(),
                    "stop timeout".to_string(),
                ))
            }
        }
    }
}
