use super::orchestrator::SharedShutdownSender;
use super::shutdown::send_shutdown;
use super::{FormtrackOrchestrator, ShutdownReason};
use crate::error::{FormtrackError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl FormtrackOrchestrator {
    /// Wait for a shutdown reason, then shut down gracefully.
    ///
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("formtrack is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| FormtrackError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let reason = shutdown_receiver
            .await
            .map_err(|_| FormtrackError::system("Shutdown channel closed unexpectedly"))?;
        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown(&reason).await?;
        info!("formtrack shutdown complete");
        Ok(exit_code)
    }

    /// Turn SIGINT and SIGTERM into shutdown requests
    fn setup_signal_handlers(&self) {
        #[cfg(unix)]
        {
            tokio::spawn(watch_sigterm(
                Arc::clone(&self.shutdown_sender),
                self.cancellation_token.clone(),
            ));
        }

        let sender = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Received SIGINT signal (Ctrl+C)");
                        send_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
                    }
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                },
            }
        });
    }
}

#[cfg(unix)]
async fn watch_sigterm(sender: SharedShutdownSender, token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = token.cancelled() => {}
        Some(()) = sigterm.recv() => {
            info!("Received SIGTERM signal");
            send_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
        }
    }
}
