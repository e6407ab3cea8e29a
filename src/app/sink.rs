use crate::error::EventBusError;
use crate::events::{EventFilter, EventHandler, SessionEvent};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Writes session output as JSON lines.
///
/// By default only per-frame telemetry is written, one `FrameTelemetry`
/// object per line. With `include_events` every session event is written in
/// its tagged form instead.
pub struct TelemetrySink<W> {
    writer: W,
    include_events: bool,
    lines_written: u64,
}

impl<W: AsyncWrite + Unpin + Send> TelemetrySink<W> {
    pub fn new(writer: W, include_events: bool) -> Self {
        Self {
            writer,
            include_events,
            lines_written: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub async fn flush(&mut self) -> Result<(), EventBusError> {
        self.writer.flush().await.map_err(|e| self.failure(e))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn failure(&self, error: impl ToString) -> EventBusError {
        EventBusError::HandlerFailed {
            handler: self.handler_name().to_string(),
            details: error.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> EventHandler for TelemetrySink<W> {
    async fn handle_event(&mut self, event: SessionEvent) -> Result<(), EventBusError> {
        let line = match (&event, self.include_events) {
            (_, true) => serde_json::to_string(&event),
            (SessionEvent::Telemetry(telemetry), false) => serde_json::to_string(telemetry),
            _ => return Ok(()),
        }
        .map_err(|e| self.failure(e))?;

        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.failure(e))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| self.failure(e))?;
        self.lines_written += 1;
        trace!("Wrote {} output lines", self.lines_written);
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "telemetry_sink"
    }

    fn event_filter(&self) -> EventFilter {
        if self.include_events {
            EventFilter::All
        } else {
            EventFilter::EventTypes(vec!["telemetry"])
        }
    }
}
