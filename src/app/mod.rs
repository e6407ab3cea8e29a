//! Application wiring: landmark source in, JSON-lines telemetry out, with
//! signal handling and graceful shutdown.

mod orchestrator;
mod runtime;
mod shutdown;
mod sink;
mod startup;
mod types;


pub use orchestrator::{FormtrackOrchestrator, OutputWriter};
pub use sink::TelemetrySink;
pub use types::{ComponentState, ShutdownReason};
