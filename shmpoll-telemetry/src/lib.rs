//! # shmpoll Telemetry
//!
//! Crate for logging and metrics around the epoll multiplexing core.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{EventOrigin, MetricsRecorder, WaitRegime};
