//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing and per-player conversion metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{ConversionMetrics, ConversionStats};
