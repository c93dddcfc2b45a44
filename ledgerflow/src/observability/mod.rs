//! Observability utilities: subscriber setup and run counters.

mod logging;
mod metrics;

pub use logging::{init_tracing, LogConfig};
pub use metrics::{MetricsSnapshot, PipelineCounters, PipelineMetrics};
