//! Observability infrastructure - Tracing and Metrics

mod config;
mod metrics;
mod tracing_setup;

pub use config::{MetricsConfig, ObservabilityConfig, TracingConfig};
pub use metrics::{
    create_metrics_router, init_metrics, record_http_request, record_queue_dispatch,
    record_task_completed, record_transition, PrometheusMetrics,
};
pub use tracing_setup::{init_tracing, shutdown_tracing};
