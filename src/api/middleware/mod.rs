//! API middleware components

pub mod actor;
pub mod logging;
pub mod metrics;

pub use actor::RequestActor;
pub use logging::logging_middleware;
pub use metrics::metrics_middleware;
