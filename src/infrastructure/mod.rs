//! Infrastructure layer - storage backends, services, sinks and telemetry

pub mod audit;
pub mod deal;
pub mod logging;
pub mod observability;
pub mod queue;
pub mod services;
pub mod sinks;
pub mod storage;
pub mod task;
pub mod version;
