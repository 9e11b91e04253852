#![deny(unused)]
//! Logging, tracing and metrics for replbox.

pub mod metrics;
pub mod tracing_layer;

pub use self::metrics::{
    setup_metrics_recorder, track_execution, track_request, track_session_event, SessionEvent,
};
pub use tracing_layer::configure_tracing;
