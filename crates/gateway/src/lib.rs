#![deny(unused)]
//! HTTP entry point for replbox.
//!
//! One endpoint carries every operation. The payload shape decides whether
//! a request creates a session, runs code in one, or kills it; the
//! dispatcher hands the classified operation to the session manager.

pub mod classifier;
pub mod dispatch;
pub mod server;

pub use classifier::{classify, classify_request, Operation};
pub use dispatch::{dispatch, status_for, CreateSessionResponse, ErrorResponse};
pub use server::{AppState, GatewayConfig, GatewayServer, HealthResponse};
