//! Core type definitions for replbox.

pub mod session;

pub use session::*;
