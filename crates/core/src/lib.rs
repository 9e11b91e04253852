#![deny(unused)]
//! Core types, configuration, and error definitions for replbox.
//!
//! This crate provides the building blocks shared by the sandbox engine,
//! the HTTP gateway and the binary: the error type, the layered
//! configuration, the language registry and the session data model.

pub mod config;
pub mod error;
pub mod language;
pub mod types;

pub use error::{Error, Result};
pub use language::{LanguageProfile, LanguageRegistry};
pub use types::*;
