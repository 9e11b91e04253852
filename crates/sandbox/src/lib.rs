#![deny(unused)]
//! Sandbox sessions for replbox.
//!
//! This crate owns everything between a decoded operation and the container
//! backend: the runtime adapter, the command synthesizer, the session
//! registry and the lifecycle manager that ties them together.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Gateway (classify + dispatch)         │
//! │    ↓ create / execute / kill           │
//! ├────────────────────────────────────────┤
//! │  SessionManager                        │
//! │    ├─ SessionRegistry (ownership, TTL) │
//! │    └─ synthesize() (code → sh line)    │
//! ├────────────────────────────────────────┤
//! │  ContainerRuntime (DockerRuntime)      │
//! │    ↓ Docker API via bollard            │
//! ├────────────────────────────────────────┤
//! │  Container (python:3, node:18-alpine)  │
//! │    /sandbox  (tmpfs, writable)         │
//! │    No network, no caps                 │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use replbox_sandbox::{DockerRuntime, SessionManager};
//!
//! let runtime = Arc::new(DockerRuntime::new((&settings).into())?);
//! let manager = Arc::new(SessionManager::new(runtime, LanguageRegistry::default(), settings));
//!
//! let id = manager.create_session("python").await?;
//! let output = manager.execute(&id, "python", "print(1+1)").await?;
//! manager.kill_session(&id).await;
//! ```

pub mod command;
pub mod engine;
pub mod manager;
pub mod registry;

pub use command::{shell_quote, synthesize, CommandSpec};
pub use engine::{
    ContainerRuntime, ContainerSettings, DockerRuntime, ExecOutput, MockRuntime, RuntimeCall,
    RuntimeOp,
};
pub use manager::{KillOutcome, SessionManager};
pub use registry::{KillTransition, Session, SessionRegistry};
