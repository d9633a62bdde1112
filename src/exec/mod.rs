// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the test commands, using
//! `tokio::process::Command`, and reporting back to the orchestration
//! runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` used in production, which tests can replace with a
//!   fake implementation.
//! - [`test_runner`] spawns and waits on individual test processes.
//! - [`environment`] exports a test's granted resources to its process.

pub mod backend;
pub mod environment;
pub mod test_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use environment::resource_environment;
