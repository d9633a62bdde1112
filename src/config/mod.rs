// src/config/mod.rs

//! Test-suite configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a suite file from disk (`loader.rs`).
//! - Validate basic invariants like known dependencies (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, TestConfig};
