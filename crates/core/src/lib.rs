//! Core library for imagesmith
//!
//! This crate contains the pipeline action contract, the `run` action, command
//! routing and execution, sandbox volume exposure, recipe loading, the pipeline
//! driver, logging and error handling.

pub mod action;
pub mod actions;
pub mod command;
pub mod context;
pub mod errors;
pub mod logging;
pub mod machine;
pub mod mount;
pub mod paths;
pub mod pipeline;
pub mod recipe;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
