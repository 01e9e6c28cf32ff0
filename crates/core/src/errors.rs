//! Error types and handling
//!
//! Errors are grouped per domain (recipe configuration, sandbox machine,
//! command execution) and wrapped in the top-level [`ImagesmithError`] so
//! callers can match on the domain or just propagate with `?`.

use crate::action::Phase;
use std::path::PathBuf;
use thiserror::Error;

/// Recipe and action configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Recipe file parsing error
    #[error("Failed to parse recipe: {message}")]
    Parsing { message: String },

    /// Action configuration rejected during verification
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Recipe file I/O error
    #[error("Failed to read recipe file")]
    Io(#[from] std::io::Error),

    /// Recipe file not found
    #[error("Recipe file not found: {path}")]
    NotFound { path: String },
}

/// Sandbox machine errors
#[derive(Error, Debug)]
pub enum MachineError {
    /// A host directory could not be exposed inside the sandbox
    #[error("Cannot expose {} as a machine volume: {reason}", path.display())]
    VolumeExposure { path: PathBuf, reason: String },
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// The process could not be started
    #[error("Failed to launch '{label}'")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but did not exit successfully
    #[error("'{label}' failed with {}", describe_exit(*code))]
    Failed { label: String, code: Option<i32> },

    /// Invalid bind mount request
    #[error("Invalid bind mount: {message}")]
    InvalidMount { message: String },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ImagesmithError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sandbox machine errors
    #[error("Machine error: {0}")]
    Machine(#[from] MachineError),

    /// Command execution errors
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// A phase hook of a pipeline action failed
    #[error("Action '{label}' failed during {}", phase.as_str())]
    Action {
        label: String,
        phase: Phase,
        #[source]
        source: Box<ImagesmithError>,
    },
}

impl ImagesmithError {
    /// Strip any [`ImagesmithError::Action`] wrapping and return the underlying error
    pub fn root(&self) -> &ImagesmithError {
        match self {
            ImagesmithError::Action { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Convenience type alias for Results with ImagesmithError
pub type Result<T> = std::result::Result<T, ImagesmithError>;
