//! Pipeline action phase contract
//!
//! Every action is driven through the same four phases, in this order:
//!
//! verify -> pre-machine -> run -> post-machine
//!
//! `verify` runs once before any sandbox exists. `pre-machine` runs only when
//! the pipeline is built inside a sandbox machine. `run` executes while the
//! target filesystem exists and before the artifact is sealed. `post-machine`
//! executes after the sandbox has exited and the final artifact exists.
//!
//! The pipeline driver owns the transitions. Inside each hook an action only
//! decides whether to act or to report [`PhaseOutcome::Skipped`].

use crate::command::CommandRunner;
use crate::context::PipelineContext;
use crate::errors::Result;
use crate::machine::SandboxMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Phases of the action contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Configuration validation, no side effects
    Verify,
    /// Sandbox resource registration
    PreMachine,
    /// Main execution
    Run,
    /// Deferred execution after artifact finalization
    PostMachine,
}

impl Phase {
    /// Get the phase name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Verify => "verify",
            Phase::PreMachine => "pre-machine",
            Phase::Run => "run",
            Phase::PostMachine => "post-machine",
        }
    }

    /// All phases in execution order
    pub fn order() -> &'static [Phase] {
        &[
            Phase::Verify,
            Phase::PreMachine,
            Phase::Run,
            Phase::PostMachine,
        ]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a phase hook did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    /// The hook performed work
    Executed,
    /// The hook had nothing to do for this configuration
    Skipped,
}

impl PhaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseOutcome::Executed => "executed",
            PhaseOutcome::Skipped => "skipped",
        }
    }
}

/// Fields shared by every action kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMetadata {
    /// Action kind as named in recipes (e.g. `run`)
    pub kind: String,
    /// Optional human-readable description from the recipe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionMetadata {
    pub fn new(kind: impl Into<String>, description: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            description,
        }
    }

    /// Label used in logs: the description, or the kind when none is set
    pub fn label(&self) -> &str {
        match self.description.as_deref() {
            Some(description) if !description.is_empty() => description,
            _ => &self.kind,
        }
    }

    /// Log the start of the action's work
    pub fn log_start(&self) {
        info!("==== {} ====", self.label());
    }
}

/// A configured pipeline step
///
/// Hooks have default implementations that do nothing, so an action kind only
/// overrides the phases it participates in.
pub trait Action: fmt::Debug {
    /// Shared action fields
    fn metadata(&self) -> &ActionMetadata;

    /// Validate the configuration. Must not perform I/O.
    fn verify(&self, _context: &PipelineContext) -> Result<()> {
        Ok(())
    }

    /// Register host resources with the sandbox machine before it starts
    ///
    /// `extra_args` is the machine's extra command-line argument list.
    fn pre_machine(
        &self,
        _context: &PipelineContext,
        _machine: &mut dyn SandboxMachine,
        _extra_args: &mut Vec<String>,
    ) -> Result<PhaseOutcome> {
        Ok(PhaseOutcome::Skipped)
    }

    /// Main execution, before the artifact is sealed
    fn run(&self, _context: &PipelineContext, _runner: &dyn CommandRunner) -> Result<PhaseOutcome> {
        Ok(PhaseOutcome::Skipped)
    }

    /// Execution after the sandbox has exited and the artifact exists
    fn post_machine(
        &self,
        _context: &PipelineContext,
        _runner: &dyn CommandRunner,
    ) -> Result<PhaseOutcome> {
        Ok(PhaseOutcome::Skipped)
    }
}
