//! The `run` action
//!
//! Runs an inline shell command or a script from the recipe directory, either
//! on the host or inside the target filesystem.
//!
//! ```toml
//! [[actions]]
//! action = "run"
//! description = "Set hostname"
//! chroot = true
//! command = "echo myhost > /etc/hostname"
//! ```
//!
//! - `command`: shell command line, run as `sh -c <command>`.
//! - `script`: executable path, relative to the recipe directory.
//! - `chroot`: run inside the target filesystem. Scripts are reachable there
//!   through a bind mount of their directory at `/script`.
//! - `postprocess`: run after the sandbox has exited and the artifact exists.
//!
//! Exactly one of `command` and `script` must be set, and `chroot` cannot be
//! combined with `postprocess`. Host commands that run during the normal pass
//! get `ROOTDIR` pointing at the target filesystem.

use crate::action::{Action, ActionMetadata, PhaseOutcome};
use crate::command::{CommandRunner, CommandSpec, ExecutionMode};
use crate::context::PipelineContext;
use crate::errors::{ConfigError, Result};
use crate::machine::SandboxMachine;
use crate::paths::clean_path_at;
use serde::Deserialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Mount point of the script directory inside the chroot
pub const SCRIPT_MOUNT: &str = "/script";

/// Variable exposing the target filesystem to host commands
pub const ROOTDIR_ENV: &str = "ROOTDIR";

/// Recipe kind name of this action
pub const KIND: &str = "run";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RunActionConfig")]
pub struct RunAction {
    metadata: ActionMetadata,
    /// Run inside the target filesystem
    pub chroot: bool,
    /// Defer until after the artifact is finalized
    pub postprocess: bool,
    /// Script path relative to the recipe directory
    pub script: Option<String>,
    /// Inline shell command line
    pub command: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunActionConfig {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    chroot: bool,
    #[serde(default)]
    postprocess: bool,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

impl From<RunActionConfig> for RunAction {
    fn from(config: RunActionConfig) -> Self {
        Self {
            metadata: ActionMetadata::new(KIND, config.description),
            chroot: config.chroot,
            postprocess: config.postprocess,
            script: config.script,
            command: config.command,
        }
    }
}

impl RunAction {
    /// Action running an inline shell command
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            metadata: ActionMetadata::new(KIND, None),
            chroot: false,
            postprocess: false,
            script: None,
            command: Some(command.into()),
        }
    }

    /// Action running a script from the recipe directory
    pub fn script(script: impl Into<String>) -> Self {
        Self {
            metadata: ActionMetadata::new(KIND, None),
            chroot: false,
            postprocess: false,
            script: Some(script.into()),
            command: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_chroot(mut self, chroot: bool) -> Self {
        self.chroot = chroot;
        self
    }

    pub fn with_postprocess(mut self, postprocess: bool) -> Self {
        self.postprocess = postprocess;
        self
    }

    fn script_name(&self) -> Option<&str> {
        self.script.as_deref().filter(|s| !s.is_empty())
    }

    fn command_line(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.is_empty())
    }

    /// Absolute script path, resolved against the recipe directory
    ///
    /// Computed from the stored configuration on every call, so it does not
    /// depend on which phases already ran.
    pub fn resolved_script(&self, context: &PipelineContext) -> Option<PathBuf> {
        self.script_name()
            .map(|script| clean_path_at(script, context.recipe_dir()))
    }

    /// Route this action to an execution mode and build its command
    ///
    /// If both `script` and `command` are set (rejected by `verify`), the
    /// script wins.
    pub fn command_spec(&self, context: &PipelineContext) -> Result<CommandSpec> {
        let mode = if self.chroot {
            ExecutionMode::Chroot {
                rootdir: context.rootdir.clone(),
                architecture: context.architecture.clone(),
            }
        } else {
            ExecutionMode::Host
        };

        let spec = if let Some(script) = self.resolved_script(context) {
            let name = script
                .file_name()
                .map(OsStr::to_os_string)
                .ok_or_else(|| ConfigError::Validation {
                    message: format!("script '{}' has no file name", script.display()),
                })?;
            let label = name.to_string_lossy().into_owned();

            if self.chroot {
                let mut inner = OsString::from(SCRIPT_MOUNT);
                inner.push("/");
                inner.push(&name);
                CommandSpec::new(mode, label, vec![inner])
                    .with_bind_mount(script_dir(&script), SCRIPT_MOUNT)?
            } else {
                CommandSpec::new(mode, label, vec![script.into_os_string()])
            }
        } else {
            let command = self.command_line().ok_or_else(|| ConfigError::Validation {
                message: "one of 'script' or 'command' must be set".to_string(),
            })?;
            CommandSpec::new(mode, command, vec!["sh".into(), "-c".into(), command.into()])
        };

        if !self.chroot && !self.postprocess {
            return Ok(spec.with_env(ROOTDIR_ENV, context.rootdir()));
        }
        Ok(spec)
    }

    fn do_run(&self, context: &PipelineContext, runner: &dyn CommandRunner) -> Result<PhaseOutcome> {
        self.metadata.log_start();
        let spec = self.command_spec(context)?;
        debug!(
            chroot = self.chroot,
            postprocess = self.postprocess,
            "Executing {}",
            spec.display_command()
        );
        runner.run(&spec)?;
        Ok(PhaseOutcome::Executed)
    }
}

fn script_dir(script: &Path) -> &Path {
    script.parent().unwrap_or_else(|| Path::new("/"))
}

impl Action for RunAction {
    fn metadata(&self) -> &ActionMetadata {
        &self.metadata
    }

    fn verify(&self, _context: &PipelineContext) -> Result<()> {
        if self.chroot && self.postprocess {
            return Err(ConfigError::Validation {
                message: "Cannot run postprocessing in the chroot".to_string(),
            }
            .into());
        }

        match (self.script_name(), self.command_line()) {
            (Some(_), Some(_)) => Err(ConfigError::Validation {
                message: "'script' and 'command' are mutually exclusive".to_string(),
            }
            .into()),
            (None, None) => Err(ConfigError::Validation {
                message: "one of 'script' or 'command' must be set".to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    #[instrument(skip_all, fields(action = %self.metadata.label()))]
    fn pre_machine(
        &self,
        context: &PipelineContext,
        machine: &mut dyn SandboxMachine,
        _extra_args: &mut Vec<String>,
    ) -> Result<PhaseOutcome> {
        let Some(script) = self.resolved_script(context) else {
            return Ok(PhaseOutcome::Skipped);
        };

        // Deferred actions run once the machine is gone and the host is reachable.
        if self.postprocess {
            return Ok(PhaseOutcome::Skipped);
        }

        machine.add_volume(script_dir(&script))?;
        Ok(PhaseOutcome::Executed)
    }

    #[instrument(skip_all, fields(action = %self.metadata.label()))]
    fn run(&self, context: &PipelineContext, runner: &dyn CommandRunner) -> Result<PhaseOutcome> {
        if self.postprocess {
            debug!("Deferred to post-machine");
            return Ok(PhaseOutcome::Skipped);
        }
        self.do_run(context, runner)
    }

    #[instrument(skip_all, fields(action = %self.metadata.label()))]
    fn post_machine(
        &self,
        context: &PipelineContext,
        runner: &dyn CommandRunner,
    ) -> Result<PhaseOutcome> {
        if !self.postprocess {
            return Ok(PhaseOutcome::Skipped);
        }
        self.do_run(context, runner)
    }
}
