//! Pipeline driver
//!
//! Drives a list of actions through the phase contract: every action is
//! verified before any action does work, then the remaining phases run in
//! order across all actions. The first error stops the pipeline.
//!
//! Booting the sandbox machine is left to the caller: when one is used, the
//! caller supplies a [`SandboxMachine`] to collect volume registrations.

use crate::action::{Action, Phase, PhaseOutcome};
use crate::command::CommandRunner;
use crate::context::PipelineContext;
use crate::errors::{ImagesmithError, Result};
use crate::machine::SandboxMachine;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

/// Outcome of one hook invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    /// Action label
    pub action: String,
    pub phase: Phase,
    pub outcome: PhaseOutcome,
}

/// Every hook invoked during a pipeline run, in invocation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub records: Vec<PhaseRecord>,
}

impl PipelineSummary {
    fn record(&mut self, action: &dyn Action, phase: Phase, outcome: PhaseOutcome) {
        self.records.push(PhaseRecord {
            action: action.metadata().label().to_string(),
            phase,
            outcome,
        });
    }

    /// Records of hooks that did work
    pub fn executed(&self) -> Vec<&PhaseRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == PhaseOutcome::Executed)
            .collect()
    }

    /// Records of hooks that had nothing to do
    pub fn skipped(&self) -> Vec<&PhaseRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == PhaseOutcome::Skipped)
            .collect()
    }

    /// Records for a single phase
    pub fn for_phase(&self, phase: Phase) -> Vec<&PhaseRecord> {
        self.records.iter().filter(|r| r.phase == phase).collect()
    }
}

/// Actions bound to the context they run in
#[derive(Debug)]
pub struct Pipeline {
    context: PipelineContext,
    actions: Vec<Box<dyn Action>>,
}

fn wrap(action: &dyn Action, phase: Phase) -> impl FnOnce(ImagesmithError) -> ImagesmithError {
    let label = action.metadata().label().to_string();
    move |source| {
        error!("Action '{}' failed during {}: {}", label, phase, source);
        ImagesmithError::Action {
            label,
            phase,
            source: Box::new(source),
        }
    }
}

impl Pipeline {
    pub fn new(context: PipelineContext, actions: Vec<Box<dyn Action>>) -> Self {
        Self { context, actions }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Verify every action
    #[instrument(skip_all)]
    pub fn verify(&self) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary::default();
        self.verify_into(&mut summary)?;
        Ok(summary)
    }

    /// Verify every action, then let each register resources with `machine`
    #[instrument(skip_all)]
    pub fn prepare_machine(
        &self,
        machine: &mut dyn SandboxMachine,
        extra_args: &mut Vec<String>,
    ) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary::default();
        self.verify_into(&mut summary)?;
        self.pre_machine_into(machine, extra_args, &mut summary)?;
        Ok(summary)
    }

    /// Run the whole pipeline
    ///
    /// `pre-machine` is only invoked when `machine` is supplied.
    #[instrument(skip_all, fields(actions = self.actions.len()))]
    pub fn execute(
        &self,
        runner: &dyn CommandRunner,
        machine: Option<&mut dyn SandboxMachine>,
    ) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary::default();
        self.verify_into(&mut summary)?;

        if let Some(machine) = machine {
            let mut extra_args = Vec::new();
            self.pre_machine_into(machine, &mut extra_args, &mut summary)?;
            debug!("Machine extra arguments: {:?}", extra_args);
        }

        info!(
            "Running {} action(s) in {}",
            self.actions.len(),
            self.context.rootdir.display()
        );
        for action in &self.actions {
            let outcome = action
                .run(&self.context, runner)
                .map_err(wrap(action.as_ref(), Phase::Run))?;
            summary.record(action.as_ref(), Phase::Run, outcome);
        }

        for action in &self.actions {
            let outcome = action
                .post_machine(&self.context, runner)
                .map_err(wrap(action.as_ref(), Phase::PostMachine))?;
            summary.record(action.as_ref(), Phase::PostMachine, outcome);
        }

        info!(
            "Pipeline finished: {} hook(s) executed, {} skipped",
            summary.executed().len(),
            summary.skipped().len()
        );
        Ok(summary)
    }

    fn verify_into(&self, summary: &mut PipelineSummary) -> Result<()> {
        for action in &self.actions {
            action
                .verify(&self.context)
                .map_err(wrap(action.as_ref(), Phase::Verify))?;
            summary.record(action.as_ref(), Phase::Verify, PhaseOutcome::Executed);
        }
        debug!("Verified {} action(s)", self.actions.len());
        Ok(())
    }

    fn pre_machine_into(
        &self,
        machine: &mut dyn SandboxMachine,
        extra_args: &mut Vec<String>,
        summary: &mut PipelineSummary,
    ) -> Result<()> {
        for action in &self.actions {
            let outcome = action
                .pre_machine(&self.context, machine, extra_args)
                .map_err(wrap(action.as_ref(), Phase::PreMachine))?;
            summary.record(action.as_ref(), Phase::PreMachine, outcome);
        }
        Ok(())
    }
}
