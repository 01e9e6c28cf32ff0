//! Run a recipe on this host

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use imagesmith_core::action::Phase;
use imagesmith_core::command::ProcessRunner;
use imagesmith_core::context::Architecture;
use imagesmith_core::pipeline::{Pipeline, PipelineSummary};
use imagesmith_core::recipe::Recipe;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Arguments for the run command
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub recipe: PathBuf,
    pub rootdir: PathBuf,
    pub architecture: Option<Architecture>,
    pub output: OutputFormat,
}

/// Execute the run command
#[instrument(skip_all, fields(recipe = %args.recipe.display()))]
pub fn execute_run(args: RunArgs) -> Result<()> {
    info!("Starting pipeline run");

    let recipe = Recipe::load(&args.recipe)
        .with_context(|| format!("Failed to load recipe {}", args.recipe.display()))?;

    std::fs::create_dir_all(&args.rootdir)
        .with_context(|| format!("Failed to create {}", args.rootdir.display()))?;
    let rootdir = args
        .rootdir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", args.rootdir.display()))?;

    let context = recipe.context(rootdir, args.architecture);
    let pipeline = Pipeline::new(context, recipe.into_actions());
    let context = pipeline.context();
    debug!(
        "Root filesystem {}, architecture {}, recipe directory {}",
        context.rootdir.display(),
        context.architecture,
        context.recipe_dir.display()
    );

    let summary = pipeline.execute(&ProcessRunner::new(), None)?;

    print_summary(&summary, args.output)?;
    info!("Pipeline run completed successfully");
    Ok(())
}

fn print_summary(summary: &PipelineSummary, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Text => {
            for phase in Phase::order() {
                for record in summary.for_phase(*phase) {
                    println!(
                        "{:<13} {:<9} {}",
                        phase.as_str(),
                        record.outcome.as_str(),
                        record.action
                    );
                }
            }
        }
    }
    Ok(())
}
