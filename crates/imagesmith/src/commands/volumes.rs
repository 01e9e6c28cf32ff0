//! Report the volumes a sandbox machine would need for a recipe

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use imagesmith_core::machine::MachineVolumes;
use imagesmith_core::pipeline::Pipeline;
use imagesmith_core::recipe::Recipe;
use serde::Serialize;
use std::path::PathBuf;
use tracing::instrument;

/// Arguments for the volumes command
#[derive(Debug, Clone)]
pub struct VolumesArgs {
    pub recipe: PathBuf,
    pub rootdir: PathBuf,
    pub output: OutputFormat,
}

/// JSON shape printed by `volumes --output json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumesResult {
    pub volumes: Vec<PathBuf>,
    pub extra_args: Vec<String>,
}

/// Execute the volumes command
#[instrument(skip_all, fields(recipe = %args.recipe.display()))]
pub fn execute_volumes(args: VolumesArgs) -> Result<()> {
    let recipe = Recipe::load(&args.recipe)
        .with_context(|| format!("Failed to load recipe {}", args.recipe.display()))?;
    let pipeline = Pipeline::new(recipe.context(args.rootdir, None), recipe.into_actions());

    let mut machine = MachineVolumes::new();
    let mut extra_args = Vec::new();
    pipeline.prepare_machine(&mut machine, &mut extra_args)?;

    let result = VolumesResult {
        volumes: machine.volumes().to_vec(),
        extra_args,
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            for volume in &result.volumes {
                println!("{}", volume.display());
            }
        }
    }
    Ok(())
}
