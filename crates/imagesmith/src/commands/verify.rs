//! Verify a recipe without executing it

use anyhow::{Context, Result};
use imagesmith_core::pipeline::Pipeline;
use imagesmith_core::recipe::Recipe;
use std::path::Path;
use tracing::{info, instrument};

/// Execute the verify command
#[instrument(skip_all, fields(recipe = %recipe.display()))]
pub fn execute_verify(recipe: &Path) -> Result<()> {
    let loaded = Recipe::load(recipe)
        .with_context(|| format!("Failed to load recipe {}", recipe.display()))?;
    let context = loaded.context("/", None);
    let pipeline = Pipeline::new(context, loaded.into_actions());

    pipeline.verify()?;

    info!("Recipe is valid");
    println!("{}: {} action(s) OK", recipe.display(), pipeline.len());
    Ok(())
}
