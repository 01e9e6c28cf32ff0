//! Recipe loading
//!
//! A recipe is a TOML document listing the pipeline's actions in order:
//!
//! ```toml
//! architecture = "arm64"
//!
//! [[actions]]
//! action = "run"
//! chroot = true
//! command = "echo myhost > /etc/hostname"
//!
//! [[actions]]
//! action = "run"
//! postprocess = true
//! script = "scripts/checksum.sh"
//! ```
//!
//! The `action` key selects the action kind. Relative paths inside actions are
//! resolved against the directory containing the recipe file.

use crate::action::{Action, ActionMetadata, PhaseOutcome};
use crate::actions::RunAction;
use crate::command::CommandRunner;
use crate::context::{Architecture, PipelineContext};
use crate::errors::{ConfigError, Result};
use crate::machine::SandboxMachine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// The closed set of action kinds a recipe can name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RecipeAction {
    Run(RunAction),
}

impl RecipeAction {
    fn inner(&self) -> &dyn Action {
        match self {
            RecipeAction::Run(action) => action,
        }
    }
}

impl Action for RecipeAction {
    fn metadata(&self) -> &ActionMetadata {
        self.inner().metadata()
    }

    fn verify(&self, context: &PipelineContext) -> Result<()> {
        self.inner().verify(context)
    }

    fn pre_machine(
        &self,
        context: &PipelineContext,
        machine: &mut dyn SandboxMachine,
        extra_args: &mut Vec<String>,
    ) -> Result<PhaseOutcome> {
        self.inner().pre_machine(context, machine, extra_args)
    }

    fn run(&self, context: &PipelineContext, runner: &dyn CommandRunner) -> Result<PhaseOutcome> {
        self.inner().run(context, runner)
    }

    fn post_machine(
        &self,
        context: &PipelineContext,
        runner: &dyn CommandRunner,
    ) -> Result<PhaseOutcome> {
        self.inner().post_machine(context, runner)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeFile {
    #[serde(default)]
    architecture: Option<Architecture>,
    #[serde(default)]
    actions: Vec<RecipeAction>,
}

/// A parsed recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    /// Target architecture requested by the recipe, if any
    pub architecture: Option<Architecture>,
    /// Actions in execution order
    pub actions: Vec<RecipeAction>,
    /// Directory relative paths resolve against
    pub recipe_dir: PathBuf,
}

impl Recipe {
    /// Parse recipe text; `recipe_dir` anchors relative paths
    pub fn parse(content: &str, recipe_dir: impl Into<PathBuf>) -> Result<Self> {
        let file: RecipeFile = toml::from_str(content).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;

        Ok(Self {
            architecture: file.architecture,
            actions: file.actions,
            recipe_dir: recipe_dir.into(),
        })
    }

    /// Load a recipe from disk
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let absolute = path.canonicalize().map_err(ConfigError::Io)?;
        let recipe_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let recipe = Self::parse(&content, recipe_dir)?;
        debug!(
            "Loaded {} action(s) from {}",
            recipe.actions.len(),
            absolute.display()
        );
        Ok(recipe)
    }

    /// Pipeline context for this recipe
    ///
    /// `architecture` overrides the recipe's own setting; without either the
    /// host architecture is used.
    pub fn context(
        &self,
        rootdir: impl Into<PathBuf>,
        architecture: Option<Architecture>,
    ) -> PipelineContext {
        let architecture = architecture
            .or_else(|| self.architecture.clone())
            .unwrap_or_else(Architecture::host);
        PipelineContext::new(rootdir, architecture, self.recipe_dir.clone())
    }

    /// Hand the actions over to a pipeline
    pub fn into_actions(self) -> Vec<Box<dyn Action>> {
        self.actions
            .into_iter()
            .map(|action| Box::new(action) as Box<dyn Action>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ImagesmithError;
    use tempfile::TempDir;

    const RECIPE: &str = r#"
architecture = "arm64"

[[actions]]
action = "run"
description = "Set hostname"
chroot = true
command = "echo myhost > /etc/hostname"

[[actions]]
action = "run"
postprocess = true
script = "scripts/checksum.sh"
"#;

    #[test]
    fn test_parse_recipe() {
        let recipe = Recipe::parse(RECIPE, "/recipes/x").unwrap();

        assert_eq!(recipe.architecture, Some(Architecture::new("arm64")));
        assert_eq!(recipe.actions.len(), 2);

        let RecipeAction::Run(first) = &recipe.actions[0];
        assert!(first.chroot);
        assert_eq!(first.metadata().label(), "Set hostname");

        let RecipeAction::Run(second) = &recipe.actions[1];
        assert!(second.postprocess);
        assert_eq!(second.script.as_deref(), Some("scripts/checksum.sh"));
    }

    #[test]
    fn test_unknown_action_kind_rejected() {
        let err = Recipe::parse(
            r#"
[[actions]]
action = "debootstrap"
suite = "bookworm"
"#,
            "/recipes/x",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ImagesmithError::Config(ConfigError::Parsing { .. })
        ));
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(Recipe::parse("archtecture = \"arm64\"", "/recipes/x").is_err());
    }

    #[test]
    fn test_context_architecture_precedence() {
        let recipe = Recipe::parse(RECIPE, "/recipes/x").unwrap();

        let ctx = recipe.context("/build/root", None);
        assert_eq!(ctx.architecture.as_str(), "arm64");
        assert_eq!(ctx.recipe_dir, PathBuf::from("/recipes/x"));

        let ctx = recipe.context("/build/root", Some(Architecture::new("riscv64")));
        assert_eq!(ctx.architecture.as_str(), "riscv64");

        let bare = Recipe::parse("", "/recipes/x").unwrap();
        assert_eq!(bare.context("/r", None).architecture, Architecture::host());
    }

    #[test]
    fn test_load_uses_recipe_parent_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("image.toml");
        std::fs::write(&path, RECIPE).unwrap();

        let recipe = Recipe::load(&path).unwrap();
        assert_eq!(recipe.recipe_dir, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Recipe::load(temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(
            err,
            ImagesmithError::Config(ConfigError::NotFound { .. })
        ));
    }
}
