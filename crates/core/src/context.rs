//! Pipeline context shared by every action
//!
//! The context is owned by the pipeline driver and handed to each phase hook by
//! reference; actions never mutate it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Target architecture, using Debian-style names (`amd64`, `arm64`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Architecture(String);

impl Architecture {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Architecture of the machine running the build
    pub fn host() -> Self {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Map a Rust target architecture name to its Debian-style name
    pub fn from_rust_arch(arch: &str) -> Self {
        let name = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "arm" => "armhf",
            "x86" => "i386",
            "powerpc64" => "ppc64el",
            other => other,
        };
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether binaries for this architecture need emulation on the host
    pub fn is_foreign(&self) -> bool {
        *self != Self::host()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared pipeline state passed to every action at every phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    /// Root of the target filesystem tree being built
    pub rootdir: PathBuf,
    /// Target architecture of the image
    pub architecture: Architecture,
    /// Directory holding the recipe; relative script paths resolve against it
    pub recipe_dir: PathBuf,
}

impl PipelineContext {
    pub fn new(
        rootdir: impl Into<PathBuf>,
        architecture: Architecture,
        recipe_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            rootdir: rootdir.into(),
            architecture,
            recipe_dir: recipe_dir.into(),
        }
    }

    pub fn rootdir(&self) -> &Path {
        &self.rootdir
    }

    pub fn recipe_dir(&self) -> &Path {
        &self.recipe_dir
    }
}
