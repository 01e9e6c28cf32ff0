//! Sandbox machine volume exposure
//!
//! When the pipeline is built inside a sandbox machine, host directories that
//! actions need later must be registered before the machine starts. The
//! machine itself is not modelled here; [`MachineVolumes`] records and
//! validates the registrations so a launcher can turn them into shares.

use crate::errors::{MachineError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An isolated build host that can expose host directories
pub trait SandboxMachine {
    /// Make `dir` visible inside the machine at the same path
    fn add_volume(&mut self, dir: &Path) -> Result<()>;
}

/// Volumes requested for a sandbox machine, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineVolumes {
    volumes: Vec<PathBuf>,
}

impl MachineVolumes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

impl SandboxMachine for MachineVolumes {
    fn add_volume(&mut self, dir: &Path) -> Result<()> {
        if !dir.is_absolute() {
            return Err(MachineError::VolumeExposure {
                path: dir.to_path_buf(),
                reason: "path is not absolute".to_string(),
            }
            .into());
        }
        if !dir.is_dir() {
            return Err(MachineError::VolumeExposure {
                path: dir.to_path_buf(),
                reason: "not an existing directory".to_string(),
            }
            .into());
        }
        if self.volumes.iter().any(|v| v == dir) {
            debug!("Volume {} already exposed", dir.display());
            return Ok(());
        }
        debug!("Exposing volume {}", dir.display());
        self.volumes.push(dir.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ImagesmithError;
    use tempfile::TempDir;

    #[test]
    fn test_add_volume_dedups() {
        let temp = TempDir::new().unwrap();
        let mut machine = MachineVolumes::new();

        machine.add_volume(temp.path()).unwrap();
        machine.add_volume(temp.path()).unwrap();

        assert_eq!(machine.volumes(), &[temp.path().to_path_buf()]);
    }

    #[test]
    fn test_relative_volume_rejected() {
        let mut machine = MachineVolumes::new();
        let err = machine.add_volume(Path::new("scripts")).unwrap_err();
        assert!(matches!(
            err,
            ImagesmithError::Machine(MachineError::VolumeExposure { .. })
        ));
        assert!(machine.is_empty());
    }

    #[test]
    fn test_missing_volume_rejected() {
        let temp = TempDir::new().unwrap();
        let mut machine = MachineVolumes::new();
        let missing = temp.path().join("does-not-exist");
        let err = machine.add_volume(&missing).unwrap_err();
        assert!(err.to_string().contains("not an existing directory"));
    }
}
