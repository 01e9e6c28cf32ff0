//! Bind mounts into the chroot
//!
//! A bind mount makes a host directory visible at a fixed location inside the
//! target filesystem for the duration of one chrooted command. Mounts are
//! rendered as `systemd-nspawn` arguments by [`BindMount::to_nspawn_arg`].
//!
//! ```rust
//! use imagesmith_core::mount::BindMount;
//!
//! let mount = BindMount::new("/recipes/a:b", "/script").unwrap();
//! assert_eq!(mount.to_nspawn_arg(), "--bind=/recipes/a\\:b:/script");
//! ```

use crate::errors::{ExecError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Host directory bound into the chroot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Host-side directory
    pub source: PathBuf,
    /// Mount point inside the chroot
    pub target: String,
}

impl BindMount {
    /// Create a validated bind mount
    ///
    /// Both ends must be absolute.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>) -> Result<Self> {
        let mount = Self {
            source: source.into(),
            target: target.into(),
        };
        mount.validate()?;
        Ok(mount)
    }

    /// Validate mount specification
    pub fn validate(&self) -> Result<()> {
        if !self.source.is_absolute() {
            return Err(ExecError::InvalidMount {
                message: format!("source '{}' is not absolute", self.source.display()),
            }
            .into());
        }
        if !Path::new(&self.target).is_absolute() {
            return Err(ExecError::InvalidMount {
                message: format!("target '{}' is not absolute", self.target),
            }
            .into());
        }
        Ok(())
    }

    /// Render as a `systemd-nspawn` argument
    ///
    /// `:` separates the two paths, so `:` and `\` inside either path are
    /// backslash-escaped.
    pub fn to_nspawn_arg(&self) -> OsString {
        let mut arg = OsString::from("--bind=");
        arg.push(escape_bind_path(self.source.as_os_str()));
        arg.push(":");
        arg.push(escape_bind_path(OsStr::new(&self.target)));
        arg
    }
}

#[cfg(unix)]
fn escape_bind_path(path: &OsStr) -> OsString {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let mut escaped = Vec::with_capacity(path.len());
    for &byte in path.as_bytes() {
        if byte == b':' || byte == b'\\' {
            escaped.push(b'\\');
        }
        escaped.push(byte);
    }
    OsString::from_vec(escaped)
}

#[cfg(not(unix))]
fn escape_bind_path(path: &OsStr) -> OsString {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .into()
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nspawn_arg() {
        let mount = BindMount::new("/recipes/x/scripts", "/script").unwrap();
        assert_eq!(mount.to_nspawn_arg(), "--bind=/recipes/x/scripts:/script");
        assert_eq!(mount.to_string(), "/recipes/x/scripts -> /script");
    }

    #[test]
    fn test_relative_source_rejected() {
        let err = BindMount::new("scripts", "/script").unwrap_err();
        assert!(err.to_string().contains("not absolute"));
    }

    #[test]
    fn test_relative_target_rejected() {
        assert!(BindMount::new("/recipes/x", "script").is_err());
    }

    #[test]
    fn test_colon_is_escaped() {
        let mount = BindMount::new("/recipes/a:b", "/script").unwrap();
        assert_eq!(mount.to_nspawn_arg(), "--bind=/recipes/a\\:b:/script");
    }

    #[test]
    fn test_backslash_is_escaped() {
        let mount = BindMount::new("/recipes/a\\b", "/mnt/x:y").unwrap();
        assert_eq!(mount.to_nspawn_arg(), "--bind=/recipes/a\\\\b:/mnt/x\\:y");
    }
}
