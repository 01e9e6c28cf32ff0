//! Lexical path helpers

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `base` and clean the result lexically.
///
/// Relative paths are joined onto `base`; absolute paths ignore it. `.`
/// components are dropped and `..` removes the preceding component, never
/// climbing above the root. The filesystem is not consulted, so the result
/// is the same no matter how many times it is applied.
pub fn clean_path_at(path: impl AsRef<Path>, base: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        clean(path)
    } else {
        clean(&base.as_ref().join(path))
    }
}

/// Lexically clean a path without touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
