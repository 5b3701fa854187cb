//! Resolution of user-supplied relative paths inside a fixed root directory.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

#[lithium_derive::lithium_error]
pub enum SandboxError {
    /// The path is absolute or climbs above the root.
    #[error("Path traversal attempt{}: {message}", format_context(.context))]
    PathTraversal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Sandbox I/O error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },
}

fn traversal(path: &Path, reason: &'static str) -> SandboxError {
    SandboxError::PathTraversal {
        message: path.display().to_string().into(),
        context: Some(reason.into()),
    }
}

/// Collapses `.` and `..` lexically. `..` may not climb above the start.
///
/// # Errors
/// [`SandboxError::PathTraversal`] for absolute paths and escaping `..`.
pub fn normalize_relative(path: &Path) -> Result<PathBuf, SandboxError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                if !out.pop() {
                    return Err(traversal(path, "escapes the root via '..'"));
                }
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(path, "absolute paths are not allowed"));
            },
        }
    }
    Ok(out)
}

/// Joins `relative` onto `root`, refusing anything that would land outside it.
///
/// The deepest existing ancestor of the target is canonicalized and must stay
/// under the canonical root, so a symlinked directory cannot redirect a file
/// that does not exist yet. Dangling symlinks on the way are rejected.
///
/// # Errors
/// [`SandboxError::PathTraversal`], or [`SandboxError::Io`] if an existing path
/// cannot be canonicalized.
pub fn resolve(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
    let relative = relative.as_ref();
    let normalized = normalize_relative(relative)?;
    if normalized.as_os_str().is_empty() {
        return Err(traversal(relative, "path names the root itself"));
    }
    let joined = root.join(normalized);

    let base = match root.canonicalize() {
        Ok(base) => base,
        // Nothing below a missing root can be a link yet.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(joined),
        Err(e) => return Err(io_error(e, root)),
    };

    let mut existing = joined.as_path();
    let real = loop {
        match existing.canonicalize() {
            Ok(real) => break real,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if existing.symlink_metadata().is_ok() {
                    return Err(traversal(relative, "passes through a dangling symlink"));
                }
                match existing.parent() {
                    Some(parent) => existing = parent,
                    None => break base.clone(),
                }
            },
            Err(e) => return Err(io_error(e, existing)),
        }
    };

    if real.starts_with(&base) {
        Ok(joined)
    } else {
        Err(traversal(relative, "resolves outside the root"))
    }
}

fn io_error(source: std::io::Error, path: &Path) -> SandboxError {
    SandboxError::Io { source, context: Some(path.display().to_string().into()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_inner_parent_dirs() {
        assert_eq!(normalize_relative(Path::new("a/./b/../c")).unwrap(), Path::new("a/c"));
        assert!(normalize_relative(Path::new("a/../../etc")).is_err());
        assert!(normalize_relative(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn resolves_inside_root() {
        let root = tempfile::tempdir().unwrap();
        let resolved = resolve(root.path(), "catalogs/ngc.json").unwrap();
        assert_eq!(resolved, root.path().join("catalogs/ngc.json"));
        assert!(matches!(resolve(root.path(), "."), Err(SandboxError::PathTraversal { .. })));
        assert!(matches!(resolve(root.path(), "../x"), Err(SandboxError::PathTraversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinks_out_of_root() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), root.path().join("link")).unwrap();
        assert!(matches!(resolve(root.path(), "link"), Err(SandboxError::PathTraversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_new_files_under_a_symlinked_dir() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("cache")).unwrap();

        for path in ["cache/new.json", "cache/deeper/new.json"] {
            assert!(
                matches!(resolve(root.path(), path), Err(SandboxError::PathTraversal { .. })),
                "{path} was accepted"
            );
        }
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_dangling_symlinks() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let gone = outside.path().join("gone");
        std::os::unix::fs::symlink(&gone, root.path().join("data")).unwrap();

        assert!(matches!(resolve(root.path(), "data"), Err(SandboxError::PathTraversal { .. })));
        assert!(matches!(resolve(root.path(), "data/x.json"), Err(SandboxError::PathTraversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn allows_symlinks_that_stay_inside() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();

        let resolved = resolve(root.path(), "alias/new.json").unwrap();
        assert_eq!(resolved, root.path().join("alias/new.json"));
    }
}
