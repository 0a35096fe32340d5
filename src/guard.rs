//! Confinement of reads and writes to an approved directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Boundary check for a single approved root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Canonicalize `root` once. The root must exist.
    pub fn new(root: &Path) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            Error::ConfigValidation(format!(
                "failed to resolve approved root {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` against this root, see [`resolve`].
    pub fn resolve(&self, candidate: &Path) -> Result<PathBuf> {
        resolve_canonical(candidate, &self.root)
    }
}

/// Canonicalize `candidate` and accept it only if it is `approved_root` or lies below it.
///
/// Relative candidates are taken relative to the root. The candidate does not
/// need to exist: its longest existing ancestor is canonicalized (following
/// symlinks and `..`) and the missing tail is appended lexically.
pub fn resolve(candidate: &Path, approved_root: &Path) -> Result<PathBuf> {
    let root = approved_root.canonicalize().map_err(|e| {
        Error::ConfigValidation(format!(
            "failed to resolve approved root {}: {e}",
            approved_root.display()
        ))
    })?;
    resolve_canonical(candidate, &root)
}

fn resolve_canonical(candidate: &Path, root: &Path) -> Result<PathBuf> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let resolved = canonicalize_lenient(&joined).map_err(|_| Error::PathViolation {
        path: candidate.to_path_buf(),
        root: root.to_path_buf(),
    })?;

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(Error::PathViolation {
            path: candidate.to_path_buf(),
            root: root.to_path_buf(),
        })
    }
}

fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => {
                // Trailing `..` or `.` components: keep them for the lexical pass.
                if let Some(last) = existing.components().next_back() {
                    tail.push(last.as_os_str().to_os_string());
                }
            }
        }
        if !existing.pop() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "path has no existing ancestor",
            ));
        }
    }

    let mut resolved = existing.canonicalize()?;
    for part in tail.iter().rev() {
        match Path::new(part).components().next() {
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            Some(Component::CurDir) | None => {}
            Some(_) => resolved.push(part),
        }
    }
    Ok(resolved)
}
