use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// A Python file selected for refactoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFile {
    /// Absolute path under the target root.
    pub path: PathBuf,
    /// Path relative to the target root, used for mirroring in copy mode.
    pub relative: PathBuf,
}

impl TargetFile {
    pub fn display_name(&self) -> String {
        self.relative.display().to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Directory names skipped wherever they appear.
    pub exclude_dirs: Vec<String>,
    /// Absolute directory skipped entirely (the copy-mode output root).
    pub skip_path: Option<PathBuf>,
}

/// List `*.py` files under `root`, sorted by relative path.
///
/// Hidden directories and `__pycache__` are always skipped. Symlinked files
/// are listed so the path guard can refuse them explicitly.
pub fn discover(root: &Path, options: &DiscoverOptions) -> Vec<TargetFile> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry, options));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let is_candidate = entry.file_type().is_file() || entry.path_is_symlink();
        if !is_candidate || entry.path().extension().is_none_or(|ext| ext != "py") {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        files.push(TargetFile {
            path: entry.path().to_path_buf(),
            relative: relative.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    debug!(count = files.len(), root = %root.display(), "discovered files");
    files
}

fn is_skipped_dir(entry: &DirEntry, options: &DiscoverOptions) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    if let Some(ref skip) = options.skip_path
        && entry.path() == skip.as_path()
    {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || name == "__pycache__"
        || options.exclude_dirs.iter().any(|d| d.as_str() == name)
}
