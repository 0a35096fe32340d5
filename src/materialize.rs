//! Persisting accepted revisions: whole-file overwrite or changed-block mirror.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::blocks::{changed_blocks, segment};
use crate::config::OutputMode;
use crate::discover::TargetFile;
use crate::error::{Error, Result};
use crate::guard::PathGuard;

/// Directories never copied into a scratch tree.
const SCRATCH_SKIP_DIRS: &[&str] = &["__pycache__", "venv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeKind {
    /// Full content written over the original.
    Overwrite,
    /// This many changed blocks written to the mirror.
    Blocks(usize),
    /// Segmentation failed; full content written to the mirror.
    FullFallback,
    /// No block changed; nothing written.
    NothingChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub dest: Option<PathBuf>,
    pub kind: MaterializeKind,
}

/// A proposed revision placed where the test run can see it.
#[derive(Debug)]
pub struct Staged {
    /// Project root the tests run from.
    pub root: PathBuf,
    /// The file holding the proposed content.
    pub file: PathBuf,
    /// Copy mode only; the scratch tree is removed when this is dropped.
    _scratch: Option<TempDir>,
}

pub struct Materializer {
    mode: OutputMode,
    target: PathGuard,
    output: Option<PathGuard>,
}

impl Materializer {
    /// Copy mode requires an output guard.
    pub fn new(mode: OutputMode, target: PathGuard, output: Option<PathGuard>) -> Result<Self> {
        if mode == OutputMode::Copy && output.is_none() {
            return Err(Error::ConfigValidation(
                "copy mode requires an output root".to_string(),
            ));
        }
        Ok(Self {
            mode,
            target,
            output,
        })
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn target_guard(&self) -> &PathGuard {
        &self.target
    }

    /// Read a target file through the target guard.
    pub fn read(&self, file: &TargetFile) -> Result<String> {
        let path = self.target.resolve(&file.path)?;
        Ok(fs::read_to_string(path)?)
    }

    /// Put proposed content where the test run sees it.
    ///
    /// Overwrite mode writes over the original. Copy mode leaves the target
    /// untouched and builds a scratch copy of the project with the proposal
    /// in place of the original file.
    pub fn stage(&self, file: &TargetFile, content: &str) -> Result<Staged> {
        match self.mode {
            OutputMode::Overwrite => {
                let dest = self.target.resolve(&file.path)?;
                atomic_write(&dest, content)?;
                Ok(Staged {
                    root: self.target.root().to_path_buf(),
                    file: dest,
                    _scratch: None,
                })
            }
            OutputMode::Copy => self.stage_scratch(file, content),
        }
    }

    /// Put the original content back after a staged revision was rejected.
    /// Copy mode never touched the original, so there is nothing to undo.
    pub fn restore(&self, file: &TargetFile, original: &str) -> Result<()> {
        if self.mode == OutputMode::Copy {
            return Ok(());
        }
        let dest = self.target.resolve(&file.path)?;
        atomic_write(&dest, original)
    }

    fn stage_scratch(&self, file: &TargetFile, content: &str) -> Result<Staged> {
        let scratch = tempfile::Builder::new()
            .prefix("refactor-swarm-")
            .tempdir()?;
        let scratch_guard = PathGuard::new(scratch.path())?;
        let dest = scratch_guard.resolve(&file.relative)?;

        let root = self.target.root();
        let output_root = self.output.as_ref().map(|g| g.root());
        let entries = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !name.starts_with('.')
                    && !SCRATCH_SKIP_DIRS.contains(&&*name)
                    && output_root != Some(entry.path())
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file());

        let mut copied = 0usize;
        for entry in entries {
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let to = scratch.path().join(relative);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &to)?;
            copied += 1;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&dest, content)?;
        debug!(
            file = %file.relative.display(),
            scratch = %scratch_guard.root().display(),
            copied,
            "revision staged in scratch tree"
        );
        Ok(Staged {
            root: scratch_guard.root().to_path_buf(),
            file: dest,
            _scratch: Some(scratch),
        })
    }

    /// Persist an accepted revision according to the output mode.
    pub fn materialize(&self, file: &TargetFile, old: &str, new: &str) -> Result<Materialized> {
        match self.mode {
            OutputMode::Overwrite => {
                let dest = self.target.resolve(&file.path)?;
                atomic_write(&dest, new)?;
                Ok(Materialized {
                    dest: Some(dest),
                    kind: MaterializeKind::Overwrite,
                })
            }
            OutputMode::Copy => self.write_changed_blocks(&file.relative, old, new),
        }
    }

    /// Write the blocks of `new` that differ from `old` to `output_root/relative`.
    pub fn write_changed_blocks(&self, relative: &Path, old: &str, new: &str) -> Result<Materialized> {
        let guard = self.output.as_ref().ok_or_else(|| {
            Error::ConfigValidation("copy mode requires an output root".to_string())
        })?;
        let dest = guard.resolve(relative)?;

        if old == new {
            return Ok(Materialized {
                dest: None,
                kind: MaterializeKind::NothingChanged,
            });
        }

        let (body, kind) = match (segment(old), segment(new)) {
            (Ok(old_blocks), Ok(new_blocks)) => {
                let changed = changed_blocks(&old_blocks, &new_blocks);
                if changed.is_empty() {
                    return Ok(Materialized {
                        dest: None,
                        kind: MaterializeKind::NothingChanged,
                    });
                }
                let texts: Vec<&str> = changed.iter().map(|b| b.text.as_str()).collect();
                (
                    format!("{}\n", texts.join("\n\n\n")),
                    MaterializeKind::Blocks(changed.len()),
                )
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    file = %relative.display(),
                    error = %e,
                    "block segmentation failed, writing full content"
                );
                (new.to_string(), MaterializeKind::FullFallback)
            }
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&dest, &body)?;
        info!(dest = %dest.display(), ?kind, "revision materialized");
        Ok(Materialized {
            dest: Some(dest),
            kind,
        })
    }
}

/// Write to a temp file in the destination directory, then rename over the destination.
pub fn atomic_write(dest: &Path, content: &str) -> Result<()> {
    let dir = dest.parent().ok_or_else(|| {
        Error::Io(std::io::Error::other(format!(
            "{} has no parent directory",
            dest.display()
        )))
    })?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    // The temp file is created 0600; keep the destination's mode.
    if let Ok(meta) = fs::metadata(dest) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
