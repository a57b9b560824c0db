//! File system helpers and staged output writes.
//!
//! Generated files are first written as `.tmp` siblings and renamed into
//! place only after every write succeeded, so a failing or crashing run
//! never leaves a partially decomposed file on disk.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub fn read_file(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Two-phase writer: stage everything, then commit with renames.
#[derive(Debug, Default)]
pub struct StagedWriter {
    staged: Vec<(PathBuf, PathBuf)>,
}

impl StagedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` to a temporary sibling of `target`.
    pub fn stage(&mut self, target: PathBuf, content: &str) -> std::io::Result<()> {
        let mut temp_name = target.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp = PathBuf::from(temp_name);
        fs::write(&temp, content)?;
        self.staged.push((temp, target));
        Ok(())
    }

    /// Rename every staged file into place. Same-directory renames are
    /// atomic on the platforms this runs on.
    pub fn commit(self) -> std::io::Result<Vec<PathBuf>> {
        let mut committed = Vec::with_capacity(self.staged.len());
        for (temp, target) in self.staged {
            fs::rename(&temp, &target)?;
            committed.push(target);
        }
        Ok(committed)
    }

    /// Remove staged temporaries without touching the targets.
    pub fn discard(self) {
        for (temp, _) in self.staged {
            let _ = fs::remove_file(temp);
        }
    }
}
