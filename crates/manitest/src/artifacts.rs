//! Generated files on disk
//!
//! Each run gets its own directory under the temp directory, so concurrent
//! runs never share files. The directory is removed when [`Artifacts`] is
//! dropped, on every path out of a run, unless it was asked to retain it.

use std::fs;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ManitestError, Result};
use crate::synth::{SyntheticConfig, SyntheticManifest};

/// Name of the generated configuration inside the run directory.
pub const CONFIG_FILE_NAME: &str = "puppet.conf";

/// Name of the generated manifest inside the run directory.
pub const MANIFEST_FILE_NAME: &str = "node.pp";

const RUN_DIR_PREFIX: &str = ".manitest-";

/// The generated configuration and manifest of one run.
#[derive(Debug)]
pub struct Artifacts {
    dir: Option<TempDir>,
    dir_path: PathBuf,
    config_path: PathBuf,
    manifest_path: PathBuf,
    retain: bool,
}

impl Artifacts {
    /// Create a run directory inside `tmpdir` and write both files to it.
    pub fn create(
        tmpdir: &Path,
        config: &SyntheticConfig,
        manifest: &SyntheticManifest,
        retain: bool,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(tmpdir)
            .map_err(|source| ManitestError::Artifact {
                path: tmpdir.to_path_buf(),
                source,
            })?;

        let dir_path = dir.path().to_path_buf();
        let config_path = dir_path.join(CONFIG_FILE_NAME);
        let manifest_path = dir_path.join(MANIFEST_FILE_NAME);

        write_file(&config_path, config.as_str())?;
        write_file(&manifest_path, manifest.as_str())?;
        tracing::debug!(dir = %dir_path.display(), retain, "wrote generated files");

        Ok(Self {
            dir: Some(dir),
            dir_path,
            config_path,
            manifest_path,
            retain,
        })
    }

    /// Directory holding both files.
    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Remove the files now, or keep them when retention was requested.
    /// Returns the kept directory.
    pub fn release(mut self) -> Option<PathBuf> {
        self.finish()
    }

    fn finish(&mut self) -> Option<PathBuf> {
        let dir = self.dir.take()?;
        if self.retain {
            let kept = dir.keep();
            tracing::info!(dir = %kept.display(), "keeping generated files");
            return Some(kept);
        }

        if let Err(e) = dir.close() {
            tracing::warn!(dir = %self.dir_path.display(), "failed to remove generated files: {e}");
        }
        None
    }
}

impl Drop for Artifacts {
    fn drop(&mut self) {
        self.finish();
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|source| ManitestError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Make sure a directory path ends with a separator.
pub fn with_trailing_separator(dir: impl Into<PathBuf>) -> PathBuf {
    let dir = dir.into();
    if dir.as_os_str().to_string_lossy().ends_with(MAIN_SEPARATOR) {
        return dir;
    }
    let mut raw = dir.into_os_string();
    raw.push(MAIN_SEPARATOR.to_string());
    PathBuf::from(raw)
}
