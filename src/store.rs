use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{MendError, Result};
use crate::pipeline::PipelineState;

/// On-disk home of the pipeline state between invocations.
///
/// Defaults to the platform cache directory:
/// - Linux: `~/.cache/testmend/state.json`
/// - macOS: `~/Library/Caches/testmend/state.json`
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Uses `path` when given, the default location otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if no cache directory can be determined.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => dirs::cache_dir()
                .ok_or_else(|| MendError::Config("No cache directory found, pass --state".into()))?
                .join("testmend")
                .join("state.json"),
        };
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved state. A missing file is an empty state.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<PipelineState> {
        if !self.path.exists() {
            debug!("No saved state at {}", self.path.display());
            return Ok(PipelineState::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&content).map_err(|e| {
            MendError::Config(format!(
                "Saved state at {} is corrupt ({e}); run `testmend reset`",
                self.path.display()
            ))
        })?;
        debug!("Loaded state from {}", self.path.display());
        Ok(state)
    }

    pub fn save(&self, state: &PipelineState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    /// Deletes the saved state. Returns whether there was anything to delete.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        info!("Removed saved state {}", self.path.display());
        Ok(true)
    }
}
