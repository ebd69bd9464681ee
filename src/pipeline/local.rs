use std::path::{Component, Path};

use log::{debug, info};
use tokio::process::Command;

use crate::error::{MendError, Result};
use crate::pipeline::state::{LocalRun, TestFile};

/// Placeholder in the runner arguments replaced by the scratch directory.
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Runs fetched test files with a local command, by default pytest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRunner {
    program: String,
    args: Vec<String>,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: ["-m", "pytest", DIR_PLACEHOLDER, "-v"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }
}

impl LocalRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Writes `tests` into a fresh scratch directory and runs the command there.
    ///
    /// A non-zero exit is a failed run, not an error. The scratch directory
    /// is removed afterwards.
    pub async fn run(&self, tests: &[TestFile]) -> Result<LocalRun> {
        let scratch = tempfile::Builder::new().prefix("testmend-").tempdir()?;
        stage_files(scratch.path(), tests)?;

        let dir = scratch.path().to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(DIR_PLACEHOLDER, &dir))
            .collect();
        info!("Running {} {} on {} files", self.program, args.join(" "), tests.len());

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(scratch.path())
            .output()
            .await
            .map_err(|e| MendError::Config(format!("Failed to launch test runner '{}': {e}", self.program)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("Test runner exited with {:?}", output.status.code());

        Ok(LocalRun {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: text,
        })
    }
}

fn stage_files(root: &Path, tests: &[TestFile]) -> Result<()> {
    for test in tests {
        let relative = Path::new(&test.path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(MendError::Config(format!(
                "Refusing to stage '{}' outside the scratch directory",
                test.path
            )));
        }

        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &test.content)?;
    }
    Ok(())
}
