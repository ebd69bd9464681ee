use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A test source file fetched from the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFile {
    pub path: String,
    pub content: String,
    pub size: u64,
    /// Revision the file was read at (commit id on GitLab, blob sha on GitHub).
    pub revision_id: String,
}

/// Lifecycle status of a build.
///
/// Everything except `Pending` and `Building` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Pending,
    Building,
    Success,
    Failure,
    Aborted,
    Timeout,
    Unknown,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Building)
    }

    /// Maps a Jenkins result code of a completed build.
    pub fn from_result_code(code: Option<&str>) -> Self {
        match code {
            Some("SUCCESS") => Self::Success,
            Some("FAILURE" | "UNSTABLE") => Self::Failure,
            Some("ABORTED") => Self::Aborted,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Building => "BUILDING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Aborted => "ABORTED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRun {
    pub job_name: String,
    pub build_number: u64,
    pub status: BuildStatus,
    pub console_log: String,
}

/// Outcome of running the fetched tests on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Execution {
    Local(LocalRun),
    Remote(BuildRun),
}

impl Execution {
    pub fn status(&self) -> BuildStatus {
        match self {
            Self::Local(run) if run.success => BuildStatus::Success,
            Self::Local(_) => BuildStatus::Failure,
            Self::Remote(build) => build.status,
        }
    }

    pub fn console_log(&self) -> &str {
        match self {
            Self::Local(run) => &run.output,
            Self::Remote(build) => &build.console_log,
        }
    }
}

/// Structured interpretation of a console log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub suggestions: Vec<String>,
}

/// Models answer `"errors": null` as often as they leave the key out.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Proposed replacement for one file, with rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub file_path: String,
    pub problem: String,
    pub original_code: String,
    pub fixed_code: String,
    pub applied: bool,
    /// Branch the fix was committed to; `None` until it is written to the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_ref: Option<String>,
}

/// A file selected for remediation whose model response could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnparsableRemediation {
    pub file_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub fixes: Vec<Fix>,
    pub unparsable: Vec<UnparsableRemediation>,
}

/// Ref and path the current test files were fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOrigin {
    pub git_ref: String,
    pub path_prefix: String,
}

/// Results of one orchestration run.
///
/// Each `record_*` call clears every slice computed downstream of it, so a
/// stage never reads output produced from older upstream inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    origin: Option<FetchOrigin>,
    tests: Option<Vec<TestFile>>,
    execution: Option<Execution>,
    diagnostic: Option<Diagnostic>,
    fixes: Option<FixReport>,
    updated_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<&FetchOrigin> {
        self.origin.as_ref()
    }

    pub fn tests(&self) -> Option<&[TestFile]> {
        self.tests.as_deref()
    }

    pub fn execution(&self) -> Option<&Execution> {
        self.execution.as_ref()
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostic.as_ref()
    }

    pub fn fixes(&self) -> Option<&FixReport> {
        self.fixes.as_ref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn record_tests(&mut self, origin: FetchOrigin, tests: Vec<TestFile>) -> &[TestFile] {
        self.origin = Some(origin);
        self.execution = None;
        self.diagnostic = None;
        self.fixes = None;
        self.touch();
        self.tests.insert(tests)
    }

    pub(crate) fn record_execution(&mut self, execution: Execution) -> &Execution {
        self.diagnostic = None;
        self.fixes = None;
        self.touch();
        self.execution.insert(execution)
    }

    pub(crate) fn record_diagnostic(&mut self, diagnostic: Diagnostic) -> &Diagnostic {
        self.fixes = None;
        self.touch();
        self.diagnostic.insert(diagnostic)
    }

    pub(crate) fn record_fixes(&mut self, report: FixReport) -> &FixReport {
        self.touch();
        self.fixes.insert(report)
    }

    pub(crate) fn fix_mut(&mut self, file_path: &str) -> Option<&mut Fix> {
        self.fixes
            .as_mut()?
            .fixes
            .iter_mut()
            .find(|fix| fix.file_path == file_path)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
