//! Fetch, execute, analyze, fix and apply, over an explicit [`PipelineState`].

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::error::{MendError, Result};
use crate::providers::{BuildParameters, BuildSystem, SourceProvider, TextGenerator};

pub mod analyzer;
pub mod applier;
pub mod fixer;
pub mod local;
pub mod poller;
pub mod state;

pub use applier::{ApplyOutcome, ApplyTarget};
pub use local::LocalRunner;
pub use poller::{BuildPoller, PollSettings};
pub use state::{
    BuildRun, BuildStatus, Diagnostic, Execution, FetchOrigin, Fix, FixReport, PipelineState,
    TestFile,
};

use analyzer::LogAnalyzer;
use fixer::FixGenerator;

/// Build parameter carrying the fetched test files as JSON.
pub const TESTS_DATA_PARAM: &str = "TESTS_DATA";
/// Build parameter telling the job to run the tests.
pub const RUN_TESTS_PARAM: &str = "RUN_TESTS";

/// Sequences the pipeline stages against the configured ports.
///
/// Every stage reads its inputs from the state and records its output
/// back into it, clearing whatever was derived from older inputs.
pub struct Orchestrator {
    source: Option<Arc<dyn SourceProvider>>,
    builds: Option<Arc<dyn BuildSystem>>,
    generator: Option<Arc<dyn TextGenerator>>,
    poll: PollSettings,
    local: LocalRunner,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            source: None,
            builds: None,
            generator: None,
            poll: PollSettings::default(),
            local: LocalRunner::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn SourceProvider>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_build_system(mut self, builds: Arc<dyn BuildSystem>) -> Self {
        self.builds = Some(builds);
        self
    }

    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_local_runner(mut self, local: LocalRunner) -> Self {
        self.local = local;
        self
    }

    fn source(&self) -> Result<&dyn SourceProvider> {
        self.source
            .as_deref()
            .ok_or_else(|| MendError::Config("no source provider configured (set --provider and its project)".to_string()))
    }

    fn builds(&self) -> Result<&dyn BuildSystem> {
        self.builds
            .as_deref()
            .ok_or_else(|| MendError::Config("no build system configured (set --jenkins-url)".to_string()))
    }

    fn generator(&self) -> Result<&dyn TextGenerator> {
        self.generator
            .as_deref()
            .ok_or_else(|| MendError::Config("no text generator configured".to_string()))
    }

    /// Fetches the test files at `git_ref` under `path_prefix`.
    pub async fn fetch<'s>(
        &self,
        state: &'s mut PipelineState,
        git_ref: &str,
        path_prefix: &str,
    ) -> Result<&'s [TestFile]> {
        let source = self.source()?;
        let tests = source.list_files(git_ref, path_prefix).await?;
        if tests.is_empty() {
            warn!("No test files found under '{path_prefix}' at {git_ref}");
        }
        let origin = FetchOrigin {
            git_ref: git_ref.to_string(),
            path_prefix: path_prefix.to_string(),
        };
        Ok(state.record_tests(origin, tests))
    }

    /// Runs the fetched tests on this machine.
    pub async fn execute_local<'s>(&self, state: &'s mut PipelineState) -> Result<&'s Execution> {
        let tests = fetched_tests(state)?;
        let run = self.local.run(tests).await?;
        info!(
            "Local run {} (exit code {:?})",
            if run.success { "passed" } else { "failed" },
            run.exit_code
        );
        Ok(state.record_execution(Execution::Local(run)))
    }

    /// Triggers `job_name` with the fetched tests, waits for it and collects its log.
    ///
    /// # Errors
    ///
    /// `Timeout` when the build is still running after `timeout` (or the
    /// configured default). The timed-out run is recorded with an empty log
    /// and the remote build is left running.
    pub async fn execute_remote<'s>(
        &self,
        state: &'s mut PipelineState,
        job_name: &str,
        extra: &BuildParameters,
        timeout: Option<Duration>,
    ) -> Result<&'s Execution> {
        let builds = self.builds()?;
        let tests = fetched_tests(state)?;

        let mut parameters = BuildParameters::new();
        parameters.insert(TESTS_DATA_PARAM.to_string(), serde_json::to_string(tests)?);
        parameters.insert(RUN_TESTS_PARAM.to_string(), "true".to_string());
        for (key, value) in extra {
            parameters.insert(key.clone(), value.clone());
        }

        let poller = BuildPoller::new(builds, self.poll);
        let build_number = poller.trigger(job_name, &parameters).await?;
        let timeout = timeout.unwrap_or(self.poll.timeout);
        let status = poller.poll_status(job_name, build_number, timeout).await?;

        if status == BuildStatus::Timeout {
            state.record_execution(Execution::Remote(BuildRun {
                job_name: job_name.to_string(),
                build_number,
                status,
                console_log: String::new(),
            }));
            return Err(MendError::Timeout {
                job_name: job_name.to_string(),
                build_number,
                waited_secs: timeout.as_secs(),
            });
        }

        let console_log = poller.fetch_log(job_name, build_number).await?;
        Ok(state.record_execution(Execution::Remote(BuildRun {
            job_name: job_name.to_string(),
            build_number,
            status,
            console_log,
        })))
    }

    /// Diagnoses the latest execution's console output.
    pub async fn analyze<'s>(&self, state: &'s mut PipelineState) -> Result<&'s Diagnostic> {
        let generator = self.generator()?;
        let execution = state
            .execution()
            .ok_or_else(|| MendError::Config("nothing to analyze: run the tests first".to_string()))?;
        let diagnostic = LogAnalyzer::new(generator)
            .analyze(execution.status(), execution.console_log())
            .await?;
        Ok(state.record_diagnostic(diagnostic))
    }

    /// Requests fixes for the files implicated by the latest diagnostic.
    pub async fn generate_fixes<'s>(&self, state: &'s mut PipelineState) -> Result<&'s FixReport> {
        let generator = self.generator()?;
        let tests = fetched_tests(state)?;
        let diagnostic = state
            .diagnostic()
            .ok_or_else(|| MendError::Config("no diagnostic: run analyze first".to_string()))?;
        let report = FixGenerator::new(generator).generate(tests, diagnostic).await?;
        Ok(state.record_fixes(report))
    }

    /// Applies the generated fix for `file_path`.
    pub async fn apply_fix<'s>(
        &self,
        state: &'s mut PipelineState,
        file_path: &str,
        target: ApplyTarget,
    ) -> Result<(&'s Fix, ApplyOutcome)> {
        if state.fixes().is_none() {
            return Err(MendError::Config("no fixes: run fix first".to_string()));
        }
        let fetched_ref = state.origin().map(|origin| origin.git_ref.clone());
        state.touch();
        let fix = state.fix_mut(file_path).ok_or_else(|| MendError::not_found("fix", file_path))?;

        let outcome = match target {
            ApplyTarget::Local => applier::stage_locally(fix),
            ApplyTarget::Source { git_ref } => {
                let source = self.source()?;
                let git_ref = git_ref.or(fetched_ref).ok_or_else(|| {
                    MendError::Config("no ref to commit to: pass --ref or fetch first".to_string())
                })?;
                applier::commit_to_source(source, fix, &git_ref).await?
            }
        };
        Ok((&*fix, outcome))
    }

    /// Opens a merge or pull request from the branch the fixes were
    /// committed to into `target_branch`, and returns its web URL.
    ///
    /// # Errors
    ///
    /// `Config` when no fix has been committed yet or the fixes already
    /// live on `target_branch`.
    pub async fn open_review_request(&self, state: &PipelineState, target_branch: &str) -> Result<String> {
        let source = self.source()?;
        let report = state
            .fixes()
            .ok_or_else(|| MendError::Config("no fixes: run fix first".to_string()))?;
        let source_branch = report
            .fixes
            .iter()
            .find_map(|fix| fix.committed_ref.as_deref())
            .ok_or_else(|| MendError::Config("no committed fixes: apply one with --commit first".to_string()))?;
        if source_branch == target_branch {
            return Err(MendError::Config(format!(
                "fixes were committed to {target_branch} itself; pick another target branch"
            )));
        }

        let committed = report
            .fixes
            .iter()
            .filter(|fix| fix.committed_ref.as_deref() == Some(source_branch));
        let request = applier::review_request(committed, source_branch, target_branch);
        let url = source.open_review_request(&request).await?;
        info!("Opened review request {source_branch} -> {target_branch}: {url}");
        Ok(url)
    }
}

fn fetched_tests(state: &PipelineState) -> Result<&[TestFile]> {
    state
        .tests()
        .ok_or_else(|| MendError::Config("no test files: run fetch first".to_string()))
}
