//! Ports to the external systems the pipeline drives, and their HTTP clients.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::state::{BuildStatus, TestFile};

pub mod github;
pub mod gitlab;
mod http;
pub mod jenkins;
pub mod ollama;

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use jenkins::{JenkinsClient, JobInfo};
pub use ollama::OllamaClient;

/// Build parameters, submitted in insertion order.
pub type BuildParameters = IndexMap<String, String>;

/// How a write should land in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// Overwrite the file last seen at `revision`.
    Update { revision: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
    pub message: String,
    pub git_ref: String,
    pub mode: WriteMode,
}

/// Merge request (GitLab) or pull request (GitHub) proposing `source_branch`
/// for `target_branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub title: String,
    pub description: String,
    pub source_branch: String,
    pub target_branch: String,
}

/// Repository hosting backend holding the test sources.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lists test files under `path_prefix` at `git_ref`, with their content.
    async fn list_files(&self, git_ref: &str, path_prefix: &str) -> Result<Vec<TestFile>>;

    /// Returns the current revision of `path`, or `None` when it does not exist.
    async fn file_revision(&self, path: &str, git_ref: &str) -> Result<Option<String>>;

    async fn write_file(&self, write: &FileWrite) -> Result<()>;

    /// Opens a review request and returns its web URL.
    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String>;
}

/// Result of a single status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPoll {
    /// The job exists but the build number has not been assigned yet.
    NotVisible,
    Running,
    Finished(BuildStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Remote build executor.
#[async_trait]
pub trait BuildSystem: Send + Sync {
    async fn job_exists(&self, name: &str) -> Result<bool>;

    async fn list_jobs(&self) -> Result<Vec<JobSummary>>;

    /// Submits a build and returns the number it is expected to receive.
    async fn trigger(&self, name: &str, parameters: &BuildParameters) -> Result<u64>;

    /// Queries a build once. Fails with `NotFound` when the job itself is absent.
    async fn poll_once(&self, name: &str, build_number: u64) -> Result<BuildPoll>;

    async fn fetch_log(&self, name: &str, build_number: u64) -> Result<String>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
