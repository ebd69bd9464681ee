//! In-memory ports for exercising the pipeline without network access.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MendError, Result};
use crate::pipeline::state::TestFile;
use crate::providers::{
    BuildParameters, BuildPoll, BuildSystem, FileWrite, JobSummary, ReviewRequest, SourceProvider,
    TextGenerator,
};

pub fn test_file(path: &str, content: &str) -> TestFile {
    TestFile {
        path: path.to_string(),
        content: content.to_string(),
        size: content.len() as u64,
        revision_id: format!("rev-{path}"),
    }
}

/// Build system answering polls from a script, then with a default answer.
pub struct StubBuildSystem {
    jobs: Vec<String>,
    polls: Mutex<VecDeque<BuildPoll>>,
    default_poll: BuildPoll,
    fail_polls: bool,
    next_build: u64,
    logs: BTreeMap<u64, String>,
    triggered: Mutex<Vec<(String, BuildParameters)>>,
    poll_calls: AtomicUsize,
}

impl StubBuildSystem {
    pub fn new(jobs: &[&str]) -> Self {
        Self {
            jobs: jobs.iter().map(|job| job.to_string()).collect(),
            polls: Mutex::new(VecDeque::new()),
            default_poll: BuildPoll::NotVisible,
            fail_polls: false,
            next_build: 1,
            logs: BTreeMap::new(),
            triggered: Mutex::new(Vec::new()),
            poll_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_polls(self, polls: Vec<BuildPoll>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            ..self
        }
    }

    pub fn with_default_poll(self, default_poll: BuildPoll) -> Self {
        Self { default_poll, ..self }
    }

    pub fn with_next_build(self, next_build: u64) -> Self {
        Self { next_build, ..self }
    }

    pub fn with_log(mut self, build_number: u64, log: &str) -> Self {
        self.logs.insert(build_number, log.to_string());
        self
    }

    pub fn failing_polls(self) -> Self {
        Self {
            fail_polls: true,
            ..self
        }
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn trigger_calls(&self) -> usize {
        self.triggered.lock().unwrap().len()
    }

    pub fn triggered(&self) -> Vec<(String, BuildParameters)> {
        self.triggered.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildSystem for StubBuildSystem {
    async fn job_exists(&self, name: &str) -> Result<bool> {
        Ok(self.jobs.iter().any(|job| job == name))
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        Ok(self
            .jobs
            .iter()
            .map(|name| JobSummary {
                name: name.clone(),
                url: None,
                color: None,
            })
            .collect())
    }

    async fn trigger(&self, name: &str, parameters: &BuildParameters) -> Result<u64> {
        self.triggered
            .lock()
            .unwrap()
            .push((name.to_string(), parameters.clone()));
        Ok(self.next_build)
    }

    async fn poll_once(&self, _name: &str, _build_number: u64) -> Result<BuildPoll> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_polls {
            return Err(MendError::Connectivity {
                service: "stub",
                operation: "poll".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_poll))
    }

    async fn fetch_log(&self, name: &str, build_number: u64) -> Result<String> {
        self.logs
            .get(&build_number)
            .cloned()
            .ok_or_else(|| MendError::not_found("build", format!("{name} #{build_number}")))
    }
}

/// Text generator replaying canned responses in order, repeating the last one.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    last: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| Ok(r.to_string())).collect()),
            last: responses.last().map(|r| r.to_string()).unwrap_or_default(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let generator = Self::new(&[]);
        generator
            .responses
            .lock()
            .unwrap()
            .push_back(Err(MendError::Connectivity {
                service: "Ollama",
                operation: "generate".to_string(),
                message: "connection refused".to_string(),
            }));
        generator
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.last.clone()),
        }
    }
}

/// Source provider backed by a map of path to (content, revision).
pub struct InMemorySource {
    files: Mutex<BTreeMap<String, (String, String)>>,
    writes: Mutex<Vec<FileWrite>>,
    review_requests: Mutex<Vec<ReviewRequest>>,
    reject_writes: bool,
}

impl InMemorySource {
    pub fn new(files: &[TestFile]) -> Self {
        Self {
            files: Mutex::new(
                files
                    .iter()
                    .map(|f| (f.path.clone(), (f.content.clone(), f.revision_id.clone())))
                    .collect(),
            ),
            writes: Mutex::new(Vec::new()),
            review_requests: Mutex::new(Vec::new()),
            reject_writes: false,
        }
    }

    pub fn rejecting_writes(self) -> Self {
        Self {
            reject_writes: true,
            ..self
        }
    }

    pub fn writes(&self) -> Vec<FileWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn review_requests(&self) -> Vec<ReviewRequest> {
        self.review_requests.lock().unwrap().clone()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(content, _)| content.clone())
    }
}

#[async_trait]
impl SourceProvider for InMemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_files(&self, _git_ref: &str, path_prefix: &str) -> Result<Vec<TestFile>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(path_prefix))
            .map(|(path, (content, revision))| TestFile {
                path: path.clone(),
                content: content.clone(),
                size: content.len() as u64,
                revision_id: revision.clone(),
            })
            .collect())
    }

    async fn file_revision(&self, path: &str, _git_ref: &str) -> Result<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, revision)| revision.clone()))
    }

    async fn write_file(&self, write: &FileWrite) -> Result<()> {
        if self.reject_writes {
            return Err(MendError::Apply {
                path: write.path.clone(),
                message: "branch is protected".to_string(),
            });
        }
        let mut files = self.files.lock().unwrap();
        let revision = format!("rev-{}", self.writes.lock().unwrap().len() + 100);
        files.insert(write.path.clone(), (write.content.clone(), revision));
        self.writes.lock().unwrap().push(write.clone());
        Ok(())
    }

    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String> {
        let mut requests = self.review_requests.lock().unwrap();
        requests.push(request.clone());
        Ok(format!("https://review.example.com/{}", requests.len()))
    }
}
