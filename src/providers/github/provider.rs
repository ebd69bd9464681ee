use async_trait::async_trait;
use log::{debug, info};

use crate::auth::Token;
use crate::error::{MendError, Result};
use crate::pipeline::state::TestFile;
use crate::providers::http::{decode_content, encode_content};
use crate::providers::{FileWrite, ReviewRequest, SourceProvider, WriteMode};

use super::client::GitHubClient;
use super::types::{ContentEntry, Contents, NewPullRequest, PutContents};

/// Test sources hosted in a GitHub repository.
pub struct GitHubProvider {
    /// GitHub API client
    client: GitHubClient,
    /// Repository owner
    pub(super) owner: String,
    /// Repository name
    pub(super) repo: String,
    extensions: Vec<String>,
}

impl GitHubProvider {
    /// Create a new GitHub source provider.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL
    /// * `project_path` - Repository path in format "owner/repo"
    /// * `token` - Optional GitHub personal access token
    /// * `extensions` - Suffixes that mark a test file (empty keeps everything)
    pub fn new(
        base_url: &str,
        project_path: &str,
        token: Option<Token>,
        extensions: Vec<String>,
    ) -> Result<Self> {
        let parts: Vec<&str> = project_path.split('/').collect();
        if parts.len() != 2 || parts.iter().any(|part| part.is_empty()) {
            return Err(MendError::Config(format!(
                "Repository path must be in format 'owner/repo', got '{project_path}'"
            )));
        }

        let owner = parts[0].to_string();
        let repo = parts[1].to_string();
        let client = GitHubClient::new(base_url, owner.clone(), repo.clone(), token)?;

        Ok(Self {
            client,
            owner,
            repo,
            extensions,
        })
    }

    pub(super) fn is_test_file(&self, path: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    async fn fetch_file(&self, entry: &ContentEntry, git_ref: &str) -> Result<TestFile> {
        let encoded = match &entry.content {
            Some(content) => content.clone(),
            None => match self.client.contents(&entry.path, git_ref).await? {
                Some(Contents::File(file)) => file.content.unwrap_or_default(),
                Some(Contents::Directory(_)) => {
                    return Err(MendError::Parse(format!(
                        "{} was listed as a file but is a directory",
                        entry.path
                    )))
                }
                None => return Err(MendError::not_found("file", format!("{}@{git_ref}", entry.path))),
            },
        };

        debug!("Fetched {} ({} bytes)", entry.path, entry.size);
        Ok(TestFile {
            path: entry.path.clone(),
            content: decode_content(&entry.path, &encoded)?,
            size: entry.size,
            revision_id: entry.sha.clone(),
        })
    }
}

#[async_trait]
impl SourceProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "GitHub"
    }

    async fn list_files(&self, git_ref: &str, path_prefix: &str) -> Result<Vec<TestFile>> {
        info!(
            "Listing test files in {}/{}:{} at {}",
            self.owner, self.repo, path_prefix, git_ref
        );

        let mut pending = vec![path_prefix.to_string()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let entries = match self.client.contents(&dir, git_ref).await? {
                Some(Contents::Directory(entries)) => entries,
                Some(Contents::File(entry)) => vec![entry],
                None => {
                    return Err(MendError::not_found(
                        "path",
                        format!("{}/{}:{dir}@{git_ref}", self.owner, self.repo),
                    ))
                }
            };

            for entry in entries {
                if entry.is_dir() {
                    pending.push(entry.path);
                } else if entry.is_file() && self.is_test_file(&entry.path) {
                    files.push(self.fetch_file(&entry, git_ref).await?);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Fetched {} test files", files.len());
        Ok(files)
    }

    async fn file_revision(&self, path: &str, git_ref: &str) -> Result<Option<String>> {
        match self.client.contents(path, git_ref).await? {
            Some(Contents::File(entry)) => Ok(Some(entry.sha)),
            Some(Contents::Directory(_)) => Err(MendError::Apply {
                path: path.to_string(),
                message: "path is a directory".to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn write_file(&self, write: &FileWrite) -> Result<()> {
        let sha = match &write.mode {
            WriteMode::Create => None,
            WriteMode::Update { revision } => Some(revision.as_str()),
        };
        let body = PutContents {
            message: &write.message,
            content: encode_content(&write.content),
            branch: &write.git_ref,
            sha,
        };
        self.client.put_contents(&write.path, &body).await
    }

    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String> {
        let pull = NewPullRequest {
            title: &request.title,
            body: &request.description,
            head: &request.source_branch,
            base: &request.target_branch,
        };
        let created = self.client.create_pull(&pull).await?;
        info!("Opened pull request #{} in {}/{}", created.number, self.owner, self.repo);
        Ok(created.html_url)
    }
}
