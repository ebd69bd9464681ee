use reqwest::{Client, StatusCode};
use url::Url;

use crate::auth::Token;
use crate::error::{MendError, Result};
use crate::providers::http::{ensure_success, read_json, send};

use super::types::{FileCommit, MergeRequest, NewMergeRequest, RepositoryFile, TreeItem};

pub(super) const SERVICE: &str = "GitLab";
const PAGE_SIZE: usize = 100;

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("testmend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MendError::Config(format!("Failed to create HTTP client: {e}")))?;

        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let api_url = Url::parse(&normalized)
            .map_err(|e| MendError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| MendError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    /// Helper to build authenticated requests
    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Construct project base URL
    fn project_url(&self, project_id: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/", urlencoding::encode(project_id)))
            .map_err(|e| MendError::Config(format!("Invalid project URL: {e}")))
    }

    /// The files API wants the whole path as one encoded segment.
    fn file_url(&self, project_id: &str, path: &str) -> Result<Url> {
        self.project_url(project_id)?
            .join(&format!("repository/files/{}", urlencoding::encode(path)))
            .map_err(|e| MendError::Config(format!("Invalid file path '{path}': {e}")))
    }

    /// Lists every tree entry under `path`, following `x-next-page`.
    pub async fn tree(&self, project_id: &str, git_ref: &str, path: &str) -> Result<Vec<TreeItem>> {
        let operation = format!("list {project_id}:{path} at {git_ref}");
        let tree_url = self
            .project_url(project_id)?
            .join("repository/tree")
            .map_err(|e| MendError::Config(format!("Invalid tree URL: {e}")))?;

        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let page_str = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let request = self.auth_request(self.client.get(tree_url.clone()).query(&[
                ("path", path),
                ("ref", git_ref),
                ("recursive", "true"),
                ("per_page", per_page.as_str()),
                ("page", page_str.as_str()),
            ]));

            let response = send(SERVICE, &operation, request).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(MendError::not_found("path", format!("{project_id}:{path}@{git_ref}")));
            }
            let response = ensure_success(SERVICE, &operation, response).await?;

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u32>().ok());

            let batch: Vec<TreeItem> = read_json(SERVICE, &operation, response).await?;
            items.extend(batch);

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(items)
    }

    pub async fn file(&self, project_id: &str, path: &str, git_ref: &str) -> Result<Option<RepositoryFile>> {
        let operation = format!("read {path} at {git_ref}");
        let url = self.file_url(project_id, path)?;
        let request = self.auth_request(self.client.get(url).query(&[("ref", git_ref)]));

        let response = send(SERVICE, &operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(SERVICE, &operation, response).await?;
        read_json(SERVICE, &operation, response).await.map(Some)
    }

    /// Creates the file (`POST`) or updates it (`PUT`) when `commit` carries
    /// the last commit id the caller saw.
    pub async fn commit_file(&self, project_id: &str, path: &str, commit: &FileCommit<'_>) -> Result<()> {
        let operation = format!("commit {path} to {}", commit.branch);
        let url = self.file_url(project_id, path)?;
        let request = if commit.last_commit_id.is_some() {
            self.client.put(url)
        } else {
            self.client.post(url)
        };

        let response = send(SERVICE, &operation, self.auth_request(request.json(commit))).await?;
        let status = response.status();
        if matches!(status.as_u16(), 400 | 409 | 422) {
            let message = response.text().await.unwrap_or_default();
            return Err(MendError::Apply {
                path: path.to_string(),
                message: format!("GitLab rejected the commit ({}): {message}", status.as_u16()),
            });
        }
        ensure_success(SERVICE, &operation, response).await?;
        Ok(())
    }

    pub async fn create_merge_request(
        &self,
        project_id: &str,
        merge_request: &NewMergeRequest<'_>,
    ) -> Result<MergeRequest> {
        let operation = format!(
            "open merge request {} -> {}",
            merge_request.source_branch, merge_request.target_branch
        );
        let url = self
            .project_url(project_id)?
            .join("merge_requests")
            .map_err(|e| MendError::Config(format!("Invalid merge request URL: {e}")))?;

        let request = self.auth_request(self.client.post(url).json(merge_request));
        let response = send(SERVICE, &operation, request).await?;
        let response = ensure_success(SERVICE, &operation, response).await?;
        read_json(SERVICE, &operation, response).await
    }
}
