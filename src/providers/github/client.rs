use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use url::Url;

use crate::auth::Token;
use crate::error::{MendError, Result};
use crate::providers::http::{encode_path, ensure_success, read_json, send};

use super::types::{Contents, NewPullRequest, PullRequest, PutContents};

pub(super) const SERVICE: &str = "GitHub";

/// GitHub REST client scoped to one repository.
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL for GitHub API
    base_url: Url,
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `owner` - Repository owner/organization
    /// * `repo` - Repository name
    /// * `token` - Optional GitHub personal access token
    pub fn new(base_url: &str, owner: String, repo: String, token: Option<Token>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("testmend/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| MendError::Config("GitHub token contains invalid characters".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MendError::Config(format!("Failed to create HTTP client: {e}")))?;

        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| MendError::Config(format!("Invalid GitHub API URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            owner,
            repo,
        })
    }

    fn contents_url(&self, path: &str) -> Result<Url> {
        let relative = format!(
            "repos/{}/{}/contents/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repo),
            encode_path(path.trim_matches('/'))
        );
        self.base_url
            .join(&relative)
            .map_err(|e| MendError::Config(format!("Invalid contents path '{path}': {e}")))
    }

    fn pulls_url(&self) -> Result<Url> {
        let relative = format!(
            "repos/{}/{}/pulls",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repo)
        );
        self.base_url
            .join(&relative)
            .map_err(|e| MendError::Config(format!("Invalid pulls URL: {e}")))
    }

    /// Fetch a file or directory listing; `None` when the path does not exist at `git_ref`.
    pub async fn contents(&self, path: &str, git_ref: &str) -> Result<Option<Contents>> {
        let operation = format!("read {}/{}:{path} at {git_ref}", self.owner, self.repo);
        let request = self
            .client
            .get(self.contents_url(path)?)
            .query(&[("ref", git_ref)]);

        let response = send(SERVICE, &operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(SERVICE, &operation, response).await?;
        read_json(SERVICE, &operation, response).await.map(Some)
    }

    /// Create or update a file in a single commit.
    pub async fn put_contents(&self, path: &str, body: &PutContents<'_>) -> Result<()> {
        let operation = format!("commit {path} to {}", body.branch);
        let request = self.client.put(self.contents_url(path)?).json(body);

        let response = send(SERVICE, &operation, request).await?;
        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            let message = response.text().await.unwrap_or_default();
            return Err(MendError::Apply {
                path: path.to_string(),
                message: format!("GitHub rejected the commit ({}): {message}", status.as_u16()),
            });
        }
        ensure_success(SERVICE, &operation, response).await?;
        Ok(())
    }

    /// Open a pull request from `head` into `base`.
    pub async fn create_pull(&self, pull: &NewPullRequest<'_>) -> Result<PullRequest> {
        let operation = format!("open pull request {} -> {}", pull.head, pull.base);
        let request = self.client.post(self.pulls_url()?).json(pull);

        let response = send(SERVICE, &operation, request).await?;
        let response = ensure_success(SERVICE, &operation, response).await?;
        read_json(SERVICE, &operation, response).await
    }
}
