use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::auth::Token;
use crate::error::{MendError, Result};
use crate::providers::http::{ensure_success, read_json, read_text, send};
use crate::providers::{BuildParameters, JobSummary};

use super::types::{BuildInfo, Crumb, JobInfo, JobsResponse};

pub(super) const SERVICE: &str = "Jenkins";

/// Client for the Jenkins JSON API.
pub struct JenkinsClient {
    client: Client,
    base_url: Url,
    user: Option<String>,
    token: Option<Token>,
}

impl JenkinsClient {
    pub fn new(base_url: &str, user: Option<String>, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("testmend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MendError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| MendError::Config(format!("Invalid Jenkins URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            user,
            token,
        })
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.user {
            Some(user) => request.basic_auth(user, self.token.as_ref().map(Token::as_str)),
            None => request,
        }
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| MendError::Config(format!("Invalid Jenkins path '{path}': {e}")))
    }

    /// Folder jobs (`team/unit`) live under nested `job/` segments.
    fn job_path(name: &str) -> String {
        name.split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| format!("job/{}/", urlencoding::encode(segment)))
            .collect()
    }

    fn job_url(&self, name: &str, suffix: &str) -> Result<Url> {
        self.join(&format!("{}{suffix}", Self::job_path(name)))
    }

    fn build_url(&self, name: &str, build_number: u64, suffix: &str) -> Result<Url> {
        self.join(&format!("{}{build_number}/{suffix}", Self::job_path(name)))
    }

    /// GET that maps 404 to `None`.
    async fn get_optional(&self, url: Url, operation: &str) -> Result<Option<Response>> {
        let response = send(SERVICE, operation, self.auth_request(self.client.get(url))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{SERVICE}: {operation} returned 404");
            return Ok(None);
        }
        ensure_success(SERVICE, operation, response).await.map(Some)
    }

    pub async fn job_info(&self, name: &str) -> Result<Option<JobInfo>> {
        let operation = format!("read job '{name}'");
        let url = self.job_url(name, "api/json")?;
        match self.get_optional(url, &operation).await? {
            Some(response) => read_json(SERVICE, &operation, response).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn build_info(&self, name: &str, build_number: u64) -> Result<Option<BuildInfo>> {
        let operation = format!("poll {name} #{build_number}");
        let mut url = self.build_url(name, build_number, "api/json")?;
        url.query_pairs_mut()
            .append_pair("tree", "building,result");
        match self.get_optional(url, &operation).await? {
            Some(response) => read_json(SERVICE, &operation, response).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn jobs(&self) -> Result<Vec<JobSummary>> {
        let operation = "list jobs";
        let mut url = self.join("api/json")?;
        url.query_pairs_mut().append_pair("tree", "jobs[name,url,color]");
        let response = send(SERVICE, operation, self.auth_request(self.client.get(url))).await?;
        let response = ensure_success(SERVICE, operation, response).await?;
        let body: JobsResponse = read_json(SERVICE, operation, response).await?;
        Ok(body.jobs)
    }

    /// Checks the credentials against the server root and returns the
    /// version it advertises in the `X-Jenkins` header.
    pub async fn server_version(&self) -> Result<Option<String>> {
        let operation = "test connection";
        let url = self.join("api/json")?;
        let response = send(SERVICE, operation, self.auth_request(self.client.get(url))).await?;
        let response = ensure_success(SERVICE, operation, response).await?;
        Ok(response
            .headers()
            .get("x-jenkins")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string))
    }

    async fn crumb(&self) -> Result<Option<Crumb>> {
        let operation = "request CSRF crumb";
        let url = self.join("crumbIssuer/api/json")?;
        match self.get_optional(url, operation).await? {
            Some(response) => read_json(SERVICE, operation, response).await.map(Some),
            None => Ok(None),
        }
    }

    /// Queues a build and returns the job's `nextBuildNumber` as read just
    /// before submission. Concurrent triggers of the same job can race on it.
    pub async fn queue_build(&self, name: &str, parameters: &BuildParameters) -> Result<u64> {
        let info = self
            .job_info(name)
            .await?
            .ok_or_else(|| MendError::not_found("job", name))?;
        let build_number = info.next_build_number;

        let operation = format!("trigger {name} #{build_number}");
        let endpoint = if parameters.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let url = self.job_url(name, endpoint)?;

        let mut request = self.auth_request(self.client.post(url));
        if let Some(crumb) = self.crumb().await? {
            request = request.header(crumb.crumb_request_field.as_str(), crumb.crumb.as_str());
        }
        if !parameters.is_empty() {
            request = request.form(parameters);
        }

        let response = send(SERVICE, &operation, request).await?;
        ensure_success(SERVICE, &operation, response).await?;
        debug!("{SERVICE}: queued {name}, expecting build #{build_number}");
        Ok(build_number)
    }

    pub async fn console_text(&self, name: &str, build_number: u64) -> Result<String> {
        let operation = format!("fetch console log of {name} #{build_number}");
        let url = self.build_url(name, build_number, "consoleText")?;
        let response = self
            .get_optional(url, &operation)
            .await?
            .ok_or_else(|| MendError::not_found("build", format!("{name} #{build_number}")))?;
        read_text(SERVICE, &operation, response).await
    }
}
