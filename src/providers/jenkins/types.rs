use serde::{Deserialize, Serialize};

use crate::providers::JobSummary;

/// Body of `GET /job/:name/api/json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub buildable: Option<bool>,
    #[serde(default)]
    pub color: Option<String>,
    pub next_build_number: u64,
    #[serde(default)]
    pub last_build: Option<BuildRef>,
    #[serde(default)]
    pub last_successful_build: Option<BuildRef>,
    #[serde(default)]
    pub last_failed_build: Option<BuildRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: u64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildInfo {
    pub building: bool,
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct JobsResponse {
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

/// CSRF protection token issued by `crumbIssuer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Crumb {
    pub crumb: String,
    pub crumb_request_field: String,
}
