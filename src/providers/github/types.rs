use serde::{Deserialize, Serialize};

/// Response of `GET /repos/{owner}/{repo}/contents/{path}`.
///
/// Directories come back as an array of entries, files as a single object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    /// `file`, `dir`, `symlink` or `submodule`
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// Base64 payload, only present when the path names a single file.
    #[serde(default)]
    pub content: Option<String>,
}

impl ContentEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// Body of `PUT /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Serialize)]
pub struct PutContents<'a> {
    pub message: &'a str,
    /// Base64-encoded new content
    pub content: String,
    pub branch: &'a str,
    /// Blob sha being replaced; omitted when creating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

/// Body of `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Serialize)]
pub struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    /// Branch holding the changes
    pub head: &'a str,
    /// Branch the changes should land in
    pub base: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}
