use serde::{Deserialize, Serialize};

/// Entry of `GET /projects/:id/repository/tree`.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeItem {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeItem {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// Body of `GET /projects/:id/repository/files/:path`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryFile {
    pub file_path: String,
    pub size: u64,
    pub content: String,
    pub last_commit_id: String,
}

/// Body of a create (`POST`) or update (`PUT`) on the files API.
#[derive(Debug, Serialize)]
pub struct FileCommit<'a> {
    pub branch: &'a str,
    pub content: &'a str,
    pub commit_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_id: Option<&'a str>,
}

/// Body of `POST /projects/:id/merge_requests`.
#[derive(Debug, Serialize)]
pub struct NewMergeRequest<'a> {
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub title: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub web_url: String,
}
