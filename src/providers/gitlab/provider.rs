use async_trait::async_trait;
use log::{debug, info};

use crate::auth::Token;
use crate::error::{MendError, Result};
use crate::pipeline::state::TestFile;
use crate::providers::http::decode_content;
use crate::providers::{FileWrite, ReviewRequest, SourceProvider, WriteMode};

use super::client::GitLabClient;
use super::types::{FileCommit, NewMergeRequest};

/// Test sources hosted in a GitLab project.
pub struct GitLabProvider {
    client: GitLabClient,
    project_path: String,
    extensions: Vec<String>,
}

impl GitLabProvider {
    /// Creates a provider for `project_path`, which may be a numeric id or
    /// a `group/project` path. Only files ending in one of `extensions` are
    /// treated as tests; an empty list keeps every file.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL cannot be constructed.
    pub fn new(
        base_url: &str,
        project_path: String,
        token: Option<Token>,
        extensions: Vec<String>,
    ) -> Result<Self> {
        if project_path.trim().is_empty() {
            return Err(MendError::Config(
                "GitLab project is required (--project or [gitlab] project)".to_string(),
            ));
        }
        let client = GitLabClient::new(base_url, token)?;

        Ok(Self {
            client,
            project_path,
            extensions,
        })
    }

    fn is_test_file(&self, path: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }
}

#[async_trait]
impl SourceProvider for GitLabProvider {
    fn name(&self) -> &'static str {
        "GitLab"
    }

    async fn list_files(&self, git_ref: &str, path_prefix: &str) -> Result<Vec<TestFile>> {
        info!(
            "Listing test files in {}:{} at {}",
            self.project_path, path_prefix, git_ref
        );

        let tree = self.client.tree(&self.project_path, git_ref, path_prefix).await?;
        let mut files = Vec::new();

        for item in tree.iter().filter(|item| item.is_blob() && self.is_test_file(&item.path)) {
            let file = self
                .client
                .file(&self.project_path, &item.path, git_ref)
                .await?
                .ok_or_else(|| MendError::not_found("file", format!("{}@{git_ref}", item.path)))?;

            debug!("Fetched {} ({} bytes)", file.file_path, file.size);
            files.push(TestFile {
                content: decode_content(&file.file_path, &file.content)?,
                path: file.file_path,
                size: file.size,
                revision_id: file.last_commit_id,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Fetched {} test files", files.len());
        Ok(files)
    }

    async fn file_revision(&self, path: &str, git_ref: &str) -> Result<Option<String>> {
        Ok(self
            .client
            .file(&self.project_path, path, git_ref)
            .await?
            .map(|file| file.last_commit_id))
    }

    async fn write_file(&self, write: &FileWrite) -> Result<()> {
        let last_commit_id = match &write.mode {
            WriteMode::Create => None,
            WriteMode::Update { revision } => Some(revision.as_str()),
        };
        let commit = FileCommit {
            branch: &write.git_ref,
            content: &write.content,
            commit_message: &write.message,
            last_commit_id,
        };
        self.client
            .commit_file(&self.project_path, &write.path, &commit)
            .await
    }

    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String> {
        let merge_request = NewMergeRequest {
            source_branch: &request.source_branch,
            target_branch: &request.target_branch,
            title: &request.title,
            description: &request.description,
        };
        let created = self
            .client
            .create_merge_request(&self.project_path, &merge_request)
            .await?;
        info!("Opened merge request !{} in {}", created.iid, self.project_path);
        Ok(created.web_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use mockito::Matcher;
    use serde_json::json;

    fn provider_for(server: &mockito::Server) -> GitLabProvider {
        GitLabProvider::new(
            &server.url(),
            "42".to_string(),
            Some(Token::from("glpat-test")),
            vec![".py".to_string()],
        )
        .unwrap()
    }

    fn file_body(path: &str, content: &str, commit: &str) -> String {
        json!({
            "file_path": path,
            "size": content.len(),
            "encoding": "base64",
            "content": STANDARD.encode(content),
            "last_commit_id": commit,
        })
        .to_string()
    }

    #[test]
    fn requires_project() {
        let result = GitLabProvider::new("https://gitlab.com", " ".to_string(), None, vec![]);
        assert!(matches!(result, Err(MendError::Config(_))));
    }

    #[tokio::test]
    async fn lists_python_blobs_with_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/repository/tree")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("path".into(), "tests/".into()),
                Matcher::UrlEncoded("ref".into(), "main".into()),
                Matcher::UrlEncoded("recursive".into(), "true".into()),
            ]))
            .match_header("authorization", "Bearer glpat-test")
            .with_status(200)
            .with_header("x-next-page", "")
            .with_body(
                json!([
                    {"id": "a", "name": "unit", "type": "tree", "path": "tests/unit"},
                    {"id": "b", "name": "test_b.py", "type": "blob", "path": "tests/unit/test_b.py"},
                    {"id": "c", "name": "README.md", "type": "blob", "path": "tests/README.md"},
                    {"id": "d", "name": "test_a.py", "type": "blob", "path": "tests/test_a.py"}
                ])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/repository/files/tests%2Ftest_a.py")
            .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
            .with_status(200)
            .with_body(file_body("tests/test_a.py", "def test_a(): pass\n", "c1"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/repository/files/tests%2Funit%2Ftest_b.py")
            .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
            .with_status(200)
            .with_body(file_body("tests/unit/test_b.py", "def test_b(): pass\n", "c2"))
            .create_async()
            .await;

        let files = provider_for(&server).list_files("main", "tests/").await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "tests/test_a.py");
        assert_eq!(files[0].content, "def test_a(): pass\n");
        assert_eq!(files[0].revision_id, "c1");
        assert_eq!(files[1].path, "tests/unit/test_b.py");
    }

    #[tokio::test]
    async fn follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/repository/tree")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("x-next-page", "2")
            .with_body(json!([{"type": "blob", "path": "tests/test_a.py"}]).to_string())
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/v4/projects/42/repository/tree")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("x-next-page", "")
            .with_body(json!([{"type": "blob", "path": "tests/test_b.py"}]).to_string())
            .create_async()
            .await;
        for (path, encoded) in [("tests/test_a.py", "tests%2Ftest_a.py"), ("tests/test_b.py", "tests%2Ftest_b.py")] {
            server
                .mock("GET", format!("/api/v4/projects/42/repository/files/{encoded}").as_str())
                .match_query(Matcher::Any)
                .with_status(200)
                .with_body(file_body(path, "x = 1\n", "c"))
                .create_async()
                .await;
        }

        let files = provider_for(&server).list_files("main", "tests/").await.unwrap();
        assert_eq!(files.len(), 2);
        second.assert_async().await;
    }

    #[tokio::test]
    async fn missing_file_has_no_revision() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/repository/files/tests%2Fnew.py")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"404 File Not Found"}"#)
            .create_async()
            .await;

        let revision = provider_for(&server)
            .file_revision("tests/new.py", "main")
            .await
            .unwrap();
        assert!(revision.is_none());
    }

    #[tokio::test]
    async fn update_puts_with_last_commit_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v4/projects/42/repository/files/tests%2Ftest_a.py")
            .match_body(Matcher::Json(json!({
                "branch": "main",
                "content": "fixed",
                "commit_message": "Fix it...",
                "last_commit_id": "c1"
            })))
            .with_status(200)
            .with_body(r#"{"file_path":"tests/test_a.py","branch":"main"}"#)
            .create_async()
            .await;

        let write = FileWrite {
            path: "tests/test_a.py".to_string(),
            content: "fixed".to_string(),
            message: "Fix it...".to_string(),
            git_ref: "main".to_string(),
            mode: WriteMode::Update {
                revision: "c1".to_string(),
            },
        };
        provider_for(&server).write_file(&write).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_posts_without_commit_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v4/projects/42/repository/files/tests%2Fnew.py")
            .match_body(Matcher::Json(json!({
                "branch": "main",
                "content": "new",
                "commit_message": "Add..."
            })))
            .with_status(201)
            .create_async()
            .await;

        let write = FileWrite {
            path: "tests/new.py".to_string(),
            content: "new".to_string(),
            message: "Add...".to_string(),
            git_ref: "main".to_string(),
            mode: WriteMode::Create,
        };
        provider_for(&server).write_file(&write).await.unwrap();
        mock.assert_async().await;
    }

    fn review_request() -> ReviewRequest {
        ReviewRequest {
            title: "Fix failing tests in tests/test_a.py".to_string(),
            description: "- `tests/test_a.py`: wrong total".to_string(),
            source_branch: "testmend/fixes".to_string(),
            target_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn opens_merge_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v4/projects/42/merge_requests")
            .match_header("authorization", "Bearer glpat-test")
            .match_body(Matcher::Json(json!({
                "source_branch": "testmend/fixes",
                "target_branch": "main",
                "title": "Fix failing tests in tests/test_a.py",
                "description": "- `tests/test_a.py`: wrong total"
            })))
            .with_status(201)
            .with_body(
                json!({"iid": 7, "web_url": "https://gitlab.example.com/group/tests/-/merge_requests/7"})
                    .to_string(),
            )
            .create_async()
            .await;

        let url = provider_for(&server)
            .open_review_request(&review_request())
            .await
            .unwrap();

        assert_eq!(url, "https://gitlab.example.com/group/tests/-/merge_requests/7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn duplicate_merge_request_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v4/projects/42/merge_requests")
            .with_status(409)
            .with_body(r#"{"message":["Another open merge request already exists for this source branch: !7"]}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .open_review_request(&review_request())
            .await
            .unwrap_err();

        match err {
            MendError::Api { status, message, .. } => {
                assert_eq!(status, 409);
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn conflicting_update_is_apply_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/api/v4/projects/42/repository/files/tests%2Ftest_a.py")
            .with_status(400)
            .with_body(r#"{"message":"You are attempting to update a file that has changed since you started editing it."}"#)
            .create_async()
            .await;

        let write = FileWrite {
            path: "tests/test_a.py".to_string(),
            content: "fixed".to_string(),
            message: "m".to_string(),
            git_ref: "main".to_string(),
            mode: WriteMode::Update {
                revision: "stale".to_string(),
            },
        };
        let err = provider_for(&server).write_file(&write).await.unwrap_err();
        match err {
            MendError::Apply { path, message } => {
                assert_eq!(path, "tests/test_a.py");
                assert!(message.contains("changed since"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
