use async_trait::async_trait;

use crate::error::{MendError, Result};
use crate::pipeline::state::BuildStatus;
use crate::providers::{BuildParameters, BuildPoll, BuildSystem, JobSummary};

use super::client::JenkinsClient;

#[async_trait]
impl BuildSystem for JenkinsClient {
    async fn job_exists(&self, name: &str) -> Result<bool> {
        Ok(self.job_info(name).await?.is_some())
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        self.jobs().await
    }

    async fn trigger(&self, name: &str, parameters: &BuildParameters) -> Result<u64> {
        self.queue_build(name, parameters).await
    }

    async fn poll_once(&self, name: &str, build_number: u64) -> Result<BuildPoll> {
        match self.build_info(name, build_number).await? {
            Some(info) if info.building => Ok(BuildPoll::Running),
            Some(info) => Ok(BuildPoll::Finished(BuildStatus::from_result_code(
                info.result.as_deref(),
            ))),
            // A 404 on the build only means "queued" while the job itself exists.
            None if self.job_exists(name).await? => Ok(BuildPoll::NotVisible),
            None => Err(MendError::not_found("job", name)),
        }
    }

    async fn fetch_log(&self, name: &str, build_number: u64) -> Result<String> {
        self.console_text(name, build_number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    async fn client_for(server: &mockito::Server) -> JenkinsClient {
        JenkinsClient::new(&server.url(), None, None).unwrap()
    }

    #[tokio::test]
    async fn running_build_polls_as_running() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/unit/3/api/json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"number":3,"building":true,"result":null}"#)
            .create_async()
            .await;

        let jenkins = client_for(&server).await;
        assert_eq!(jenkins.poll_once("unit", 3).await.unwrap(), BuildPoll::Running);
    }

    #[tokio::test]
    async fn finished_build_reports_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/unit/3/api/json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"number":3,"building":false,"result":"FAILURE"}"#)
            .create_async()
            .await;

        let jenkins = client_for(&server).await;
        assert_eq!(
            jenkins.poll_once("unit", 3).await.unwrap(),
            BuildPoll::Finished(BuildStatus::Failure)
        );
    }

    #[tokio::test]
    async fn queued_build_is_not_visible_yet() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/unit/4/api/json")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/job/unit/api/json")
            .with_status(200)
            .with_body(r#"{"nextBuildNumber":5}"#)
            .create_async()
            .await;

        let jenkins = client_for(&server).await;
        assert_eq!(jenkins.poll_once("unit", 4).await.unwrap(), BuildPoll::NotVisible);
    }

    #[tokio::test]
    async fn build_of_missing_job_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/gone/1/api/json")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/job/gone/api/json")
            .with_status(404)
            .create_async()
            .await;

        let jenkins = client_for(&server).await;
        let err = jenkins.poll_once("gone", 1).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
