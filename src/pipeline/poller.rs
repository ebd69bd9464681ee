use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

use crate::error::{MendError, Result};
use crate::pipeline::state::BuildStatus;
use crate::providers::{BuildParameters, BuildPoll, BuildSystem};

/// Wait budget and cadence of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Wall-clock deadline after which the build is reported as `TIMEOUT`.
    pub timeout: Duration,
    /// Interval while the build number is not assigned yet.
    pub pending_interval: Duration,
    /// Interval while the build is running.
    pub running_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            pending_interval: Duration::from_secs(5),
            running_interval: Duration::from_secs(10),
        }
    }
}

impl PollSettings {
    /// # Errors
    ///
    /// `Config` when any duration is zero. A zero interval would query the
    /// build system back to back until the deadline.
    pub fn new(timeout: Duration, pending_interval: Duration, running_interval: Duration) -> Result<Self> {
        for (name, value) in [
            ("timeout-secs", timeout),
            ("pending-interval-secs", pending_interval),
            ("running-interval-secs", running_interval),
        ] {
            if value.is_zero() {
                return Err(MendError::Config(format!("[poll] {name} must be greater than zero")));
            }
        }
        Ok(Self {
            timeout,
            pending_interval,
            running_interval,
        })
    }
}

/// Drives one remote build from trigger to a terminal status.
///
/// The poller never cancels anything remotely: a build that outlives the
/// deadline keeps running on the executor.
pub struct BuildPoller<'a> {
    builds: &'a dyn BuildSystem,
    settings: PollSettings,
}

impl<'a> BuildPoller<'a> {
    pub fn new(builds: &'a dyn BuildSystem, settings: PollSettings) -> Self {
        Self { builds, settings }
    }

    /// Submits a build of `job_name` and returns the number it should get.
    ///
    /// # Errors
    ///
    /// `NotFound` listing the known job names when the job does not exist.
    pub async fn trigger(&self, job_name: &str, parameters: &BuildParameters) -> Result<u64> {
        if !self.builds.job_exists(job_name).await? {
            let known = match self.builds.list_jobs().await {
                Ok(jobs) => jobs.into_iter().map(|job| job.name).collect(),
                Err(e) => {
                    warn!("Could not list jobs while reporting unknown job '{job_name}': {e}");
                    Vec::new()
                }
            };
            return Err(MendError::NotFound {
                kind: "job",
                name: job_name.to_string(),
                known,
            });
        }

        let build_number = self.builds.trigger(job_name, parameters).await?;
        info!("Triggered {job_name}, expecting build #{build_number}");
        Ok(build_number)
    }

    /// Polls until the build leaves the running state or `timeout` elapses.
    ///
    /// Returns the terminal status, or `BuildStatus::Timeout` once the
    /// deadline passes. Sleeps never overshoot the deadline.
    pub async fn poll_status(
        &self,
        job_name: &str,
        build_number: u64,
        timeout: Duration,
    ) -> Result<BuildStatus> {
        let started = Instant::now();
        let mut polls = 0_u32;

        loop {
            if started.elapsed() >= timeout {
                warn!(
                    "{job_name} #{build_number} still running after {}s ({polls} polls), giving up",
                    timeout.as_secs()
                );
                return Ok(BuildStatus::Timeout);
            }

            polls += 1;
            let interval = match self.builds.poll_once(job_name, build_number).await? {
                BuildPoll::Finished(status) if status.is_terminal() => {
                    info!("{job_name} #{build_number} finished with {status} after {polls} polls");
                    return Ok(status);
                }
                BuildPoll::Running | BuildPoll::Finished(_) => {
                    debug!("{job_name} #{build_number} is running");
                    self.settings.running_interval
                }
                BuildPoll::NotVisible => {
                    debug!("{job_name} #{build_number} is not visible yet");
                    self.settings.pending_interval
                }
            };

            let remaining = timeout.saturating_sub(started.elapsed());
            sleep(interval.min(remaining)).await;
        }
    }

    /// Polls with the configured default deadline.
    pub async fn wait(&self, job_name: &str, build_number: u64) -> Result<BuildStatus> {
        self.poll_status(job_name, build_number, self.settings.timeout).await
    }

    pub async fn fetch_log(&self, job_name: &str, build_number: u64) -> Result<String> {
        self.builds.fetch_log(job_name, build_number).await
    }
}
