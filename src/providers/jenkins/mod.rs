mod client;
mod provider;
mod types;

pub use client::JenkinsClient;
pub use types::{BuildRef, JobInfo};
