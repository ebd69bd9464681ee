use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration file structure for testmend.
///
/// Holds connection settings for the source, build and model backends plus
/// pipeline defaults. Every value can be overridden on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub jenkins: JenkinsConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gitlab,
    Github,
}

/// Where the test files come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Branch, tag or commit to fetch from and commit fixes to
    #[serde(default = "default_ref", rename = "ref")]
    pub git_ref: String,

    /// Directory holding the tests
    #[serde(default = "default_path")]
    pub path: String,

    /// File suffixes that mark a test file
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// Project path (e.g., 'group/project') or numeric id
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// GitHub API base URL
    #[serde(default = "default_github_base_url")]
    pub base_url: String,

    /// Repository path (e.g., 'owner/repo')
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    pub url: Option<String>,

    pub user: Option<String>,

    /// API token (or password) for `user`
    pub token: Option<String>,

    /// Job triggered by `run-remote` and `run` when none is given
    pub job: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Sent as the `system` field of every generation request
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_pending_interval_secs")]
    pub pending_interval_secs: u64,

    #[serde(default = "default_running_interval_secs")]
    pub running_interval_secs: u64,
}

/// Command running the tests locally; `{dir}` is replaced by the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocalConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            git_ref: default_ref(),
            path: default_path(),
            extensions: default_extensions(),
        }
    }
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
            project: None,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_github_base_url(),
            repo: None,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            system_prompt: None,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            pending_interval_secs: default_pending_interval_secs(),
            running_interval_secs: default_running_interval_secs(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

fn default_ref() -> String {
    "main".to_string()
}

fn default_path() -> String {
    "tests/".to_string()
}

fn default_extensions() -> Vec<String> {
    vec![".py".to_string()]
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gemma2:7b".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_pending_interval_secs() -> u64 {
    5
}

fn default_running_interval_secs() -> u64 {
    10
}

fn default_program() -> String {
    "python".to_string()
}

fn default_args() -> Vec<String> {
    ["-m", "pytest", "{dir}", "-v"].iter().map(|arg| arg.to_string()).collect()
}

const CANDIDATES: [&str; 4] = ["testmend.toml", "testmend.json", "testmend.yaml", "testmend.yml"];

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./testmend.toml
    /// 3. ./testmend.json
    /// 4. ./testmend.yaml
    /// 5. ./testmend.yml
    ///
    /// Returns default configuration if no file is found. A specified path
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_dir(Path::new(".")),
        }
    }

    fn load_from_dir(dir: &Path) -> Result<Self> {
        for candidate in CANDIDATES {
            let path = dir.join(candidate);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
