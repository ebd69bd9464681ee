use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use crate::auth::Token;
use crate::config::{Config, ProviderKind};
use crate::error::MendError;
use crate::output::{self, bright_green, bright_red, cyan, dim, PhaseProgress};
use crate::pipeline::{
    ApplyOutcome, ApplyTarget, Fix, LocalRunner, Orchestrator, PipelineState, PollSettings,
};
use crate::providers::{
    BuildParameters, GitHubProvider, GitLabProvider, JenkinsClient, OllamaClient, SourceProvider,
};
use crate::store::StateStore;

#[derive(Parser)]
#[command(name = "testmend")]
#[command(author, version, about = "Run, diagnose and repair failing tests", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./testmend.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pipeline state file (default: <cache dir>/testmend/state.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Also write the command's result as JSON to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(flatten)]
    backends: BackendArgs,
}

/// Overrides for the `[source]`, `[gitlab]`, `[github]`, `[jenkins]` and `[ollama]` config sections.
#[derive(Args, Debug, Default)]
struct BackendArgs {
    #[arg(long, global = true, value_enum)]
    provider: Option<ProviderKind>,

    #[arg(long, global = true)]
    gitlab_url: Option<String>,

    #[arg(long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    gitlab_token: Option<String>,

    /// GitLab project path or id
    #[arg(long, global = true)]
    project: Option<String>,

    #[arg(long, global = true)]
    github_url: Option<String>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub repository as owner/repo
    #[arg(long, global = true)]
    repo: Option<String>,

    #[arg(long, global = true, env = "JENKINS_URL")]
    jenkins_url: Option<String>,

    #[arg(long, global = true, env = "JENKINS_USER")]
    jenkins_user: Option<String>,

    #[arg(long, global = true, env = "JENKINS_TOKEN", hide_env_values = true)]
    jenkins_token: Option<String>,

    #[arg(long, global = true, env = "OLLAMA_HOST")]
    ollama_host: Option<String>,

    #[arg(long, global = true, env = "OLLAMA_MODEL")]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the test files from the repository
    Fetch {
        #[arg(short, long = "ref")]
        git_ref: Option<String>,

        #[arg(long)]
        path: Option<String>,
    },

    /// Run the fetched tests on this machine
    RunLocal,

    /// Run the fetched tests on Jenkins and collect the console log
    RunRemote {
        /// Job to trigger (default: [jenkins] job)
        job: Option<String>,

        /// Extra build parameter, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Seconds to wait for the build (default: [poll] timeout-secs)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Diagnose the latest test run
    Analyze,

    /// Generate fixes for the files named in the diagnostic
    Fix,

    /// Apply the generated fix for FILE
    Apply {
        file: String,

        /// Commit the fix to the repository instead of only marking it applied
        #[arg(long)]
        commit: bool,

        /// Branch to commit to (default: the ref the tests were fetched from)
        #[arg(short, long = "ref", requires = "commit")]
        git_ref: Option<String>,

        /// Open a merge/pull request for the committed fixes
        #[arg(long, requires = "commit")]
        open_mr: bool,

        /// Branch the merge/pull request targets (default: [source] ref)
        #[arg(long, requires = "open_mr")]
        target: Option<String>,
    },

    /// Fetch, run, analyze and generate fixes in one go
    Run {
        #[arg(long, conflicts_with = "local")]
        job: Option<String>,

        /// Run the tests locally instead of on Jenkins
        #[arg(long)]
        local: bool,

        /// Apply every generated fix
        #[arg(long, value_enum)]
        apply: Option<ApplyMode>,

        #[arg(short, long = "ref")]
        git_ref: Option<String>,

        #[arg(long)]
        path: Option<String>,

        /// Open a merge/pull request once the fixes are committed (needs --apply source)
        #[arg(long, requires = "apply")]
        open_mr: bool,

        /// Branch the merge/pull request targets (default: [source] ref)
        #[arg(long, requires = "open_mr")]
        target: Option<String>,
    },

    /// Print the recorded pipeline state
    Show,

    /// List Jenkins jobs, or show the details of NAME
    Jobs { name: Option<String> },

    /// Check the Jenkins connection and the Ollama model
    Check {
        /// Pull the model when it is missing
        #[arg(long)]
        pull: bool,
    },

    /// Write the effective configuration, without credentials, to PATH
    Init {
        #[arg(default_value = "testmend.toml")]
        path: PathBuf,
    },

    /// Delete the recorded pipeline state
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ApplyMode {
    Local,
    Source,
}

impl ApplyMode {
    fn target(self) -> ApplyTarget {
        match self {
            Self::Local => ApplyTarget::Local,
            Self::Source => ApplyTarget::Source { git_ref: None },
        }
    }
}

#[derive(Serialize)]
struct ApplyReport<'a> {
    fix: &'a Fix,
    #[serde(skip_serializing_if = "Option::is_none")]
    review_url: Option<String>,
}

#[derive(Serialize)]
struct CheckReport {
    jenkins_version: Option<String>,
    model: String,
    model_available: bool,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl BackendArgs {
    /// Layers command-line and environment values over the file configuration.
    fn apply(&self, config: &mut Config) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }
        fn set_opt(target: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        if let Some(provider) = self.provider {
            config.source.provider = provider;
        }
        set(&mut config.gitlab.base_url, &self.gitlab_url);
        set_opt(&mut config.gitlab.token, &self.gitlab_token);
        set_opt(&mut config.gitlab.project, &self.project);
        set(&mut config.github.base_url, &self.github_url);
        set_opt(&mut config.github.token, &self.github_token);
        set_opt(&mut config.github.repo, &self.repo);
        set_opt(&mut config.jenkins.url, &self.jenkins_url);
        set_opt(&mut config.jenkins.user, &self.jenkins_user);
        set_opt(&mut config.jenkins.token, &self.jenkins_token);
        set(&mut config.ollama.host, &self.ollama_host);
        set(&mut config.ollama.model, &self.model);
    }
}

fn source_provider(config: &Config) -> Result<Option<Arc<dyn SourceProvider>>> {
    let extensions = config.source.extensions.clone();
    let provider: Arc<dyn SourceProvider> = match config.source.provider {
        ProviderKind::Gitlab => {
            let Some(project) = &config.gitlab.project else {
                return Ok(None);
            };
            let token = config.gitlab.token.as_deref().map(Token::from);
            Arc::new(GitLabProvider::new(&config.gitlab.base_url, project.clone(), token, extensions)?)
        }
        ProviderKind::Github => {
            let Some(repo) = &config.github.repo else {
                return Ok(None);
            };
            let token = config.github.token.as_deref().map(Token::from);
            Arc::new(GitHubProvider::new(&config.github.base_url, repo, token, extensions)?)
        }
    };
    Ok(Some(provider))
}

fn jenkins_client(config: &Config) -> Result<Option<JenkinsClient>> {
    let Some(url) = &config.jenkins.url else {
        return Ok(None);
    };
    let token = config.jenkins.token.as_deref().map(Token::from);
    Ok(Some(JenkinsClient::new(url, config.jenkins.user.clone(), token)?))
}

fn ollama_client(config: &Config) -> Result<OllamaClient> {
    let client = OllamaClient::new(
        &config.ollama.host,
        config.ollama.model.clone(),
        Duration::from_secs(config.ollama.request_timeout_secs),
    )?;
    Ok(match &config.ollama.system_prompt {
        Some(system_prompt) => client.with_system_prompt(system_prompt.clone()),
        None => client,
    })
}

fn orchestrator(config: &Config) -> Result<Orchestrator> {
    let poll = PollSettings::new(
        Duration::from_secs(config.poll.timeout_secs),
        Duration::from_secs(config.poll.pending_interval_secs),
        Duration::from_secs(config.poll.running_interval_secs),
    )?;
    let mut orchestrator = Orchestrator::new()
        .with_text_generator(Arc::new(ollama_client(config)?))
        .with_poll_settings(poll)
        .with_local_runner(LocalRunner::new(config.local.program.clone(), config.local.args.clone()));

    if let Some(source) = source_provider(config)? {
        orchestrator = orchestrator.with_source(source);
    }
    if let Some(jenkins) = jenkins_client(config)? {
        orchestrator = orchestrator.with_build_system(Arc::new(jenkins));
    }
    Ok(orchestrator)
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        self.backends.apply(&mut config);
        Ok(config)
    }

    /// Writes `value` as JSON to `--output` when one was given.
    fn emit(&self, value: &impl Serialize) -> Result<()> {
        let Some(output_path) = &self.output else {
            return Ok(());
        };
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        std::fs::write(output_path, json_output)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        info!("Result written to: {}", output_path.display());
        Ok(())
    }

    fn default_job(config: &Config, job: Option<&String>) -> Result<String> {
        match job.or(config.jenkins.job.as_ref()) {
            Some(job) => Ok(job.clone()),
            None => bail!("No job given: pass JOB or set [jenkins] job"),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        let store = StateStore::new(self.state.clone())?;

        match &self.command {
            Commands::Fetch { git_ref, path } => {
                let git_ref = git_ref.as_deref().unwrap_or(&config.source.git_ref);
                let path = path.as_deref().unwrap_or(&config.source.path);
                let orchestrator = orchestrator(&config)?;
                let mut state = store.load()?;
                let tests = orchestrator.fetch(&mut state, git_ref, path).await?.to_vec();
                store.save(&state)?;
                output::print_tests(&tests);
                self.emit(&tests)
            }
            Commands::RunLocal => {
                let orchestrator = orchestrator(&config)?;
                let mut state = store.load()?;
                let execution = orchestrator.execute_local(&mut state).await?.clone();
                store.save(&state)?;
                output::print_execution(&execution);
                self.emit(&execution)
            }
            Commands::RunRemote {
                job,
                params,
                timeout,
            } => {
                let job = Self::default_job(&config, job.as_ref())?;
                let extra: BuildParameters = params.iter().cloned().collect();
                let orchestrator = orchestrator(&config)?;
                let mut state = store.load()?;
                let result = orchestrator
                    .execute_remote(&mut state, &job, &extra, timeout.map(Duration::from_secs))
                    .await
                    .cloned();
                // A timed-out run is recorded too.
                store.save(&state)?;
                let execution = result?;
                output::print_execution(&execution);
                self.emit(&execution)
            }
            Commands::Analyze => {
                let orchestrator = orchestrator(&config)?;
                let mut state = store.load()?;
                let diagnostic = orchestrator.analyze(&mut state).await?.clone();
                store.save(&state)?;
                output::print_diagnostic(&diagnostic);
                self.emit(&diagnostic)
            }
            Commands::Fix => {
                let orchestrator = orchestrator(&config)?;
                let mut state = store.load()?;
                let report = orchestrator.generate_fixes(&mut state).await?.clone();
                store.save(&state)?;
                output::print_fixes(&report);
                self.emit(&report)
            }
            Commands::Apply {
                file,
                commit,
                git_ref,
                open_mr,
                target,
            } => {
                let apply_target = if *commit {
                    ApplyTarget::Source {
                        git_ref: git_ref.clone(),
                    }
                } else {
                    ApplyTarget::Local
                };
                let orchestrator = orchestrator(&config)?;
                let mut state = store.load()?;
                let (fix, outcome) = orchestrator.apply_fix(&mut state, file, apply_target).await?;
                let fix = fix.clone();
                store.save(&state)?;
                print_apply_outcome(&fix.file_path, &outcome);

                let review_url = if *open_mr {
                    let target = target.as_deref().unwrap_or(&config.source.git_ref);
                    let url = orchestrator.open_review_request(&state, target).await?;
                    print_review_url(&url);
                    Some(url)
                } else {
                    None
                };
                self.emit(&ApplyReport {
                    fix: &fix,
                    review_url,
                })
            }
            Commands::Run {
                job,
                local,
                apply,
                git_ref,
                path,
                open_mr,
                target,
            } => {
                if *open_mr && *apply != Some(ApplyMode::Source) {
                    bail!("--open-mr needs the fixes committed: pass --apply source");
                }
                let review_target = open_mr.then(|| target.as_deref().unwrap_or(&config.source.git_ref));
                let execute = if *local {
                    Execute::Local
                } else {
                    Execute::Remote(Self::default_job(&config, job.as_ref())?)
                };
                let git_ref = git_ref.as_deref().unwrap_or(&config.source.git_ref);
                let path = path.as_deref().unwrap_or(&config.source.path);
                let orchestrator = orchestrator(&config)?;

                // A full run starts from scratch; fetch clears everything downstream.
                let mut state = PipelineState::new();
                let mut progress = PhaseProgress::start(5, "Fetching tests");
                let result = run_phases(
                    &orchestrator,
                    &mut state,
                    &mut progress,
                    git_ref,
                    path,
                    &execute,
                    *apply,
                    review_target,
                )
                .await;
                store.save(&state)?;
                let review_url = match result {
                    Ok(review_url) => review_url,
                    Err(e) => {
                        progress.fail(&e.to_string());
                        return Err(e.into());
                    }
                };

                output::print_summary(&state);
                if let Some(url) = &review_url {
                    print_review_url(url);
                }
                self.emit(&state)
            }
            Commands::Show => {
                let state = store.load()?;
                output::print_summary(&state);
                self.emit(&state)
            }
            Commands::Jobs { name } => {
                let Some(jenkins) = jenkins_client(&config)? else {
                    bail!("Jenkins is not configured: pass --jenkins-url or set JENKINS_URL");
                };
                match name {
                    Some(name) => {
                        let info = jenkins
                            .job_info(name)
                            .await?
                            .ok_or_else(|| MendError::not_found("job", name.as_str()))?;
                        output::print_job(name, &info);
                        self.emit(&info)
                    }
                    None => {
                        let jobs = jenkins.jobs().await?;
                        output::print_jobs(&jobs);
                        self.emit(&jobs)
                    }
                }
            }
            Commands::Check { pull } => self.check(&config, *pull).await,
            Commands::Init { path } => init(&config, path),
            Commands::Reset => {
                if store.clear()? {
                    println!("{} {}", bright_green("Removed"), store.path().display());
                } else {
                    println!("{} {}", dim("Nothing to remove at"), store.path().display());
                }
                Ok(())
            }
        }
    }

    async fn check(&self, config: &Config, pull: bool) -> Result<()> {
        let jenkins_version = match jenkins_client(config)? {
            Some(jenkins) => {
                let version = jenkins.server_version().await?;
                println!(
                    "{} {} {}",
                    bright_green("✓ Jenkins"),
                    cyan(config.jenkins.url.as_deref().unwrap_or_default()),
                    dim(version.as_deref().unwrap_or("(version hidden)"))
                );
                version
            }
            None => {
                println!("{}", dim("- Jenkins not configured"));
                None
            }
        };

        let ollama = ollama_client(config)?;
        let mut model_available = ollama.model_available().await?;
        if !model_available && pull {
            info!("Pulling model {}", ollama.model());
            ollama.pull_model().await?;
            model_available = true;
        }
        if model_available {
            println!("{} {}", bright_green("✓ Ollama model"), cyan(ollama.model()));
        } else {
            println!(
                "{} {} {}",
                bright_red("✗ Ollama model missing:"),
                cyan(ollama.model()),
                dim("(run `testmend check --pull`)")
            );
        }

        self.emit(&CheckReport {
            jenkins_version,
            model: ollama.model().to_string(),
            model_available,
        })
    }
}

enum Execute {
    Local,
    Remote(String),
}

async fn run_phases(
    orchestrator: &Orchestrator,
    state: &mut PipelineState,
    progress: &mut PhaseProgress,
    git_ref: &str,
    path: &str,
    execute: &Execute,
    apply: Option<ApplyMode>,
    review_target: Option<&str>,
) -> crate::error::Result<Option<String>> {
    let count = orchestrator.fetch(state, git_ref, path).await?.len();
    let running = match execute {
        Execute::Local => "Running tests locally".to_string(),
        Execute::Remote(job) => format!("Running tests on {job}"),
    };
    progress.advance(&format!("Fetched {count} test files"), &running);

    let status = match execute {
        Execute::Local => orchestrator.execute_local(state).await?.status(),
        Execute::Remote(job) => orchestrator
            .execute_remote(state, job, &BuildParameters::new(), None)
            .await?
            .status(),
    };
    progress.advance(&format!("Tests finished: {status}"), "Analyzing the console log");

    let errors = orchestrator.analyze(state).await?.errors.len();
    progress.advance(&format!("Diagnosed {errors} errors"), "Generating fixes");

    let paths: Vec<String> = orchestrator
        .generate_fixes(state)
        .await?
        .fixes
        .iter()
        .map(|fix| fix.file_path.clone())
        .collect();
    progress.advance(&format!("Generated {} fixes", paths.len()), "Applying fixes");

    let Some(mode) = apply else {
        progress.finish("Fixes left for review (pass --apply to apply them)");
        return Ok(None);
    };
    for path in &paths {
        orchestrator.apply_fix(state, path, mode.target()).await?;
    }

    // Nothing was committed when no fix came back.
    let review_url = match review_target {
        Some(target) if !paths.is_empty() => Some(orchestrator.open_review_request(state, target).await?),
        _ => None,
    };
    let done = match &review_url {
        Some(_) => format!("Applied {} fixes and opened a review request", paths.len()),
        None => format!("Applied {} fixes", paths.len()),
    };
    progress.finish(&done);
    Ok(review_url)
}

fn print_apply_outcome(file_path: &str, outcome: &ApplyOutcome) {
    let detail = match outcome {
        ApplyOutcome::Staged => "marked as applied".to_string(),
        ApplyOutcome::Updated { previous_revision } => {
            format!("committed over revision {previous_revision}")
        }
        ApplyOutcome::Created => "committed as a new file".to_string(),
    };
    println!("{} {} {}", bright_green("✓"), cyan(file_path), dim(detail));
}

fn print_review_url(url: &str) {
    println!("{} {}", bright_green("✓ Review request opened:"), cyan(url));
}

fn init(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let mut config = config.clone();
    config.gitlab.token = None;
    config.github.token = None;
    config.jenkins.token = None;
    config.save(path)?;
    println!("{} {}", bright_green("Wrote"), path.display());
    Ok(())
}
