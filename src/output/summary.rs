use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::pipeline::state::{Diagnostic, Execution, FixReport, TestFile};
use crate::pipeline::PipelineState;
use crate::providers::jenkins::BuildRef;
use crate::providers::{JobInfo, JobSummary};

use super::styling::{bright, bright_red, bright_yellow, cyan, dim, status};
use super::tables::{applied_cell, create_table, cyan_header, more_rows_cell, revision_cell, size_cell};

const MAX_TEST_ROWS: usize = 25;

/// Prints every recorded slice of the pipeline state to stdout.
///
/// Sections appear in stage order and only when the stage has run:
/// - Tests: fetched files with size and revision
/// - Execution: local exit code or remote job, build number and status
/// - Diagnostic: summary, errors in red, suggestions in yellow
/// - Fixes: file, problem and applied flag, plus unusable model responses
/// - Next step: the command that continues the pipeline
pub fn print_summary(state: &PipelineState) {
    println!("{}", render_summary(state));
}

pub fn print_tests(tests: &[TestFile]) {
    let mut output = String::new();
    render_tests(&mut output, tests);
    println!("{output}");
}

pub fn print_execution(execution: &Execution) {
    let mut output = String::new();
    render_execution(&mut output, execution);
    println!("{output}");
}

pub fn print_diagnostic(diagnostic: &Diagnostic) {
    let mut output = String::new();
    render_diagnostic(&mut output, diagnostic);
    println!("{output}");
}

pub fn print_fixes(report: &FixReport) {
    let mut output = String::new();
    render_fixes(&mut output, report);
    println!("{output}");
}

pub fn print_jobs(jobs: &[JobSummary]) {
    println!("{}", render_jobs(jobs));
}

pub fn print_job(name: &str, info: &JobInfo) {
    println!("{}", render_job(name, info));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_summary(state: &PipelineState) -> String {
    let mut output = String::new();

    let Some(tests) = state.tests() else {
        let _ = writeln!(
            output,
            "{}\n\n  {} {}",
            bright_yellow("Nothing recorded yet."),
            dim("Start with:"),
            cyan("testmend fetch")
        );
        return output;
    };

    add_section_header(&mut output, "📊", "Overview");
    if let Some(origin) = state.origin() {
        let _ = writeln!(output, "  {} {}", dim("Ref:"), cyan(&origin.git_ref));
        let _ = writeln!(output, "  {} {}", dim("Path:"), cyan(&origin.path_prefix));
    }
    if let Some(updated_at) = state.updated_at() {
        let _ = writeln!(
            output,
            "  {} {}",
            dim("Updated:"),
            dim(updated_at.format("%Y-%m-%d %H:%M UTC"))
        );
    }
    output.push('\n');

    render_tests(&mut output, tests);
    if let Some(execution) = state.execution() {
        render_execution(&mut output, execution);
    }
    if let Some(diagnostic) = state.diagnostic() {
        render_diagnostic(&mut output, diagnostic);
    }
    if let Some(report) = state.fixes() {
        render_fixes(&mut output, report);
    }

    add_section_header(&mut output, "💡", "Next Step");
    let _ = writeln!(output, "  {}", next_step(state));

    output
}

fn next_step(state: &PipelineState) -> String {
    match (state.execution(), state.diagnostic(), state.fixes()) {
        (None, _, _) => format!("{} or {}", cyan("testmend run-local"), cyan("testmend run-remote <JOB>")),
        (Some(_), None, _) => cyan("testmend analyze").to_string(),
        (Some(_), Some(_), None) => cyan("testmend fix").to_string(),
        (Some(_), Some(_), Some(report)) => match report.fixes.iter().find(|fix| !fix.applied) {
            Some(fix) => cyan(format!("testmend apply {} --commit", fix.file_path)).to_string(),
            None => dim("All fixes applied. Re-run the tests to confirm.").to_string(),
        },
    }
}

fn render_tests(output: &mut String, tests: &[TestFile]) {
    add_section_header(output, "🧪", &format!("Tests ({})", tests.len()));
    if tests.is_empty() {
        let _ = writeln!(output, "  {}\n", bright_yellow("No test files matched."));
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["File", "Size", "Revision"]));
    for test in tests.iter().take(MAX_TEST_ROWS) {
        table.add_row(vec![
            Cell::new(&test.path),
            size_cell(test.size),
            revision_cell(&test.revision_id),
        ]);
    }
    if tests.len() > MAX_TEST_ROWS {
        table.add_row(vec![more_rows_cell(tests.len() - MAX_TEST_ROWS), Cell::new(""), Cell::new("")]);
    }
    let _ = writeln!(output, "{table}\n");
}

fn render_execution(output: &mut String, execution: &Execution) {
    add_section_header(output, "🏗️", "Execution");
    match execution {
        Execution::Local(run) => {
            let exit = run
                .exit_code
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            let _ = writeln!(
                output,
                "  {} {}  {} {}",
                dim("Local run:"),
                status(execution.status()),
                dim("exit code"),
                exit
            );
        }
        Execution::Remote(build) => {
            let _ = writeln!(
                output,
                "  {} {} #{}  {}",
                dim("Job:"),
                cyan(&build.job_name),
                build.build_number,
                status(build.status)
            );
        }
    }
    let lines = execution.console_log().lines().count();
    let _ = writeln!(output, "  {} {lines} lines\n", dim("Console log:"));
}

fn render_diagnostic(output: &mut String, diagnostic: &Diagnostic) {
    add_section_header(output, "🔍", "Diagnostic");
    let _ = writeln!(output, "  {}", diagnostic.summary);
    if !diagnostic.errors.is_empty() {
        let _ = writeln!(output, "\n  {}", dim("Errors:"));
        for error in &diagnostic.errors {
            let _ = writeln!(output, "  • {}", bright_red(error));
        }
    }
    if !diagnostic.suggestions.is_empty() {
        let _ = writeln!(output, "\n  {}", dim("Suggestions:"));
        for suggestion in &diagnostic.suggestions {
            let _ = writeln!(output, "  • {}", bright_yellow(suggestion));
        }
    }
    output.push('\n');
}

fn render_fixes(output: &mut String, report: &FixReport) {
    add_section_header(output, "🩹", &format!("Fixes ({})", report.fixes.len()));
    if report.fixes.is_empty() {
        let _ = writeln!(output, "  {}", bright_yellow("No fixes generated."));
    } else {
        let mut table = create_table();
        table.set_header(cyan_header(&["File", "Problem", "Applied"]));
        for fix in &report.fixes {
            table.add_row(vec![
                Cell::new(&fix.file_path),
                Cell::new(&fix.problem),
                applied_cell(fix.applied),
            ]);
        }
        let _ = writeln!(output, "{table}");
    }

    if !report.unparsable.is_empty() {
        let _ = writeln!(output, "\n  {}", bright_yellow("Unparsable remediation:"));
        for gap in &report.unparsable {
            let _ = writeln!(output, "  • {} {}", cyan(&gap.file_path), dim(&gap.reason));
        }
    }
    output.push('\n');
}

fn render_jobs(jobs: &[JobSummary]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📋", &format!("Jobs ({})", jobs.len()));

    let mut table = create_table();
    table.set_header(cyan_header(&["Job", "Last Build", "URL"]));
    for job in jobs {
        table.add_row(vec![
            Cell::new(&job.name),
            job_color_cell(job.color.as_deref()),
            Cell::new(job.url.as_deref().unwrap_or("")),
        ]);
    }
    let _ = writeln!(output, "{table}");
    output
}

/// Jenkins ball color; `_anime` marks a build in progress.
fn job_color_cell(color: Option<&str>) -> Cell {
    let color = color.unwrap_or("notbuilt");
    Cell::new(color.trim_end_matches("_anime")).fg(match color {
        c if c.starts_with("blue") => TableColor::Green,
        c if c.starts_with("red") => TableColor::Red,
        c if c.starts_with("yellow") => TableColor::Yellow,
        _ => TableColor::DarkGrey,
    })
}

fn render_job(name: &str, info: &JobInfo) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📋", info.name.as_deref().unwrap_or(name));
    if let Some(description) = info.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(output, "  {}\n", description.trim());
    }

    fn build_cell(build: Option<&BuildRef>) -> Cell {
        match build {
            Some(build) => Cell::new(format!("#{}", build.number)),
            None => Cell::new("-").fg(TableColor::DarkGrey),
        }
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Field", "Value"]));
    table.add_row(vec![Cell::new("State"), job_color_cell(info.color.as_deref())]);
    table.add_row(vec![
        Cell::new("Buildable"),
        Cell::new(match info.buildable {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        }),
    ]);
    table.add_row(vec![Cell::new("Last build"), build_cell(info.last_build.as_ref())]);
    table.add_row(vec![Cell::new("Last success"), build_cell(info.last_successful_build.as_ref())]);
    table.add_row(vec![Cell::new("Last failure"), build_cell(info.last_failed_build.as_ref())]);
    table.add_row(vec![
        Cell::new("Next build"),
        Cell::new(format!("#{}", info.next_build_number)),
    ]);
    if let Some(url) = &info.url {
        table.add_row(vec![Cell::new("URL"), Cell::new(url)]);
    }
    let _ = writeln!(output, "{table}");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{BuildRun, BuildStatus, FetchOrigin, Fix, LocalRun, UnparsableRemediation};
    use crate::test_support::test_file;

    fn fetched() -> PipelineState {
        let mut state = PipelineState::new();
        state.record_tests(
            FetchOrigin {
                git_ref: "release/1.2".to_string(),
                path_prefix: "tests/".to_string(),
            },
            vec![test_file("tests/test_cart.py", "def test_cart(): pass\n")],
        );
        state
    }

    #[test]
    fn test_render_summary_empty_state() {
        let output = render_summary(&PipelineState::new());
        assert!(output.contains("Nothing recorded yet."));
        assert!(output.contains("testmend fetch"));
    }

    #[test]
    fn test_render_summary_after_fetch() {
        let output = render_summary(&fetched());

        assert!(output.contains("release/1.2"));
        assert!(output.contains("Tests (1)"));
        assert!(output.contains("tests/test_cart.py"));
        assert!(!output.contains("Execution"));
        assert!(output.contains("testmend run-local"));
    }

    #[test]
    fn test_render_summary_with_remote_build_and_diagnostic() {
        let mut state = fetched();
        state.record_execution(Execution::Remote(BuildRun {
            job_name: "pytest-suite".to_string(),
            build_number: 42,
            status: BuildStatus::Failure,
            console_log: "line 1\nline 2\n".to_string(),
        }));
        state.record_diagnostic(Diagnostic {
            summary: "cart total is off by one".to_string(),
            errors: vec!["tests/test_cart.py::test_total".to_string()],
            suggestions: vec!["update the expected total".to_string()],
        });

        let output = render_summary(&state);

        assert!(output.contains("pytest-suite"));
        assert!(output.contains("#42"));
        assert!(output.contains("FAILURE"));
        assert!(output.contains("2 lines"));
        assert!(output.contains("cart total is off by one"));
        assert!(output.contains("tests/test_cart.py::test_total"));
        assert!(output.contains("update the expected total"));
        assert!(output.contains("testmend fix"));
    }

    #[test]
    fn test_render_summary_with_fixes_and_gaps() {
        let mut state = fetched();
        state.record_execution(Execution::Local(LocalRun {
            success: false,
            exit_code: Some(1),
            output: String::new(),
        }));
        state.record_diagnostic(Diagnostic::fallback());
        state.record_fixes(FixReport {
            fixes: vec![Fix {
                file_path: "tests/test_cart.py".to_string(),
                problem: "wrong total".to_string(),
                original_code: String::new(),
                fixed_code: String::new(),
                applied: false,
                committed_ref: None,
            }],
            unparsable: vec![UnparsableRemediation {
                file_path: "tests/test_user.py".to_string(),
                reason: "response has no FIXED_CODE: marker".to_string(),
            }],
        });

        let output = render_summary(&state);

        assert!(output.contains("exit code"));
        assert!(output.contains("Fixes (1)"));
        assert!(output.contains("wrong total"));
        assert!(output.contains("Unparsable remediation"));
        assert!(output.contains("tests/test_user.py"));
        assert!(output.contains("testmend apply tests/test_cart.py --commit"));
    }

    #[test]
    fn test_render_jobs() {
        let output = render_jobs(&[
            JobSummary {
                name: "pytest-suite".to_string(),
                url: Some("https://ci.example.com/job/pytest-suite/".to_string()),
                color: Some("blue_anime".to_string()),
            },
            JobSummary {
                name: "nightly".to_string(),
                url: None,
                color: None,
            },
        ]);

        assert!(output.contains("Jobs (2)"));
        assert!(output.contains("pytest-suite"));
        assert!(output.contains("https://ci.example.com/job/pytest-suite/"));
        assert!(output.contains("notbuilt"));
    }

    #[test]
    fn test_render_job_details() {
        let info: JobInfo = serde_json::from_str(
            r#"{
                "name": "pytest-suite",
                "description": "Runs the shop tests",
                "buildable": true,
                "color": "red_anime",
                "nextBuildNumber": 43,
                "lastBuild": {"number": 42},
                "lastSuccessfulBuild": {"number": 40}
            }"#,
        )
        .unwrap();

        let output = render_job("pytest-suite", &info);

        assert!(output.contains("pytest-suite"));
        assert!(output.contains("Runs the shop tests"));
        assert!(output.contains("#42"));
        assert!(output.contains("#40"));
        assert!(output.contains("#43"));
        assert!(output.contains("yes"));
        assert!(!output.contains("red_anime"));
    }
}
