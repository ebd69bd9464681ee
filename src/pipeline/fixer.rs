use log::{info, warn};

use crate::error::Result;
use crate::pipeline::state::{Diagnostic, Fix, FixReport, TestFile, UnparsableRemediation};
use crate::providers::TextGenerator;

const PROBLEM_MARKER: &str = "PROBLEM:";
const FIXED_CODE_MARKER: &str = "FIXED_CODE:";

/// Files whose path occurs verbatim in at least one diagnosed error.
///
/// Plain case-sensitive containment: a module path such as `tests.test_a`
/// does not select `tests/test_a.py`, and a short path may match unrelated
/// error text.
pub fn select_files<'t>(tests: &'t [TestFile], diagnostic: &Diagnostic) -> Vec<&'t TestFile> {
    tests
        .iter()
        .filter(|test| diagnostic.errors.iter().any(|error| error.contains(&test.path)))
        .collect()
}

/// Problem description and replacement code extracted from a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub problem: String,
    pub fixed_code: String,
}

/// Splits a response on the `PROBLEM:` / `FIXED_CODE:` markers.
///
/// Returns the reason when the response does not follow the protocol.
/// Stricter than marker presence alone: a response carrying both markers
/// but nothing after `FIXED_CODE:` is rejected, so an empty file is never
/// proposed as a fix.
pub fn parse_remediation(response: &str) -> std::result::Result<Remediation, String> {
    let Some(code_at) = response.find(FIXED_CODE_MARKER) else {
        return Err(format!("response has no {FIXED_CODE_MARKER} marker"));
    };
    let head = &response[..code_at];
    let Some(problem_at) = head.find(PROBLEM_MARKER) else {
        let reason = if response.contains(PROBLEM_MARKER) {
            format!("{PROBLEM_MARKER} appears after {FIXED_CODE_MARKER}")
        } else {
            format!("response has no {PROBLEM_MARKER} marker")
        };
        return Err(reason);
    };

    let problem = head[problem_at + PROBLEM_MARKER.len()..].trim();
    let fixed_code = response[code_at + FIXED_CODE_MARKER.len()..].trim();
    if fixed_code.is_empty() {
        return Err(format!("{FIXED_CODE_MARKER} section is empty"));
    }

    Ok(Remediation {
        problem: problem.to_string(),
        fixed_code: fixed_code.to_string(),
    })
}

/// Requests a remediation for every file implicated by a diagnostic.
pub struct FixGenerator<'a> {
    generator: &'a dyn TextGenerator,
}

impl<'a> FixGenerator<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self { generator }
    }

    /// Produces one [`Fix`] per selected file whose response follows the
    /// marker protocol. Selected files with unusable responses are listed in
    /// [`FixReport::unparsable`] instead.
    ///
    /// # Errors
    ///
    /// Fails on the first generator error; earlier results are discarded.
    pub async fn generate(&self, tests: &[TestFile], diagnostic: &Diagnostic) -> Result<FixReport> {
        let selected = select_files(tests, diagnostic);
        info!(
            "{} of {} test files are implicated by the diagnosed errors",
            selected.len(),
            tests.len()
        );

        let mut report = FixReport::default();
        for test in selected {
            let response = self.generator.generate(&fix_prompt(test, diagnostic)).await?;
            match parse_remediation(&response) {
                Ok(remediation) => {
                    info!("Generated fix for {}", test.path);
                    report.fixes.push(Fix {
                        file_path: test.path.clone(),
                        problem: remediation.problem,
                        original_code: test.content.clone(),
                        fixed_code: remediation.fixed_code,
                        applied: false,
                        committed_ref: None,
                    });
                }
                Err(reason) => {
                    warn!("No usable fix for {}: {reason}", test.path);
                    report.unparsable.push(UnparsableRemediation {
                        file_path: test.path.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(report)
    }
}

fn fix_prompt(test: &TestFile, diagnostic: &Diagnostic) -> String {
    fn bullets(items: &[String]) -> String {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    format!(
        "Based on the analysis of a failed test run:\n\
         \n\
         Errors:\n{errors}\n\
         \n\
         Suggestions:\n{suggestions}\n\
         \n\
         Fix the following test.\n\
         \n\
         File: {path}\n\
         Code:\n\
         {content}\n\
         \n\
         Return the fixed code together with a description of the problem, in exactly this format:\n\
         {PROBLEM_MARKER} description of the problem\n\
         {FIXED_CODE_MARKER}\n\
         <the complete fixed file>\n",
        errors = bullets(&diagnostic.errors),
        suggestions = bullets(&diagnostic.suggestions),
        path = test.path,
        content = test.content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_file, ScriptedGenerator};

    fn diagnostic(errors: &[&str]) -> Diagnostic {
        Diagnostic {
            summary: "failures".to_string(),
            errors: errors.iter().map(|e| e.to_string()).collect(),
            suggestions: vec!["check the expected value".to_string()],
        }
    }

    #[test]
    fn selects_files_named_in_errors() {
        let tests = vec![
            test_file("test_foo.py", "def test_foo(): assert 1 == 2\n"),
            test_file("test_bar.py", "def test_bar(): pass\n"),
        ];
        let diagnostic = diagnostic(&["test_foo.py::test_x failed"]);

        let selected = select_files(&tests, &diagnostic);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, "test_foo.py");
    }

    #[test]
    fn selection_is_case_sensitive_containment() {
        let tests = vec![test_file("tests/test_a.py", "")];

        assert!(select_files(&tests, &diagnostic(&["TESTS/TEST_A.PY failed"])).is_empty());
        assert!(select_files(&tests, &diagnostic(&["tests.test_a::test_x failed"])).is_empty());
        assert_eq!(
            select_files(&tests, &diagnostic(&["at ./tests/test_a.py:3"])).len(),
            1
        );
    }

    #[test]
    fn parses_marked_response() {
        let remediation =
            parse_remediation("PROBLEM:  expected 2, got 1\nFIXED_CODE:\n\ndef test(): assert 1 == 1\n\n").unwrap();

        assert_eq!(remediation.problem, "expected 2, got 1");
        assert_eq!(remediation.fixed_code, "def test(): assert 1 == 1");
    }

    #[test]
    fn text_before_problem_marker_is_ignored() {
        let remediation = parse_remediation("Sure!\nPROBLEM: typo\nFIXED_CODE:\nx = 1").unwrap();
        assert_eq!(remediation.problem, "typo");
    }

    #[test]
    fn rejects_responses_off_protocol() {
        assert!(parse_remediation("no markers at all").is_err());
        assert!(parse_remediation("PROBLEM: typo\nhere is code").is_err());
        assert!(parse_remediation("FIXED_CODE:\nx = 1").is_err());
        assert!(parse_remediation("FIXED_CODE:\nx = 1\nPROBLEM: typo")
            .unwrap_err()
            .contains("after"));
        assert!(parse_remediation("PROBLEM: typo\nFIXED_CODE:\n   ").is_err());
    }

    #[test]
    fn both_markers_with_empty_code_is_rejected() {
        assert_eq!(
            parse_remediation("PROBLEM: x\nFIXED_CODE:\n").unwrap_err(),
            "FIXED_CODE: section is empty"
        );
    }

    #[tokio::test]
    async fn unmarked_response_produces_no_fix() {
        let tests = vec![test_file("test_foo.py", "def test_foo(): assert False\n")];
        let generator = ScriptedGenerator::new(&["I would change the assertion."]);

        let report = FixGenerator::new(&generator)
            .generate(&tests, &diagnostic(&["test_foo.py failed"]))
            .await
            .unwrap();

        assert!(report.fixes.is_empty());
        assert_eq!(report.unparsable.len(), 1);
        assert_eq!(report.unparsable[0].file_path, "test_foo.py");
    }

    #[tokio::test]
    async fn builds_fix_with_original_code() {
        let tests = vec![
            test_file("test_foo.py", "def test_foo(): assert 1 == 2\n"),
            test_file("test_bar.py", "def test_bar(): pass\n"),
        ];
        let generator = ScriptedGenerator::new(&[
            "PROBLEM: wrong expected value\nFIXED_CODE:\ndef test_foo(): assert 1 == 1\n",
        ]);

        let report = FixGenerator::new(&generator)
            .generate(&tests, &diagnostic(&["test_foo.py::test_foo AssertionError"]))
            .await
            .unwrap();

        assert_eq!(generator.prompts().len(), 1);
        assert!(generator.prompts()[0].contains("File: test_foo.py"));
        assert!(generator.prompts()[0].contains("def test_foo(): assert 1 == 2"));
        assert_eq!(
            report.fixes,
            vec![Fix {
                file_path: "test_foo.py".to_string(),
                problem: "wrong expected value".to_string(),
                original_code: "def test_foo(): assert 1 == 2\n".to_string(),
                fixed_code: "def test_foo(): assert 1 == 1".to_string(),
                applied: false,
                committed_ref: None,
            }]
        );
        assert!(report.unparsable.is_empty());
    }

    #[tokio::test]
    async fn no_implicated_files_means_no_requests() {
        let tests = vec![test_file("test_foo.py", "")];
        let generator = ScriptedGenerator::new(&["PROBLEM: x\nFIXED_CODE:\ny"]);

        let report = FixGenerator::new(&generator)
            .generate(&tests, &diagnostic(&["ImportError: no module named requests"]))
            .await
            .unwrap();

        assert_eq!(report, FixReport::default());
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn generator_failure_aborts() {
        let tests = vec![test_file("test_foo.py", "")];
        let generator = ScriptedGenerator::failing();

        let result = FixGenerator::new(&generator)
            .generate(&tests, &diagnostic(&["test_foo.py failed"]))
            .await;

        assert!(result.is_err());
    }
}
