use log::{debug, info, warn};

use crate::error::Result;
use crate::pipeline::state::{BuildStatus, Diagnostic};
use crate::providers::TextGenerator;

pub const FALLBACK_SUMMARY: &str = "AI analysis did not return a valid format";
pub const FALLBACK_ERROR: &str = "Failed to parse AI response";
pub const FALLBACK_SUGGESTION: &str = "Review logs manually";

impl Diagnostic {
    /// Diagnostic reported when the model response cannot be interpreted.
    pub fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            errors: vec![FALLBACK_ERROR.to_string()],
            suggestions: vec![FALLBACK_SUGGESTION.to_string()],
        }
    }
}

/// Turns a console log into a [`Diagnostic`] with the help of a text model.
pub struct LogAnalyzer<'a> {
    generator: &'a dyn TextGenerator,
}

impl<'a> LogAnalyzer<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self { generator }
    }

    /// Asks the model for a summary, errors and suggestions.
    ///
    /// Only generator failures are errors. An unusable answer yields
    /// [`Diagnostic::fallback`].
    pub async fn analyze(&self, status: BuildStatus, console_log: &str) -> Result<Diagnostic> {
        info!("Analyzing {} bytes of console output ({status})", console_log.len());
        let response = self.generator.generate(&analysis_prompt(status, console_log)).await?;
        Ok(parse_diagnostic(&response))
    }
}

fn analysis_prompt(status: BuildStatus, console_log: &str) -> String {
    format!(
        "Analyze the logs of a test run and identify the problems.\n\
         \n\
         Build status: {status}\n\
         \n\
         Logs:\n\
         {console_log}\n\
         \n\
         Provide:\n\
         1. A short summary of what happened\n\
         2. A list of the specific errors, if any, naming the failing test files\n\
         3. Suggestions on how to fix the problems\n\
         \n\
         Respond with JSON only:\n\
         {{\n  \"summary\": \"short summary\",\n  \"errors\": [\"list\", \"of errors\"],\n  \"suggestions\": [\"list\", \"of suggestions\"]\n}}\n"
    )
}

/// Parses a model response into a diagnostic, falling back when it is not
/// a JSON object with a non-empty `summary`.
pub fn parse_diagnostic(response: &str) -> Diagnostic {
    let clean = strip_markdown_fences(response);
    match serde_json::from_str::<Diagnostic>(clean) {
        Ok(diagnostic) if !diagnostic.summary.trim().is_empty() => {
            debug!(
                "Parsed diagnostic with {} errors and {} suggestions",
                diagnostic.errors.len(),
                diagnostic.suggestions.len()
            );
            diagnostic
        }
        Ok(_) => {
            warn!("Model returned a diagnostic without a summary, using fallback");
            Diagnostic::fallback()
        }
        Err(e) => {
            warn!("Model response is not a valid diagnostic ({e}), using fallback");
            Diagnostic::fallback()
        }
    }
}

fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
