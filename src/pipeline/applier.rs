use log::info;

use crate::error::Result;
use crate::pipeline::state::Fix;
use crate::providers::{FileWrite, ReviewRequest, SourceProvider, WriteMode};

const COMMIT_SUBJECT_CHARS: usize = 50;

/// Where an accepted fix should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyTarget {
    /// Record the fix as applied without writing anywhere.
    Local,
    /// Commit the fix through the source provider, on `git_ref` or the
    /// ref the tests were fetched from.
    Source { git_ref: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Staged,
    Updated { previous_revision: String },
    Created,
}

/// First 50 characters of the problem followed by an ellipsis.
pub fn commit_message(problem: &str) -> String {
    let mut message: String = problem.chars().take(COMMIT_SUBJECT_CHARS).collect();
    message.push_str("...");
    message
}

pub fn stage_locally(fix: &mut Fix) -> ApplyOutcome {
    info!("Staged fix for {}", fix.file_path);
    fix.applied = true;
    ApplyOutcome::Staged
}

/// Writes the fixed code at the fix's path, updating the file when it
/// already exists on `git_ref` and creating it otherwise.
///
/// `fix.applied` is only set once the write is confirmed.
pub async fn commit_to_source(
    source: &dyn SourceProvider,
    fix: &mut Fix,
    git_ref: &str,
) -> Result<ApplyOutcome> {
    let revision = source.file_revision(&fix.file_path, git_ref).await?;
    let (mode, outcome) = match revision {
        Some(revision) => (
            WriteMode::Update {
                revision: revision.clone(),
            },
            ApplyOutcome::Updated {
                previous_revision: revision,
            },
        ),
        None => (WriteMode::Create, ApplyOutcome::Created),
    };

    let write = FileWrite {
        path: fix.file_path.clone(),
        content: fix.fixed_code.clone(),
        message: commit_message(&fix.problem),
        git_ref: git_ref.to_string(),
        mode,
    };
    source.write_file(&write).await?;

    info!(
        "Committed fix for {} to {} on {git_ref} ({outcome:?})",
        fix.file_path,
        source.name()
    );
    fix.applied = true;
    fix.committed_ref = Some(git_ref.to_string());
    Ok(outcome)
}

/// Merge or pull request proposing the fixes committed on `source_branch`.
pub fn review_request<'f>(
    fixes: impl IntoIterator<Item = &'f Fix>,
    source_branch: &str,
    target_branch: &str,
) -> ReviewRequest {
    let fixes: Vec<&Fix> = fixes.into_iter().collect();
    let title = match fixes.as_slice() {
        [only] => format!("Fix failing tests in {}", only.file_path),
        many => format!("Fix failing tests in {} files", many.len()),
    };
    let description = fixes
        .iter()
        .map(|fix| format!("- `{}`: {}", fix.file_path, fix.problem))
        .collect::<Vec<_>>()
        .join("\n");

    ReviewRequest {
        title,
        description,
        source_branch: source_branch.to_string(),
        target_branch: target_branch.to_string(),
    }
}
