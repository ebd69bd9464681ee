mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{bright_green, bright_red, cyan, dim, magenta_bold};
pub use summary::{
    print_diagnostic, print_execution, print_fixes, print_job, print_jobs, print_summary,
    print_tests,
};

/// Prints the `testmend` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🩺 testmend"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Run, diagnose and repair failing tests")
    );
}
