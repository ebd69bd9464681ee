use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow};

/// Spinner per phase of a multi-phase operation.
pub struct PhaseProgress {
    pb: ProgressBar,
    phase: usize,
    total: usize,
}

impl PhaseProgress {
    pub fn start(total: usize, label: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(bright_yellow(format!("Phase 1/{total}: {label}")).to_string());
        Self { pb, phase: 1, total }
    }

    /// Completes the current phase with `done` and starts the next one.
    pub fn advance(&mut self, done: &str, next: &str) {
        self.complete(done);
        self.phase += 1;
        self.pb = create_spinner(
            bright_yellow(format!("Phase {}/{}: {next}", self.phase, self.total)).to_string(),
        );
    }

    pub fn finish(&self, done: &str) {
        self.complete(done);
        eprintln!();
    }

    /// Marks the current phase as failed; later phases are not started.
    pub fn fail(&self, reason: &str) {
        self.pb.abandon_with_message(
            bright_red(format!("Phase {}/{}: {reason} ✗", self.phase, self.total)).to_string(),
        );
        eprintln!();
    }

    fn complete(&self, done: &str) {
        self.pb.finish_with_message(
            bright_green(format!("Phase {}/{}: {done} ✓", self.phase, self.total)).to_string(),
        );
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
