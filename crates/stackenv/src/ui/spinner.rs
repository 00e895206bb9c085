use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn spinning_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// RAII spinner on stderr; clears itself when dropped unfinished
#[derive(Debug)]
pub struct PlainSpinner {
    pb: ProgressBar,
    finished: bool,
}

impl PlainSpinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(spinning_style());
        pb.set_message(style(message).yellow().to_string());
        Self {
            pb,
            finished: false,
        }
    }

    pub fn finish_with_message(mut self, message: &str) {
        self.pb.set_style(finished_style());
        self.pb
            .finish_with_message(style(format!("✔ {}", message)).green().to_string());
        self.finished = true;
    }

    pub fn fail_with_message(mut self, message: &str) {
        self.pb.set_style(finished_style());
        self.pb
            .finish_with_message(style(format!("✖ {}", message)).red().to_string());
        self.finished = true;
    }
}

impl Drop for PlainSpinner {
    fn drop(&mut self) {
        if !self.finished {
            self.pb.finish_and_clear();
        }
    }
}
