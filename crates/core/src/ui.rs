//! User interface contract
//!
//! The orchestrator reports progress through a single spinner and plain
//! status lines, and may ask one yes/no question. Front ends implement [`Ui`].

use crate::errors::UiError;

/// Interactive output and prompts
pub trait Ui: Send + Sync {
    fn spinner_start(&self, message: &str);
    fn spinner_succeed(&self, message: &str);
    fn spinner_fail(&self, message: &str);
    /// Stop the spinner without a final status
    fn spinner_stop(&self);
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    /// Ask a yes/no question; front ends without a terminal return [`UiError::NonInteractive`]
    fn confirm(&self, message: &str, default: bool) -> Result<bool, UiError>;
}

/// The run's spinner. Dropping it while it still spins stops it.
pub struct SpinnerHandle<'a> {
    ui: &'a dyn Ui,
    spinning: bool,
}

impl<'a> SpinnerHandle<'a> {
    pub fn start(ui: &'a dyn Ui, message: &str) -> Self {
        ui.spinner_start(message);
        Self { ui, spinning: true }
    }

    pub fn succeed(&mut self, message: &str) {
        self.ui.spinner_succeed(message);
        self.spinning = false;
    }

    pub fn fail(&mut self, message: &str) {
        self.ui.spinner_fail(message);
        self.spinning = false;
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning
    }
}

impl Drop for SpinnerHandle<'_> {
    fn drop(&mut self) {
        if self.spinning {
            self.ui.spinner_stop();
        }
    }
}
