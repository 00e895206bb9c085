//! Terminal front end
//!
//! [`TerminalUi`] renders the run's spinner on stderr when stderr is a
//! terminal and falls back to plain stderr lines otherwise. Status lines go to
//! stdout. The push question uses a dialoguer prompt and is refused outright
//! when stdin is not a terminal.

pub mod spinner;

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use spinner::PlainSpinner;
use stackenv_core::errors::UiError;
use stackenv_core::ui::Ui;
use std::io::IsTerminal;
use std::sync::Mutex;

/// `Ui` for an interactive shell session
#[derive(Debug)]
pub struct TerminalUi {
    spinner: Mutex<Option<PlainSpinner>>,
    animate: bool,
}

impl TerminalUi {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
            animate: std::io::stderr().is_terminal(),
        }
    }

    fn take_spinner(&self) -> Option<PlainSpinner> {
        self.spinner.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui for TerminalUi {
    fn spinner_start(&self, message: &str) {
        if !self.animate {
            eprintln!("{}", message);
            return;
        }
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(PlainSpinner::start(message));
        }
    }

    fn spinner_succeed(&self, message: &str) {
        match self.take_spinner() {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{}", style(message).for_stderr().green()),
        }
    }

    fn spinner_fail(&self, message: &str) {
        match self.take_spinner() {
            Some(spinner) => spinner.fail_with_message(message),
            None => eprintln!("{}", style(message).for_stderr().red()),
        }
    }

    fn spinner_stop(&self) {
        drop(self.take_spinner());
    }

    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", style(message).green());
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool, UiError> {
        if !std::io::stdin().is_terminal() {
            return Err(UiError::NonInteractive {
                question: message.to_string(),
            });
        }
        self.spinner_stop();
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(|e| UiError::Prompt {
                message: e.to_string(),
            })
    }
}
