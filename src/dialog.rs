//! User interaction port for the coordinator.
use inquire::{Confirm, Select};

/// Questions the coordinator may need answered mid-install.
///
/// Injected at construction so the engine never talks to a terminal
/// directly.
#[cfg_attr(test, mockall::automock)]
pub trait DialogPort: Send + Sync {
    /// Ask a yes/no question.
    fn confirm(&self, prompt: &str) -> bool;

    /// Ask the user to pick one of `choices`; `None` means no choice.
    fn choose(&self, prompt: &str, choices: &[String]) -> Option<String>;

    /// Show a message that needs no answer.
    fn inform(&self, message: &str);
}

/// Non-interactive answers: confirm everything, take the first choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDialog;

impl DialogPort for AutoDialog {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!("auto-confirming: {prompt}");
        true
    }

    fn choose(&self, prompt: &str, choices: &[String]) -> Option<String> {
        let choice = choices.first().cloned();
        if let Some(c) = &choice {
            tracing::info!("{prompt}: choosing '{c}'");
        }
        choice
    }

    fn inform(&self, message: &str) {
        tracing::info!("{message}");
    }
}

/// Interactive prompts on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalDialog;

impl DialogPort for TerminalDialog {
    fn confirm(&self, prompt: &str) -> bool {
        Confirm::new(prompt)
            .with_default(false)
            .with_help_message("Press Enter to decline, or 'y' to continue")
            .prompt()
            .unwrap_or_else(|e| {
                tracing::warn!("confirmation failed: {e}");
                false
            })
    }

    fn choose(&self, prompt: &str, choices: &[String]) -> Option<String> {
        if choices.is_empty() {
            return None;
        }
        Select::new(prompt, choices.to_vec())
            .with_starting_cursor(0)
            .with_page_size(10)
            .with_help_message("↑↓ to move, ENTER to select, ESC to skip")
            .prompt_skippable()
            .unwrap_or_else(|e| {
                tracing::warn!("selection failed: {e}");
                None
            })
    }

    fn inform(&self, message: &str) {
        tracing::info!("{message}");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn auto_dialog_takes_first_choice() {
        let choices = vec!["2K".to_string(), "4K".to_string()];
        assert_eq!(AutoDialog.choose("variant", &choices), Some("2K".to_string()));
        assert_eq!(AutoDialog.choose("variant", &[]), None);
        assert!(AutoDialog.confirm("continue?"));
    }
}
