//! Error handling and display for the CLI.

use colored::Colorize;
use ember_runtime::{AskError, ConfigError, SupervisionError, SystemError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("actor system error: {0}")]
    System(#[from] SystemError),

    #[error("supervisor unavailable: {0}")]
    Supervision(#[from] SupervisionError),

    #[error("ask failed: {0}")]
    Ask(#[from] AskError),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::Config(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check EMBER_* variables and the file passed to --config.".yellow()
                );
            }
            CliError::System(SystemError::NoRuntime) => {
                eprintln!("\n{}", "Hint: The actor system needs a Tokio runtime.".yellow());
            }
            CliError::Ask(AskError::Timeout(_)) => {
                eprintln!(
                    "\n{}",
                    "Hint: Raise EMBER_ASK_TIMEOUT_MS for slow handlers.".yellow()
                );
            }
            _ => {}
        }
    }
}
