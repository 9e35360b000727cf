//! CLI commands.

mod config;
mod counter;
mod crash;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ember_runtime::{ActorSystem, Config};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;
use crate::output::OutputFormat;

/// ember - run and inspect actor systems.
#[derive(Debug, Parser)]
#[command(name = "ember")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json).
    #[arg(long, global = true, default_value = "text")]
    format: String,

    /// TOML configuration file; EMBER_* variables are used when omitted.
    #[arg(long, global = true, env = "EMBER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the number of scheduler workers.
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a burst of asks to a counting actor.
    Counter(counter::CounterCommand),

    /// Feed failures to a supervised actor and report what the supervisor did.
    Crash(crash::CrashCommand),

    /// Print the effective configuration.
    Config(config::ConfigCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        };

        let mut config = match &self.config {
            Some(path) => Config::from_file(path).map_err(CliError::from)?,
            None => Config::from_env().map_err(CliError::from)?,
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate().map_err(CliError::from)?;

        init_tracing(&config.log_level, self.json_logs);

        let ctx = CommandContext { config, format };

        match self.command {
            Commands::Counter(cmd) => cmd.run(ctx).await,
            Commands::Crash(cmd) => cmd.run(ctx).await,
            Commands::Config(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("ember {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Start an actor system from the resolved configuration.
    pub fn system(&self) -> Result<ActorSystem> {
        Ok(ActorSystem::create(self.config.clone()).map_err(CliError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_defaults() {
        let cli = Cli::try_parse_from(["ember", "counter"]).unwrap();
        assert_eq!(cli.format, "text");
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Counter(_)));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ember",
            "crash",
            "--workers",
            "8",
            "--format",
            "json",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(8));
        assert_eq!(cli.format, "json");
        assert!(cli.json_logs);
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["ember", "deploy"]).is_err());
    }
}
