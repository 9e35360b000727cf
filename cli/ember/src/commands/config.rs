//! Config command - print the effective configuration.

use anyhow::{Context, Result};
use clap::Args;

use crate::output::{print_single, OutputFormat};

use super::CommandContext;

/// Print the configuration after file, environment and flag overrides.
#[derive(Debug, Args)]
pub struct ConfigCommand {}

impl ConfigCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        match ctx.format {
            OutputFormat::Json => print_single(&ctx.config),
            OutputFormat::Text => {
                let rendered =
                    toml::to_string_pretty(&ctx.config).context("failed to render config")?;
                print!("{rendered}");
            }
        }
        Ok(())
    }
}
