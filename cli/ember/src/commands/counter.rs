//! Counter command - drive one counting actor with asks.

use anyhow::Result;
use clap::Args;
use ember_runtime::{Actor, ActorError, Context};
use serde::Serialize;
use tracing::info;

use crate::error::CliError;
use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Ask a counting actor `messages` times and report its final state.
#[derive(Debug, Args)]
pub struct CounterCommand {
    /// Number of asks to send.
    #[arg(long, short, default_value_t = 50)]
    messages: u32,

    /// Text of every message.
    #[arg(long, default_value = "Hello")]
    text: String,

    /// Actor id.
    #[arg(long, default_value = "counter")]
    id: String,
}

/// Counts the messages it handles and echoes each one back.
#[derive(Debug)]
struct Counter;

impl Actor for Counter {
    type State = u64;
    type Message = String;
    type Reply = String;

    fn on_receive(
        &mut self,
        message: String,
        ctx: Context<u64>,
    ) -> Result<(Context<u64>, String), ActorError> {
        let count = ctx.state().copied().unwrap_or_default() + 1;
        Ok((ctx.with_state(count), format!("Processed: {message}")))
    }
}

#[derive(Debug, Serialize)]
struct CounterReport {
    actor: String,
    address: String,
    messages: u32,
    last_reply: Option<String>,
    state: u64,
    activations: u64,
    reschedules: u64,
    steals: u64,
}

impl CounterCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let system = ctx.system()?;
        let counter = system
            .actor_of(&self.id, 0, None, |_, _| Counter)
            .await
            .map_err(CliError::from)?;

        let mut last_reply = None;
        for _ in 0..self.messages {
            let reply = counter.ask(self.text.clone()).await.map_err(CliError::from)?;
            last_reply = Some(reply);
        }

        let state = counter.last_known_state().unwrap_or_default();
        let stats = system.scheduler().stats();
        info!(actor_id = %counter.id(), state, "Counter finished");

        let report = CounterReport {
            actor: counter.id().to_string(),
            address: counter.address(),
            messages: self.messages,
            last_reply,
            state,
            activations: stats.activations,
            reschedules: stats.reschedules,
            steals: stats.steals,
        };
        system.shutdown().await;

        match ctx.format {
            OutputFormat::Json => print_single(&report),
            OutputFormat::Text => {
                if let Some(reply) = &report.last_reply {
                    print_info(&format!("last reply from {}: {reply}", report.address));
                }
                print_success(&format!(
                    "{} handled {} messages in {} activations",
                    report.actor, report.state, report.activations
                ));
            }
        }
        Ok(())
    }
}
