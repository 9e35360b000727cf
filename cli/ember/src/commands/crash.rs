//! Crash command - exercise supervision with a failing actor.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use ember_runtime::{
    Actor, ActorError, Context, Supervisor, SupervisorStatus, SupervisorStrategy,
};
use tracing::{info, warn};

use crate::error::CliError;
use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// How long to wait for the supervisor to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Send `failures` crashing messages to a supervised actor.
#[derive(Debug, Args)]
pub struct CrashCommand {
    /// Number of failing messages to send.
    #[arg(long, short, default_value_t = 3)]
    failures: u32,

    /// Restarts allowed before the actor is removed.
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Restart strategy.
    #[arg(long, value_enum, default_value_t = StrategyArg::OneForOne)]
    strategy: StrategyArg,

    /// Smallest restart delay in milliseconds.
    #[arg(long, default_value_t = 50)]
    initial_backoff_ms: u64,

    /// Largest restart delay in milliseconds.
    #[arg(long, default_value_t = 500)]
    max_backoff_ms: u64,

    /// Fail by panicking instead of returning an error.
    #[arg(long)]
    panic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    OneForOne,
    AllForOne,
    Escalate,
}

impl CrashCommand {
    fn strategy(&self) -> SupervisorStrategy {
        let strategy = match self.strategy {
            StrategyArg::OneForOne => SupervisorStrategy::one_for_one(),
            StrategyArg::AllForOne => SupervisorStrategy::all_for_one(),
            StrategyArg::Escalate => SupervisorStrategy::escalate(),
        };
        strategy.with_max_retries(self.max_retries).with_backoff(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Counts good messages; `"fail"` errors and `"panic"` panics.
#[derive(Debug)]
struct Flaky;

impl Actor for Flaky {
    type State = u32;
    type Message = String;
    type Reply = u32;

    fn on_receive(
        &mut self,
        message: String,
        ctx: Context<u32>,
    ) -> Result<(Context<u32>, u32), ActorError> {
        match message.as_str() {
            "fail" => Err(ActorError::handler("asked to fail")),
            "panic" => panic!("asked to panic"),
            _ => {
                let count = ctx.state().copied().unwrap_or_default() + 1;
                Ok((ctx.with_state(count), count))
            }
        }
    }
}

impl CrashCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        if self.initial_backoff_ms > self.max_backoff_ms {
            bail!("--initial-backoff-ms must not exceed --max-backoff-ms");
        }

        let system = ctx.system()?;
        let supervisor = system
            .supervisor("crash-supervisor", self.strategy(), None)
            .map_err(CliError::from)?;
        let flaky = system
            .actor_of("flaky", 0, Some(&supervisor), |_, _| Flaky)
            .await
            .map_err(CliError::from)?;

        let message = if self.panic { "panic" } else { "fail" };
        for attempt in 1..=self.failures {
            if let Err(e) = flaky.send(message.to_string()).await {
                warn!(attempt, error = %e, "Actor no longer reachable");
                break;
            }
        }

        let status = settle(&supervisor, self.failures).await?;
        info!(
            supervisor = %status.id,
            restarts = status.restarts,
            removals = status.removals,
            "Supervisor settled"
        );
        let alive = system.contains("flaky");
        system.shutdown().await;

        match ctx.format {
            OutputFormat::Json => print_single(&status),
            OutputFormat::Text => {
                print_info(&format!(
                    "{} restarts, {} removals",
                    status.restarts, status.removals
                ));
                if alive {
                    print_success("flaky survived every failure");
                } else {
                    print_success("flaky exhausted its retries and was removed");
                }
            }
        }
        Ok(())
    }
}

/// Waits until every failure has been answered with a restart or a removal.
async fn settle(
    supervisor: &Supervisor,
    failures: u32,
) -> Result<SupervisorStatus> {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        let status = supervisor
            .status()
            .await
            .map_err(CliError::from)?;
        let handled = status.restarts + status.removals;
        if handled >= u64::from(failures) || status.children.is_empty() {
            return Ok(status);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("supervisor did not settle within {SETTLE_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
