//! Shared actors and helpers for the runtime integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ember_runtime::{
    Actor, ActorError, ActorId, ActorSystem, Config, Context, Schedulable, Scheduler,
    SupervisorStrategy, WorkStealingScheduler,
};

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_system() -> ActorSystem {
    ActorSystem::create(Config::for_testing()).expect("create actor system")
}

/// Supervision with millisecond backoff so restarts happen quickly.
pub fn fast(strategy: SupervisorStrategy) -> SupervisorStrategy {
    strategy.with_backoff(Duration::from_millis(5), Duration::from_millis(20))
}

/// Polls `check` until it returns true or the settle timeout passes.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for: {what}");
}

// =============================================================================
// Actors
// =============================================================================

/// Counts messages and acknowledges each one.
#[derive(Debug)]
pub struct Counter;

impl Actor for Counter {
    type State = i64;
    type Message = String;
    type Reply = String;

    fn on_receive(
        &mut self,
        message: String,
        ctx: Context<i64>,
    ) -> Result<(Context<i64>, String), ActorError> {
        let next = ctx.state().copied().unwrap_or_default() + 1;
        Ok((ctx.with_state(next), format!("Processed: {message}")))
    }
}

/// Counts messages; `"fail"` returns an error and `"panic"` panics.
#[derive(Debug)]
pub struct Flaky;

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
            "fail" => Err(ActorError::handler("requested failure")),
            "panic" => panic!("requested panic"),
            _ => {
                let next = ctx.state().copied().unwrap_or_default() + 1;
                Ok((ctx.with_state(next), next))
            }
        }
    }
}

/// Replies with the message it was sent.
#[derive(Debug)]
pub struct Echo;

impl Actor for Echo {
    type State = ();
    type Message = u64;
    type Reply = u64;

    fn on_receive(&mut self, message: u64, ctx: Context<()>) -> Result<(Context<()>, u64), ActorError> {
        Ok((ctx, message))
    }
}

/// Appends every message to its state.
#[derive(Debug)]
pub struct Recorder;

impl Actor for Recorder {
    type State = Vec<u32>;
    type Message = u32;
    type Reply = usize;

    fn on_receive(
        &mut self,
        message: u32,
        ctx: Context<Vec<u32>>,
    ) -> Result<(Context<Vec<u32>>, usize), ActorError> {
        let mut seen = ctx.state().cloned().unwrap_or_default();
        seen.push(message);
        let len = seen.len();
        Ok((ctx.with_state(seen), len))
    }
}

/// Blocks its worker for the number of milliseconds it is sent.
#[derive(Debug)]
pub struct Sleeper;

impl Actor for Sleeper {
    type State = ();
    type Message = u64;
    type Reply = ();

    fn on_receive(&mut self, millis: u64, ctx: Context<()>) -> Result<(Context<()>, ()), ActorError> {
        std::thread::sleep(Duration::from_millis(millis));
        Ok((ctx, ()))
    }
}

/// Detects overlapping handler invocations for one actor.
#[derive(Debug, Default, Clone)]
pub struct OverlapProbe {
    pub in_flight: Arc<AtomicUsize>,
    pub overlaps: Arc<AtomicUsize>,
}

impl OverlapProbe {
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

impl Actor for OverlapProbe {
    type State = u64;
    type Message = u64;
    type Reply = u64;

    fn on_receive(&mut self, _: u64, ctx: Context<u64>) -> Result<(Context<u64>, u64), ActorError> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_micros(50));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = ctx.state().copied().unwrap_or_default() + 1;
        Ok((ctx.with_state(next), next))
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Delegates to the system scheduler while recording calls.
pub struct RecordingScheduler {
    inner: Arc<WorkStealingScheduler>,
    enqueued: AtomicUsize,
    removed: Mutex<Vec<ActorId>>,
}

impl RecordingScheduler {
    pub fn wrap(inner: Arc<WorkStealingScheduler>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            enqueued: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
        })
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> Vec<ActorId> {
        self.removed.lock().unwrap().clone()
    }
}

impl Scheduler for RecordingScheduler {
    fn enqueue(&self, executor: Arc<dyn Schedulable>) -> bool {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueue(executor)
    }

    fn remove_actor(&self, actor_id: &ActorId) -> bool {
        self.removed.lock().unwrap().push(actor_id.clone());
        self.inner.remove_actor(actor_id)
    }

    fn clean_all_worker_queues(&self) {
        self.inner.clean_all_worker_queues();
    }
}
