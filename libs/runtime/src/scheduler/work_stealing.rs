//! Work-stealing, reduction-budgeted scheduler.
//!
//! Each worker loop pops its own queue, then steals from peers, then idles
//! until new work is placed or `idle_wait` elapses. An activation drains at
//! most `max_reductions` worth of messages; an executor with messages left
//! goes back on a queue so its peers get a turn.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ember_id::ActorId;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::queue::WorkerQueue;
use super::{Schedulable, Scheduler};
use crate::config::{Config, Placement};

/// How often the steal sweeper scans the worker queues.
const SWEEP_INTERVAL: Duration = Duration::from_millis(5);

/// Scheduler tuning, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_reductions: u32,
    pub workers: usize,
    pub steal_sweeper: bool,
    pub process_time_threshold: Duration,
    pub time_penalty_factor: u32,
    pub idle_wait: Duration,
    pub placement: Placement,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_reductions: config.max_reductions,
            workers: config.workers,
            steal_sweeper: config.steal_sweeper,
            process_time_threshold: config.process_time_threshold(),
            time_penalty_factor: config.time_penalty_factor,
            idle_wait: config.idle_wait(),
            placement: config.placement,
        }
    }
}

/// Cumulative scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Activations started.
    pub activations: u64,
    /// Executors put back on a queue because their budget ran out.
    pub reschedules: u64,
    /// Executors taken from another worker's queue.
    pub steals: u64,
}

/// Reductions charged for one message that took `elapsed`.
fn reduction_cost(elapsed: Duration, threshold: Duration, penalty_factor: u32) -> u32 {
    if elapsed <= threshold {
        return 1;
    }
    let intervals = elapsed
        .as_nanos()
        .checked_div(threshold.as_nanos())
        .unwrap_or(u128::MAX);
    let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
    intervals.saturating_mul(penalty_factor).saturating_add(1)
}

pub struct WorkStealingScheduler {
    settings: SchedulerSettings,
    queues: Vec<WorkerQueue>,
    sweeper: bool,
    next_worker: AtomicUsize,
    work_available: Notify,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    activations: AtomicU64,
    reschedules: AtomicU64,
    steals: AtomicU64,
}

impl WorkStealingScheduler {
    /// Creates the worker queues without starting any worker.
    pub fn new(settings: SchedulerSettings) -> Arc<Self> {
        let workers = settings.workers.max(1);
        let sweeper = settings.steal_sweeper && workers > 4;
        let loops = if sweeper { workers - 1 } else { workers };
        let (shutdown, _) = watch::channel(false);

        Arc::new(Self {
            settings,
            queues: (0..loops).map(|_| WorkerQueue::new()).collect(),
            sweeper,
            next_worker: AtomicUsize::new(0),
            work_available: Notify::new(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            activations: AtomicU64::new(0),
            reschedules: AtomicU64::new(0),
            steals: AtomicU64::new(0),
        })
    }

    /// Spawns the worker loops (and the sweeper, if enabled). Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }

        info!(
            workers = self.queues.len(),
            sweeper = self.sweeper,
            max_reductions = self.settings.max_reductions,
            "Starting scheduler"
        );

        for worker in 0..self.queues.len() {
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(Arc::clone(self).worker_loop(worker, shutdown)));
        }
        if self.sweeper {
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(Arc::clone(self).sweep_loop(shutdown)));
        }
    }

    /// Tells every loop to exit without waiting for them.
    pub fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
        self.work_available.notify_waiters();
    }

    /// Stops all loops, waits for in-flight activations, and clears the queues.
    pub async fn shutdown(&self) {
        self.signal_shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler worker ended abnormally");
            }
        }

        self.clean_all_worker_queues();
        info!(stats = ?self.stats(), "Scheduler stopped");
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            activations: self.activations.load(Ordering::Relaxed),
            reschedules: self.reschedules.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
        }
    }

    /// Number of worker queues.
    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.iter().map(WorkerQueue::len).collect()
    }

    // =========================================================================
    // Loops
    // =========================================================================

    async fn worker_loop(self: Arc<Self>, worker: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker, "Worker started");

        while !*shutdown.borrow() {
            let next = self.queues[worker].pop().or_else(|| self.steal(worker));
            match next {
                Some(executor) => {
                    self.activate(executor).await;
                    tokio::task::yield_now().await;
                }
                None => {
                    tokio::select! {
                        biased;

                        _ = shutdown.changed() => {}
                        _ = self.work_available.notified() => {}
                        _ = tokio::time::sleep(self.settings.idle_wait) => {}
                    }
                }
            }
        }

        debug!(worker, "Worker stopped");
    }

    async fn sweep_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!("Steal sweeper started");
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                _ = shutdown.changed() => continue,
                _ = ticker.tick() => {}
            }

            for queue in &self.queues {
                if let Some(executor) = queue.pop() {
                    self.steals.fetch_add(1, Ordering::Relaxed);
                    self.activate(executor).await;
                }
            }
        }

        debug!("Steal sweeper stopped");
    }

    /// Takes the first available executor from a peer queue.
    fn steal(&self, thief: usize) -> Option<Arc<dyn Schedulable>> {
        let workers = self.queues.len();
        let stolen = (1..workers)
            .map(|offset| (thief + offset) % workers)
            .find_map(|victim| self.queues[victim].pop());

        if let Some(executor) = &stolen {
            self.steals.fetch_add(1, Ordering::Relaxed);
            trace!(thief, actor_id = %executor.actor_id(), "Stole executor");
        }
        stolen
    }

    // =========================================================================
    // Activation
    // =========================================================================

    async fn activate(&self, executor: Arc<dyn Schedulable>) {
        // The guard outlives the moves into `place` below.
        let holder = Arc::clone(&executor);
        let _activation = holder.activation_lock().lock().await;
        self.activations.fetch_add(1, Ordering::Relaxed);
        executor.resume_execution();

        let mut reductions: u32 = 0;
        while executor.is_active() && reductions < self.settings.max_reductions {
            let started = Instant::now();
            if !executor.process_next().await {
                break;
            }
            reductions = reductions.saturating_add(reduction_cost(
                started.elapsed(),
                self.settings.process_time_threshold,
                self.settings.time_penalty_factor,
            ));
        }

        trace!(actor_id = %executor.actor_id(), reductions, "Activation finished");

        if !executor.is_active() {
            executor.release_scheduled();
            return;
        }

        // Parked: the suspension marks it off-queue until `enqueue` resumes it.
        drop(executor.suspend_execution());

        if executor.has_messages() {
            // Budget exhausted: requeue behind everyone else.
            self.reschedules.fetch_add(1, Ordering::Relaxed);
            self.place(executor);
            return;
        }

        executor.release_scheduled();

        // A send that raced with the release found the slot still claimed.
        if executor.has_messages() && executor.is_active() && executor.try_mark_scheduled() {
            self.place(executor);
        }
    }

    fn pick_worker(&self) -> usize {
        let workers = self.queues.len();
        match self.settings.placement {
            Placement::Random => rand::rng().random_range(0..workers),
            Placement::RoundRobin => self.next_worker.fetch_add(1, Ordering::Relaxed) % workers,
        }
    }

    fn place(&self, executor: Arc<dyn Schedulable>) {
        executor.resume_execution();
        let worker = self.pick_worker();
        trace!(worker, actor_id = %executor.actor_id(), "Placed executor");
        self.queues[worker].push(executor);
        self.work_available.notify_one();
    }
}

impl Scheduler for WorkStealingScheduler {
    fn enqueue(&self, executor: Arc<dyn Schedulable>) -> bool {
        if !executor.is_active() || !executor.try_mark_scheduled() {
            return false;
        }
        self.place(executor);
        true
    }

    fn remove_actor(&self, actor_id: &ActorId) -> bool {
        let mut removed = 0usize;
        for queue in &self.queues {
            for executor in queue.remove_actor(actor_id) {
                executor.deactivate();
                executor.release_scheduled();
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(actor_id = %actor_id, removed, "Removed actor from scheduler");
        } else {
            debug!(actor_id = %actor_id, "Actor not queued in scheduler");
        }
        removed > 0
    }

    fn clean_all_worker_queues(&self) {
        for queue in &self.queues {
            for executor in queue.drain() {
                executor.release_scheduled();
            }
        }
        info!("All worker queues cleared");
    }
}

impl std::fmt::Debug for WorkStealingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStealingScheduler")
            .field("settings", &self.settings)
            .field("queues", &self.queue_lengths())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
