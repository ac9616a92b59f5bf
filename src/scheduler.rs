//! Periodic sampling tasks.
//!
//! Each [`TaskKind`] gets its own tokio task driving an interval. The sampling
//! pass itself runs on the blocking pool, and the next tick is not looked at
//! until the pass has returned, so passes of one task never overlap. A tick
//! that fell due while a pass was running is dropped rather than replayed.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ProcessList,
    ProcessTree,
    Graphs,
    StatusBar,
    Network,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::ProcessList,
        TaskKind::ProcessTree,
        TaskKind::Graphs,
        TaskKind::StatusBar,
        TaskKind::Network,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskKind::ProcessList => "process-list",
            TaskKind::ProcessTree => "process-tree",
            TaskKind::Graphs => "graphs",
            TaskKind::StatusBar => "status-bar",
            TaskKind::Network => "network",
        }
    }

    pub fn default_period(self) -> Duration {
        match self {
            TaskKind::ProcessList => Duration::from_secs(2),
            TaskKind::ProcessTree => Duration::from_secs(3),
            TaskKind::Graphs => Duration::from_secs(2),
            TaskKind::StatusBar => Duration::from_secs(1),
            TaskKind::Network => Duration::from_secs(5),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("{0} task is already running")]
    AlreadyRunning(TaskKind),
}

/// One sampling pass. Runs on the blocking pool.
pub trait Sampler: Send + 'static {
    fn sample(&mut self);
}

impl<F> Sampler for F
where
    F: FnMut() + Send + 'static,
{
    fn sample(&mut self) {
        self()
    }
}

/// Requests an out-of-band pass of one task. Triggers fired while one is
/// already pending collapse into a single pass.
#[derive(Clone, Debug)]
pub struct TaskTrigger(Arc<Notify>);

impl TaskTrigger {
    fn new() -> Self {
        TaskTrigger(Arc::new(Notify::new()))
    }

    pub fn fire(&self) {
        self.0.notify_one();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Active,
    Paused,
    Stopped,
}

struct TaskHandle {
    state: watch::Sender<RunState>,
    trigger: TaskTrigger,
    join: JoinHandle<()>,
}

/// Owns the running sampler tasks. Must be used from within a tokio runtime.
#[derive(Default)]
pub struct Scheduler {
    tasks: HashMap<TaskKind, TaskHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `sampler` on a fixed `period`. The first pass runs immediately.
    pub fn spawn<S: Sampler>(
        &mut self,
        kind: TaskKind,
        period: Duration,
        sampler: S,
    ) -> Result<(), SchedulerError> {
        if self.is_running(kind) {
            return Err(SchedulerError::AlreadyRunning(kind));
        }
        let (state, state_rx) = watch::channel(RunState::Active);
        let trigger = TaskTrigger::new();
        let join = tokio::spawn(run_task(kind, period, sampler, state_rx, trigger.clone()));
        self.tasks.insert(
            kind,
            TaskHandle {
                state,
                trigger,
                join,
            },
        );
        Ok(())
    }

    /// Suspend or resume scheduled ticks. Manual triggers still run while
    /// paused.
    pub fn set_paused(&self, kind: TaskKind, paused: bool) {
        let Some(handle) = self.tasks.get(&kind) else {
            return;
        };
        let target = if paused {
            RunState::Paused
        } else {
            RunState::Active
        };
        handle.state.send_if_modified(|state| {
            if *state == RunState::Stopped || *state == target {
                return false;
            }
            *state = target;
            true
        });
        tracing::debug!(task = kind.label(), paused, "task pause state changed");
    }

    pub fn is_paused(&self, kind: TaskKind) -> bool {
        self.tasks
            .get(&kind)
            .is_some_and(|handle| *handle.state.borrow() == RunState::Paused)
    }

    pub fn trigger_now(&self, kind: TaskKind) {
        if let Some(handle) = self.tasks.get(&kind) {
            handle.trigger.fire();
        }
    }

    /// Detached trigger for callers that do not hold the scheduler.
    pub fn trigger_handle(&self, kind: TaskKind) -> Option<TaskTrigger> {
        self.tasks.get(&kind).map(|handle| handle.trigger.clone())
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks
            .get(&kind)
            .is_some_and(|handle| !handle.join.is_finished())
    }

    /// Stop one task. An in-flight pass is allowed to finish; once this
    /// returns the sampler is never called again.
    pub async fn stop(&mut self, kind: TaskKind) {
        if let Some(handle) = self.tasks.remove(&kind) {
            handle.state.send_replace(RunState::Stopped);
            if let Err(err) = handle.join.await {
                tracing::error!(task = kind.label(), error = %err, "sampler task ended abnormally");
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for handle in self.tasks.values() {
            handle.state.send_replace(RunState::Stopped);
        }
        for (kind, handle) in self.tasks.drain() {
            if let Err(err) = handle.join.await {
                tracing::error!(task = kind.label(), error = %err, "sampler task ended abnormally");
            }
        }
    }
}

async fn run_task<S: Sampler>(
    kind: TaskKind,
    period: Duration,
    sampler: S,
    mut state: watch::Receiver<RunState>,
    trigger: TaskTrigger,
) {
    tracing::debug!(task = kind.label(), ?period, "sampler task started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sampler = Some(sampler);
    let mut busy_until: Option<Instant> = None;

    loop {
        let run = tokio::select! {
            biased;
            changed = state.changed() => {
                if changed.is_err() || *state.borrow_and_update() == RunState::Stopped {
                    break;
                }
                false
            }
            _ = trigger.0.notified() => true,
            scheduled = ticker.tick() => {
                if *state.borrow() == RunState::Paused {
                    false
                } else if busy_until.is_some_and(|end| scheduled < end) {
                    tracing::trace!(task = kind.label(), "tick came due during a pass, skipped");
                    false
                } else {
                    true
                }
            }
        };
        if !run {
            continue;
        }

        let Some(mut current) = sampler.take() else {
            break;
        };
        let pass = tokio::task::spawn_blocking(move || {
            let panicked = catch_unwind(AssertUnwindSafe(|| current.sample())).is_err();
            (current, panicked)
        })
        .await;
        busy_until = Some(Instant::now());

        match pass {
            Ok((current, panicked)) => {
                if panicked {
                    tracing::error!(task = kind.label(), "sampler panicked, continuing");
                }
                sampler = Some(current);
            }
            Err(err) => {
                tracing::error!(task = kind.label(), error = %err, "sampler pass aborted");
                break;
            }
        }
    }

    tracing::debug!(task = kind.label(), "sampler task stopped");
}
