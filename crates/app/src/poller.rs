//! Named recurring tasks with overlap protection.
//!
//! Integrations register their polling here instead of owning timers, so
//! every poll shares the same start/stop switch and the same guard: a
//! guarded task whose previous run is still in flight skips the firing
//! rather than queueing it.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use homedash_domain::error::PollerError;
use homedash_domain::time::{Timestamp, now};

use crate::event_bus::panic_message;

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;
type Condition = Arc<dyn Fn() -> bool + Send + Sync>;

/// How a task is wrapped when registered.
#[derive(Clone)]
pub struct TaskOptions {
    /// Skip firings while a previous run is still in flight.
    pub guarded: bool,
    /// Only run when this returns `true` at fire time.
    pub condition: Option<Condition>,
    /// Run once as soon as the task is scheduled.
    pub run_immediately: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            guarded: true,
            condition: None,
            run_immediately: false,
        }
    }
}

impl std::fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOptions")
            .field("guarded", &self.guarded)
            .field("condition", &self.condition.is_some())
            .field("run_immediately", &self.run_immediately)
            .finish()
    }
}

impl TaskOptions {
    #[must_use]
    pub fn unguarded(mut self) -> Self {
        self.guarded = false;
        self
    }

    #[must_use]
    pub fn immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }

    #[must_use]
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }
}

/// What happened to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    SkippedInFlight,
    SkippedByCondition,
}

/// Introspection snapshot of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(rename = "intervalMs", serialize_with = "as_millis")]
    pub interval: Duration,
    pub enabled: bool,
    /// Whether a timer is currently scheduled.
    pub running: bool,
    pub in_flight: bool,
    pub guarded: bool,
    pub has_condition: bool,
    pub run_count: u64,
    pub skip_count: u64,
    pub error_count: u64,
    pub last_run: Option<Timestamp>,
    pub last_error: Option<String>,
}

fn as_millis<S: serde::Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug, Default)]
struct Stats {
    run_count: u64,
    skip_count: u64,
    error_count: u64,
    last_run: Option<Timestamp>,
    last_error: Option<String>,
}

/// The wrapped task function: guard, condition and failure accounting.
struct Runner {
    name: String,
    task: TaskFn,
    guarded: bool,
    condition: Option<Condition>,
    active: AtomicUsize,
    stats: Mutex<Stats>,
}

/// Decrements the active count when an invocation ends, even by panic.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Runner {
    async fn invoke(self: Arc<Self>) -> RunOutcome {
        if let Some(condition) = &self.condition
            && !condition()
        {
            self.lock_stats().skip_count += 1;
            tracing::trace!(task = %self.name, "condition not met, skipping");
            return RunOutcome::SkippedByCondition;
        }

        if self.guarded {
            if self
                .active
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                self.lock_stats().skip_count += 1;
                tracing::debug!(task = %self.name, "previous run still in flight, skipping");
                return RunOutcome::SkippedInFlight;
            }
        } else {
            self.active.fetch_add(1, Ordering::SeqCst);
        }
        let _active = ActiveGuard(&self.active);

        {
            let mut stats = self.lock_stats();
            stats.run_count += 1;
            stats.last_run = Some(now());
        }

        let error = match AssertUnwindSafe((self.task)()).catch_unwind().await {
            Ok(Ok(())) => return RunOutcome::Completed,
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        tracing::warn!(task = %self.name, error = %error, "task run failed");
        let mut stats = self.lock_stats();
        stats.error_count += 1;
        stats.last_error = Some(error);
        RunOutcome::Failed
    }

    fn lock_stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Task {
    interval: Duration,
    enabled: bool,
    run_immediately: bool,
    timer: Option<JoinHandle<()>>,
    runner: Arc<Runner>,
}

impl Task {
    fn schedule(&mut self, first_run: bool) {
        self.cancel();
        let runner = Arc::clone(&self.runner);
        let period = self.interval;
        let immediate = first_run && self.run_immediately;
        self.timer = Some(tokio::spawn(async move {
            if immediate {
                tokio::spawn(Arc::clone(&runner).invoke());
            }
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tokio::spawn(Arc::clone(&runner).invoke());
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn status(&self) -> TaskStatus {
        let stats = self.runner.lock_stats();
        TaskStatus {
            interval: self.interval,
            enabled: self.enabled,
            running: self.timer.is_some(),
            in_flight: self.runner.active.load(Ordering::SeqCst) > 0,
            guarded: self.runner.guarded,
            has_condition: self.runner.condition.is_some(),
            run_count: stats.run_count,
            skip_count: stats.skip_count,
            error_count: stats.error_count,
            last_run: stats.last_run,
            last_error: stats.last_error.clone(),
        }
    }
}

/// Registry of recurring tasks.
///
/// Scheduling spawns on the ambient tokio runtime, so `register` on a
/// running poller, `start*` and `update_interval` must be called from
/// within one.
#[derive(Default)]
pub struct Poller {
    tasks: Mutex<HashMap<String, Task>>,
    running: AtomicBool,
}

impl Poller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a recurring task; an existing task with the same name is
    /// unregistered first.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::InvalidInterval`] for a zero interval.
    pub fn register<F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        options: TaskOptions,
        task: F,
    ) -> Result<(), PollerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(PollerError::InvalidInterval(name));
        }
        self.unregister(&name);

        let runner = Arc::new(Runner {
            name: name.clone(),
            task: Arc::new(move || Box::pin(task()) as TaskFuture),
            guarded: options.guarded,
            condition: options.condition,
            active: AtomicUsize::new(0),
            stats: Mutex::new(Stats::default()),
        });
        let mut task = Task {
            interval,
            enabled: true,
            run_immediately: options.run_immediately,
            timer: None,
            runner,
        };
        if self.is_running() {
            task.schedule(true);
        }
        tracing::debug!(task = %name, interval_ms = interval.as_millis(), "task registered");
        self.lock_tasks().insert(name, task);
        Ok(())
    }

    /// Cancel and remove a task. Returns `false` if it did not exist.
    pub fn unregister(&self, name: &str) -> bool {
        match self.lock_tasks().remove(name) {
            Some(mut task) => {
                task.cancel();
                tracing::debug!(task = name, "task unregistered");
                true
            }
            None => false,
        }
    }

    /// Schedule every enabled task.
    pub fn start_all(&self) {
        self.running.store(true, Ordering::SeqCst);
        let mut tasks = self.lock_tasks();
        for task in tasks.values_mut().filter(|task| task.enabled) {
            task.schedule(true);
        }
        tracing::info!(tasks = tasks.len(), "poller started");
    }

    /// Cancel every timer; registrations and enabled flags are kept.
    pub fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);
        for task in self.lock_tasks().values_mut() {
            task.cancel();
        }
        tracing::info!("poller stopped");
    }

    /// Enable and schedule one task.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::UnknownTask`] if no task has this name.
    pub fn start(&self, name: &str) -> Result<(), PollerError> {
        self.with_task(name, |task| {
            task.enabled = true;
            task.schedule(true);
        })
    }

    /// Disable and cancel one task without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::UnknownTask`] if no task has this name.
    pub fn stop(&self, name: &str) -> Result<(), PollerError> {
        self.with_task(name, |task| {
            task.enabled = false;
            task.cancel();
        })
    }

    /// Invoke a task now, outside its cadence but still behind its guard.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::UnknownTask`] if no task has this name.
    pub async fn run_now(&self, name: &str) -> Result<RunOutcome, PollerError> {
        let runner = self
            .lock_tasks()
            .get(name)
            .map(|task| Arc::clone(&task.runner))
            .ok_or_else(|| PollerError::UnknownTask(name.to_string()))?;
        Ok(runner.invoke().await)
    }

    /// Change a task's period, rescheduling it if its timer is live.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::InvalidInterval`] for a zero interval and
    /// [`PollerError::UnknownTask`] if no task has this name.
    pub fn update_interval(&self, name: &str, interval: Duration) -> Result<(), PollerError> {
        if interval.is_zero() {
            return Err(PollerError::InvalidInterval(name.to_string()));
        }
        self.with_task(name, |task| {
            task.interval = interval;
            if task.timer.is_some() {
                task.schedule(false);
            }
        })
    }

    /// Status of every task, keyed by name.
    #[must_use]
    pub fn get_status(&self) -> BTreeMap<String, TaskStatus> {
        self.lock_tasks()
            .iter()
            .map(|(name, task)| (name.clone(), task.status()))
            .collect()
    }

    /// Registered task names, sorted.
    #[must_use]
    pub fn get_task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_tasks().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn with_task(&self, name: &str, apply: impl FnOnce(&mut Task)) -> Result<(), PollerError> {
        let mut tasks = self.lock_tasks();
        let task = tasks
            .get_mut(name)
            .ok_or_else(|| PollerError::UnknownTask(name.to_string()))?;
        apply(task);
        Ok(())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for task in self.lock_tasks().values_mut() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting(counter: &Arc<AtomicUsize>, work: Duration) -> impl Fn() -> TaskFuture + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if !work.is_zero() {
                    tokio::time::sleep(work).await;
                }
                Ok(())
            })
        }
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("kaboom")
    }

    async fn noop() -> anyhow::Result<()> {
        Ok(())
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_once_per_interval_after_start() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register("tick", ms(100), TaskOptions::default(), counting(&runs, Duration::ZERO))
            .unwrap();

        tokio::time::sleep(ms(250)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0, "not started yet");

        poller.start_all();
        tokio::time::sleep(ms(350)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_never_overlap_guarded_runs_slower_than_interval() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register("slow", ms(100), TaskOptions::default(), counting(&runs, ms(250)))
            .unwrap();
        poller.start_all();

        tokio::time::sleep(ms(990)).await;

        // starts at 100, 400 and 700; the firings in between are skipped
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let status = &poller.get_status()["slow"];
        assert!(status.skip_count >= 4);
        assert!(status.in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn should_overlap_unguarded_runs() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register(
                "slow",
                ms(100),
                TaskOptions::default().unguarded(),
                counting(&runs, ms(250)),
            )
            .unwrap();
        poller.start_all();

        tokio::time::sleep(ms(990)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_firing_after_task_failure() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        poller
            .register("flaky", ms(100), TaskOptions::default(), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("device offline"))
                }
            })
            .unwrap();
        poller.start_all();

        tokio::time::sleep(ms(350)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let status = &poller.get_status()["flaky"];
        assert_eq!(status.error_count, 3);
        assert_eq!(status.last_error.as_deref(), Some("device offline"));
        assert!(status.running);
    }

    #[tokio::test]
    async fn should_report_failure_when_task_panics() {
        let poller = Poller::new();
        poller
            .register("boom", ms(100), TaskOptions::default(), explode)
            .unwrap();

        assert_eq!(poller.run_now("boom").await.unwrap(), RunOutcome::Failed);
        let status = &poller.get_status()["boom"];
        assert!(!status.in_flight);
        assert_eq!(status.last_error.as_deref(), Some("panicked: kaboom"));
    }

    #[tokio::test]
    async fn should_skip_when_condition_is_false() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&gate);
        poller
            .register(
                "gated",
                ms(100),
                TaskOptions::default().when(move || flag.load(Ordering::SeqCst)),
                counting(&runs, Duration::ZERO),
            )
            .unwrap();

        assert_eq!(
            poller.run_now("gated").await.unwrap(),
            RunOutcome::SkippedByCondition
        );
        gate.store(true, Ordering::SeqCst);
        assert_eq!(poller.run_now("gated").await.unwrap(), RunOutcome::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(poller.get_status()["gated"].has_condition);
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_run_now_while_guarded_run_in_flight() {
        let poller = Arc::new(Poller::new());
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register("slow", ms(1_000), TaskOptions::default(), counting(&runs, ms(500)))
            .unwrap();

        let background = Arc::clone(&poller);
        let first = tokio::spawn(async move { background.run_now("slow").await });
        tokio::task::yield_now().await;

        assert_eq!(
            poller.run_now("slow").await.unwrap(),
            RunOutcome::SkippedInFlight
        );
        assert_eq!(first.await.unwrap().unwrap(), RunOutcome::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_fail_for_unknown_task() {
        let poller = Poller::new();
        assert_eq!(
            poller.run_now("ghost").await,
            Err(PollerError::UnknownTask("ghost".to_string()))
        );
        assert_eq!(
            poller.stop("ghost"),
            Err(PollerError::UnknownTask("ghost".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_single_task_and_leave_it_disabled_on_start_all() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register("tick", ms(100), TaskOptions::default(), counting(&runs, Duration::ZERO))
            .unwrap();
        poller.start_all();
        tokio::time::sleep(ms(150)).await;
        poller.stop("tick").unwrap();
        poller.stop_all();
        poller.start_all();

        tokio::time::sleep(ms(500)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let status = &poller.get_status()["tick"];
        assert!(!status.enabled);
        assert!(!status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reschedule_when_interval_updated() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register("tick", ms(1_000), TaskOptions::default(), counting(&runs, Duration::ZERO))
            .unwrap();
        poller.start_all();

        poller.update_interval("tick", ms(100)).unwrap();
        tokio::time::sleep(ms(350)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(poller.get_status()["tick"].interval, ms(100));
    }

    #[test]
    fn should_reject_zero_interval() {
        let poller = Poller::new();
        assert_eq!(
            poller.register("zero", Duration::ZERO, TaskOptions::default(), noop),
            Err(PollerError::InvalidInterval("zero".to_string()))
        );
        poller
            .register("ok", ms(10), TaskOptions::default(), noop)
            .unwrap();
        assert_eq!(
            poller.update_interval("ok", Duration::ZERO),
            Err(PollerError::InvalidInterval("ok".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_immediately_when_requested() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register(
                "eager",
                ms(1_000),
                TaskOptions::default().immediately(),
                counting(&runs, Duration::ZERO),
            )
            .unwrap();
        poller.start_all();

        tokio::time::sleep(ms(10)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_replace_task_when_registered_twice() {
        let poller = Poller::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        poller.start_all();
        poller
            .register("dup", ms(100), TaskOptions::default(), counting(&first, Duration::ZERO))
            .unwrap();
        poller
            .register("dup", ms(100), TaskOptions::default(), counting(&second, Duration::ZERO))
            .unwrap();

        tokio::time::sleep(ms(250)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(poller.get_task_names(), vec!["dup".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_firing_when_unregistered() {
        let poller = Poller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        poller
            .register("tick", ms(100), TaskOptions::default(), counting(&runs, Duration::ZERO))
            .unwrap();
        poller.start_all();
        assert!(poller.unregister("tick"));
        assert!(!poller.unregister("tick"));

        tokio::time::sleep(ms(300)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(poller.get_status().is_empty());
    }

    #[test]
    fn should_serialize_status_interval_in_millis() {
        let poller = Poller::new();
        poller
            .register("tick", ms(1_500), TaskOptions::default(), noop)
            .unwrap();
        let json = serde_json::to_value(&poller.get_status()["tick"]).unwrap();
        assert_eq!(json["intervalMs"], 1_500);
        assert_eq!(json["hasCondition"], false);
    }
}
