//! Single-flight execution of scheduled command files.
//!
//! Cron triggers push schedule ids into a FIFO queue (deduplicated by id).
//! One drain at a time pops jobs and runs them to completion through a
//! [`JobExecutor`], so at most one conversation is ever active.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command::CommandResolver;
use super::cron_scheduler::CronScheduler;
use crate::models::{Schedule, ScheduleRun};
use crate::storage::Storage;

/// Runs one command prompt to completion.
///
/// Resolves only once the conversation is finished, with the final answer.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, prompt: String, cancel: CancellationToken) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Upper bound on one job; `None` waits for the conversation to finish.
    pub job_timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }
}

pub struct ScheduleRunner {
    storage: Arc<Storage>,
    executor: Arc<dyn JobExecutor>,
    resolver: CommandResolver,
    config: RunnerConfig,
    queue: Mutex<VecDeque<Schedule>>,
    is_processing: AtomicBool,
    stopped: AtomicBool,
    cron: tokio::sync::Mutex<Option<CronScheduler>>,
    shutdown: CancellationToken,
}

impl ScheduleRunner {
    pub fn new(
        storage: Arc<Storage>,
        executor: Arc<dyn JobExecutor>,
        resolver: CommandResolver,
    ) -> Self {
        Self {
            storage,
            executor,
            resolver,
            config: RunnerConfig::default(),
            queue: Mutex::new(VecDeque::new()),
            is_processing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cron: tokio::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a cron trigger for every enabled schedule and start
    /// listening for firings. Calling it again is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            bail!("Schedule runner has been stopped");
        }

        let mut cron = self.cron.lock().await;
        if cron.is_some() {
            return Ok(());
        }

        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = CronScheduler::new(fired_tx).await?;
        self.reconcile(&scheduler).await?;
        scheduler.start().await?;
        info!(
            jobs = scheduler.active_job_count().await,
            "Schedule runner started"
        );
        *cron = Some(scheduler);

        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.listen(fired_rx).await });
        Ok(())
    }

    /// Bring cron triggers in line with the stored schedules.
    ///
    /// Schedules added, removed, re-enabled, disabled or given a new cron
    /// expression since the last sync (for example by another `codeloom`
    /// process) are picked up. Returns `(added, removed)`; a runner that is
    /// not started or already stopped reports `(0, 0)`.
    pub async fn sync_schedules(&self) -> Result<(usize, usize)> {
        if self.is_stopped() {
            return Ok((0, 0));
        }
        let cron = self.cron.lock().await;
        match cron.as_ref() {
            Some(scheduler) => self.reconcile(scheduler).await,
            None => Ok((0, 0)),
        }
    }

    async fn reconcile(&self, scheduler: &CronScheduler) -> Result<(usize, usize)> {
        let wanted: HashMap<String, Schedule> = self
            .storage
            .schedules
            .list()
            .into_iter()
            .filter(|schedule| schedule.enabled)
            .map(|schedule| (schedule.id.clone(), schedule))
            .collect();
        let current = scheduler.registered().await;

        let mut removed = 0;
        for (id, cron) in &current {
            if wanted.get(id).is_none_or(|schedule| &schedule.cron != cron)
                && scheduler.remove_schedule(id).await?
            {
                removed += 1;
            }
        }

        let mut added = 0;
        for (id, schedule) in &wanted {
            if current.get(id) == Some(&schedule.cron) {
                continue;
            }
            match scheduler.add_schedule(schedule).await {
                Ok(()) => added += 1,
                Err(e) => {
                    warn!(schedule_id = %id, error = %e, "Skipping schedule with bad trigger");
                }
            }
        }

        if added > 0 || removed > 0 {
            info!(added, removed, "Cron triggers synced");
        }
        Ok((added, removed))
    }

    async fn listen(self: Arc<Self>, mut fired: mpsc::UnboundedReceiver<String>) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                id = fired.recv() => match id {
                    Some(id) => {
                        if let Err(e) = self.trigger(&id) {
                            warn!(schedule_id = %id, error = %e, "Failed to trigger schedule");
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("Schedule listener stopped");
    }

    /// Queue a stored schedule and make sure a drain is running.
    ///
    /// Returns `false` when the schedule is disabled, already queued, or the
    /// runner is stopped.
    pub fn trigger(self: &Arc<Self>, schedule_id: &str) -> Result<bool> {
        let Some(schedule) = self.storage.schedules.get(schedule_id)? else {
            bail!("Schedule {} not found", schedule_id);
        };
        if !schedule.enabled {
            debug!(schedule_id = %schedule.id, "Schedule disabled, ignoring trigger");
            return Ok(false);
        }
        if !self.enqueue(schedule) {
            return Ok(false);
        }

        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.process_queue().await });
        Ok(true)
    }

    /// Append to the queue unless the same schedule is already waiting.
    pub fn enqueue(&self, schedule: Schedule) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        let mut queue = self.queue.lock();
        if queue.iter().any(|queued| queued.id == schedule.id) {
            debug!(schedule_id = %schedule.id, "Schedule already queued");
            return false;
        }
        debug!(schedule_id = %schedule.id, position = queue.len(), "Schedule queued");
        queue.push_back(schedule);
        true
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::Acquire)
    }

    /// Drain the queue in FIFO order, one job at a time.
    ///
    /// Returns immediately when another drain is already running.
    pub async fn process_queue(&self) {
        loop {
            if self
                .is_processing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = self.queue.lock().pop_front();
                let Some(schedule) = next else { break };
                self.execute_job(&schedule).await;
            }

            self.is_processing.store(false, Ordering::Release);
            // A trigger may have slipped in between the last pop and the store.
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    /// Run one schedule and record the outcome. Never fails; errors are
    /// kept on the returned run.
    pub async fn execute_job(&self, schedule: &Schedule) -> ScheduleRun {
        let mut run = ScheduleRun::start(schedule);
        self.record(&run);
        info!(schedule_id = %schedule.id, command = %schedule.command, "Scheduled job started");

        match self.run_command(schedule).await {
            Ok(answer) => {
                run.succeed();
                if let Err(e) = self.storage.schedules.mark_ran(&schedule.id) {
                    warn!(schedule_id = %schedule.id, error = %e, "Failed to update last run time");
                }
                info!(
                    schedule_id = %schedule.id,
                    answer_len = answer.len(),
                    "Scheduled job finished"
                );
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(schedule_id = %schedule.id, error = %message, "Scheduled job failed");
                run.fail(message);
            }
        }

        self.record(&run);
        run
    }

    async fn run_command(&self, schedule: &Schedule) -> Result<String> {
        let prompt = self.resolver.load(&schedule.command)?;
        let cancel = CancellationToken::new();
        let job = self.executor.execute(prompt, cancel.clone());

        match self.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    bail!("Job timed out after {:?}", limit)
                }
            },
            None => job.await,
        }
    }

    fn record(&self, run: &ScheduleRun) {
        if let Err(e) = self.storage.schedules.record_run(run) {
            warn!(run_id = %run.id, error = %e, "Failed to record schedule run");
        }
    }

    /// Halt all triggers and discard the pending queue.
    ///
    /// A job already running finishes; nothing new is queued afterwards.
    pub async fn stop(&self) -> Result<()> {
        let already_stopped = self.stopped.swap(true, Ordering::AcqRel);
        self.shutdown.cancel();
        let discarded = {
            let mut queue = self.queue.lock();
            let len = queue.len();
            queue.clear();
            len
        };

        if let Some(mut scheduler) = self.cron.lock().await.take() {
            scheduler.shutdown().await?;
        }
        if !already_stopped {
            info!(discarded, "Schedule runner stopped");
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of registered cron triggers.
    pub async fn active_job_count(&self) -> usize {
        match self.cron.lock().await.as_ref() {
            Some(scheduler) => scheduler.active_job_count().await,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingExecutor {
        prompts: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn execute(&self, prompt: String, cancel: CancellationToken) -> Result<String> {
            self.prompts.lock().push(prompt.clone());
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = cancel.cancelled() => bail!("cancelled"),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Ok(format!("done: {prompt}"))
        }
    }

    struct Fixture {
        _dir: TempDir,
        storage: Arc<Storage>,
        executor: Arc<RecordingExecutor>,
        resolver: CommandResolver,
    }

    fn fixture(executor: RecordingExecutor) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join(".codeloom");
        let storage = Arc::new(Storage::open(&data_dir).unwrap());
        let commands = data_dir.join("commands");
        std::fs::create_dir_all(&commands).unwrap();
        std::fs::write(commands.join("report.md"), "Write the daily report").unwrap();
        let resolver = CommandResolver::new(commands, dir.path());
        Fixture {
            _dir: dir,
            storage,
            executor: Arc::new(executor),
            resolver,
        }
    }

    fn runner(f: &Fixture) -> Arc<ScheduleRunner> {
        Arc::new(ScheduleRunner::new(
            Arc::clone(&f.storage),
            f.executor.clone(),
            f.resolver.clone(),
        ))
    }

    #[tokio::test]
    async fn test_enqueue_dedups_by_schedule_id() {
        let f = fixture(RecordingExecutor::default());
        let runner = runner(&f);
        let schedule = Schedule::new("0 9 * * *", "report");

        assert!(runner.enqueue(schedule.clone()));
        assert!(!runner.enqueue(schedule));
        assert_eq!(runner.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_stop_twice_leaves_no_jobs() {
        let f = fixture(RecordingExecutor::default());
        f.storage
            .schedules
            .add(Schedule::new("0 9 * * *", "report"))
            .unwrap();
        let runner = runner(&f);

        runner.start().await.unwrap();
        assert_eq!(runner.active_job_count().await, 1);

        runner.stop().await.unwrap();
        runner.stop().await.unwrap();
        assert_eq!(runner.active_job_count().await, 0);
        assert!(runner.is_stopped());
    }

    #[tokio::test]
    async fn test_sync_follows_stored_schedules() {
        let f = fixture(RecordingExecutor::default());
        let kept = f
            .storage
            .schedules
            .add(Schedule::new("0 9 * * *", "report"))
            .unwrap();
        let dropped = f
            .storage
            .schedules
            .add(Schedule::new("0 10 * * *", "report"))
            .unwrap();
        let runner = runner(&f);
        assert_eq!(runner.sync_schedules().await.unwrap(), (0, 0));

        runner.start().await.unwrap();
        assert_eq!(runner.active_job_count().await, 2);
        assert_eq!(runner.sync_schedules().await.unwrap(), (0, 0));

        f.storage.schedules.remove(&dropped.id).unwrap();
        f.storage.schedules.add(Schedule::new("*/5 * * * *", "report")).unwrap();
        assert_eq!(runner.sync_schedules().await.unwrap(), (1, 1));
        assert_eq!(runner.active_job_count().await, 2);

        f.storage.schedules.set_enabled(&kept.id, false).unwrap();
        assert_eq!(runner.sync_schedules().await.unwrap(), (0, 1));
        assert_eq!(runner.active_job_count().await, 1);

        runner.stop().await.unwrap();
        assert_eq!(runner.sync_schedules().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_stop_discards_queue_and_rejects_new_work() {
        let f = fixture(RecordingExecutor::default());
        let runner = runner(&f);
        runner.enqueue(Schedule::new("0 9 * * *", "report"));
        runner.enqueue(Schedule::new("0 10 * * *", "report"));

        runner.stop().await.unwrap();
        assert_eq!(runner.queue_len(), 0);
        assert!(!runner.enqueue(Schedule::new("0 11 * * *", "report")));
        assert!(runner.start().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_command_is_recorded_and_queue_moves_on() {
        let f = fixture(RecordingExecutor::default());
        let runner = runner(&f);
        let missing = f
            .storage
            .schedules
            .add(Schedule::new("0 9 * * *", "does-not-exist"))
            .unwrap();
        let report = f
            .storage
            .schedules
            .add(Schedule::new("0 10 * * *", "report"))
            .unwrap();

        runner.enqueue(missing.clone());
        runner.enqueue(report.clone());
        runner.process_queue().await;

        let runs = f.storage.schedules.runs(10);
        assert_eq!(runs.len(), 2);
        let failed = runs.iter().find(|r| r.schedule_id == missing.id).unwrap();
        assert_eq!(failed.status, RunStatus::Error);
        assert!(failed.error.as_deref().unwrap().contains("not found"));

        let ok = runs.iter().find(|r| r.schedule_id == report.id).unwrap();
        assert_eq!(ok.status, RunStatus::Success);
        assert_eq!(*f.executor.prompts.lock(), vec!["Write the daily report"]);

        let stored = f.storage.schedules.get(&report.id).unwrap().unwrap();
        assert!(stored.last_run_at.is_some());
        let stored = f.storage.schedules.get(&missing.id).unwrap().unwrap();
        assert!(stored.last_run_at.is_none());
        assert!(!runner.is_processing());
    }

    #[tokio::test]
    async fn test_job_timeout_records_error() {
        let f = fixture(RecordingExecutor {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let runner = ScheduleRunner::new(
            Arc::clone(&f.storage),
            f.executor.clone(),
            f.resolver.clone(),
        )
        .with_config(RunnerConfig::default().with_job_timeout(Duration::from_millis(50)));

        let run = runner
            .execute_job(&Schedule::new("0 9 * * *", "report"))
            .await;
        assert_eq!(run.status, RunStatus::Error);
        assert!(run.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_trigger_skips_disabled_schedule() {
        let f = fixture(RecordingExecutor::default());
        let runner = runner(&f);
        let schedule = f
            .storage
            .schedules
            .add(Schedule::new("0 9 * * *", "report"))
            .unwrap();
        f.storage.schedules.set_enabled(&schedule.id, false).unwrap();

        assert!(!runner.trigger(&schedule.id).unwrap());
        assert!(runner.trigger("no-such-schedule").is_err());
        assert_eq!(runner.queue_len(), 0);
    }
}
