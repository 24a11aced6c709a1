//! Schedule definitions and their run log.

use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use parking_lot::Mutex;

use codeloom_storage::{read_json_or_default, write_json};
use codeloom_traits::DocumentStore;

use crate::models::{MAX_RUN_LOG, RunLogDocument, Schedule, ScheduleDocument, ScheduleRun};
use crate::scheduler::normalize_cron_expr;

const SCHEDULES_KEY: &str = "schedules.json";
const RUNS_KEY: &str = "schedule-runs.json";

/// Typed access to `schedules.json` and `schedule-runs.json`.
pub struct ScheduleStorage {
    store: Arc<dyn DocumentStore>,
    // Serializes read-modify-write cycles on both documents.
    write_lock: Mutex<()>,
}

impl ScheduleStorage {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// List all schedules in creation order
    pub fn list(&self) -> Vec<Schedule> {
        self.load().schedules
    }

    /// Find a schedule by full id or unique id prefix
    pub fn get(&self, id: &str) -> Result<Option<Schedule>> {
        let schedules = self.list();
        if let Some(exact) = schedules.iter().find(|s| s.id == id) {
            return Ok(Some(exact.clone()));
        }

        let mut matches = schedules.into_iter().filter(|s| s.id.starts_with(id));
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            bail!("Schedule id prefix '{}' is ambiguous", id);
        }
        Ok(first)
    }

    /// Add a schedule after validating its cron expression
    pub fn add(&self, schedule: Schedule) -> Result<Schedule> {
        normalize_cron_expr(&schedule.cron)?;
        if schedule.command.trim().is_empty() {
            bail!("Schedule command must not be empty");
        }

        let _guard = self.write_lock.lock();
        let mut doc = self.load();
        if doc.schedules.iter().any(|s| s.id == schedule.id) {
            bail!("Schedule {} already exists", schedule.id);
        }
        doc.schedules.push(schedule.clone());
        self.save(&doc)?;
        tracing::info!(schedule_id = %schedule.id, cron = %schedule.cron, "Schedule added");
        Ok(schedule)
    }

    /// Replace a stored schedule with the same id
    pub fn update(&self, schedule: &Schedule) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut doc = self.load();
        let Some(slot) = doc.schedules.iter_mut().find(|s| s.id == schedule.id) else {
            bail!("Schedule {} not found", schedule.id);
        };
        *slot = schedule.clone();
        self.save(&doc)
    }

    /// Remove a schedule; returns the removed entry
    pub fn remove(&self, id: &str) -> Result<Schedule> {
        let Some(target) = self.get(id)? else {
            bail!("Schedule {} not found", id);
        };

        let _guard = self.write_lock.lock();
        let mut doc = self.load();
        doc.schedules.retain(|s| s.id != target.id);
        self.save(&doc)?;
        tracing::info!(schedule_id = %target.id, "Schedule removed");
        Ok(target)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Schedule> {
        let Some(mut schedule) = self.get(id)? else {
            bail!("Schedule {} not found", id);
        };
        schedule.enabled = enabled;
        self.update(&schedule)?;
        Ok(schedule)
    }

    /// Stamp `last_run_at` after a successful run.
    ///
    /// A schedule removed while its job was running is ignored.
    pub fn mark_ran(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut doc = self.load();
        if let Some(schedule) = doc.schedules.iter_mut().find(|s| s.id == id) {
            schedule.last_run_at = Some(Utc::now());
            self.save(&doc)?;
        }
        Ok(())
    }

    /// Insert or update a run record, keeping only the newest entries
    pub fn record_run(&self, run: &ScheduleRun) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut log: RunLogDocument = read_json_or_default(self.store.as_ref(), RUNS_KEY);
        match log.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => log.runs.push(run.clone()),
        }
        if log.runs.len() > MAX_RUN_LOG {
            let excess = log.runs.len() - MAX_RUN_LOG;
            log.runs.drain(..excess);
        }
        write_json(self.store.as_ref(), RUNS_KEY, &log)?;
        Ok(())
    }

    /// Most recent runs first
    pub fn runs(&self, limit: usize) -> Vec<ScheduleRun> {
        let log: RunLogDocument = read_json_or_default(self.store.as_ref(), RUNS_KEY);
        log.runs.into_iter().rev().take(limit).collect()
    }

    fn load(&self) -> ScheduleDocument {
        read_json_or_default(self.store.as_ref(), SCHEDULES_KEY)
    }

    fn save(&self, doc: &ScheduleDocument) -> Result<()> {
        write_json(self.store.as_ref(), SCHEDULES_KEY, doc)?;
        Ok(())
    }
}
