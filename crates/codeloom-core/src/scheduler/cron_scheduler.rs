use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::Schedule;

/// Widen a cron expression to the seconds-first form.
///
/// Five fields (`min hour day month weekday`) get a leading `0` seconds
/// field; six and seven field expressions pass through. The result is
/// checked with the `cron` parser.
pub fn normalize_cron_expr(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let widened = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => bail!(
            "Invalid cron expression '{}': expected 5, 6 or 7 fields, got {}",
            expr,
            n
        ),
    };

    cron::Schedule::from_str(&widened)
        .map_err(|e| anyhow!("Invalid cron expression '{}': {}", expr, e))?;
    Ok(widened)
}

/// Next time `expr` fires after now.
pub fn next_fire(expr: &str) -> Result<Option<DateTime<Utc>>> {
    let widened = normalize_cron_expr(expr)?;
    let schedule = cron::Schedule::from_str(&widened)
        .map_err(|e| anyhow!("Invalid cron expression '{}': {}", expr, e))?;
    Ok(schedule.upcoming(Utc).next())
}

/// Cron trigger wrapper: each job sends its schedule id down a channel
///
/// The receiving side (the job runner) owns queueing and execution; a
/// firing trigger never runs work itself.
pub struct CronScheduler {
    /// tokio-cron-scheduler instance
    scheduler: JobScheduler,
    /// Where fired schedule ids go
    fired: mpsc::UnboundedSender<String>,
    /// job_uuid -> registered trigger (used for removal and resync)
    job_map: Arc<RwLock<HashMap<Uuid, Registered>>>,
}

#[derive(Debug, Clone)]
struct Registered {
    schedule_id: String,
    cron: String,
}

impl CronScheduler {
    /// Create a new cron scheduler that reports firings on `fired`
    pub async fn new(fired: mpsc::UnboundedSender<String>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            scheduler,
            fired,
            job_map: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;

        info!("CronScheduler started");
        Ok(())
    }

    /// Register one trigger for `schedule`
    pub async fn add_schedule(&self, schedule: &Schedule) -> Result<()> {
        let cron_expr = normalize_cron_expr(&schedule.cron)?;
        let schedule_id = schedule.id.clone();
        let fired = self.fired.clone();

        debug!(schedule_id = %schedule_id, cron = %cron_expr, "Adding cron schedule");

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
            let schedule_id = schedule_id.clone();
            let fired = fired.clone();

            Box::pin(async move {
                info!(schedule_id = %schedule_id, "Cron job triggered");
                if fired.send(schedule_id.clone()).is_err() {
                    debug!(schedule_id = %schedule_id, "Runner gone, dropping trigger");
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create cron job: {}", e))?;

        let job_uuid = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add job to scheduler: {}", e))?;

        self.job_map.write().await.insert(
            job_uuid,
            Registered {
                schedule_id: schedule.id.clone(),
                cron: schedule.cron.clone(),
            },
        );

        info!(
            schedule_id = %schedule.id,
            job_uuid = %job_uuid,
            cron = %cron_expr,
            "Cron schedule added"
        );
        Ok(())
    }

    /// Remove the trigger for a schedule
    ///
    /// Returns Ok(true) when a job was found and removed, Ok(false) when no job existed.
    pub async fn remove_schedule(&self, schedule_id: &str) -> Result<bool> {
        let job_uuid = {
            let map = self.job_map.read().await;
            map.iter()
                .find_map(|(uuid, job)| (job.schedule_id == schedule_id).then_some(*uuid))
        };

        let Some(uuid) = job_uuid else {
            debug!(schedule_id = %schedule_id, "No cron job found for schedule");
            return Ok(false);
        };

        self.scheduler
            .remove(&uuid)
            .await
            .map_err(|e| anyhow!("Failed to remove job from scheduler: {}", e))?;
        self.job_map.write().await.remove(&uuid);

        info!(schedule_id = %schedule_id, job_uuid = %uuid, "Cron schedule removed");
        Ok(true)
    }

    /// Remove every registered trigger
    pub async fn remove_all(&self) -> Result<()> {
        let uuids: Vec<Uuid> = self.job_map.read().await.keys().copied().collect();
        for uuid in uuids {
            self.scheduler
                .remove(&uuid)
                .await
                .map_err(|e| anyhow!("Failed to remove job from scheduler: {}", e))?;
            self.job_map.write().await.remove(&uuid);
        }
        Ok(())
    }

    /// Shut down the scheduler
    pub async fn shutdown(&mut self) -> Result<()> {
        self.remove_all().await?;
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to shutdown scheduler: {}", e))?;

        info!("CronScheduler shut down");
        Ok(())
    }

    /// Registered triggers as `schedule_id -> cron` (the expression as stored)
    pub async fn registered(&self) -> HashMap<String, String> {
        self.job_map
            .read()
            .await
            .values()
            .map(|job| (job.schedule_id.clone(), job.cron.clone()))
            .collect()
    }

    /// Get the number of active jobs
    pub async fn active_job_count(&self) -> usize {
        self.job_map.read().await.len()
    }
}
