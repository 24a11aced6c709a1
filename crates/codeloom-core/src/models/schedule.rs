use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of run records kept; older runs are evicted first.
pub const MAX_RUN_LOG: usize = 100;

/// A command file executed on a cron trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    /// Cron expression, 5-field (minute first) or 6/7-field (second first).
    pub cron: String,
    /// Command file reference: a name under `.codeloom/commands/` or a path.
    pub command: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(cron: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            cron: cron.into(),
            command: command.into(),
            enabled: true,
            created_at: Utc::now(),
            last_run_at: None,
        }
    }

    /// First eight characters of the id, for display.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// One execution of a [`Schedule`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRun {
    pub id: String,
    pub schedule_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScheduleRun {
    /// Record a run that starts now.
    pub fn start(schedule: &Schedule) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            schedule_id: schedule.id.clone(),
            command: schedule.command.clone(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            error: None,
        }
    }

    pub fn succeed(&mut self) {
        self.status = RunStatus::Success;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }
}

/// On-disk shape of `schedules.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

/// On-disk shape of `schedule-runs.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLogDocument {
    #[serde(default)]
    pub runs: Vec<ScheduleRun>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let schedule = Schedule::new("0 9 * * *", "daily-report");
        let mut run = ScheduleRun::start(&schedule);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.duration().is_none());

        run.fail("Command file not found: daily-report");
        assert_eq!(run.status, RunStatus::Error);
        assert!(run.completed_at.is_some());
        assert!(run.error.as_deref().unwrap().contains("not found"));
    }

    #[test]
    fn test_schedule_serializes_camel_case() {
        let schedule = Schedule::new("*/5 * * * *", "lint");
        let value = serde_json::to_value(&schedule).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("lastRunAt").is_some());
        assert_eq!(value["enabled"], true);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Success).unwrap(),
            "\"success\""
        );
    }
}
