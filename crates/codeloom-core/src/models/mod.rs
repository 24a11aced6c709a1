mod schedule;

pub use schedule::{
    MAX_RUN_LOG, RunLogDocument, RunStatus, Schedule, ScheduleDocument, ScheduleRun,
};
