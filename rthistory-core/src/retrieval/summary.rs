use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rthistory_model::{PatientId, RecordKind};
use serde::Serialize;
use uuid::Uuid;

use super::scheduler::TaskStatus;
use super::task::TaskItem;

/// Terminal-failure record for a task that hit the attempt ceiling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AbandonedTask {
    pub kind: RecordKind,
    pub key: String,
    pub attempts: u16,
}

impl From<&TaskItem> for AbandonedTask {
    fn from(task: &TaskItem) -> Self {
        Self {
            kind: task.kind(),
            key: task.record_key().to_string(),
            attempts: task.attempt(),
        }
    }
}

/// What one run did. Completion of a run does not mean everything reachable
/// was retrieved; check [`RunSummary::is_complete`].
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub patient: PatientId,
    pub started_at: DateTime<Utc>,
    pub seeded_plans: usize,
    /// Tasks handed to a handler.
    pub dispatched: usize,
    pub completed: usize,
    pub already_present: usize,
    pub retries: usize,
    pub refinements: usize,
    pub content_failures: usize,
    pub abandoned: Vec<AbandonedTask>,
    /// Tasks still queued when the run was cancelled or timed out.
    pub unprocessed: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(run_id: Uuid, patient: PatientId) -> Self {
        Self {
            run_id,
            patient,
            started_at: Utc::now(),
            seeded_plans: 0,
            dispatched: 0,
            completed: 0,
            already_present: 0,
            retries: 0,
            refinements: 0,
            content_failures: 0,
            abandoned: Vec::new(),
            unprocessed: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, status: &TaskStatus) {
        self.dispatched += 1;
        match status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::AlreadyPresent => self.already_present += 1,
            TaskStatus::Retry { .. } => self.retries += 1,
            TaskStatus::Refined => self.refinements += 1,
            TaskStatus::ContentFailure { .. } => self.content_failures += 1,
        }
    }

    /// True only when nothing was abandoned, cut short, or skipped because
    /// of unusable content.
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty()
            && !self.cancelled
            && self.unprocessed == 0
            && self.content_failures == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sub-millisecond precision is noise in an operator report.
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        write!(
            f,
            "patient {}: {} plans seeded, {} retrieved, {} already present, {} retries, {} abandoned, {} content failures in {}",
            self.patient,
            self.seeded_plans,
            self.completed,
            self.already_present,
            self.retries,
            self.abandoned.len(),
            self.content_failures,
            humantime::format_duration(elapsed)
        )?;
        if self.cancelled {
            write!(f, " (cancelled with {} tasks unprocessed)", self.unprocessed)?;
        }
        Ok(())
    }
}
