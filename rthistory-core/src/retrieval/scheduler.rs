use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rthistory_model::{PatientId, RecordKind, Uid};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug_span, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{Result, RetrievalError};

use super::config::RetrievalConfig;
use super::handlers::{self, HandlerContext};
use super::ports::{ArchiveTransport, ExistenceCache, ReceiveEndpoint};
use super::queue::WorkQueue;
use super::summary::{AbandonedTask, RunSummary};
use super::task::TaskItem;

/// How a single task ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// Received and, where applicable, expanded.
    Completed,
    /// The cache already holds the record.
    AlreadyPresent,
    /// Transient failure; the follow-up is the same task one attempt later.
    Retry { reason: String },
    /// Series discovered; the follow-up is the same task at the new series.
    Refined,
    /// Content of a received record was unusable. Not retried.
    ContentFailure { reason: String },
}

impl TaskStatus {
    pub fn needs_retry(&self) -> bool {
        matches!(self, TaskStatus::Retry { .. })
    }
}

/// Status plus the tasks to push back onto the queue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub follow_ups: Vec<TaskItem>,
}

impl TaskOutcome {
    pub fn completed(follow_ups: Vec<TaskItem>) -> Self {
        Self {
            status: TaskStatus::Completed,
            follow_ups,
        }
    }

    pub fn already_present() -> Self {
        Self {
            status: TaskStatus::AlreadyPresent,
            follow_ups: Vec::new(),
        }
    }

    pub fn retry(task: &TaskItem, reason: String) -> Self {
        Self {
            status: TaskStatus::Retry { reason },
            follow_ups: vec![task.retry()],
        }
    }

    pub fn refined(task: TaskItem) -> Self {
        Self {
            status: TaskStatus::Refined,
            follow_ups: vec![task],
        }
    }

    pub fn content_failure(reason: String, follow_ups: Vec<TaskItem>) -> Self {
        Self {
            status: TaskStatus::ContentFailure { reason },
            follow_ups,
        }
    }
}

/// Collaborators handed to the scheduler explicitly; nothing is global.
#[derive(Clone)]
pub struct RetrievalPorts {
    pub archive: Arc<dyn ArchiveTransport>,
    pub cache: Arc<dyn ExistenceCache>,
    pub endpoint: Arc<dyn ReceiveEndpoint>,
}

impl RetrievalPorts {
    pub fn new(
        archive: Arc<dyn ArchiveTransport>,
        cache: Arc<dyn ExistenceCache>,
        endpoint: Arc<dyn ReceiveEndpoint>,
    ) -> Self {
        Self {
            archive,
            cache,
            endpoint,
        }
    }
}

impl fmt::Debug for RetrievalPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalPorts")
            .field("archive", &"ArchiveTransport")
            .field("cache", &"ExistenceCache")
            .field("endpoint", &"ReceiveEndpoint")
            .finish()
    }
}

/// Drains one patient's retrieval graph, one task at a time.
///
/// Tasks are handled strictly sequentially so that at most one move is ever
/// outstanding; the receive buffer carries no request correlation and relies
/// on that.
#[derive(Debug)]
pub struct RetrievalScheduler {
    ports: RetrievalPorts,
    config: RetrievalConfig,
}

impl RetrievalScheduler {
    pub fn new(ports: RetrievalPorts, config: RetrievalConfig) -> Self {
        Self { ports, config }
    }

    pub async fn run(&self, patient: &PatientId) -> Result<RunSummary> {
        self.run_with_cancellation(patient, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires or the
    /// configured run timeout elapses. Both are only checked between tasks,
    /// never while a move is outstanding.
    pub async fn run_with_cancellation(
        &self,
        patient: &PatientId,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let run_id = Uuid::now_v7();
        let span = info_span!("retrieval_run", %run_id, patient = %patient);
        async move {
            let started = Instant::now();
            let deadline = self
                .config
                .run_timeout
                .and_then(|timeout| started.checked_add(timeout));
            let mut summary = RunSummary::new(run_id, patient.clone());

            let mut queue = self.seed(patient).await?;
            summary.seeded_plans = queue.len();
            info!(target: "retrieval::run", plans = queue.len(), "seeded retrieval queue");

            while let Some(task) = queue.pop() {
                let timed_out = deadline.is_some_and(|deadline| Instant::now() >= deadline);
                if cancel.is_cancelled() || timed_out {
                    summary.cancelled = true;
                    summary.unprocessed = queue.len() + 1;
                    warn!(
                        target: "retrieval::run",
                        unprocessed = summary.unprocessed,
                        timed_out,
                        "stopping retrieval run before queue was drained"
                    );
                    break;
                }

                if self.config.retry.is_exhausted(task.attempt()) {
                    error!(
                        target: "retrieval::task",
                        key = %task.record_key(),
                        kind = %task.kind(),
                        attempts = task.attempt(),
                        "abandoning task after too many attempts"
                    );
                    summary.abandoned.push(AbandonedTask::from(&task));
                    continue;
                }

                let outcome = self.dispatch(&task).await;
                summary.record(&outcome.status);
                queue.extend(outcome.follow_ups);
            }

            summary.elapsed = started.elapsed();
            info!(
                target: "retrieval::run",
                dispatched = summary.dispatched,
                completed = summary.completed,
                already_present = summary.already_present,
                abandoned = summary.abandoned.len(),
                complete = summary.is_complete(),
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "retrieval run finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Handles one task and reports its outcome. Never fails: handler errors
    /// are folded into a retry or a content failure here.
    pub async fn dispatch(&self, task: &TaskItem) -> TaskOutcome {
        let span = debug_span!(
            "task",
            kind = %task.kind(),
            patient = %task.patient(),
            study = %task.study(),
            series = %task.series(),
            instance = %task.instance(),
            attempt = task.attempt()
        );
        async {
            info!(target: "retrieval::task", "handling task");
            let ctx = HandlerContext {
                archive: self.ports.archive.as_ref(),
                cache: self.ports.cache.as_ref(),
                endpoint: self.ports.endpoint.as_ref(),
                expansion: &self.config.expansion,
            };

            let result = match task.kind() {
                RecordKind::Plan => handlers::plan::handle(&ctx, task).await,
                RecordKind::StructureSet => {
                    handlers::structure_set::handle(&ctx, task).await
                }
                RecordKind::Dose => handlers::dose::handle(&ctx, task).await,
                RecordKind::TreatmentRecord => {
                    handlers::treatment_record::handle(&ctx, task).await
                }
                RecordKind::Image(_) => handlers::image::handle(&ctx, task).await,
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => self.handle_error(task, err),
            };
            if let TaskStatus::Retry { reason } = &outcome.status {
                warn!(target: "retrieval::task", reason = %reason, "task will be retried");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    fn handle_error(&self, task: &TaskItem, err: RetrievalError) -> TaskOutcome {
        let msg = err.to_string();
        if err.is_transient() {
            TaskOutcome::retry(task, msg)
        } else {
            error!(target: "retrieval::task", error = %msg, "task failed on record content; not retrying");
            TaskOutcome::content_failure(msg, Vec::new())
        }
    }

    /// One PLAN task per plan referenced by the patient's treatment records,
    /// in treatment order.
    async fn seed(&self, patient: &PatientId) -> Result<WorkQueue> {
        let mut descriptors = self
            .ports
            .archive
            .find_treatment_records(patient)
            .await
            .map_err(|err| RetrievalError::Seeding {
                patient: patient.to_string(),
                source: Box::new(err),
            })?;

        descriptors.sort_by(|a, b| {
            (&a.treatment_date, &a.treatment_time)
                .cmp(&(&b.treatment_date, &b.treatment_time))
        });

        let mut queue = WorkQueue::new();
        for descriptor in descriptors {
            let Some(plan) = descriptor
                .referenced_instance
                .filter(|reference| reference.is_well_formed())
            else {
                warn!(
                    target: "retrieval::run",
                    record = %descriptor.instance_uid,
                    "treatment record does not reference a plan; skipping"
                );
                continue;
            };
            queue.push(TaskItem::new(
                RecordKind::Plan,
                patient.clone(),
                descriptor.study_uid,
                Uid::empty(),
                plan.instance_uid,
                plan.record_class,
            ));
        }
        Ok(queue)
    }
}
