use tracing::info;

use crate::error::Result;
use crate::retrieval::ports::InstanceQuery;
use crate::retrieval::scheduler::TaskOutcome;
use crate::retrieval::task::TaskItem;

use super::{Fetch, HandlerContext, fetch, is_cached};

pub(crate) async fn handle(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
) -> Result<TaskOutcome> {
    if task.series().is_empty() {
        return resolve_series(ctx, task).await;
    }

    match fetch(ctx, task).await? {
        Fetch::Cached => Ok(TaskOutcome::already_present()),
        Fetch::NotDelivered(reason) => Ok(TaskOutcome::retry(task, reason)),
        Fetch::Received(received) => {
            info!(
                target: "retrieval::task",
                series = %task.series(),
                slices = received.len(),
                "image series retrieved"
            );
            Ok(TaskOutcome::completed(Vec::new()))
        }
    }
}

/// Finds the series holding the task's instance and re-addresses the task at
/// it. A lookup that matches nothing is retried like a transport failure.
async fn resolve_series(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
) -> Result<TaskOutcome> {
    if is_cached(ctx, &task.record_key()).await {
        info!(
            target: "retrieval::task",
            instance = %task.instance(),
            "image instance already present locally"
        );
        return Ok(TaskOutcome::already_present());
    }

    let query = InstanceQuery {
        patient: task.patient().clone(),
        study: task.study().clone(),
        instance: task.instance().clone(),
        record_class: task.record_class().clone(),
    };
    let found = ctx.archive.find_instance(&query).await?;

    match found.into_iter().find(|descriptor| !descriptor.series_uid.is_empty()) {
        Some(descriptor) => {
            info!(
                target: "retrieval::expand",
                instance = %task.instance(),
                series = %descriptor.series_uid,
                "resolved image series"
            );
            Ok(TaskOutcome::refined(task.with_series(descriptor.series_uid)))
        }
        None => Ok(TaskOutcome::retry(
            task,
            format!("no series found for image instance {}", task.instance()),
        )),
    }
}
