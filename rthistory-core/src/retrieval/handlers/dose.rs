use tracing::info;

use crate::error::Result;
use crate::retrieval::scheduler::TaskOutcome;
use crate::retrieval::task::TaskItem;

use super::{Fetch, HandlerContext, fetch};

/// Doses are leaves: confirm receipt, expand nothing.
pub(crate) async fn handle(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
) -> Result<TaskOutcome> {
    match fetch(ctx, task).await? {
        Fetch::Cached => Ok(TaskOutcome::already_present()),
        Fetch::NotDelivered(reason) => Ok(TaskOutcome::retry(task, reason)),
        Fetch::Received(received) => {
            info!(
                target: "retrieval::task",
                dose = %task.instance(),
                received = received.len(),
                "dose retrieved"
            );
            Ok(TaskOutcome::completed(Vec::new()))
        }
    }
}
