use tracing::info;

use crate::error::{Result, RetrievalError};
use crate::retrieval::scheduler::TaskOutcome;
use crate::retrieval::task::TaskItem;

use super::{Fetch, HandlerContext, fetch};

/// Moves every fraction's record of one series in a single request.
pub(crate) async fn handle(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
) -> Result<TaskOutcome> {
    if task.series().is_empty() {
        return Err(RetrievalError::Content(
            "treatment record task has no series to address".into(),
        ));
    }

    match fetch(ctx, task).await? {
        Fetch::Cached => Ok(TaskOutcome::already_present()),
        Fetch::NotDelivered(reason) => Ok(TaskOutcome::retry(task, reason)),
        Fetch::Received(received) => {
            info!(
                target: "retrieval::task",
                series = %task.series(),
                fractions = received.len(),
                "treatment record series retrieved"
            );
            Ok(TaskOutcome::completed(Vec::new()))
        }
    }
}
