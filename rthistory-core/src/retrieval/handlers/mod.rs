//! Per-kind task handlers.
//!
//! Handlers return a [`TaskOutcome`](super::scheduler::TaskOutcome) describing the follow-up tasks to push;
//! they never touch the queue. Errors they return are classified by the
//! scheduler.

pub(crate) mod dose;
pub(crate) mod image;
pub(crate) mod plan;
pub(crate) mod structure_set;
pub(crate) mod treatment_record;

use rthistory_model::ClinicalRecord;
use tracing::{info, warn};

use crate::error::Result;

use super::config::ExpansionConfig;
use super::ports::{
    ArchiveTransport, ExistenceCache, MoveStatus, ReceiveEndpoint,
};
use super::task::{RecordKey, TaskItem};

/// Borrowed view of the collaborators a handler may call.
pub(crate) struct HandlerContext<'a> {
    pub archive: &'a dyn ArchiveTransport,
    pub cache: &'a dyn ExistenceCache,
    pub endpoint: &'a dyn ReceiveEndpoint,
    pub expansion: &'a ExpansionConfig,
}

/// Result of the shared cache-check / move / receive sequence.
#[derive(Debug)]
pub(crate) enum Fetch {
    Cached,
    Received(Vec<ClinicalRecord>),
    NotDelivered(String),
}

/// A cache that cannot answer is treated as a miss; at worst the record is
/// fetched again.
pub(crate) async fn is_cached(ctx: &HandlerContext<'_>, key: &RecordKey) -> bool {
    match ctx.cache.exists(key).await {
        Ok(present) => present,
        Err(err) => {
            warn!(
                target: "retrieval::task",
                key = %key,
                error = %err,
                "existence check failed; treating as not present"
            );
            false
        }
    }
}

/// Cache check, then a single move, then a read of whatever the endpoint
/// accepted. The receive buffer is cleared on every path that issued a move.
pub(crate) async fn fetch(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
) -> Result<Fetch> {
    let key = task.record_key();
    if is_cached(ctx, &key).await {
        info!(target: "retrieval::task", key = %key, "already present locally");
        return Ok(Fetch::Cached);
    }

    let request = task.move_request();
    let status = ctx.archive.move_to_endpoint(&request).await;
    let received = ctx.endpoint.received().await;
    ctx.endpoint.clear().await;

    if let MoveStatus::Failed { detail } = status? {
        return Ok(Fetch::NotDelivered(format!(
            "{} move did not complete: {detail}",
            request.granularity
        )));
    }

    if received.is_empty() {
        return Ok(Fetch::NotDelivered(
            "move completed but nothing was received".into(),
        ));
    }

    Ok(Fetch::Received(received))
}

/// The record matching the task's instance, else the first one received.
pub(crate) fn select_received(
    task: &TaskItem,
    mut received: Vec<ClinicalRecord>,
) -> Option<ClinicalRecord> {
    let position = received
        .iter()
        .position(|record| record.instance_uid == *task.instance())
        .unwrap_or(0);
    if position < received.len() {
        Some(received.swap_remove(position))
    } else {
        None
    }
}
