use std::collections::HashSet;

use rthistory_model::{RecordContent, RecordDescriptor, RecordKind, Uid};
use tracing::{debug, error, info, warn};

use crate::error::{Result, RetrievalError};
use crate::retrieval::ports::ReferenceQuery;
use crate::retrieval::scheduler::TaskOutcome;
use crate::retrieval::task::TaskItem;

use super::{Fetch, HandlerContext, fetch, select_received};

pub(crate) async fn handle(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
) -> Result<TaskOutcome> {
    let received = match fetch(ctx, task).await? {
        Fetch::Cached => return Ok(TaskOutcome::already_present()),
        Fetch::NotDelivered(reason) => return Ok(TaskOutcome::retry(task, reason)),
        Fetch::Received(received) => received,
    };

    let Some(plan) = select_received(task, received) else {
        return Ok(TaskOutcome::retry(task, "no plan in receive buffer".into()));
    };
    let RecordContent::Plan(content) = &plan.content else {
        return Err(RetrievalError::Content(format!(
            "expected a plan for instance {}, received {} content",
            task.instance(),
            plan.modality
        )));
    };

    let mut follow_ups = Vec::new();
    let mut content_issue = None;

    match content
        .referenced_structure_set
        .as_ref()
        .filter(|reference| reference.is_well_formed())
    {
        Some(reference) => {
            info!(
                target: "retrieval::expand",
                structure_set = %reference.instance_uid,
                "plan references structure set"
            );
            follow_ups.push(TaskItem::new(
                RecordKind::StructureSet,
                task.patient().clone(),
                task.study().clone(),
                Uid::empty(),
                reference.instance_uid.clone(),
                reference.record_class.clone(),
            ));
        }
        None => {
            error!(
                target: "retrieval::expand",
                plan = %task.instance(),
                "plan carries no usable structure set reference; skipping structure set"
            );
            content_issue = Some("plan has no structure set reference".to_string());
        }
    }

    let doses = find_referencing(ctx, task, RecordKind::Dose).await;
    if doses.is_empty() {
        info!(target: "retrieval::expand", plan = %task.instance(), "no doses reference this plan yet");
    }
    for dose in &doses {
        if dose.instance_uid.is_empty() {
            debug!(
                target: "retrieval::expand",
                series = %dose.series_uid,
                "dose descriptor has no instance; skipping"
            );
            continue;
        }
        follow_ups.push(TaskItem::from_descriptor(RecordKind::Dose, task.patient(), dose));
    }

    let records = find_referencing(ctx, task, RecordKind::TreatmentRecord).await;
    if records.is_empty() {
        info!(
            target: "retrieval::expand",
            plan = %task.instance(),
            "no treatment records reference this plan yet"
        );
    }
    let mut seen_series = HashSet::new();
    for record in &records {
        if record.series_uid.is_empty() {
            debug!(
                target: "retrieval::expand",
                instance = %record.instance_uid,
                "treatment record descriptor has no series; skipping"
            );
            continue;
        }
        if seen_series.insert(record.series_uid.clone()) {
            follow_ups.push(TaskItem::for_series(
                RecordKind::TreatmentRecord,
                task.patient(),
                record,
            ));
        }
    }

    info!(
        target: "retrieval::expand",
        plan = %task.instance(),
        follow_ups = follow_ups.len(),
        doses = doses.len(),
        treatment_series = seen_series.len(),
        "expanded plan"
    );

    Ok(match content_issue {
        Some(reason) => TaskOutcome::content_failure(reason, follow_ups),
        None => TaskOutcome::completed(follow_ups),
    })
}

/// Lookup failures during expansion are logged and read as "none yet"; the
/// plan itself has already been received.
async fn find_referencing(
    ctx: &HandlerContext<'_>,
    task: &TaskItem,
    kind: RecordKind,
) -> Vec<RecordDescriptor> {
    let query = ReferenceQuery {
        patient: task.patient().clone(),
        study: task.study().clone(),
        anchor_instance: task.instance().clone(),
        target_class: kind.default_class(),
    };
    match ctx.archive.find_referencing(&query).await {
        Ok(found) => found,
        Err(err) => {
            warn!(
                target: "retrieval::expand",
                plan = %task.instance(),
                class = %query.target_class,
                error = %err,
                "lookup of referencing records failed"
            );
            Vec::new()
        }
    }
}
