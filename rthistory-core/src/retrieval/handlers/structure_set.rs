use std::collections::HashSet;

use rthistory_model::{
    InstanceReference, RecordContent, RecordKind, RoiContour, Uid,
};
use tracing::{error, info};

use crate::error::{Result, RetrievalError};
use crate::retrieval::config::ContourSelection;
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

    let Some(structure_set) = select_received(task, received) else {
        return Ok(TaskOutcome::retry(
            task,
            "no structure set in receive buffer".into(),
        ));
    };
    let RecordContent::StructureSet(content) = &structure_set.content else {
        return Err(RetrievalError::Content(format!(
            "expected a structure set for instance {}, received {} content",
            task.instance(),
            structure_set.modality
        )));
    };

    let references =
        match image_references(&content.roi_contours, ctx.expansion.contour_selection) {
            Ok(references) => references,
            Err(reason) => {
                error!(
                    target: "retrieval::expand",
                    structure_set = %task.instance(),
                    regions = content.roi_contours.len(),
                    reason = %reason,
                    "structure set yields no image to retrieve"
                );
                return Ok(TaskOutcome::content_failure(reason, Vec::new()));
            }
        };

    let mut follow_ups = Vec::with_capacity(references.len());
    let mut content_issue = None;
    for reference in references {
        match reference.record_class.image_modality() {
            Ok(modality) => {
                info!(
                    target: "retrieval::expand",
                    structure_set = %task.instance(),
                    image = %reference.instance_uid,
                    modality = %modality,
                    "structure set contoured on image"
                );
                follow_ups.push(TaskItem::new(
                    RecordKind::Image(modality),
                    task.patient().clone(),
                    task.study().clone(),
                    Uid::empty(),
                    reference.instance_uid.clone(),
                    reference.record_class.clone(),
                ));
            }
            Err(err) => {
                error!(
                    target: "retrieval::expand",
                    structure_set = %task.instance(),
                    image = %reference.instance_uid,
                    error = %err,
                    "contoured image is not a CT, MR or PT image"
                );
                content_issue = Some(err.to_string());
            }
        }
    }

    Ok(match content_issue {
        Some(reason) => TaskOutcome::content_failure(reason, follow_ups),
        None => TaskOutcome::completed(follow_ups),
    })
}

/// Image instances referenced by the first contour of the selected regions.
///
/// With [`ContourSelection::FirstWithGeometry`] the first region carrying
/// contours decides: if its first contour has no usable image reference the
/// structure set is unusable, later regions are not consulted. With
/// [`ContourSelection::EveryRegion`] regions without a usable reference are
/// skipped, but at least one must remain.
fn image_references(
    regions: &[RoiContour],
    selection: ContourSelection,
) -> std::result::Result<Vec<&InstanceReference>, String> {
    match selection {
        ContourSelection::FirstWithGeometry => {
            let region = regions
                .iter()
                .find(|region| region.has_geometry())
                .ok_or_else(|| "structure set has no contoured region".to_string())?;
            let reference = region
                .first_image_ref()
                .filter(|reference| reference.is_well_formed())
                .ok_or_else(|| {
                    format!(
                        "region {} has contours but no usable image reference",
                        region.roi_number
                    )
                })?;
            Ok(vec![reference])
        }
        ContourSelection::EveryRegion => {
            let mut seen = HashSet::new();
            let references: Vec<_> = regions
                .iter()
                .filter(|region| region.has_geometry())
                .filter_map(RoiContour::first_image_ref)
                .filter(|reference| reference.is_well_formed())
                .filter(|reference| seen.insert(reference.instance_uid.clone()))
                .collect();
            if references.is_empty() {
                return Err(
                    "structure set has no contoured region with an image reference".into(),
                );
            }
            Ok(references)
        }
    }
}
