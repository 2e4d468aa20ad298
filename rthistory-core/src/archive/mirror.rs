//! Archive transport backed by a directory of exported clinical records.
//!
//! The mirror holds records in the same JSON form the local store writes.
//! Finds are answered from memory; moves push the matching records through
//! the receiving endpoint and return once every one has been acknowledged.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rthistory_model::{
    ClinicalRecord, PatientId, RecordClass, RecordDescriptor, Uid, class_uids,
};
use tracing::{debug, info, warn};

use crate::error::{Result, RetrievalError};
use crate::retrieval::ports::{
    ArchiveTransport, InstanceQuery, MoveGranularity, MoveRequest, MoveStatus,
    ReferenceQuery,
};
use crate::retrieval::receive::{DeliveryAck, DeliveryHandle};
use crate::store::FsRecordStore;

pub struct MirrorArchive {
    root: Option<PathBuf>,
    records: Vec<ClinicalRecord>,
    delivery: DeliveryHandle,
}

impl fmt::Debug for MirrorArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorArchive")
            .field("root", &self.root)
            .field("records", &self.records.len())
            .finish()
    }
}

impl MirrorArchive {
    /// Loads every record file below `root`. Files that do not parse are
    /// skipped with a warning.
    pub async fn open(root: impl AsRef<Path>, delivery: DeliveryHandle) -> Result<Self> {
        let root = root.as_ref();
        if !tokio::fs::try_exists(root).await? {
            return Err(RetrievalError::Archive(format!(
                "archive mirror {} does not exist",
                root.display()
            )));
        }

        let mut records = Vec::new();
        for path in FsRecordStore::record_files(root).await? {
            match FsRecordStore::load(&path).await {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    target: "retrieval::archive",
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable mirror record"
                ),
            }
        }
        info!(
            target: "retrieval::archive",
            root = %root.display(),
            records = records.len(),
            "loaded archive mirror"
        );

        Ok(Self {
            root: Some(root.to_path_buf()),
            records,
            delivery,
        })
    }

    pub fn from_records(records: Vec<ClinicalRecord>, delivery: DeliveryHandle) -> Self {
        Self {
            root: None,
            records,
            delivery,
        }
    }

    fn matching<'a>(
        &'a self,
        patient: &'a PatientId,
        study: &'a Uid,
        predicate: impl Fn(&ClinicalRecord) -> bool + 'a,
    ) -> impl Iterator<Item = &'a ClinicalRecord> + 'a {
        self.records.iter().filter(move |record| {
            record.patient_id == *patient
                && (study.is_empty() || record.study_uid == *study)
                && predicate(record)
        })
    }
}

#[async_trait]
impl ArchiveTransport for MirrorArchive {
    async fn find_treatment_records(
        &self,
        patient: &PatientId,
    ) -> Result<Vec<RecordDescriptor>> {
        let any_study = Uid::empty();
        let class = RecordClass::new(class_uids::RT_BEAMS_TREATMENT_RECORD);
        let found: Vec<_> = self
            .matching(patient, &any_study, |record| record.record_class == class)
            .map(ClinicalRecord::descriptor)
            .collect();
        debug!(target: "retrieval::archive", patient = %patient, found = found.len(), "find treatment records");
        Ok(found)
    }

    async fn find_referencing(
        &self,
        query: &ReferenceQuery,
    ) -> Result<Vec<RecordDescriptor>> {
        let found: Vec<_> = self
            .matching(&query.patient, &query.study, |record| {
                record.record_class == query.target_class
                    && record
                        .referenced_plan()
                        .is_some_and(|plan| plan.instance_uid == query.anchor_instance)
            })
            .map(ClinicalRecord::descriptor)
            .collect();
        debug!(
            target: "retrieval::archive",
            anchor = %query.anchor_instance,
            class = %query.target_class,
            found = found.len(),
            "find referencing records"
        );
        Ok(found)
    }

    async fn find_instance(
        &self,
        query: &InstanceQuery,
    ) -> Result<Vec<RecordDescriptor>> {
        let found: Vec<_> = self
            .matching(&query.patient, &query.study, |record| {
                record.instance_uid == query.instance
                    && (query.record_class.as_str().is_empty()
                        || record.record_class == query.record_class)
            })
            .map(ClinicalRecord::descriptor)
            .collect();
        debug!(target: "retrieval::archive", instance = %query.instance, found = found.len(), "find instance");
        Ok(found)
    }

    async fn move_to_endpoint(&self, request: &MoveRequest) -> Result<MoveStatus> {
        let selected: Vec<ClinicalRecord> = self
            .matching(&request.patient, &request.study, |record| {
                record.record_class == request.record_class
                    && match request.granularity {
                        MoveGranularity::Instance => record.instance_uid == request.target,
                        MoveGranularity::Series => record.series_uid == request.target,
                    }
            })
            .cloned()
            .collect();

        let mut rejected = Vec::new();
        for record in &selected {
            match self.delivery.deliver(record.clone()).await? {
                DeliveryAck::Stored(_) => {}
                DeliveryAck::Rejected(detail) => {
                    rejected.push(format!("{}: {detail}", record.instance_uid));
                }
            }
        }

        info!(
            target: "retrieval::archive",
            granularity = %request.granularity,
            target_uid = %request.target,
            pushed = selected.len(),
            rejected = rejected.len(),
            "move finished"
        );

        if rejected.is_empty() {
            Ok(MoveStatus::Completed)
        } else {
            Ok(MoveStatus::Failed {
                detail: rejected.join("; "),
            })
        }
    }
}
