#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use rthistory_core::RetrievalError;
use rthistory_core::retrieval::{
    ArchiveTransport, ExistenceCache, InstanceQuery, MoveRequest, MoveStatus,
    ReceiveBuffer, RecordKey, ReferenceQuery,
};
use rthistory_model::{
    ClinicalRecord, Contour, DoseContent, InstanceReference, Modality,
    PatientId, PlanContent, RecordClass, RecordContent, RecordDescriptor,
    RoiContour, StructureSetContent, TreatmentRecordContent, Uid, class_uids,
};

/// Every call the scheduler made against the archive, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveCall {
    FindTreatmentRecords(PatientId),
    FindReferencing(ReferenceQuery),
    FindInstance(InstanceQuery),
    Move(MoveRequest),
}

impl ArchiveCall {
    pub fn patient(&self) -> &PatientId {
        match self {
            ArchiveCall::FindTreatmentRecords(patient) => patient,
            ArchiveCall::FindReferencing(query) => &query.patient,
            ArchiveCall::FindInstance(query) => &query.patient,
            ArchiveCall::Move(request) => &request.patient,
        }
    }

    pub fn as_move(&self) -> Option<&MoveRequest> {
        match self {
            ArchiveCall::Move(request) => Some(request),
            _ => None,
        }
    }
}

/// In-memory archive with scripted answers. Moves push the records scripted
/// for their target UID into the shared receive buffer.
#[derive(Default)]
pub struct ScriptedArchive {
    buffer: ReceiveBuffer,
    records: Vec<ClinicalRecord>,
    failing_targets: HashSet<Uid>,
    silent_targets: HashSet<Uid>,
    unresolvable: HashSet<Uid>,
    seeding_error: Option<String>,
    calls: Mutex<Vec<ArchiveCall>>,
}

impl ScriptedArchive {
    pub fn new(buffer: ReceiveBuffer) -> Self {
        Self {
            buffer,
            ..Self::default()
        }
    }

    pub fn with_records(mut self, records: impl IntoIterator<Item = ClinicalRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Moves targeting `uid` always report failure.
    pub fn failing(mut self, uid: &str) -> Self {
        self.failing_targets.insert(Uid::new(uid));
        self
    }

    /// Moves targeting `uid` complete but push nothing.
    pub fn silent(mut self, uid: &str) -> Self {
        self.silent_targets.insert(Uid::new(uid));
        self
    }

    /// Instance lookups for `uid` never find a series.
    pub fn unresolvable(mut self, uid: &str) -> Self {
        self.unresolvable.insert(Uid::new(uid));
        self
    }

    pub fn failing_seed(mut self, detail: &str) -> Self {
        self.seeding_error = Some(detail.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn moves(&self) -> Vec<MoveRequest> {
        self.calls().iter().filter_map(ArchiveCall::as_move).cloned().collect()
    }

    pub fn moves_for(&self, target: &str) -> usize {
        self.moves()
            .iter()
            .filter(|request| request.target == Uid::new(target))
            .count()
    }

    fn log(&self, call: ArchiveCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn of_patient<'a>(&'a self, patient: &'a PatientId) -> impl Iterator<Item = &'a ClinicalRecord> + 'a {
        self.records.iter().filter(move |record| record.patient_id == *patient)
    }
}

#[async_trait]
impl ArchiveTransport for ScriptedArchive {
    async fn find_treatment_records(
        &self,
        patient: &PatientId,
    ) -> rthistory_core::Result<Vec<RecordDescriptor>> {
        self.log(ArchiveCall::FindTreatmentRecords(patient.clone()));
        if let Some(detail) = &self.seeding_error {
            return Err(RetrievalError::Archive(detail.clone()));
        }
        Ok(self
            .of_patient(patient)
            .filter(|record| record.modality == Modality::RtRecord)
            .map(ClinicalRecord::descriptor)
            .collect())
    }

    async fn find_referencing(
        &self,
        query: &ReferenceQuery,
    ) -> rthistory_core::Result<Vec<RecordDescriptor>> {
        self.log(ArchiveCall::FindReferencing(query.clone()));
        Ok(self
            .of_patient(&query.patient)
            .filter(|record| {
                record.record_class == query.target_class
                    && record
                        .referenced_plan()
                        .is_some_and(|plan| plan.instance_uid == query.anchor_instance)
            })
            .map(ClinicalRecord::descriptor)
            .collect())
    }

    async fn find_instance(
        &self,
        query: &InstanceQuery,
    ) -> rthistory_core::Result<Vec<RecordDescriptor>> {
        self.log(ArchiveCall::FindInstance(query.clone()));
        if self.unresolvable.contains(&query.instance) {
            return Ok(Vec::new());
        }
        Ok(self
            .of_patient(&query.patient)
            .filter(|record| record.instance_uid == query.instance)
            .map(ClinicalRecord::descriptor)
            .collect())
    }

    async fn move_to_endpoint(
        &self,
        request: &MoveRequest,
    ) -> rthistory_core::Result<MoveStatus> {
        self.log(ArchiveCall::Move(request.clone()));
        if self.failing_targets.contains(&request.target) {
            return Ok(MoveStatus::Failed {
                detail: "0xA702 refused: out of resources".into(),
            });
        }
        if self.silent_targets.contains(&request.target) {
            return Ok(MoveStatus::Completed);
        }

        let pushed: Vec<ClinicalRecord> = self
            .of_patient(&request.patient)
            .filter(|record| {
                record.instance_uid == request.target || record.series_uid == request.target
            })
            .cloned()
            .collect();
        for record in pushed {
            self.buffer.push(record).await;
        }
        Ok(MoveStatus::Completed)
    }
}

/// Existence cache over a fixed set of rendered record keys.
#[derive(Default)]
pub struct InMemoryCache {
    present: Mutex<HashSet<String>>,
    lookups: Mutex<Vec<RecordKey>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_present(&self, key: &RecordKey) {
        self.present.lock().unwrap().insert(key.to_string());
    }

    pub fn lookups(&self) -> Vec<RecordKey> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExistenceCache for InMemoryCache {
    async fn exists(&self, key: &RecordKey) -> rthistory_core::Result<bool> {
        self.lookups.lock().unwrap().push(key.clone());
        Ok(self.present.lock().unwrap().contains(&key.to_string()))
    }
}

pub fn plan(patient: &str, instance: &str, structure_set: Option<&str>) -> ClinicalRecord {
    ClinicalRecord {
        patient_id: PatientId::new(patient),
        study_uid: Uid::new("1.1"),
        series_uid: Uid::new("1.1.5"),
        instance_uid: Uid::new(instance),
        record_class: RecordClass::new(class_uids::RT_PLAN),
        modality: Modality::RtPlan,
        content: RecordContent::Plan(PlanContent {
            label: Some("PELVIS".into()),
            referenced_structure_set: structure_set
                .map(|uid| InstanceReference::new(class_uids::RT_STRUCTURE_SET, uid)),
        }),
    }
}

/// Structure set whose first region is empty and whose second region is
/// contoured on `image` of class `image_class`.
pub fn structure_set(
    patient: &str,
    instance: &str,
    image: Option<(&str, &str)>,
) -> ClinicalRecord {
    let mut roi_contours = vec![RoiContour {
        roi_number: 1,
        contours: Vec::new(),
    }];
    if let Some((image_class, image)) = image {
        roi_contours.push(RoiContour {
            roi_number: 2,
            contours: vec![Contour {
                image_refs: vec![InstanceReference::new(image_class, image)],
            }],
        });
    }
    structure_set_with_regions(patient, instance, roi_contours)
}

pub fn structure_set_with_regions(
    patient: &str,
    instance: &str,
    roi_contours: Vec<RoiContour>,
) -> ClinicalRecord {
    ClinicalRecord {
        patient_id: PatientId::new(patient),
        study_uid: Uid::new("1.1"),
        series_uid: Uid::new("1.1.4"),
        instance_uid: Uid::new(instance),
        record_class: RecordClass::new(class_uids::RT_STRUCTURE_SET),
        modality: Modality::RtStruct,
        content: RecordContent::StructureSet(StructureSetContent { roi_contours }),
    }
}

pub fn dose(patient: &str, instance: &str, plan: &str) -> ClinicalRecord {
    ClinicalRecord {
        patient_id: PatientId::new(patient),
        study_uid: Uid::new("1.1"),
        series_uid: Uid::new("1.1.3"),
        instance_uid: Uid::new(instance),
        record_class: RecordClass::new(class_uids::RT_DOSE),
        modality: Modality::RtDose,
        content: RecordContent::Dose(DoseContent {
            referenced_plan: Some(InstanceReference::new(class_uids::RT_PLAN, plan)),
            summation_type: Some("PLAN".into()),
        }),
    }
}

pub fn treatment_record(
    patient: &str,
    series: &str,
    instance: &str,
    plan: &str,
    date: &str,
    fraction: u32,
) -> ClinicalRecord {
    ClinicalRecord {
        patient_id: PatientId::new(patient),
        study_uid: Uid::new("1.1"),
        series_uid: Uid::new(series),
        instance_uid: Uid::new(instance),
        record_class: RecordClass::new(class_uids::RT_BEAMS_TREATMENT_RECORD),
        modality: Modality::RtRecord,
        content: RecordContent::TreatmentRecord(TreatmentRecordContent {
            referenced_plan: Some(InstanceReference::new(class_uids::RT_PLAN, plan)),
            treatment_date: Some(date.into()),
            treatment_time: Some("083000".into()),
            fraction_number: Some(fraction),
        }),
    }
}

pub fn ct_slice(patient: &str, series: &str, instance: &str) -> ClinicalRecord {
    ClinicalRecord {
        patient_id: PatientId::new(patient),
        study_uid: Uid::new("1.1"),
        series_uid: Uid::new(series),
        instance_uid: Uid::new(instance),
        record_class: RecordClass::new(class_uids::CT_IMAGE),
        modality: Modality::Ct,
        content: RecordContent::Image,
    }
}

/// One plan with a structure set contoured on a two-slice CT series, two
/// doses, and two fractions of treatment records in one series.
pub fn treated_patient(patient: &str) -> Vec<ClinicalRecord> {
    vec![
        plan(patient, "P1", Some("S1")),
        structure_set(patient, "S1", Some((class_uids::CT_IMAGE, "I1"))),
        ct_slice(patient, "CS1", "I1"),
        ct_slice(patient, "CS1", "I2"),
        dose(patient, "D1", "P1"),
        dose(patient, "D2", "P1"),
        treatment_record(patient, "T1", "R1", "P1", "20240102", 1),
        treatment_record(patient, "T1", "R2", "P1", "20240103", 2),
    ]
}

/// The same graph delivered in a single fraction, so one plan task is seeded.
pub fn single_fraction_patient(patient: &str) -> Vec<ClinicalRecord> {
    treated_patient(patient)
        .into_iter()
        .filter(|record| record.instance_uid != Uid::new("R2"))
        .collect()
}
