use crate::ids::{PatientId, Uid};
use crate::modality::{Modality, RecordClass};

/// Reference from one record to another record instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstanceReference {
    pub record_class: RecordClass,
    pub instance_uid: Uid,
}

impl InstanceReference {
    pub fn new(record_class: impl Into<RecordClass>, instance_uid: impl Into<Uid>) -> Self {
        Self {
            record_class: record_class.into(),
            instance_uid: instance_uid.into(),
        }
    }

    /// A reference is usable only when both halves are populated.
    pub fn is_well_formed(&self) -> bool {
        !self.record_class.as_str().is_empty() && !self.instance_uid.is_empty()
    }
}

/// Result row returned by archive lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordDescriptor {
    pub patient_id: PatientId,
    pub study_uid: Uid,
    pub series_uid: Uid,
    pub instance_uid: Uid,
    pub record_class: RecordClass,
    /// Plan instance a dose or treatment record points back to.
    #[cfg_attr(feature = "serde", serde(default))]
    pub referenced_instance: Option<InstanceReference>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub treatment_date: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub treatment_time: Option<String>,
}

/// One contour of a region of interest and the image slices it was drawn on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    #[cfg_attr(feature = "serde", serde(default))]
    pub image_refs: Vec<InstanceReference>,
}

/// Contour data for a single region of interest in a structure set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoiContour {
    pub roi_number: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub contours: Vec<Contour>,
}

impl RoiContour {
    pub fn has_geometry(&self) -> bool {
        !self.contours.is_empty()
    }

    /// Image referenced by the first contour of this region.
    pub fn first_image_ref(&self) -> Option<&InstanceReference> {
        self.contours.first()?.image_refs.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanContent {
    #[cfg_attr(feature = "serde", serde(default))]
    pub label: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub referenced_structure_set: Option<InstanceReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructureSetContent {
    #[cfg_attr(feature = "serde", serde(default))]
    pub roi_contours: Vec<RoiContour>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DoseContent {
    #[cfg_attr(feature = "serde", serde(default))]
    pub referenced_plan: Option<InstanceReference>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub summation_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreatmentRecordContent {
    #[cfg_attr(feature = "serde", serde(default))]
    pub referenced_plan: Option<InstanceReference>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub treatment_date: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub treatment_time: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fraction_number: Option<u32>,
}

/// Kind-specific payload of a received record. Only the attributes the
/// retrieval graph walks are modelled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "payload"))]
pub enum RecordContent {
    Plan(PlanContent),
    StructureSet(StructureSetContent),
    Dose(DoseContent),
    TreatmentRecord(TreatmentRecordContent),
    Image,
}

/// A record pushed by the archive into the receiving endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClinicalRecord {
    pub patient_id: PatientId,
    pub study_uid: Uid,
    pub series_uid: Uid,
    pub instance_uid: Uid,
    pub record_class: RecordClass,
    pub modality: Modality,
    pub content: RecordContent,
}

impl ClinicalRecord {
    /// Plan instance this record points back to, for doses and treatment
    /// records.
    pub fn referenced_plan(&self) -> Option<&InstanceReference> {
        match &self.content {
            RecordContent::Dose(dose) => dose.referenced_plan.as_ref(),
            RecordContent::TreatmentRecord(record) => {
                record.referenced_plan.as_ref()
            }
            _ => None,
        }
    }

    pub fn descriptor(&self) -> RecordDescriptor {
        let (treatment_date, treatment_time) = match &self.content {
            RecordContent::TreatmentRecord(record) => {
                (record.treatment_date.clone(), record.treatment_time.clone())
            }
            _ => (None, None),
        };

        RecordDescriptor {
            patient_id: self.patient_id.clone(),
            study_uid: self.study_uid.clone(),
            series_uid: self.series_uid.clone(),
            instance_uid: self.instance_uid.clone(),
            record_class: self.record_class.clone(),
            referenced_instance: self.referenced_plan().cloned(),
            treatment_date,
            treatment_time,
        }
    }
}
