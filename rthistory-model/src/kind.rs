use std::fmt;

use crate::modality::{ImageModality, Modality, RecordClass};

/// Clinical category of a retrievable record. Drives task dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RecordKind {
    Plan,
    StructureSet,
    Dose,
    TreatmentRecord,
    Image(ImageModality),
}

impl RecordKind {
    pub fn modality(&self) -> Modality {
        match self {
            RecordKind::Plan => Modality::RtPlan,
            RecordKind::StructureSet => Modality::RtStruct,
            RecordKind::Dose => Modality::RtDose,
            RecordKind::TreatmentRecord => Modality::RtRecord,
            RecordKind::Image(image) => image.modality(),
        }
    }

    /// Storage class the archive files records of this kind under.
    pub fn default_class(&self) -> RecordClass {
        self.modality().record_class()
    }

    /// Treatment records are only ever addressed as a whole series.
    pub fn is_series_level(&self) -> bool {
        matches!(self, RecordKind::TreatmentRecord)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Plan => "plan",
            RecordKind::StructureSet => "structure_set",
            RecordKind::Dose => "dose",
            RecordKind::TreatmentRecord => "treatment_record",
            RecordKind::Image(_) => "image",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Plan => write!(f, "PLAN"),
            RecordKind::StructureSet => write!(f, "STRUCTURE_SET"),
            RecordKind::Dose => write!(f, "DOSE"),
            RecordKind::TreatmentRecord => write!(f, "TREATMENT_RECORD"),
            RecordKind::Image(image) => write!(f, "IMAGE({image})"),
        }
    }
}
