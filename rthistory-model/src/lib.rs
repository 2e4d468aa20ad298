//! Identifiers, record kinds and clinical record models shared by the RT
//! history crates.
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod kind;
pub mod modality;
pub mod record;

pub use error::{ModelError, Result as ModelResult};
pub use ids::{PatientId, Uid};
pub use kind::RecordKind;
pub use modality::{ImageModality, Modality, RecordClass, class_uids};
pub use record::{
    ClinicalRecord, Contour, DoseContent, InstanceReference, PlanContent,
    RecordContent, RecordDescriptor, RoiContour, StructureSetContent,
    TreatmentRecordContent,
};
