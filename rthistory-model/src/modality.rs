use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};

/// Well-known storage class UIDs addressed by the retrieval pipeline.
pub mod class_uids {
    pub const CT_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
    pub const MR_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
    pub const PET_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.128";
    pub const RT_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.481.1";
    pub const CR_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.1";
    pub const RT_BEAMS_TREATMENT_RECORD: &str = "1.2.840.10008.5.1.4.1.1.481.4";
    pub const RT_PLAN: &str = "1.2.840.10008.5.1.4.1.1.481.5";
    pub const RT_DOSE: &str = "1.2.840.10008.5.1.4.1.1.481.2";
    pub const RT_STRUCTURE_SET: &str = "1.2.840.10008.5.1.4.1.1.481.3";
    pub const SPATIAL_REGISTRATION: &str = "1.2.840.10008.5.1.4.1.1.66.1";
}

/// Record-class to modality table. Lookups in both directions go through
/// this single table.
const CLASS_TABLE: &[(&str, Modality)] = &[
    (class_uids::CT_IMAGE, Modality::Ct),
    (class_uids::MR_IMAGE, Modality::Mr),
    (class_uids::PET_IMAGE, Modality::Pt),
    (class_uids::RT_IMAGE, Modality::RtImage),
    (class_uids::CR_IMAGE, Modality::Cr),
    (class_uids::RT_BEAMS_TREATMENT_RECORD, Modality::RtRecord),
    (class_uids::RT_PLAN, Modality::RtPlan),
    (class_uids::RT_DOSE, Modality::RtDose),
    (class_uids::RT_STRUCTURE_SET, Modality::RtStruct),
    (class_uids::SPATIAL_REGISTRATION, Modality::Reg),
];

/// Modality codes as they appear on stored records and in the local store
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Modality {
    Ct,
    Mr,
    Pt,
    RtImage,
    Cr,
    RtRecord,
    RtPlan,
    RtDose,
    RtStruct,
    Reg,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mr => "MR",
            Modality::Pt => "PT",
            Modality::RtImage => "RTIMAGE",
            Modality::Cr => "CR",
            Modality::RtRecord => "RTRECORD",
            Modality::RtPlan => "RTPLAN",
            Modality::RtDose => "RTDOSE",
            Modality::RtStruct => "RTSTRUCT",
            Modality::Reg => "REG",
        }
    }

    /// Storage class UID for this modality.
    pub fn record_class(&self) -> RecordClass {
        CLASS_TABLE
            .iter()
            .find(|(_, modality)| modality == self)
            .map(|(uid, _)| RecordClass::new(*uid))
            .unwrap_or_default()
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CT" => Ok(Modality::Ct),
            "MR" => Ok(Modality::Mr),
            "PT" => Ok(Modality::Pt),
            "RTIMAGE" => Ok(Modality::RtImage),
            "CR" => Ok(Modality::Cr),
            "RTRECORD" => Ok(Modality::RtRecord),
            "RTPLAN" => Ok(Modality::RtPlan),
            "RTDOSE" => Ok(Modality::RtDose),
            "RTSTRUCT" => Ok(Modality::RtStruct),
            "REG" => Ok(Modality::Reg),
            _ => Err(ModelError::UnknownModality(raw.to_string())),
        }
    }
}

/// Volumetric image modalities a structure set can be contoured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum ImageModality {
    Ct,
    Mr,
    Pt,
}

impl ImageModality {
    pub fn modality(&self) -> Modality {
        match self {
            ImageModality::Ct => Modality::Ct,
            ImageModality::Mr => Modality::Mr,
            ImageModality::Pt => Modality::Pt,
        }
    }
}

impl TryFrom<Modality> for ImageModality {
    type Error = ModelError;

    fn try_from(value: Modality) -> Result<Self> {
        match value {
            Modality::Ct => Ok(ImageModality::Ct),
            Modality::Mr => Ok(ImageModality::Mr),
            Modality::Pt => Ok(ImageModality::Pt),
            other => Err(ModelError::NotAnImageModality(
                other.as_str().to_string(),
            )),
        }
    }
}

impl fmt::Display for ImageModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.modality().as_str())
    }
}

/// Stable record type code used for transport-level addressing (SOP class
/// UID), never a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RecordClass(pub String);

impl RecordClass {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the modality implied by this class via the static table.
    pub fn modality(&self) -> Result<Modality> {
        CLASS_TABLE
            .iter()
            .find(|(uid, _)| *uid == self.0)
            .map(|(_, modality)| *modality)
            .ok_or_else(|| ModelError::UnknownRecordClass(self.0.clone()))
    }

    /// Image modality for classes that denote contourable images.
    pub fn image_modality(&self) -> Result<ImageModality> {
        ImageModality::try_from(self.modality()?)
    }
}

impl From<&str> for RecordClass {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
