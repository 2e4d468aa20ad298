use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownModality(String),
    UnknownRecordClass(String),
    NotAnImageModality(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownModality(raw) => {
                write!(f, "unknown modality: {raw}")
            }
            ModelError::UnknownRecordClass(raw) => {
                write!(f, "unknown record class: {raw}")
            }
            ModelError::NotAnImageModality(raw) => {
                write!(f, "not an image modality: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
