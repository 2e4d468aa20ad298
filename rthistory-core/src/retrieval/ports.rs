//! Collaborator contracts consumed by the scheduler.
//!
//! The scheduler never talks to the archive, the local store or the inbound
//! listener directly. Everything goes through these traits so the wire
//! protocol and storage layout stay swappable.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use rthistory_model::{
    ClinicalRecord, PatientId, RecordClass, RecordDescriptor, Uid,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::task::RecordKey;

/// Whether an archive operation addresses one record or a whole series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveGranularity {
    Instance,
    Series,
}

impl fmt::Display for MoveGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveGranularity::Instance => f.write_str("instance"),
            MoveGranularity::Series => f.write_str("series"),
        }
    }
}

/// Completion reported by the archive for a move request.
///
/// `Completed` is the only success. Failure detail is logged but never
/// branched on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveStatus {
    Completed,
    Failed { detail: String },
}

/// Lookup for records of `target_class` that point back at `anchor_instance`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceQuery {
    pub patient: PatientId,
    pub study: Uid,
    pub anchor_instance: Uid,
    pub target_class: RecordClass,
}

/// Lookup of a single instance, used to discover its series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceQuery {
    pub patient: PatientId,
    pub study: Uid,
    pub instance: Uid,
    pub record_class: RecordClass,
}

/// Request for the archive to push records into the receiving endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveRequest {
    pub patient: PatientId,
    pub study: Uid,
    pub record_class: RecordClass,
    /// Instance UID or series UID depending on `granularity`.
    pub target: Uid,
    pub granularity: MoveGranularity,
}

/// Local existence check. Queried, never mutated, by the scheduler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExistenceCache: Send + Sync {
    async fn exists(&self, key: &RecordKey) -> Result<bool>;
}

/// Remote find and move primitives of the clinical archive.
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// Every treatment record delivered to the patient, one per fraction.
    async fn find_treatment_records(
        &self,
        patient: &PatientId,
    ) -> Result<Vec<RecordDescriptor>>;

    async fn find_referencing(
        &self,
        query: &ReferenceQuery,
    ) -> Result<Vec<RecordDescriptor>>;

    async fn find_instance(
        &self,
        query: &InstanceQuery,
    ) -> Result<Vec<RecordDescriptor>>;

    /// Blocks until the archive reports completion. Every record pushed as
    /// part of the move must be visible through the endpoint once this
    /// returns.
    async fn move_to_endpoint(&self, request: &MoveRequest)
    -> Result<MoveStatus>;
}

/// Read/clear view over the records the inbound listener accepted.
#[async_trait]
pub trait ReceiveEndpoint: Send + Sync {
    async fn received(&self) -> Vec<ClinicalRecord>;

    async fn clear(&self);
}

/// Persistence target for accepted records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn store(&self, record: &ClinicalRecord) -> Result<PathBuf>;
}
