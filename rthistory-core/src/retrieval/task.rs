use std::fmt;

use rthistory_model::{
    PatientId, RecordClass, RecordDescriptor, RecordKind, Uid,
};
use serde::{Deserialize, Serialize};

use super::ports::{MoveGranularity, MoveRequest};

/// Unit of work drained by the scheduler.
///
/// Items are immutable: a retry or a series refinement produces a new item
/// and the original is dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    kind: RecordKind,
    patient: PatientId,
    study: Uid,
    series: Uid,
    instance: Uid,
    record_class: RecordClass,
    attempt: u16,
}

impl TaskItem {
    pub fn new(
        kind: RecordKind,
        patient: PatientId,
        study: Uid,
        series: Uid,
        instance: Uid,
        record_class: RecordClass,
    ) -> Self {
        Self {
            kind,
            patient,
            study,
            series,
            instance,
            record_class,
            attempt: 0,
        }
    }

    /// Instance-addressed task built from an archive lookup result.
    pub fn from_descriptor(
        kind: RecordKind,
        patient: &PatientId,
        descriptor: &RecordDescriptor,
    ) -> Self {
        Self::new(
            kind,
            patient.clone(),
            descriptor.study_uid.clone(),
            descriptor.series_uid.clone(),
            descriptor.instance_uid.clone(),
            descriptor.record_class.clone(),
        )
    }

    /// Series-addressed task; the instance stays unknown.
    pub fn for_series(
        kind: RecordKind,
        patient: &PatientId,
        descriptor: &RecordDescriptor,
    ) -> Self {
        Self::new(
            kind,
            patient.clone(),
            descriptor.study_uid.clone(),
            descriptor.series_uid.clone(),
            Uid::empty(),
            descriptor.record_class.clone(),
        )
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn patient(&self) -> &PatientId {
        &self.patient
    }

    pub fn study(&self) -> &Uid {
        &self.study
    }

    pub fn series(&self) -> &Uid {
        &self.series
    }

    pub fn instance(&self) -> &Uid {
        &self.instance
    }

    pub fn record_class(&self) -> &RecordClass {
        &self.record_class
    }

    pub fn attempt(&self) -> u16 {
        self.attempt
    }

    /// Same task, next attempt.
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    /// Same task addressed at a freshly resolved series. Refinement is not a
    /// failure, so the attempt counter starts over.
    pub fn with_series(&self, series: Uid) -> Self {
        Self {
            series,
            attempt: 0,
            ..self.clone()
        }
    }

    /// Treatment records are always moved as a series. Images are moved as a
    /// series once the series is known. Everything else is a single instance.
    pub fn granularity(&self) -> MoveGranularity {
        match self.kind {
            kind if kind.is_series_level() => MoveGranularity::Series,
            RecordKind::Image(_) if !self.series.is_empty() => {
                MoveGranularity::Series
            }
            _ => MoveGranularity::Instance,
        }
    }

    pub fn record_key(&self) -> RecordKey {
        match self.granularity() {
            MoveGranularity::Series => RecordKey {
                patient: self.patient.clone(),
                study: self.study.clone(),
                kind: self.kind,
                series: self.series.known().cloned(),
                instance: None,
            },
            MoveGranularity::Instance => RecordKey {
                patient: self.patient.clone(),
                study: self.study.clone(),
                kind: self.kind,
                series: self.series.known().cloned(),
                instance: self.instance.known().cloned(),
            },
        }
    }

    pub fn move_request(&self) -> MoveRequest {
        let granularity = self.granularity();
        let target = match granularity {
            MoveGranularity::Series => self.series.clone(),
            MoveGranularity::Instance => self.instance.clone(),
        };
        MoveRequest {
            patient: self.patient.clone(),
            study: self.study.clone(),
            record_class: self.record_class.clone(),
            target,
            granularity,
        }
    }
}

impl fmt::Display for TaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (attempt {})", self.record_key(), self.attempt)
    }
}

/// Identity of a record in the local store, derived from a task.
///
/// This is the only de-duplication mechanism: a task whose key the cache
/// reports as present is never fetched again.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub patient: PatientId,
    pub study: Uid,
    pub kind: RecordKind,
    pub series: Option<Uid>,
    pub instance: Option<Uid>,
}

impl RecordKey {
    pub fn granularity(&self) -> MoveGranularity {
        if self.instance.is_some() {
            MoveGranularity::Instance
        } else {
            MoveGranularity::Series
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let series = self.series.as_ref().map_or("*", Uid::as_str);
        let instance = self.instance.as_ref().map_or("*", Uid::as_str);
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.kind.label(),
            self.patient,
            self.study,
            series,
            instance
        )
    }
}
