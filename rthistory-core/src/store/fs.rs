//! Filesystem record store.
//!
//! Records live at `<root>/<patient>/<study>/<MODALITY>/<series>/<instance>.json`.
//! The store answers existence checks for the scheduler and persists what the
//! receiving endpoint accepts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rthistory_model::{ClinicalRecord, Modality, PatientId, Uid};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;
use crate::retrieval::ports::{ExistenceCache, RecordSink};
use crate::retrieval::task::RecordKey;

const RECORD_EXTENSION: &str = "json";

#[derive(Clone, Debug)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn modality_dir(
        &self,
        patient: &PatientId,
        study: &Uid,
        modality: Modality,
    ) -> PathBuf {
        self.root
            .join(sanitize_component(patient.as_str()))
            .join(sanitize_component(study.as_str()))
            .join(modality.as_str())
    }

    pub fn record_path(&self, record: &ClinicalRecord) -> PathBuf {
        self.modality_dir(&record.patient_id, &record.study_uid, record.modality)
            .join(sanitize_component(record.series_uid.as_str()))
            .join(record_file_name(&record.instance_uid))
    }

    pub async fn load(path: &Path) -> Result<ClinicalRecord> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every record file below `dir`, depth first.
    pub async fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if is_record_file(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn series_has_records(&self, dir: &Path) -> Result<bool> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if is_record_file(&entry.path()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn contains_instance(&self, dir: &Path, instance: &Uid) -> Result<bool> {
        let wanted = record_file_name(instance);
        let files = Self::record_files(dir).await?;
        Ok(files
            .iter()
            .any(|path| path.file_name().is_some_and(|name| name == wanted.as_str())))
    }
}

#[async_trait]
impl ExistenceCache for FsRecordStore {
    async fn exists(&self, key: &RecordKey) -> Result<bool> {
        let modality_dir =
            self.modality_dir(&key.patient, &key.study, key.kind.modality());

        let present = match (&key.series, &key.instance) {
            (_, Some(instance)) => self.contains_instance(&modality_dir, instance).await?,
            (Some(series), None) => {
                let series_dir = modality_dir.join(sanitize_component(series.as_str()));
                self.series_has_records(&series_dir).await?
            }
            (None, None) => {
                warn!(key = %key, "existence check without series or instance");
                false
            }
        };
        debug!(key = %key, present, "existence check");
        Ok(present)
    }
}

#[async_trait]
impl RecordSink for FsRecordStore {
    async fn store(&self, record: &ClinicalRecord) -> Result<PathBuf> {
        let path = self.record_path(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(record)?;
        let staging = path.with_extension("json.partial");
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &path).await?;
        Ok(path)
    }
}

fn record_file_name(instance: &Uid) -> String {
    format!("{}.{RECORD_EXTENSION}", sanitize_component(instance.as_str()))
}

fn is_record_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
}

/// Keeps UIDs and MRNs from escaping the store root or producing odd names.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
