//! ---
//! qis_section: "02-inspection-workflow"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Inspection-chain validation and workflow engine."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use f_qis_persistence::{JournalEntry, JournalWriter, MutationKind, PersistenceError};

use crate::records::{
    FinalInspection, FitUpInspection, MaterialInspection, NdtRequest, Stage,
};

/// Errors returned by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record lookup failure.
    #[error("record not found")]
    NotFound,
    /// The store's own uniqueness constraint fired. Final arbiter for
    /// racing writers.
    #[error("duplicate report number {report_no:?} for {stage}")]
    UniqueViolation {
        /// Stage the collision occurred in.
        stage: Stage,
        /// The colliding report number.
        report_no: String,
    },
    /// Journal write failure. The mutation was not committed.
    #[error("journal failure: {0}")]
    Journal(#[from] PersistenceError),
}

/// Durable storage seam for inspection records.
///
/// `put_*` upserts and enforces report-number uniqueness within
/// (project, stage) under the store's own lock; `delete_*` returns the
/// removed record. Implementations commit each mutation atomically.
pub trait RecordStore: Send + Sync {
    /// Insert or replace a material inspection.
    fn put_material(&self, record: MaterialInspection) -> Result<(), StoreError>;
    /// Fetch a material inspection by id.
    fn material(&self, id: Uuid) -> Option<MaterialInspection>;
    /// Enumerate a project's material inspections.
    fn materials_in_project(&self, project_id: Uuid) -> Vec<MaterialInspection>;
    /// Remove a material inspection.
    fn delete_material(&self, id: Uuid) -> Result<MaterialInspection, StoreError>;

    /// Insert or replace a fit-up inspection.
    fn put_fitup(&self, record: FitUpInspection) -> Result<(), StoreError>;
    /// Fetch a fit-up inspection by id.
    fn fitup(&self, id: Uuid) -> Option<FitUpInspection>;
    /// Enumerate a project's fit-up inspections.
    fn fitups_in_project(&self, project_id: Uuid) -> Vec<FitUpInspection>;
    /// Remove a fit-up inspection.
    fn delete_fitup(&self, id: Uuid) -> Result<FitUpInspection, StoreError>;

    /// Insert or replace a final inspection.
    fn put_final(&self, record: FinalInspection) -> Result<(), StoreError>;
    /// Fetch a final inspection by id.
    fn final_inspection(&self, id: Uuid) -> Option<FinalInspection>;
    /// Enumerate a project's final inspections.
    fn finals_in_project(&self, project_id: Uuid) -> Vec<FinalInspection>;
    /// Remove a final inspection.
    fn delete_final(&self, id: Uuid) -> Result<FinalInspection, StoreError>;

    /// Insert or replace an NDT request.
    fn put_ndt(&self, record: NdtRequest) -> Result<(), StoreError>;
    /// Fetch an NDT request by id.
    fn ndt(&self, id: Uuid) -> Option<NdtRequest>;
    /// Enumerate a project's NDT requests.
    fn ndts_in_project(&self, project_id: Uuid) -> Vec<NdtRequest>;
    /// Remove an NDT request.
    fn delete_ndt(&self, id: Uuid) -> Result<NdtRequest, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    materials: HashMap<Uuid, MaterialInspection>,
    fitups: HashMap<Uuid, FitUpInspection>,
    finals: HashMap<Uuid, FinalInspection>,
    ndts: HashMap<Uuid, NdtRequest>,
    journal: Option<JournalWriter>,
}

impl StoreInner {
    /// Journal first, mutate second: a failed append leaves the maps
    /// untouched, so no mutation commits without its journal line.
    fn record_mutation<T: serde::Serialize>(
        &mut self,
        stage: Stage,
        kind: MutationKind,
        record: &T,
    ) -> Result<(), StoreError> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(JournalEntry::new(
                stage.to_string(),
                kind,
                serde_json::to_value(record).map_err(PersistenceError::from)?,
            ))?;
        }
        Ok(())
    }
}

/// In-memory record store with an optional on-disk mutation journal.
#[derive(Clone)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    /// Create an unjournaled store (tests, ephemeral deployments).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    /// Create a store journaling every mutation to `path`.
    pub fn with_journal(path: &Path) -> Result<Self, StoreError> {
        let journal = JournalWriter::open(path)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(StoreInner {
                journal: Some(journal),
                ..StoreInner::default()
            })),
        })
    }
}

/// Uniqueness probe shared by the four stages.
fn report_taken<'a, R>(
    mut records: impl Iterator<Item = &'a R>,
    project_id: Uuid,
    report_no: &str,
    own_id: Uuid,
    key: impl Fn(&R) -> (Uuid, &str, Uuid),
) -> bool
where
    R: 'a,
{
    records.any(|record| {
        let (project, report, id) = key(record);
        project == project_id && report == report_no && id != own_id
    })
}

macro_rules! stage_store_impl {
    ($put:ident, $get:ident, $list:ident, $delete:ident, $map:ident, $ty:ty, $stage:expr) => {
        fn $put(&self, record: $ty) -> Result<(), StoreError> {
            let mut inner = self.inner.write();
            if report_taken(
                inner.$map.values(),
                record.project_id,
                &record.report_no,
                record.id,
                |r| (r.project_id, r.report_no.as_str(), r.id),
            ) {
                return Err(StoreError::UniqueViolation {
                    stage: $stage,
                    report_no: record.report_no.clone(),
                });
            }
            let kind = if inner.$map.contains_key(&record.id) {
                MutationKind::Updated
            } else {
                MutationKind::Created
            };
            inner.record_mutation($stage, kind, &record)?;
            debug!(stage = %$stage, id = %record.id, ?kind, "record committed");
            inner.$map.insert(record.id, record);
            Ok(())
        }

        fn $get(&self, id: Uuid) -> Option<$ty> {
            self.inner.read().$map.get(&id).cloned()
        }

        fn $list(&self, project_id: Uuid) -> Vec<$ty> {
            let mut records: Vec<$ty> = self
                .inner
                .read()
                .$map
                .values()
                .filter(|record| record.project_id == project_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| a.report_no.cmp(&b.report_no));
            records
        }

        fn $delete(&self, id: Uuid) -> Result<$ty, StoreError> {
            let mut inner = self.inner.write();
            let record = inner.$map.get(&id).cloned().ok_or(StoreError::NotFound)?;
            inner.record_mutation($stage, MutationKind::Deleted, &record)?;
            inner.$map.remove(&id);
            debug!(stage = %$stage, id = %id, "record deleted");
            Ok(record)
        }
    };
}

impl RecordStore for MemoryRecordStore {
    stage_store_impl!(
        put_material,
        material,
        materials_in_project,
        delete_material,
        materials,
        MaterialInspection,
        Stage::Material
    );
    stage_store_impl!(
        put_fitup,
        fitup,
        fitups_in_project,
        delete_fitup,
        fitups,
        FitUpInspection,
        Stage::FitUp
    );
    stage_store_impl!(
        put_final,
        final_inspection,
        finals_in_project,
        delete_final,
        finals,
        FinalInspection,
        Stage::Final
    );
    stage_store_impl!(
        put_ndt,
        ndt,
        ndts_in_project,
        delete_ndt,
        ndts,
        NdtRequest,
        Stage::Ndt
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MaterialResult;
    use chrono::Utc;
    use f_qis_persistence::replay;
    use tempfile::tempdir;

    fn material(project_id: Uuid, report_no: &str) -> MaterialInspection {
        let now = Utc::now();
        MaterialInspection {
            id: Uuid::new_v4(),
            project_id,
            material_type: "plate".into(),
            material_grade: "S355J2".into(),
            thickness_mm: 12.0,
            heat_no: "H-7731".into(),
            report_no: report_no.into(),
            result: MaterialResult::Pass,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn uniqueness_is_enforced_per_project_and_stage() {
        let store = MemoryRecordStore::new();
        let project = Uuid::new_v4();
        store.put_material(material(project, "MVR-100")).unwrap();

        let err = store.put_material(material(project, "MVR-100")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { stage: Stage::Material, .. }));

        // Same report number in a different project is fine.
        store
            .put_material(material(Uuid::new_v4(), "MVR-100"))
            .unwrap();
    }

    #[test]
    fn put_replaces_in_place_without_self_conflict() {
        let store = MemoryRecordStore::new();
        let project = Uuid::new_v4();
        let mut record = material(project, "MVR-100");
        store.put_material(record.clone()).unwrap();

        record.result = MaterialResult::Conditional;
        store.put_material(record.clone()).unwrap();
        assert_eq!(
            store.material(record.id).unwrap().result,
            MaterialResult::Conditional
        );
        assert_eq!(store.materials_in_project(project).len(), 1);
    }

    #[test]
    fn delete_missing_record_is_not_found() {
        let store = MemoryRecordStore::new();
        assert!(matches!(
            store.delete_material(Uuid::new_v4()).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn mutations_are_journaled_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.jsonl");
        let project = Uuid::new_v4();
        {
            let store = MemoryRecordStore::with_journal(&path).unwrap();
            let record = material(project, "MVR-100");
            store.put_material(record.clone()).unwrap();
            store.delete_material(record.id).unwrap();
        }
        let entries = replay(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, MutationKind::Created);
        assert_eq!(entries[1].kind, MutationKind::Deleted);
        assert_eq!(entries[0].stage, "material");
    }
}
