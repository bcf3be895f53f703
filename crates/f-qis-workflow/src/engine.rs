//! ---
//! qis_section: "02-inspection-workflow"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Inspection-chain validation and workflow engine."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use f_qis_registry::ProjectRole;

use crate::records::{
    parse_enum, FinalDraft, FinalInspection, FinalResult, FinalUpdate, FitUpDraft,
    FitUpInspection, FitUpResult, FitUpUpdate, MaterialDraft, MaterialInspection, MaterialResult,
    MaterialUpdate, NdtDraft, NdtMethod, NdtRequest, NdtResult, NdtStatus, NdtUpdate, Stage,
};
use crate::store::RecordStore;
use crate::{ConflictError, ReferentialIntegrityError, Result, ValidationError, WorkflowError};

/// Validates and persists inspection-stage records, enforcing chain
/// integrity and legal state transitions.
///
/// Every check runs before the first store write; a failed call leaves
/// the store untouched and a successful one commits exactly one record.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn RecordStore>,
}

impl WorkflowEngine {
    /// Build an engine over a record store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn require(capability: ProjectRole, required: ProjectRole) -> Result<()> {
        if capability >= required {
            Ok(())
        } else {
            Err(WorkflowError::InsufficientCapability { required })
        }
    }

    // ---- material --------------------------------------------------------

    /// Create a material inspection.
    pub fn create_material(
        &self,
        project_id: Uuid,
        draft: MaterialDraft,
        actor: Uuid,
        capability: ProjectRole,
    ) -> Result<MaterialInspection> {
        Self::require(capability, ProjectRole::Editor)?;
        let result: MaterialResult = parse_enum("result", &draft.result)?;
        self.check_material_report(project_id, &draft.report_no, None)?;

        let now = Utc::now();
        let record = MaterialInspection {
            id: Uuid::new_v4(),
            project_id,
            material_type: draft.material_type,
            material_grade: draft.material_grade,
            thickness_mm: draft.thickness_mm,
            heat_no: draft.heat_no,
            report_no: draft.report_no,
            result,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };
        self.store.put_material(record.clone())?;
        debug!(project = %project_id, id = %record.id, report = %record.report_no, "material inspection created");
        Ok(record)
    }

    /// Apply a partial update to a material inspection.
    pub fn update_material(
        &self,
        id: Uuid,
        project_id: Uuid,
        update: MaterialUpdate,
        capability: ProjectRole,
    ) -> Result<MaterialInspection> {
        Self::require(capability, ProjectRole::Editor)?;
        let mut record = self.scoped_material(id, project_id)?;

        if let Some(result) = update.result.as_deref() {
            record.result = parse_enum("result", result)?;
        }
        if let Some(report_no) = update.report_no {
            if report_no != record.report_no {
                self.check_material_report(project_id, &report_no, Some(id))?;
            }
            record.report_no = report_no;
        }
        if let Some(material_type) = update.material_type {
            record.material_type = material_type;
        }
        if let Some(material_grade) = update.material_grade {
            record.material_grade = material_grade;
        }
        if let Some(thickness_mm) = update.thickness_mm {
            record.thickness_mm = thickness_mm;
        }
        if let Some(heat_no) = update.heat_no {
            record.heat_no = heat_no;
        }
        record.updated_at = Utc::now();
        self.store.put_material(record.clone())?;
        Ok(record)
    }

    /// Fetch a material inspection within the caller's project scope.
    pub fn get_material(
        &self,
        id: Uuid,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<MaterialInspection> {
        Self::require(capability, ProjectRole::Viewer)?;
        self.scoped_material(id, project_id)
    }

    /// Enumerate a project's material inspections.
    pub fn list_materials(
        &self,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<Vec<MaterialInspection>> {
        Self::require(capability, ProjectRole::Viewer)?;
        Ok(self.store.materials_in_project(project_id))
    }

    /// Delete a material inspection unless a fit-up still references it.
    pub fn delete_material(
        &self,
        id: Uuid,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<()> {
        Self::require(capability, ProjectRole::Editor)?;
        let record = self.scoped_material(id, project_id)?;
        let referenced = self
            .store
            .fitups_in_project(project_id)
            .iter()
            .any(|fitup| fitup.part1_material_id == id || fitup.part2_material_id == id);
        if referenced {
            return Err(ReferentialIntegrityError::ReferencedByDownstream {
                stage: Stage::Material,
                id,
            }
            .into());
        }
        self.store.delete_material(record.id)?;
        Ok(())
    }

    // ---- fit-up ----------------------------------------------------------

    /// Create a fit-up inspection joining two distinct materials.
    pub fn create_fitup(
        &self,
        project_id: Uuid,
        draft: FitUpDraft,
        actor: Uuid,
        capability: ProjectRole,
    ) -> Result<FitUpInspection> {
        Self::require(capability, ProjectRole::Editor)?;
        let result: FitUpResult = parse_enum("result", &draft.result)?;
        self.check_part_references(project_id, draft.part1_material_id, draft.part2_material_id)?;
        self.check_fitup_report(project_id, &draft.report_no, None)?;

        let now = Utc::now();
        let record = FitUpInspection {
            id: Uuid::new_v4(),
            project_id,
            part1_material_id: draft.part1_material_id,
            part2_material_id: draft.part2_material_id,
            drawing_no: draft.drawing_no,
            joint_no: draft.joint_no,
            report_no: draft.report_no,
            result,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };
        self.store.put_fitup(record.clone())?;
        debug!(project = %project_id, id = %record.id, report = %record.report_no, "fit-up inspection created");
        Ok(record)
    }

    /// Apply a partial update to a fit-up inspection. Changing either part
    /// reference revalidates distinctness and project ownership of both.
    pub fn update_fitup(
        &self,
        id: Uuid,
        project_id: Uuid,
        update: FitUpUpdate,
        capability: ProjectRole,
    ) -> Result<FitUpInspection> {
        Self::require(capability, ProjectRole::Editor)?;
        let mut record = self.scoped_fitup(id, project_id)?;

        if let Some(result) = update.result.as_deref() {
            record.result = parse_enum("result", result)?;
        }
        let part1 = update.part1_material_id.unwrap_or(record.part1_material_id);
        let part2 = update.part2_material_id.unwrap_or(record.part2_material_id);
        if part1 != record.part1_material_id || part2 != record.part2_material_id {
            self.check_part_references(project_id, part1, part2)?;
        }
        record.part1_material_id = part1;
        record.part2_material_id = part2;
        if let Some(report_no) = update.report_no {
            if report_no != record.report_no {
                self.check_fitup_report(project_id, &report_no, Some(id))?;
            }
            record.report_no = report_no;
        }
        if let Some(drawing_no) = update.drawing_no {
            record.drawing_no = drawing_no;
        }
        if let Some(joint_no) = update.joint_no {
            record.joint_no = joint_no;
        }
        record.updated_at = Utc::now();
        self.store.put_fitup(record.clone())?;
        Ok(record)
    }

    /// Fetch a fit-up inspection within the caller's project scope.
    pub fn get_fitup(
        &self,
        id: Uuid,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<FitUpInspection> {
        Self::require(capability, ProjectRole::Viewer)?;
        self.scoped_fitup(id, project_id)
    }

    /// Enumerate a project's fit-up inspections.
    pub fn list_fitups(
        &self,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<Vec<FitUpInspection>> {
        Self::require(capability, ProjectRole::Viewer)?;
        Ok(self.store.fitups_in_project(project_id))
    }

    /// Delete a fit-up inspection unless a final inspection references it.
    pub fn delete_fitup(&self, id: Uuid, project_id: Uuid, capability: ProjectRole) -> Result<()> {
        Self::require(capability, ProjectRole::Editor)?;
        let record = self.scoped_fitup(id, project_id)?;
        let referenced = self
            .store
            .finals_in_project(project_id)
            .iter()
            .any(|final_inspection| final_inspection.fitup_id == id);
        if referenced {
            return Err(ReferentialIntegrityError::ReferencedByDownstream {
                stage: Stage::FitUp,
                id,
            }
            .into());
        }
        self.store.delete_fitup(record.id)?;
        Ok(())
    }

    // ---- final -----------------------------------------------------------

    /// Create a final inspection of a fit-up.
    pub fn create_final(
        &self,
        project_id: Uuid,
        draft: FinalDraft,
        actor: Uuid,
        capability: ProjectRole,
    ) -> Result<FinalInspection> {
        Self::require(capability, ProjectRole::Editor)?;
        let result = match draft.result.as_deref() {
            Some(raw) => parse_enum("result", raw)?,
            None => FinalResult::default(),
        };
        match self.store.fitup(draft.fitup_id) {
            None => {
                return Err(ReferentialIntegrityError::MissingReference {
                    stage: Stage::FitUp,
                    id: draft.fitup_id,
                }
                .into())
            }
            Some(fitup) if fitup.project_id != project_id => {
                return Err(ReferentialIntegrityError::CrossProjectReference {
                    stage: Stage::FitUp,
                    id: draft.fitup_id,
                }
                .into())
            }
            Some(_) => {}
        }
        self.check_final_report(project_id, &draft.report_no, None)?;

        let now = Utc::now();
        let record = FinalInspection {
            id: Uuid::new_v4(),
            project_id,
            fitup_id: draft.fitup_id,
            report_no: draft.report_no,
            ndt_rt: draft.ndt_rt,
            ndt_pt: draft.ndt_pt,
            ndt_mt: draft.ndt_mt,
            result,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };
        self.store.put_final(record.clone())?;
        debug!(project = %project_id, id = %record.id, report = %record.report_no, "final inspection created");
        Ok(record)
    }

    /// Apply a partial update to a final inspection. The fit-up reference
    /// is fixed at creation; only outcome fields move.
    pub fn update_final(
        &self,
        id: Uuid,
        project_id: Uuid,
        update: FinalUpdate,
        capability: ProjectRole,
    ) -> Result<FinalInspection> {
        Self::require(capability, ProjectRole::Editor)?;
        let mut record = self.scoped_final(id, project_id)?;

        if let Some(result) = update.result.as_deref() {
            let next: FinalResult = parse_enum("result", result)?;
            if !record.result.transition_is_legal(next) {
                return Err(ValidationError::IllegalTransition {
                    field: "result",
                    from: record.result.to_string(),
                    to: next.to_string(),
                }
                .into());
            }
            record.result = next;
        }
        if let Some(report_no) = update.report_no {
            if report_no != record.report_no {
                self.check_final_report(project_id, &report_no, Some(id))?;
            }
            record.report_no = report_no;
        }
        if update.ndt_rt.is_some() {
            record.ndt_rt = update.ndt_rt;
        }
        if update.ndt_pt.is_some() {
            record.ndt_pt = update.ndt_pt;
        }
        if update.ndt_mt.is_some() {
            record.ndt_mt = update.ndt_mt;
        }
        record.updated_at = Utc::now();
        self.store.put_final(record.clone())?;
        Ok(record)
    }

    /// Fetch a final inspection within the caller's project scope.
    pub fn get_final(
        &self,
        id: Uuid,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<FinalInspection> {
        Self::require(capability, ProjectRole::Viewer)?;
        self.scoped_final(id, project_id)
    }

    /// Enumerate a project's final inspections.
    pub fn list_finals(
        &self,
        project_id: Uuid,
        capability: ProjectRole,
    ) -> Result<Vec<FinalInspection>> {
        Self::require(capability, ProjectRole::Viewer)?;
        Ok(self.store.finals_in_project(project_id))
    }

    /// Delete a final inspection unless an NDT request references it.
    /// No REST route exists for this; kept for parity across stages.
    pub fn delete_final(&self, id: Uuid, project_id: Uuid, capability: ProjectRole) -> Result<()> {
        Self::require(capability, ProjectRole::Editor)?;
        let record = self.scoped_final(id, project_id)?;
        let referenced = self
            .store
            .ndts_in_project(project_id)
            .iter()
            .any(|ndt| ndt.final_inspection_id == Some(id));
        if referenced {
            return Err(ReferentialIntegrityError::ReferencedByDownstream {
                stage: Stage::Final,
                id,
            }
            .into());
        }
        self.store.delete_final(record.id)?;
        Ok(())
    }

    // ---- ndt -------------------------------------------------------------

    /// Create an NDT request, standalone or derived from a final
    /// inspection in the same project.
    pub fn create_ndt(
        &self,
        project_id: Uuid,
        draft: NdtDraft,
        actor: Uuid,
        capability: ProjectRole,
    ) -> Result<NdtRequest> {
        Self::require(capability, ProjectRole::Editor)?;
        let method: NdtMethod = parse_enum("method", &draft.method)?;
        let result = match draft.result.as_deref() {
            Some(raw) => parse_enum("result", raw)?,
            None => NdtResult::default(),
        };
        let status = match draft.status.as_deref() {
            Some(raw) => parse_enum("status", raw)?,
            None => NdtStatus::default(),
        };
        if let Some(final_id) = draft.final_inspection_id {
            match self.store.final_inspection(final_id) {
                None => {
                    return Err(ReferentialIntegrityError::MissingReference {
                        stage: Stage::Final,
                        id: final_id,
                    }
                    .into())
                }
                Some(final_inspection) if final_inspection.project_id != project_id => {
                    return Err(ReferentialIntegrityError::CrossProjectReference {
                        stage: Stage::Final,
                        id: final_id,
                    }
                    .into())
                }
                Some(_) => {}
            }
        }
        self.check_ndt_report(project_id, &draft.report_no, None)?;

        let now = Utc::now();
        let record = NdtRequest {
            id: Uuid::new_v4(),
            project_id,
            final_inspection_id: draft.final_inspection_id,
            method,
            report_no: draft.report_no,
            result,
            status,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };
        self.store.put_ndt(record.clone())?;
        debug!(project = %project_id, id = %record.id, method = %record.method, "ndt request created");
        Ok(record)
    }

    /// Apply a partial update to an NDT request.
    pub fn update_ndt(
        &self,
        id: Uuid,
        project_id: Uuid,
        update: NdtUpdate,
        capability: ProjectRole,
    ) -> Result<NdtRequest> {
        Self::require(capability, ProjectRole::Editor)?;
        let mut record = self.scoped_ndt(id, project_id)?;

        if let Some(status) = update.status.as_deref() {
            let next: NdtStatus = parse_enum("status", status)?;
            if !record.status.transition_is_legal(next) {
                return Err(ValidationError::IllegalTransition {
                    field: "status",
                    from: record.status.to_string(),
                    to: next.to_string(),
                }
                .into());
            }
            record.status = next;
        }
        if let Some(result) = update.result.as_deref() {
            let next: NdtResult = parse_enum("result", result)?;
            if !record.result.transition_is_legal(next) {
                return Err(ValidationError::IllegalTransition {
                    field: "result",
                    from: record.result.to_string(),
                    to: next.to_string(),
                }
                .into());
            }
            record.result = next;
        }
        if let Some(method) = update.method.as_deref() {
            record.method = parse_enum("method", method)?;
        }
        if let Some(report_no) = update.report_no {
            if report_no != record.report_no {
                self.check_ndt_report(project_id, &report_no, Some(id))?;
            }
            record.report_no = report_no;
        }
        record.updated_at = Utc::now();
        self.store.put_ndt(record.clone())?;
        Ok(record)
    }

    /// Fetch an NDT request within the caller's project scope.
    pub fn get_ndt(&self, id: Uuid, project_id: Uuid, capability: ProjectRole) -> Result<NdtRequest> {
        Self::require(capability, ProjectRole::Viewer)?;
        self.scoped_ndt(id, project_id)
    }

    /// Enumerate a project's NDT requests.
    pub fn list_ndts(&self, project_id: Uuid, capability: ProjectRole) -> Result<Vec<NdtRequest>> {
        Self::require(capability, ProjectRole::Viewer)?;
        Ok(self.store.ndts_in_project(project_id))
    }

    /// Delete an NDT request. Leaf of the chain, so never blocked.
    /// No REST route exists for this; kept for parity across stages.
    pub fn delete_ndt(&self, id: Uuid, project_id: Uuid, capability: ProjectRole) -> Result<()> {
        Self::require(capability, ProjectRole::Editor)?;
        let record = self.scoped_ndt(id, project_id)?;
        self.store.delete_ndt(record.id)?;
        Ok(())
    }

    // ---- shared checks ---------------------------------------------------

    /// Records outside the requested project resolve exactly like missing
    /// ones, so scope is never leaked through lookups.
    fn scoped_material(&self, id: Uuid, project_id: Uuid) -> Result<MaterialInspection> {
        self.store
            .material(id)
            .filter(|record| record.project_id == project_id)
            .ok_or(WorkflowError::NotFound)
    }

    fn scoped_fitup(&self, id: Uuid, project_id: Uuid) -> Result<FitUpInspection> {
        self.store
            .fitup(id)
            .filter(|record| record.project_id == project_id)
            .ok_or(WorkflowError::NotFound)
    }

    fn scoped_final(&self, id: Uuid, project_id: Uuid) -> Result<FinalInspection> {
        self.store
            .final_inspection(id)
            .filter(|record| record.project_id == project_id)
            .ok_or(WorkflowError::NotFound)
    }

    fn scoped_ndt(&self, id: Uuid, project_id: Uuid) -> Result<NdtRequest> {
        self.store
            .ndt(id)
            .filter(|record| record.project_id == project_id)
            .ok_or(WorkflowError::NotFound)
    }

    fn check_part_references(&self, project_id: Uuid, part1: Uuid, part2: Uuid) -> Result<()> {
        if part1 == part2 {
            return Err(ValidationError::DuplicateMaterialReference.into());
        }
        for id in [part1, part2] {
            match self.store.material(id) {
                None => {
                    return Err(ReferentialIntegrityError::MissingReference {
                        stage: Stage::Material,
                        id,
                    }
                    .into())
                }
                Some(material) if material.project_id != project_id => {
                    return Err(ReferentialIntegrityError::CrossProjectReference {
                        stage: Stage::Material,
                        id,
                    }
                    .into())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn check_material_report(
        &self,
        project_id: Uuid,
        report_no: &str,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        let taken = self
            .store
            .materials_in_project(project_id)
            .iter()
            .any(|record| record.report_no == report_no && Some(record.id) != exclude);
        if taken {
            return Err(ConflictError::DuplicateReportNumber {
                stage: Stage::Material,
                report_no: report_no.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_fitup_report(
        &self,
        project_id: Uuid,
        report_no: &str,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        let taken = self
            .store
            .fitups_in_project(project_id)
            .iter()
            .any(|record| record.report_no == report_no && Some(record.id) != exclude);
        if taken {
            return Err(ConflictError::DuplicateReportNumber {
                stage: Stage::FitUp,
                report_no: report_no.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_final_report(
        &self,
        project_id: Uuid,
        report_no: &str,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        let taken = self
            .store
            .finals_in_project(project_id)
            .iter()
            .any(|record| record.report_no == report_no && Some(record.id) != exclude);
        if taken {
            return Err(ConflictError::DuplicateReportNumber {
                stage: Stage::Final,
                report_no: report_no.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_ndt_report(
        &self,
        project_id: Uuid,
        report_no: &str,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        let taken = self
            .store
            .ndts_in_project(project_id)
            .iter()
            .any(|record| record.report_no == report_no && Some(record.id) != exclude);
        if taken {
            return Err(ConflictError::DuplicateReportNumber {
                stage: Stage::Ndt,
                report_no: report_no.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
