//! ---
//! qis_section: "02-inspection-workflow"
//! qis_subsection: "integration-tests"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Chain integrity tests for the workflow engine."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::sync::Arc;

use uuid::Uuid;

use f_qis_registry::ProjectRole;
use f_qis_workflow::{
    ConflictError, FinalDraft, FinalUpdate, FitUpDraft, MaterialDraft, MaterialUpdate, NdtDraft,
    NdtUpdate, MemoryRecordStore, ReferentialIntegrityError, Stage, ValidationError,
    WorkflowEngine, WorkflowError,
};

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(MemoryRecordStore::new()))
}

fn material_draft(report_no: &str) -> MaterialDraft {
    MaterialDraft {
        material_type: "plate".into(),
        material_grade: "S355J2".into(),
        thickness_mm: 12.0,
        heat_no: "H-7731".into(),
        report_no: report_no.into(),
        result: "pass".into(),
    }
}

fn fitup_draft(part1: Uuid, part2: Uuid, report_no: &str) -> FitUpDraft {
    FitUpDraft {
        part1_material_id: part1,
        part2_material_id: part2,
        drawing_no: "DWG-12".into(),
        joint_no: "J-4".into(),
        report_no: report_no.into(),
        result: "pass".into(),
    }
}

#[test]
fn viewer_cannot_write_but_can_read() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let err = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Viewer)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InsufficientCapability { .. }));

    engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
    assert_eq!(
        engine.list_materials(project, ProjectRole::Viewer).unwrap().len(),
        1
    );
}

#[test]
fn unknown_result_value_is_rejected() {
    let engine = engine();
    let project = Uuid::new_v4();
    let mut draft = material_draft("MVR-100");
    draft.result = "approved".into();
    let err = engine
        .create_material(project, draft, Uuid::new_v4(), ProjectRole::Editor)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::InvalidEnumValue { field: "result", .. })
    ));
}

#[test]
fn duplicate_report_number_within_project_conflicts() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();
    engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
    let err = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Conflict(ConflictError::DuplicateReportNumber {
            stage: Stage::Material,
            ..
        })
    ));

    // The uniqueness scope is (project, stage): another project is free.
    engine
        .create_material(Uuid::new_v4(), material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
}

#[test]
fn fitup_rejects_same_material_twice() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();
    let m1 = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();

    let err = engine
        .create_fitup(project, fitup_draft(m1.id, m1.id, "FR-1"), actor, ProjectRole::Editor)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::DuplicateMaterialReference)
    ));
}

#[test]
fn fitup_requires_existing_same_project_materials() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();
    let m1 = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();

    // Dangling second part.
    let ghost = Uuid::new_v4();
    let err = engine
        .create_fitup(project, fitup_draft(m1.id, ghost, "FR-1"), actor, ProjectRole::Editor)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReferentialIntegrity(ReferentialIntegrityError::MissingReference {
            stage: Stage::Material,
            id
        }) if id == ghost
    ));

    // Second part from a different project.
    let other_project = Uuid::new_v4();
    let foreign = engine
        .create_material(other_project, material_draft("MVR-200"), actor, ProjectRole::Editor)
        .unwrap();
    let err = engine
        .create_fitup(
            project,
            fitup_draft(m1.id, foreign.id, "FR-1"),
            actor,
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReferentialIntegrity(ReferentialIntegrityError::CrossProjectReference {
            stage: Stage::Material,
            ..
        })
    ));
}

#[test]
fn deleting_referenced_material_is_blocked_and_mutates_nothing() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();
    let m1 = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
    let m2 = engine
        .create_material(project, material_draft("MVR-101"), actor, ProjectRole::Editor)
        .unwrap();
    let fitup = engine
        .create_fitup(project, fitup_draft(m1.id, m2.id, "FR-1"), actor, ProjectRole::Editor)
        .unwrap();

    let err = engine
        .delete_material(m1.id, project, ProjectRole::Editor)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReferentialIntegrity(
            ReferentialIntegrityError::ReferencedByDownstream {
                stage: Stage::Material,
                ..
            }
        )
    ));
    // Both records are unchanged.
    assert!(engine.get_material(m1.id, project, ProjectRole::Viewer).is_ok());
    assert!(engine.get_fitup(fitup.id, project, ProjectRole::Viewer).is_ok());

    // Removing the fit-up unblocks the material.
    engine.delete_fitup(fitup.id, project, ProjectRole::Editor).unwrap();
    engine.delete_material(m1.id, project, ProjectRole::Editor).unwrap();
}

#[test]
fn final_inspection_must_reference_fitup_in_same_project() {
    let engine = engine();
    let actor = Uuid::new_v4();
    let project_a = Uuid::new_v4();
    let project_b = Uuid::new_v4();

    let m1 = engine
        .create_material(project_a, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
    let m2 = engine
        .create_material(project_a, material_draft("MVR-101"), actor, ProjectRole::Editor)
        .unwrap();
    let fitup = engine
        .create_fitup(project_a, fitup_draft(m1.id, m2.id, "FR-1"), actor, ProjectRole::Editor)
        .unwrap();

    let err = engine
        .create_final(
            project_b,
            FinalDraft {
                fitup_id: fitup.id,
                report_no: "FI-1".into(),
                ndt_rt: None,
                ndt_pt: None,
                ndt_mt: None,
                result: None,
            },
            actor,
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReferentialIntegrity(ReferentialIntegrityError::CrossProjectReference {
            stage: Stage::FitUp,
            ..
        })
    ));
}

#[test]
fn final_result_cannot_reopen_once_decided() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();
    let m1 = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
    let m2 = engine
        .create_material(project, material_draft("MVR-101"), actor, ProjectRole::Editor)
        .unwrap();
    let fitup = engine
        .create_fitup(project, fitup_draft(m1.id, m2.id, "FR-1"), actor, ProjectRole::Editor)
        .unwrap();
    let final_inspection = engine
        .create_final(
            project,
            FinalDraft {
                fitup_id: fitup.id,
                report_no: "FI-1".into(),
                ndt_rt: None,
                ndt_pt: None,
                ndt_mt: None,
                result: None,
            },
            actor,
            ProjectRole::Editor,
        )
        .unwrap();

    // pending → pass is legal.
    engine
        .update_final(
            final_inspection.id,
            project,
            FinalUpdate {
                result: Some("pass".into()),
                ..Default::default()
            },
            ProjectRole::Editor,
        )
        .unwrap();

    // pass → pending is not.
    let err = engine
        .update_final(
            final_inspection.id,
            project,
            FinalUpdate {
                result: Some("pending".into()),
                ..Default::default()
            },
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::IllegalTransition { field: "result", .. })
    ));

    // Overturning pass → fail stays legal.
    engine
        .update_final(
            final_inspection.id,
            project,
            FinalUpdate {
                result: Some("fail".into()),
                ..Default::default()
            },
            ProjectRole::Editor,
        )
        .unwrap();
}

#[test]
fn ndt_request_lifecycle_and_derivation() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();

    // Standalone request.
    let standalone = engine
        .create_ndt(
            project,
            NdtDraft {
                final_inspection_id: None,
                method: "UT".into(),
                report_no: "NDT-1".into(),
                result: None,
                status: None,
            },
            actor,
            ProjectRole::Editor,
        )
        .unwrap();
    assert!(standalone.final_inspection_id.is_none());

    // Derivation from a missing final inspection dangles.
    let ghost = Uuid::new_v4();
    let err = engine
        .create_ndt(
            project,
            NdtDraft {
                final_inspection_id: Some(ghost),
                method: "RT".into(),
                report_no: "NDT-2".into(),
                result: None,
                status: None,
            },
            actor,
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReferentialIntegrity(ReferentialIntegrityError::MissingReference {
            stage: Stage::Final,
            id
        }) if id == ghost
    ));

    // Completed requests never reopen.
    engine
        .update_ndt(
            standalone.id,
            project,
            NdtUpdate {
                status: Some("completed".into()),
                result: Some("pass".into()),
                ..Default::default()
            },
            ProjectRole::Editor,
        )
        .unwrap();
    let err = engine
        .update_ndt(
            standalone.id,
            project,
            NdtUpdate {
                status: Some("pending".into()),
                ..Default::default()
            },
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::IllegalTransition { field: "status", .. })
    ));

    let err = engine
        .create_ndt(
            project,
            NdtDraft {
                final_inspection_id: None,
                method: "XR".into(),
                report_no: "NDT-3".into(),
                result: None,
                status: None,
            },
            actor,
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::InvalidEnumValue { field: "method", .. })
    ));
}

#[test]
fn lookups_outside_project_scope_resolve_as_not_found() {
    let engine = engine();
    let actor = Uuid::new_v4();
    let project_a = Uuid::new_v4();
    let project_b = Uuid::new_v4();
    let record = engine
        .create_material(project_a, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();

    let err = engine
        .get_material(record.id, project_b, ProjectRole::Viewer)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound));

    let err = engine
        .update_material(
            record.id,
            project_b,
            MaterialUpdate::default(),
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound));
}

#[test]
fn failed_update_leaves_record_unchanged() {
    let engine = engine();
    let project = Uuid::new_v4();
    let actor = Uuid::new_v4();
    let a = engine
        .create_material(project, material_draft("MVR-100"), actor, ProjectRole::Editor)
        .unwrap();
    let b = engine
        .create_material(project, material_draft("MVR-101"), actor, ProjectRole::Editor)
        .unwrap();

    // Renaming b's report onto a's collides; b must stay intact.
    let err = engine
        .update_material(
            b.id,
            project,
            MaterialUpdate {
                report_no: Some("MVR-100".into()),
                heat_no: Some("H-9999".into()),
                ..Default::default()
            },
            ProjectRole::Editor,
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));

    let unchanged = engine.get_material(b.id, project, ProjectRole::Viewer).unwrap();
    assert_eq!(unchanged.report_no, "MVR-101");
    assert_eq!(unchanged.heat_no, "H-7731");
    let _ = a;
}
