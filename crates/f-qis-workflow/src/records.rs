//! ---
//! qis_section: "02-inspection-workflow"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Inspection-chain validation and workflow engine."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::ValidationError;

/// The four stages of the inspection chain, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Stage {
    /// Material receipt check.
    Material,
    /// Fit-up check joining two received materials.
    FitUp,
    /// Final weld inspection of a fit-up.
    Final,
    /// Nondestructive-test request.
    Ndt,
}

/// Outcome of a material receipt check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MaterialResult {
    /// Accepted.
    Pass,
    /// Rejected.
    Fail,
    /// Accepted with conditions.
    Conditional,
}

/// Outcome of a fit-up check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FitUpResult {
    /// Accepted.
    Pass,
    /// Rejected.
    Fail,
}

/// Outcome of a final weld inspection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FinalResult {
    /// Not yet decided.
    #[default]
    Pending,
    /// Accepted.
    Pass,
    /// Rejected.
    Fail,
}

impl FinalResult {
    /// Whether a decided result would move back to pending.
    pub fn transition_is_legal(self, next: FinalResult) -> bool {
        !(matches!(self, FinalResult::Pass | FinalResult::Fail)
            && next == FinalResult::Pending)
    }
}

/// Nondestructive-test method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum NdtMethod {
    /// Ultrasonic testing.
    Ut,
    /// Radiographic testing.
    Rt,
    /// Penetrant testing.
    Pt,
    /// Magnetic particle testing.
    Mt,
    /// Visual testing.
    Vt,
}

/// Outcome of a nondestructive test.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NdtResult {
    /// Not yet decided.
    #[default]
    Pending,
    /// Accepted.
    Pass,
    /// Rejected.
    Fail,
}

impl NdtResult {
    /// Whether a decided result would move back to pending.
    pub fn transition_is_legal(self, next: NdtResult) -> bool {
        !(matches!(self, NdtResult::Pass | NdtResult::Fail) && next == NdtResult::Pending)
    }
}

/// Lifecycle status of an NDT request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NdtStatus {
    /// Awaiting execution.
    #[default]
    Pending,
    /// Test performed.
    Completed,
    /// Request withdrawn.
    Cancelled,
}

impl NdtStatus {
    /// Whether a closed request would reopen.
    pub fn transition_is_legal(self, next: NdtStatus) -> bool {
        !(matches!(self, NdtStatus::Completed | NdtStatus::Cancelled)
            && next == NdtStatus::Pending)
    }
}

/// Parse an enum field from its raw boundary string, rejecting unknown
/// values instead of defaulting.
pub(crate) fn parse_enum<T: std::str::FromStr>(
    field: &'static str,
    raw: &str,
) -> Result<T, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidEnumValue {
        field,
        value: raw.to_string(),
    })
}

/// A material receipt check. Root of the inspection chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialInspection {
    /// Stable identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Material family, e.g. `plate`, `pipe`.
    pub material_type: String,
    /// Grade designation, e.g. `S355J2`.
    pub material_grade: String,
    /// Thickness in millimetres.
    pub thickness_mm: f64,
    /// Mill heat number.
    pub heat_no: String,
    /// Report number, unique within (project, stage).
    pub report_no: String,
    /// Inspection outcome.
    pub result: MaterialResult,
    /// Authoring user.
    pub created_by: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a material inspection. Enum fields arrive as raw
/// strings and are normalized exactly once, in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDraft {
    pub material_type: String,
    pub material_grade: String,
    pub thickness_mm: f64,
    pub heat_no: String,
    pub report_no: String,
    pub result: String,
}

/// Partial update for a material inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialUpdate {
    pub material_type: Option<String>,
    pub material_grade: Option<String>,
    pub thickness_mm: Option<f64>,
    pub heat_no: Option<String>,
    pub report_no: Option<String>,
    pub result: Option<String>,
}

/// A fit-up check joining two distinct materials of the same project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitUpInspection {
    /// Stable identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// First joined material.
    pub part1_material_id: Uuid,
    /// Second joined material. Always distinct from the first.
    pub part2_material_id: Uuid,
    /// Drawing the joint appears on.
    pub drawing_no: String,
    /// Joint designation.
    pub joint_no: String,
    /// Report number, unique within (project, stage).
    pub report_no: String,
    /// Inspection outcome.
    pub result: FitUpResult,
    /// Authoring user.
    pub created_by: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a fit-up inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitUpDraft {
    pub part1_material_id: Uuid,
    pub part2_material_id: Uuid,
    pub drawing_no: String,
    pub joint_no: String,
    pub report_no: String,
    pub result: String,
}

/// Partial update for a fit-up inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitUpUpdate {
    pub part1_material_id: Option<Uuid>,
    pub part2_material_id: Option<Uuid>,
    pub drawing_no: Option<String>,
    pub joint_no: Option<String>,
    pub report_no: Option<String>,
    pub result: Option<String>,
}

/// A final weld inspection of a fit-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalInspection {
    /// Stable identifier.
    pub id: Uuid,
    /// Owning project. Always equal to the fit-up's project.
    pub project_id: Uuid,
    /// Inspected fit-up.
    pub fitup_id: Uuid,
    /// Report number, unique within (project, stage).
    pub report_no: String,
    /// Radiographic outcome note, when performed.
    pub ndt_rt: Option<String>,
    /// Penetrant outcome note, when performed.
    pub ndt_pt: Option<String>,
    /// Magnetic particle outcome note, when performed.
    pub ndt_mt: Option<String>,
    /// Inspection outcome.
    pub result: FinalResult,
    /// Authoring user.
    pub created_by: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a final inspection. The result defaults to
/// pending when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalDraft {
    pub fitup_id: Uuid,
    pub report_no: String,
    #[serde(default)]
    pub ndt_rt: Option<String>,
    #[serde(default)]
    pub ndt_pt: Option<String>,
    #[serde(default)]
    pub ndt_mt: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

/// Partial update for a final inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalUpdate {
    pub report_no: Option<String>,
    pub ndt_rt: Option<String>,
    pub ndt_pt: Option<String>,
    pub ndt_mt: Option<String>,
    pub result: Option<String>,
}

/// A nondestructive-test request, standalone or derived from a final
/// inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NdtRequest {
    /// Stable identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Final inspection the request was derived from, when not standalone.
    pub final_inspection_id: Option<Uuid>,
    /// Test method.
    pub method: NdtMethod,
    /// Report number, unique within (project, stage).
    pub report_no: String,
    /// Test outcome.
    pub result: NdtResult,
    /// Request lifecycle status.
    pub status: NdtStatus,
    /// Authoring user.
    pub created_by: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating an NDT request. Result and status default to
/// pending when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NdtDraft {
    #[serde(default)]
    pub final_inspection_id: Option<Uuid>,
    pub method: String,
    pub report_no: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Partial update for an NDT request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NdtUpdate {
    pub method: Option<String>,
    pub report_no: Option<String>,
    pub result: Option<String>,
    pub status: Option<String>,
}
