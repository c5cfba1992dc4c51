use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::enums::{ApprovalStatus, InstanceStatus, TemplateType};

/// A named, versioned definition of report structure.
///
/// `fields` maps field name to a definition object (type, label, plus
/// type-specific properties). Every entry in `sections` must exist as a
/// key in `fields` — enforced by the registry at create/update time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub template_type: TemplateType,
    /// None means global/system scope.
    pub practice_id: Option<String>,
    pub fields: Map<String, Value>,
    pub sections: Vec<String>,
    pub is_active: bool,
    pub version: i64,
    pub approval_status: ApprovalStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Template {
    /// Auto-population pairs derived from the field schema.
    ///
    /// A field definition may carry a string `source` property naming the
    /// patient attribute it is filled from (e.g. `"patient.first_name"`).
    /// Returns (qualified source, patient attribute) pairs; the attribute
    /// is the source with its namespace stripped.
    pub fn auto_population_mapping(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter_map(|(_, def)| def.get("source").and_then(Value::as_str))
            .map(|source| {
                let attr = source.rsplit('.').next().unwrap_or(source);
                (source.to_string(), attr.to_string())
            })
            .collect()
    }
}

/// Immutable snapshot of a template's schema at a given version number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: Uuid,
    pub template_id: Uuid,
    pub version: i64,
    pub fields: Map<String, Value>,
    pub sections: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A report-bound, mutable copy of a template's field schema holding
/// actual values. Completes in lock-step with the owning report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub report_id: Uuid,
    pub patient_id: String,
    pub assigned_therapist_ids: Vec<String>,
    pub instance_data: Map<String, Value>,
    pub deleted_sections: Vec<String>,
    pub status: InstanceStatus,
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
