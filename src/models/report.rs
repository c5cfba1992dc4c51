use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::enums::{Priority, ReportStatus};

/// A unit of clinical documentation requested from one or more therapists.
///
/// `assigned_therapist_ids` is never empty while the report is not cancelled;
/// `completed_at` is set if and only if status is `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub patient_id: String,
    pub report_type: String,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub status: ReportStatus,
    pub priority: Priority,
    pub assigned_therapist_ids: Vec<String>,
    pub disciplines: Vec<String>,
    pub requested_by: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    pub content: Map<String, Value>,
    pub ai_generated_sections: Option<Map<String, Value>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// One row per (report, therapist) marking that an assignee finished
/// their portion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCompletion {
    pub id: Uuid,
    pub report_id: Uuid,
    pub therapist_id: String,
    pub completed_at: NaiveDateTime,
    pub notes: Option<String>,
}

/// Per-report completion progress, derived from completion rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub total_therapists: usize,
    pub completed_count: usize,
    pub percentage: f64,
    pub is_fully_completed: bool,
    pub completions: Vec<ReportCompletion>,
}

/// Derived urgency/overdue classification. Computed, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportClassification {
    pub is_urgent: bool,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

/// Aggregated report counts for a user's dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAnalytics {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
    pub completion_rate: f64,
    pub avg_completion_days: f64,
}
