//! Report lifecycle: creation, assignment, per-therapist completion,
//! status transitions, urgency classification and dashboard analytics.
//!
//! Every transition is caller-invoked; nothing here runs in the
//! background. Report creation is deliberately non-atomic: the report row
//! is the primary write, and instance population or notification failures
//! are logged without rolling it back. Reassignment is the one
//! transactional path, so a completion racing a reassignment can never
//! survive the cleared roster.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::authorization::{require, Capability, PermissionProvider};
use crate::autopopulate;
use crate::db::repository::{
    delete_all_completions, delete_completion, delete_report, get_completions,
    get_instance_for_report, get_report, get_template, insert_completion, insert_instance,
    insert_notification, insert_report, list_notifications, list_reports_for_patient,
    list_reports_for_user, mark_notification_read, update_instance, update_report,
};
use crate::errors::WorkflowError;
use crate::models::enums::{
    InstanceStatus, NotificationType, Priority, ReportStatus,
};
use crate::models::{
    CompletionStatus, Notification, Report, ReportAnalytics, ReportClassification,
    ReportCompletion, TemplateInstance,
};
use crate::providers::{ClinicalContentGenerator, PatientBundle, PatientDataProvider};

#[derive(Debug, Clone)]
pub struct CreateReportRequest {
    pub patient_id: String,
    pub report_type: String,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub priority: Priority,
    pub assigned_therapist_ids: Vec<String>,
    pub disciplines: Vec<String>,
    pub requested_by: Option<String>,
    pub deadline_date: Option<NaiveDate>,
}

/// Partial report update; absent fields keep their current value.
/// `deadline_date` is double-optional so a deadline can be cleared.
#[derive(Debug, Clone, Default)]
pub struct ReportUpdate {
    pub title: Option<String>,
    pub status: Option<ReportStatus>,
    pub priority: Option<Priority>,
    pub deadline_date: Option<Option<NaiveDate>>,
    pub content: Option<Map<String, Value>>,
}

pub struct ReportWorkflow<'a> {
    conn: &'a Connection,
    permissions: &'a dyn PermissionProvider,
    patients: Option<&'a dyn PatientDataProvider>,
    generator: Option<&'a dyn ClinicalContentGenerator>,
    code_lookup: HashMap<String, String>,
}

impl<'a> ReportWorkflow<'a> {
    pub fn new(conn: &'a Connection, permissions: &'a dyn PermissionProvider) -> Self {
        Self {
            conn,
            permissions,
            patients: None,
            generator: None,
            code_lookup: HashMap::new(),
        }
    }

    pub fn with_patient_provider(mut self, provider: &'a dyn PatientDataProvider) -> Self {
        self.patients = Some(provider);
        self
    }

    pub fn with_generator(mut self, generator: &'a dyn ClinicalContentGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_code_lookup(mut self, lookup: HashMap<String, String>) -> Self {
        self.code_lookup = lookup;
        self
    }

    // -----------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------

    /// Create a report in `pending`, populate its template instance and
    /// notify the assignees. The report write is the primary operation;
    /// instance and notification failures are logged and swallowed.
    pub fn create_report(&self, request: CreateReportRequest) -> Result<Report, WorkflowError> {
        let mut errors = Vec::new();
        if request.assigned_therapist_ids.is_empty() {
            errors.push("at least one therapist must be assigned".to_string());
        }
        if request.disciplines.is_empty() {
            errors.push("at least one discipline is required".to_string());
        }
        if request.title.trim().is_empty() {
            errors.push("title must not be empty".to_string());
        }
        if !errors.is_empty() {
            return Err(WorkflowError::validation(errors));
        }

        let template = match request.template_id {
            Some(id) => Some(
                get_template(self.conn, &id)?
                    .ok_or_else(|| WorkflowError::not_found("template", id.to_string()))?,
            ),
            None => None,
        };

        let now = chrono::Local::now().naive_local();
        let mut report = Report {
            id: Uuid::new_v4(),
            patient_id: request.patient_id.clone(),
            report_type: request.report_type,
            template_id: request.template_id,
            title: request.title,
            status: ReportStatus::Pending,
            priority: request.priority,
            assigned_therapist_ids: request.assigned_therapist_ids,
            disciplines: request.disciplines,
            requested_by: request.requested_by,
            deadline_date: request.deadline_date,
            content: Map::new(),
            ai_generated_sections: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        insert_report(self.conn, &report)?;
        tracing::info!(report = %report.id, patient = report.patient_id, "report created");

        if let Some(template) = &template {
            match self.create_instance(&report, template) {
                // Successful AI generation implicitly moves the fresh
                // report into in_progress.
                Ok(true) => report = self.advance_to_in_progress(&report.id)?,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(report = %report.id, "instance creation failed, report stands: {e}");
                }
            }
        }

        let creator = report.requested_by.as_deref().unwrap_or("");
        for assignee in &report.assigned_therapist_ids {
            if assignee == creator {
                continue;
            }
            let notification = Notification {
                id: Uuid::new_v4(),
                report_id: report.id,
                recipient_id: assignee.clone(),
                notification_type: NotificationType::Request,
                message: format!("New report requested: {}", report.title),
                is_read: false,
                created_at: now,
                read_at: None,
            };
            if let Err(e) = insert_notification(self.conn, &notification) {
                tracing::warn!(report = %report.id, assignee, "notification write failed: {e}");
            }
        }

        Ok(report)
    }

    /// Returns whether AI content was generated into the instance.
    fn create_instance(
        &self,
        report: &Report,
        template: &crate::models::Template,
    ) -> Result<bool, WorkflowError> {
        let bundle = self.patient_bundle(&report.patient_id);
        let instance_data =
            autopopulate::populate(template, &bundle, &self.code_lookup, self.generator);
        let ai_generated = autopopulate::has_ai_content(&instance_data);

        let now = chrono::Local::now().naive_local();
        insert_instance(
            self.conn,
            &TemplateInstance {
                id: Uuid::new_v4(),
                template_id: template.id,
                report_id: report.id,
                patient_id: report.patient_id.clone(),
                assigned_therapist_ids: report.assigned_therapist_ids.clone(),
                instance_data,
                deleted_sections: Vec::new(),
                status: InstanceStatus::Draft,
                title: report.title.clone(),
                created_at: now,
                updated_at: now,
            },
        )?;
        Ok(ai_generated)
    }

    /// Best-effort patient fetch: provider absence or failure degrades to
    /// an empty bundle, since auto-population is total.
    fn patient_bundle(&self, patient_id: &str) -> PatientBundle {
        let Some(provider) = self.patients else {
            return PatientBundle {
                patient_id: patient_id.to_string(),
                ..PatientBundle::default()
            };
        };
        match provider.patient_for_autopopulation(patient_id) {
            Ok(bundle) => bundle,
            Err(e) => {
                let err = WorkflowError::from(e);
                tracing::warn!(patient_id, "populating minimally: {err}");
                PatientBundle {
                    patient_id: patient_id.to_string(),
                    ..PatientBundle::default()
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    pub fn get_report(&self, id: &Uuid) -> Result<Report, WorkflowError> {
        get_report(self.conn, id)?
            .ok_or_else(|| WorkflowError::not_found("report", id.to_string()))
    }

    pub fn get_instance(&self, report_id: &Uuid) -> Result<TemplateInstance, WorkflowError> {
        get_instance_for_report(self.conn, report_id)?
            .ok_or_else(|| WorkflowError::not_found("template instance", report_id.to_string()))
    }

    /// Reports where the user is an assignee or the requester.
    pub fn list_reports_for_user(&self, user_id: &str) -> Result<Vec<Report>, WorkflowError> {
        Ok(list_reports_for_user(self.conn, user_id)?)
    }

    /// All reports for one patient, newest first.
    pub fn list_reports_for_patient(&self, patient_id: &str) -> Result<Vec<Report>, WorkflowError> {
        Ok(list_reports_for_patient(self.conn, patient_id)?)
    }

    // -----------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------

    /// Move a pending report to `in_progress`. Idempotent: calling on a
    /// report already past pending is a no-op.
    pub fn advance_to_in_progress(&self, id: &Uuid) -> Result<Report, WorkflowError> {
        let mut report = self.get_report(id)?;
        if report.status != ReportStatus::Pending {
            return Ok(report);
        }
        report.status = ReportStatus::InProgress;
        report.updated_at = chrono::Local::now().naive_local();
        update_report(self.conn, &report)?;
        Ok(report)
    }

    /// Apply a partial update. A status change must be a legal transition;
    /// moving to `completed` stamps `completed_at` and syncs the bound
    /// instance, keeping the two in lock-step.
    pub fn update_report(&self, id: &Uuid, update: ReportUpdate) -> Result<Report, WorkflowError> {
        let mut report = self.get_report(id)?;
        let was_completed = report.status == ReportStatus::Completed;

        if let Some(new_status) = update.status {
            check_transition(report.status, new_status)?;
            report.status = new_status;
        }
        if let Some(title) = update.title {
            report.title = title;
        }
        if let Some(priority) = update.priority {
            report.priority = priority;
        }
        if let Some(deadline) = update.deadline_date {
            report.deadline_date = deadline;
        }
        if let Some(content) = update.content {
            report.content = content;
        }

        let now = chrono::Local::now().naive_local();
        report.updated_at = now;
        report.completed_at = if report.status == ReportStatus::Completed {
            report.completed_at.or(Some(now))
        } else {
            None
        };
        update_report(self.conn, &report)?;

        if report.status == ReportStatus::Completed && !was_completed {
            self.sync_instance_completed(&report);
            self.emit_completion_notification(&report, now);
        }
        Ok(report)
    }

    fn sync_instance_completed(&self, report: &Report) {
        let result = get_instance_for_report(self.conn, &report.id).and_then(|instance| {
            let Some(mut instance) = instance else {
                return Ok(());
            };
            instance.status = InstanceStatus::Completed;
            instance.updated_at = chrono::Local::now().naive_local();
            update_instance(self.conn, &instance)
        });
        if let Err(e) = result {
            tracing::warn!(report = %report.id, "instance completion sync failed: {e}");
        }
    }

    fn emit_completion_notification(&self, report: &Report, now: chrono::NaiveDateTime) {
        let Some(requester) = report.requested_by.as_deref() else {
            return;
        };
        let notification = Notification {
            id: Uuid::new_v4(),
            report_id: report.id,
            recipient_id: requester.to_string(),
            notification_type: NotificationType::Completion,
            message: format!("Report completed: {}", report.title),
            is_read: false,
            created_at: now,
            read_at: None,
        };
        if let Err(e) = insert_notification(self.conn, &notification) {
            tracing::warn!(report = %report.id, "completion notification failed: {e}");
        }
    }

    // -----------------------------------------------------------------
    // Per-therapist completion
    // -----------------------------------------------------------------

    /// Record that an assignee finished their portion. Never flips the
    /// report itself to completed — full completion is an explicit,
    /// caller-driven status update (human sign-off gate).
    pub fn complete_portion(
        &self,
        report_id: &Uuid,
        therapist_id: &str,
        notes: Option<String>,
    ) -> Result<ReportCompletion, WorkflowError> {
        let report = self.get_report(report_id)?;
        if !report
            .assigned_therapist_ids
            .iter()
            .any(|t| t == therapist_id)
        {
            return Err(WorkflowError::forbidden(format!(
                "therapist {therapist_id} is not assigned to this report"
            )));
        }

        let completion = ReportCompletion {
            id: Uuid::new_v4(),
            report_id: *report_id,
            therapist_id: therapist_id.to_string(),
            completed_at: chrono::Local::now().naive_local(),
            notes,
        };
        insert_completion(self.conn, &completion)?;
        tracing::info!(report = %report_id, therapist_id, "portion completed");
        Ok(completion)
    }

    /// Retract the calling therapist's completion. No status change.
    pub fn remove_completion(
        &self,
        report_id: &Uuid,
        therapist_id: &str,
    ) -> Result<bool, WorkflowError> {
        self.get_report(report_id)?;
        Ok(delete_completion(self.conn, report_id, therapist_id)?)
    }

    pub fn get_completion_status(&self, report_id: &Uuid) -> Result<CompletionStatus, WorkflowError> {
        let report = self.get_report(report_id)?;
        let completions = get_completions(self.conn, report_id)?;

        let total = report.assigned_therapist_ids.len();
        let completed = completions.len();
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Ok(CompletionStatus {
            total_therapists: total,
            completed_count: completed,
            percentage,
            is_fully_completed: total > 0 && completed >= total,
            completions,
        })
    }

    // -----------------------------------------------------------------
    // Reassignment
    // -----------------------------------------------------------------

    /// Replace the assignee roster. Clears every completion row, resets
    /// status to pending and propagates the new roster to the instance —
    /// all inside one transaction, so reassignment wins any race with a
    /// concurrent completion.
    pub fn reassign(
        &self,
        report_id: &Uuid,
        new_therapist_ids: Vec<String>,
    ) -> Result<Report, WorkflowError> {
        if new_therapist_ids.is_empty() {
            return Err(WorkflowError::validation(vec![
                "at least one therapist must be assigned".to_string(),
            ]));
        }
        let mut report = self.get_report(report_id)?;
        if report.status == ReportStatus::Cancelled {
            return Err(WorkflowError::Conflict(
                "cannot reassign a cancelled report".into(),
            ));
        }

        let tx = self.conn.unchecked_transaction().map_err(|e| {
            WorkflowError::Storage(crate::db::DatabaseError::Sqlite(e))
        })?;

        let cleared = delete_all_completions(self.conn, report_id)?;
        report.assigned_therapist_ids = new_therapist_ids;
        report.status = ReportStatus::Pending;
        report.completed_at = None;
        report.updated_at = chrono::Local::now().naive_local();
        update_report(self.conn, &report)?;

        if let Some(mut instance) = get_instance_for_report(self.conn, report_id)? {
            instance.assigned_therapist_ids = report.assigned_therapist_ids.clone();
            instance.updated_at = report.updated_at;
            update_instance(self.conn, &instance)?;
        }

        tx.commit()
            .map_err(|e| WorkflowError::Storage(crate::db::DatabaseError::Sqlite(e)))?;
        tracing::info!(report = %report_id, cleared, "report reassigned");
        Ok(report)
    }

    // -----------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------

    /// Cascading delete: notifications, completions and the instance go
    /// with the report. Returns false when the row was already gone.
    pub fn delete_report(&self, id: &Uuid, caller: &str) -> Result<bool, WorkflowError> {
        require(self.permissions, caller, Capability::DeleteReport)?;
        Ok(delete_report(self.conn, id)?)
    }

    // -----------------------------------------------------------------
    // Classification & analytics
    // -----------------------------------------------------------------

    pub fn classify(&self, report: &Report) -> ReportClassification {
        classify_as_of(report, chrono::Local::now().date_naive())
    }

    pub fn report_analytics(&self, user_id: &str) -> Result<ReportAnalytics, WorkflowError> {
        let reports = self.list_reports_for_user(user_id)?;
        let today = chrono::Local::now().date_naive();

        let mut analytics = ReportAnalytics {
            total: reports.len(),
            pending: 0,
            in_progress: 0,
            completed: 0,
            overdue: 0,
            completion_rate: 0.0,
            avg_completion_days: 0.0,
        };
        let mut completion_days_sum = 0.0;

        for report in &reports {
            match report.status {
                ReportStatus::Pending => analytics.pending += 1,
                ReportStatus::InProgress => analytics.in_progress += 1,
                ReportStatus::Completed => analytics.completed += 1,
                ReportStatus::Cancelled => {}
            }
            if classify_as_of(report, today).is_overdue {
                analytics.overdue += 1;
            }
            if let Some(completed_at) = report.completed_at {
                completion_days_sum +=
                    (completed_at - report.created_at).num_seconds() as f64 / 86_400.0;
            }
        }

        if analytics.total > 0 {
            analytics.completion_rate = analytics.completed as f64 / analytics.total as f64 * 100.0;
        }
        if analytics.completed > 0 {
            analytics.avg_completion_days = completion_days_sum / analytics.completed as f64;
        }
        Ok(analytics)
    }

    // -----------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------

    pub fn notifications_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, WorkflowError> {
        Ok(list_notifications(self.conn, recipient_id, unread_only)?)
    }

    pub fn mark_notification_read(&self, id: &Uuid) -> Result<bool, WorkflowError> {
        Ok(mark_notification_read(
            self.conn,
            id,
            chrono::Local::now().naive_local(),
        )?)
    }

    /// Emit `overdue` notifications to every assignee of an overdue
    /// report. Caller-driven, intended for a polling sweep.
    pub fn notify_overdue(&self, report_id: &Uuid) -> Result<usize, WorkflowError> {
        let report = self.get_report(report_id)?;
        let classification = self.classify(&report);
        if !classification.is_overdue {
            return Ok(0);
        }

        let now = chrono::Local::now().naive_local();
        let mut sent = 0;
        for assignee in &report.assigned_therapist_ids {
            let notification = Notification {
                id: Uuid::new_v4(),
                report_id: report.id,
                recipient_id: assignee.clone(),
                notification_type: NotificationType::Overdue,
                message: format!(
                    "Report overdue by {} day(s): {}",
                    classification.days_overdue, report.title
                ),
                is_read: false,
                created_at: now,
                read_at: None,
            };
            insert_notification(self.conn, &notification)?;
            sent += 1;
        }
        Ok(sent)
    }
}

/// Legal status transitions. Terminal states accept nothing; `pending`
/// may not be re-entered except through reassignment.
fn check_transition(from: ReportStatus, to: ReportStatus) -> Result<(), WorkflowError> {
    if from == to {
        return Ok(());
    }
    let legal = match (from, to) {
        (ReportStatus::Pending, ReportStatus::InProgress)
        | (ReportStatus::Pending, ReportStatus::Completed)
        | (ReportStatus::Pending, ReportStatus::Cancelled)
        | (ReportStatus::InProgress, ReportStatus::Completed)
        | (ReportStatus::InProgress, ReportStatus::Cancelled) => true,
        _ => false,
    };
    if legal {
        Ok(())
    } else {
        Err(WorkflowError::Conflict(format!(
            "illegal status transition {} -> {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

/// Urgency/overdue classification relative to `today`. Derived, never
/// stored: urgent means high priority or a deadline within one calendar
/// day; overdue means a missed deadline on a non-terminal report.
pub fn classify_as_of(report: &Report, today: NaiveDate) -> ReportClassification {
    let near_deadline = report
        .deadline_date
        .is_some_and(|deadline| deadline <= today + Duration::days(1));
    let is_urgent = report.priority == Priority::High || near_deadline;

    let overdue_days = match report.deadline_date {
        Some(deadline) if deadline < today && !report.status.is_terminal() => {
            (today - deadline).num_days()
        }
        _ => 0,
    };

    ReportClassification {
        is_urgent,
        is_overdue: overdue_days > 0,
        days_overdue: overdue_days,
    }
}
