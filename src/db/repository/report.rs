use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::sqlite::{DATETIME_FORMAT, DATE_FORMAT};
use crate::db::DatabaseError;
use crate::models::enums::{Priority, ReportStatus};
use crate::models::Report;

const REPORT_COLUMNS: &str = "id, patient_id, report_type, template_id, title, status, priority,
     assigned_therapist_ids, disciplines, requested_by, deadline_date, content,
     ai_generated_sections, created_at, updated_at, completed_at";

pub fn insert_report(conn: &Connection, report: &Report) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reports (id, patient_id, report_type, template_id, title, status, priority,
         assigned_therapist_ids, disciplines, requested_by, deadline_date, content,
         ai_generated_sections, created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            report.id.to_string(),
            report.patient_id,
            report.report_type,
            report.template_id.map(|id| id.to_string()),
            report.title,
            report.status.as_str(),
            report.priority.as_i64(),
            serde_json::to_string(&report.assigned_therapist_ids).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&report.disciplines).unwrap_or_else(|_| "[]".into()),
            report.requested_by,
            report.deadline_date.map(|d| d.format(DATE_FORMAT).to_string()),
            Value::Object(report.content.clone()).to_string(),
            report
                .ai_generated_sections
                .as_ref()
                .map(|m| Value::Object(m.clone()).to_string()),
            report.created_at.format(DATETIME_FORMAT).to_string(),
            report.updated_at.format(DATETIME_FORMAT).to_string(),
            report
                .completed_at
                .map(|dt| dt.format(DATETIME_FORMAT).to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_report(conn: &Connection, id: &Uuid) -> Result<Option<Report>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id.to_string()], report_row_from_rusqlite)?;
    match rows.next() {
        Some(row) => Ok(Some(report_from_row(row?)?)),
        None => Ok(None),
    }
}

/// Update the mutable portion of a report in place. Status, priority,
/// content, deadline and the completion timestamp all travel together so
/// the `completed_at` ⟺ `completed` invariant stays in one write.
pub fn update_report(conn: &Connection, report: &Report) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE reports SET title = ?2, status = ?3, priority = ?4,
         assigned_therapist_ids = ?5, disciplines = ?6, deadline_date = ?7, content = ?8,
         ai_generated_sections = ?9, updated_at = ?10, completed_at = ?11
         WHERE id = ?1",
        params![
            report.id.to_string(),
            report.title,
            report.status.as_str(),
            report.priority.as_i64(),
            serde_json::to_string(&report.assigned_therapist_ids).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&report.disciplines).unwrap_or_else(|_| "[]".into()),
            report.deadline_date.map(|d| d.format(DATE_FORMAT).to_string()),
            Value::Object(report.content.clone()).to_string(),
            report
                .ai_generated_sections
                .as_ref()
                .map(|m| Value::Object(m.clone()).to_string()),
            report.updated_at.format(DATETIME_FORMAT).to_string(),
            report
                .completed_at
                .map(|dt| dt.format(DATETIME_FORMAT).to_string()),
        ],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "report".into(),
            id: report.id.to_string(),
        });
    }
    Ok(())
}

/// Reports where the user is an assignee or the requester.
pub fn list_reports_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Report>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports
         WHERE requested_by = ?1
            OR EXISTS (SELECT 1 FROM json_each(reports.assigned_therapist_ids)
                       WHERE json_each.value = ?1)
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![user_id], report_row_from_rusqlite)?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(report_from_row(row?)?);
    }
    Ok(reports)
}

pub fn list_reports_for_patient(
    conn: &Connection,
    patient_id: &str,
) -> Result<Vec<Report>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports WHERE patient_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id], report_row_from_rusqlite)?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(report_from_row(row?)?);
    }
    Ok(reports)
}

/// True if any report references the given template.
pub fn template_is_referenced(conn: &Connection, template_id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reports WHERE template_id = ?1",
        params![template_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Delete a report row. Completions, instances and notifications go with it
/// via FK cascade. Returns false when the row was already gone.
pub fn delete_report(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM reports WHERE id = ?1", params![id.to_string()])?;
    Ok(affected > 0)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct ReportRow {
    id: String,
    patient_id: String,
    report_type: String,
    template_id: Option<String>,
    title: String,
    status: String,
    priority: i64,
    assigned_therapist_ids: String,
    disciplines: String,
    requested_by: Option<String>,
    deadline_date: Option<String>,
    content: String,
    ai_generated_sections: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

fn report_row_from_rusqlite(row: &rusqlite::Row) -> Result<ReportRow, rusqlite::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        report_type: row.get(2)?,
        template_id: row.get(3)?,
        title: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        assigned_therapist_ids: row.get(7)?,
        disciplines: row.get(8)?,
        requested_by: row.get(9)?,
        deadline_date: row.get(10)?,
        content: row.get(11)?,
        ai_generated_sections: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

fn report_from_row(raw: ReportRow) -> Result<Report, DatabaseError> {
    Ok(Report {
        id: parse_uuid(&raw.id)?,
        patient_id: raw.patient_id,
        report_type: raw.report_type,
        template_id: raw.template_id.as_deref().map(parse_uuid).transpose()?,
        title: raw.title,
        status: ReportStatus::from_str(&raw.status)?,
        priority: Priority::from_i64(raw.priority)?,
        assigned_therapist_ids: serde_json::from_str(&raw.assigned_therapist_ids)
            .unwrap_or_default(),
        disciplines: serde_json::from_str(&raw.disciplines).unwrap_or_default(),
        requested_by: raw.requested_by,
        deadline_date: raw
            .deadline_date
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        content: parse_json_map(&raw.content),
        ai_generated_sections: raw.ai_generated_sections.as_deref().map(parse_json_map),
        created_at: parse_datetime(&raw.created_at),
        updated_at: parse_datetime(&raw.updated_at),
        completed_at: raw
            .completed_at
            .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok()),
    })
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|_| DatabaseError::InvalidEnum {
        field: "uuid".into(),
        value: s.into(),
    })
}

pub(crate) fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap_or_default()
}

pub(crate) fn parse_json_map(s: &str) -> Map<String, Value> {
    serde_json::from_str(s).unwrap_or_default()
}
