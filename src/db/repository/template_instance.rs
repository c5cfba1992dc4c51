use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::report::{parse_datetime, parse_json_map, parse_uuid};
use crate::db::sqlite::DATETIME_FORMAT;
use crate::db::DatabaseError;
use crate::models::enums::InstanceStatus;
use crate::models::TemplateInstance;

const INSTANCE_COLUMNS: &str = "id, template_id, report_id, patient_id, assigned_therapist_ids,
     instance_data, deleted_sections, status, title, created_at, updated_at";

pub fn insert_instance(conn: &Connection, instance: &TemplateInstance) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO template_instances (id, template_id, report_id, patient_id,
         assigned_therapist_ids, instance_data, deleted_sections, status, title,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            instance.id.to_string(),
            instance.template_id.to_string(),
            instance.report_id.to_string(),
            instance.patient_id,
            serde_json::to_string(&instance.assigned_therapist_ids).unwrap_or_else(|_| "[]".into()),
            serde_json::Value::Object(instance.instance_data.clone()).to_string(),
            serde_json::to_string(&instance.deleted_sections).unwrap_or_else(|_| "[]".into()),
            instance.status.as_str(),
            instance.title,
            instance.created_at.format(DATETIME_FORMAT).to_string(),
            instance.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_instance_for_report(
    conn: &Connection,
    report_id: &Uuid,
) -> Result<Option<TemplateInstance>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM template_instances WHERE report_id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![report_id.to_string()], instance_row_from_rusqlite)?;
    match rows.next() {
        Some(row) => Ok(Some(instance_from_row(row?)?)),
        None => Ok(None),
    }
}

pub fn update_instance(conn: &Connection, instance: &TemplateInstance) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE template_instances SET assigned_therapist_ids = ?2, instance_data = ?3,
         deleted_sections = ?4, status = ?5, title = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            instance.id.to_string(),
            serde_json::to_string(&instance.assigned_therapist_ids).unwrap_or_else(|_| "[]".into()),
            serde_json::Value::Object(instance.instance_data.clone()).to_string(),
            serde_json::to_string(&instance.deleted_sections).unwrap_or_else(|_| "[]".into()),
            instance.status.as_str(),
            instance.title,
            instance.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "template_instance".into(),
            id: instance.id.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct InstanceRow {
    id: String,
    template_id: String,
    report_id: String,
    patient_id: String,
    assigned_therapist_ids: String,
    instance_data: String,
    deleted_sections: String,
    status: String,
    title: String,
    created_at: String,
    updated_at: String,
}

fn instance_row_from_rusqlite(row: &rusqlite::Row) -> Result<InstanceRow, rusqlite::Error> {
    Ok(InstanceRow {
        id: row.get(0)?,
        template_id: row.get(1)?,
        report_id: row.get(2)?,
        patient_id: row.get(3)?,
        assigned_therapist_ids: row.get(4)?,
        instance_data: row.get(5)?,
        deleted_sections: row.get(6)?,
        status: row.get(7)?,
        title: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn instance_from_row(raw: InstanceRow) -> Result<TemplateInstance, DatabaseError> {
    Ok(TemplateInstance {
        id: parse_uuid(&raw.id)?,
        template_id: parse_uuid(&raw.template_id)?,
        report_id: parse_uuid(&raw.report_id)?,
        patient_id: raw.patient_id,
        assigned_therapist_ids: serde_json::from_str(&raw.assigned_therapist_ids)
            .unwrap_or_default(),
        instance_data: parse_json_map(&raw.instance_data),
        deleted_sections: serde_json::from_str(&raw.deleted_sections).unwrap_or_default(),
        status: InstanceStatus::from_str(&raw.status)?,
        title: raw.title,
        created_at: parse_datetime(&raw.created_at),
        updated_at: parse_datetime(&raw.updated_at),
    })
}
