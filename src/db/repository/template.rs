use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::report::{parse_datetime, parse_json_map, parse_uuid};
use crate::db::sqlite::DATETIME_FORMAT;
use crate::db::DatabaseError;
use crate::models::enums::{ApprovalStatus, TemplateType};
use crate::models::{Template, TemplateVersion};

const TEMPLATE_COLUMNS: &str = "id, name, description, template_type, practice_id, fields,
     sections, is_active, version, approval_status, created_at, updated_at";

pub fn insert_template(conn: &Connection, template: &Template) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO templates (id, name, description, template_type, practice_id, fields,
         sections, is_active, version, approval_status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            template.id.to_string(),
            template.name,
            template.description,
            template.template_type.as_str(),
            template.practice_id,
            serde_json::Value::Object(template.fields.clone()).to_string(),
            serde_json::to_string(&template.sections).unwrap_or_else(|_| "[]".into()),
            template.is_active as i32,
            template.version,
            template.approval_status.as_str(),
            template.created_at.format(DATETIME_FORMAT).to_string(),
            template.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )
    .map_err(|e| DatabaseError::from_sqlite(e, "template name already exists in this scope"))?;
    Ok(())
}

pub fn get_template(conn: &Connection, id: &Uuid) -> Result<Option<Template>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id.to_string()], template_row_from_rusqlite)?;
    match rows.next() {
        Some(row) => Ok(Some(template_from_row(row?)?)),
        None => Ok(None),
    }
}

/// Templates visible in a practice scope: the practice's own plus global
/// ones. `practice_id = None` lists only global templates.
pub fn list_templates(
    conn: &Connection,
    practice_id: Option<&str>,
    active_only: bool,
) -> Result<Vec<Template>, DatabaseError> {
    let sql = format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates
         WHERE (practice_id IS NULL OR practice_id = ?1)
           AND (?2 = 0 OR is_active = 1)
         ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![practice_id.unwrap_or(""), active_only as i32],
        template_row_from_rusqlite,
    )?;

    let mut templates = Vec::new();
    for row in rows {
        templates.push(template_from_row(row?)?);
    }
    Ok(templates)
}

pub fn update_template(conn: &Connection, template: &Template) -> Result<(), DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE templates SET name = ?2, description = ?3, template_type = ?4, fields = ?5,
             sections = ?6, is_active = ?7, version = ?8, approval_status = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                template.id.to_string(),
                template.name,
                template.description,
                template.template_type.as_str(),
                serde_json::Value::Object(template.fields.clone()).to_string(),
                serde_json::to_string(&template.sections).unwrap_or_else(|_| "[]".into()),
                template.is_active as i32,
                template.version,
                template.approval_status.as_str(),
                template.updated_at.format(DATETIME_FORMAT).to_string(),
            ],
        )
        .map_err(|e| DatabaseError::from_sqlite(e, "template name already exists in this scope"))?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "template".into(),
            id: template.id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_template(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM templates WHERE id = ?1", params![id.to_string()])?;
    Ok(affected > 0)
}

// ---------------------------------------------------------------------------
// Version snapshots
// ---------------------------------------------------------------------------

pub fn insert_template_version(
    conn: &Connection,
    version: &TemplateVersion,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO template_versions (id, template_id, version, fields, sections, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            version.id.to_string(),
            version.template_id.to_string(),
            version.version,
            serde_json::Value::Object(version.fields.clone()).to_string(),
            serde_json::to_string(&version.sections).unwrap_or_else(|_| "[]".into()),
            version.created_by,
            version.created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )
    .map_err(|e| DatabaseError::from_sqlite(e, "version snapshot already exists"))?;
    Ok(())
}

pub fn get_template_version(
    conn: &Connection,
    template_id: &Uuid,
    version: i64,
) -> Result<Option<TemplateVersion>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, template_id, version, fields, sections, created_by, created_at
         FROM template_versions WHERE template_id = ?1 AND version = ?2",
    )?;
    let mut rows = stmt.query_map(params![template_id.to_string(), version], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;
    match rows.next() {
        Some(row) => {
            let (id, template_id, version, fields, sections, created_by, created_at) = row?;
            Ok(Some(TemplateVersion {
                id: parse_uuid(&id)?,
                template_id: parse_uuid(&template_id)?,
                version,
                fields: parse_json_map(&fields),
                sections: serde_json::from_str(&sections).unwrap_or_default(),
                created_by,
                created_at: parse_datetime(&created_at),
            }))
        }
        None => Ok(None),
    }
}

pub fn list_template_versions(
    conn: &Connection,
    template_id: &Uuid,
) -> Result<Vec<i64>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT version FROM template_versions WHERE template_id = ?1 ORDER BY version",
    )?;
    let rows = stmt.query_map(params![template_id.to_string()], |row| row.get::<_, i64>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct TemplateRow {
    id: String,
    name: String,
    description: String,
    template_type: String,
    practice_id: Option<String>,
    fields: String,
    sections: String,
    is_active: i64,
    version: i64,
    approval_status: String,
    created_at: String,
    updated_at: String,
}

fn template_row_from_rusqlite(row: &rusqlite::Row) -> Result<TemplateRow, rusqlite::Error> {
    Ok(TemplateRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        template_type: row.get(3)?,
        practice_id: row.get(4)?,
        fields: row.get(5)?,
        sections: row.get(6)?,
        is_active: row.get(7)?,
        version: row.get(8)?,
        approval_status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn template_from_row(raw: TemplateRow) -> Result<Template, DatabaseError> {
    Ok(Template {
        id: parse_uuid(&raw.id)?,
        name: raw.name,
        description: raw.description,
        template_type: TemplateType::from_str(&raw.template_type)?,
        practice_id: raw.practice_id,
        fields: parse_json_map(&raw.fields),
        sections: serde_json::from_str(&raw.sections).unwrap_or_default(),
        is_active: raw.is_active != 0,
        version: raw.version,
        approval_status: ApprovalStatus::from_str(&raw.approval_status)?,
        created_at: parse_datetime(&raw.created_at),
        updated_at: parse_datetime(&raw.updated_at),
    })
}
