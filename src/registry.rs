//! Template definitions, versions and the approval workflow.
//!
//! Every mutation goes through a role check against the injected
//! `PermissionProvider`. Updates always bump the version before applying
//! changes and leave a snapshot behind, so `revert` can restore any prior
//! schema. A template referenced by a report can never be hard-deleted or
//! deactivated.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::authorization::{require, Capability, PermissionProvider};
use crate::db::repository::{
    delete_template, get_template, get_template_version, insert_template, insert_template_version,
    list_template_versions, list_templates, template_is_referenced, update_template,
};
use crate::errors::WorkflowError;
use crate::models::enums::{ApprovalStatus, TemplateType};
use crate::models::{Template, TemplateVersion};
use crate::validator::validate_field_schema;

#[derive(Debug, Clone)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub description: String,
    pub template_type: TemplateType,
    pub practice_id: Option<String>,
    pub fields: Map<String, Value>,
    pub sections: Vec<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Map<String, Value>>,
    pub sections: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

pub struct TemplateRegistry<'a> {
    conn: &'a Connection,
    permissions: &'a dyn PermissionProvider,
}

impl<'a> TemplateRegistry<'a> {
    pub fn new(conn: &'a Connection, permissions: &'a dyn PermissionProvider) -> Self {
        Self { conn, permissions }
    }

    pub fn create(
        &self,
        request: CreateTemplateRequest,
        caller: &str,
    ) -> Result<Template, WorkflowError> {
        require(self.permissions, caller, Capability::CreateTemplate)?;
        validate_schema_and_sections(&request.fields, &request.sections)?;

        let now = chrono::Local::now().naive_local();
        let template = Template {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            template_type: request.template_type,
            practice_id: request.practice_id,
            fields: request.fields,
            sections: request.sections,
            is_active: true,
            version: 1,
            approval_status: ApprovalStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        insert_template(self.conn, &template)?;
        snapshot(self.conn, &template, Some(caller), now)?;
        tracing::info!(template = %template.id, name = template.name, "template created");
        Ok(template)
    }

    pub fn get(&self, id: &Uuid) -> Result<Template, WorkflowError> {
        get_template(self.conn, id)?
            .ok_or_else(|| WorkflowError::not_found("template", id.to_string()))
    }

    pub fn list(
        &self,
        practice_id: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<Template>, WorkflowError> {
        Ok(list_templates(self.conn, practice_id, active_only)?)
    }

    /// Apply a partial update. The version is bumped before the changes
    /// land, and the resulting schema is re-validated as a whole.
    pub fn update(
        &self,
        id: &Uuid,
        update: TemplateUpdate,
        caller: &str,
    ) -> Result<Template, WorkflowError> {
        require(self.permissions, caller, Capability::EditTemplate)?;
        let mut template = self.get(id)?;

        if update.is_active == Some(false) && template_is_referenced(self.conn, id)? {
            return Err(WorkflowError::Conflict(
                "template is referenced by existing reports".into(),
            ));
        }

        template.version += 1;
        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(description) = update.description {
            template.description = description;
        }
        if let Some(fields) = update.fields {
            template.fields = fields;
        }
        if let Some(sections) = update.sections {
            template.sections = sections;
        }
        if let Some(is_active) = update.is_active {
            template.is_active = is_active;
        }
        validate_schema_and_sections(&template.fields, &template.sections)?;

        let now = chrono::Local::now().naive_local();
        template.updated_at = now;
        update_template(self.conn, &template)?;
        snapshot(self.conn, &template, Some(caller), now)?;
        tracing::info!(template = %template.id, version = template.version, "template updated");
        Ok(template)
    }

    /// Hard delete, refused while any report references the template.
    pub fn delete(&self, id: &Uuid, caller: &str) -> Result<bool, WorkflowError> {
        require(self.permissions, caller, Capability::EditTemplate)?;
        if template_is_referenced(self.conn, id)? {
            return Err(WorkflowError::Conflict(
                "template is referenced by existing reports".into(),
            ));
        }
        Ok(delete_template(self.conn, id)?)
    }

    // -----------------------------------------------------------------
    // Approval workflow
    // -----------------------------------------------------------------

    /// Cut a new version awaiting approval.
    pub fn create_version(&self, id: &Uuid, caller: &str) -> Result<Template, WorkflowError> {
        require(self.permissions, caller, Capability::EditTemplate)?;
        let mut template = self.get(id)?;

        template.version += 1;
        template.approval_status = ApprovalStatus::PendingApproval;
        let now = chrono::Local::now().naive_local();
        template.updated_at = now;
        update_template(self.conn, &template)?;
        snapshot(self.conn, &template, Some(caller), now)?;
        Ok(template)
    }

    /// Approve a specific version, activating the template.
    pub fn approve(&self, id: &Uuid, version: i64, caller: &str) -> Result<Template, WorkflowError> {
        require(self.permissions, caller, Capability::ApproveTemplate)?;
        let mut template = self.get(id)?;

        if get_template_version(self.conn, id, version)?.is_none() {
            return Err(WorkflowError::not_found(
                "template version",
                format!("{id} v{version}"),
            ));
        }
        if version != template.version {
            return Err(WorkflowError::Conflict(format!(
                "version {version} is not the current version {}",
                template.version
            )));
        }

        template.approval_status = ApprovalStatus::Approved;
        template.is_active = true;
        template.updated_at = chrono::Local::now().naive_local();
        update_template(self.conn, &template)?;
        tracing::info!(template = %template.id, version, approver = caller, "template approved");
        Ok(template)
    }

    /// Restore the schema of a prior version. Lands as a fresh version so
    /// the history stays linear.
    pub fn revert(&self, id: &Uuid, version: i64, caller: &str) -> Result<Template, WorkflowError> {
        require(self.permissions, caller, Capability::EditTemplate)?;
        let mut template = self.get(id)?;

        let Some(prior) = get_template_version(self.conn, id, version)? else {
            return Err(WorkflowError::not_found(
                "template version",
                format!("{id} v{version}"),
            ));
        };

        template.version += 1;
        template.fields = prior.fields;
        template.sections = prior.sections;
        template.approval_status = ApprovalStatus::Draft;
        let now = chrono::Local::now().naive_local();
        template.updated_at = now;
        update_template(self.conn, &template)?;
        snapshot(self.conn, &template, Some(caller), now)?;
        tracing::info!(template = %template.id, restored = version, "template reverted");
        Ok(template)
    }

    pub fn versions(&self, id: &Uuid) -> Result<Vec<i64>, WorkflowError> {
        Ok(list_template_versions(self.conn, id)?)
    }
}

fn validate_schema_and_sections(
    fields: &Map<String, Value>,
    sections: &[String],
) -> Result<(), WorkflowError> {
    let mut validation = validate_field_schema(fields);
    for section in sections {
        if !fields.contains_key(section) {
            validation
                .errors
                .push(format!("section '{section}' has no matching field definition"));
        }
    }
    if validation.errors.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::validation(validation.errors))
    }
}

fn snapshot(
    conn: &Connection,
    template: &Template,
    created_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<(), WorkflowError> {
    insert_template_version(
        conn,
        &TemplateVersion {
            id: Uuid::new_v4(),
            template_id: template.id,
            version: template.version,
            fields: template.fields.clone(),
            sections: template.sections.clone(),
            created_by: created_by.map(String::from),
            created_at: now,
        },
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Read-only HTML-ish rendering of a template schema, optionally filled
/// with sample data, for author review. Pure function, no persistence.
pub fn preview(template: &Template, sample_data: Option<&Map<String, Value>>) -> String {
    let mut out = String::new();
    out.push_str(&format!("<h1>{}</h1>\n", template.name));

    let ordered: Vec<&String> = if template.sections.is_empty() {
        template.fields.keys().collect()
    } else {
        template.sections.iter().collect()
    };

    for field_name in ordered {
        let Some(def) = template.fields.get(field_name).and_then(Value::as_object) else {
            continue;
        };
        let label = def
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or(field_name);
        let value = sample_data
            .and_then(|data| data.get(field_name))
            .map(render_value)
            .unwrap_or_else(|| format!("[{}]", def.get("type").and_then(Value::as_str).unwrap_or("field")));
        out.push_str(&format!(
            "<section><h2>{label}</h2><div>{value}</div></section>\n"
        ));
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
