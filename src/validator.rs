//! Template field-schema validator.
//!
//! Checks a map of field-name → field definition against the closed
//! field-type set and the per-type contracts. Accumulates every problem
//! instead of stopping at the first, so one call reports the full list.
//! Pure function, no side effects; the registry runs it on create/update
//! and it is exposed directly for client-submitted schema edits.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::enums::FieldType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaValidation {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl SchemaValidation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { ok: errors.is_empty(), errors }
    }
}

pub fn validate_field_schema(fields: &Map<String, Value>) -> SchemaValidation {
    let mut errors = Vec::new();

    for (name, definition) in fields {
        validate_field(name, definition, &mut errors);
    }

    SchemaValidation::from_errors(errors)
}

fn validate_field(name: &str, definition: &Value, errors: &mut Vec<String>) {
    let Some(def) = definition.as_object() else {
        errors.push(format!("field '{name}' must be an object"));
        return;
    };

    let field_type = def.get("type").and_then(Value::as_str);
    if field_type.is_none() {
        errors.push(format!("field '{name}' is missing required property 'type'"));
    }
    if def.get("label").and_then(Value::as_str).is_none() {
        errors.push(format!("field '{name}' is missing required property 'label'"));
    }

    let Some(type_str) = field_type else {
        return;
    };
    let Ok(field_type) = FieldType::from_str(type_str) else {
        errors.push(format!("field '{name}' has unknown type '{type_str}'"));
        return;
    };

    match field_type {
        FieldType::MultipleChoice => {
            if !has_non_empty_array(def, "options") {
                errors.push(format!(
                    "field '{name}' of type multiple_choice requires a non-empty 'options' list"
                ));
            }
        }
        FieldType::StructuredTable => {
            if !has_non_empty_array(def, "columns") {
                errors.push(format!(
                    "field '{name}' of type structured_table requires a non-empty 'columns' list"
                ));
            }
        }
        FieldType::AiParagraph => {
            if def.get("ai_source").is_none() {
                errors.push(format!(
                    "field '{name}' of type ai_paragraph requires an 'ai_source' property"
                ));
            }
        }
        _ => {}
    }
}

fn has_non_empty_array(def: &Map<String, Value>, key: &str) -> bool {
    def.get(key)
        .and_then(Value::as_array)
        .is_some_and(|arr| !arr.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn valid_schema_passes() {
        let fields = schema(&[
            ("summary", json!({"type": "paragraph", "label": "Summary"})),
            (
                "mobility",
                json!({"type": "multiple_choice", "label": "Mobility", "options": ["independent", "assisted"]}),
            ),
            (
                "goals",
                json!({"type": "structured_table", "label": "Goals", "columns": ["goal", "status"]}),
            ),
            (
                "history",
                json!({"type": "ai_paragraph", "label": "History", "ai_source": "clinical_notes"}),
            ),
        ]);
        let result = validate_field_schema(&fields);
        assert!(result.ok, "errors: {:?}", result.errors);
    }

    #[test]
    fn non_object_definition_is_rejected() {
        let fields = schema(&[("summary", json!("paragraph"))]);
        let result = validate_field_schema(&fields);
        assert!(!result.ok);
        assert_eq!(result.errors, vec!["field 'summary' must be an object"]);
    }

    #[test]
    fn missing_type_and_label_both_reported() {
        let fields = schema(&[("summary", json!({}))]);
        let result = validate_field_schema(&fields);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("'type'"));
        assert!(result.errors[1].contains("'label'"));
    }

    #[test]
    fn unknown_type_named_in_error() {
        let fields = schema(&[("widget", json!({"type": "hologram", "label": "W"}))]);
        let result = validate_field_schema(&fields);
        assert_eq!(result.errors, vec!["field 'widget' has unknown type 'hologram'"]);
    }

    #[test]
    fn empty_options_is_an_error() {
        let fields = schema(&[(
            "choice",
            json!({"type": "multiple_choice", "label": "C", "options": []}),
        )]);
        let result = validate_field_schema(&fields);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("options"));
    }

    #[test]
    fn three_independent_errors_reported_in_one_call() {
        // Unknown type + missing label + missing options: all three must
        // come back together, not just the first.
        let fields = schema(&[
            ("a_bad_type", json!({"type": "hologram", "label": "A"})),
            ("b_no_label", json!({"type": "paragraph"})),
            ("c_no_options", json!({"type": "multiple_choice", "label": "C"})),
        ]);
        let result = validate_field_schema(&fields);
        assert!(!result.ok);
        assert_eq!(result.errors.len(), 3, "errors: {:?}", result.errors);
    }

    #[test]
    fn empty_schema_is_valid() {
        let result = validate_field_schema(&Map::new());
        assert!(result.ok);
        assert!(result.errors.is_empty());
    }
}
