//! Projects patient data into a template's initial instance payload.
//!
//! `populate` is total: it always returns a populated map, even with no
//! field mapping, no clinical notes and no generator. Everything beyond
//! the date seed is best-effort enrichment — AI failures are logged and
//! the field stays empty, never failing report creation.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::db::sqlite::DATE_FORMAT;
use crate::models::enums::ContentType;
use crate::models::Template;
use crate::providers::{ClinicalContentGenerator, PatientBundle};

/// Professions we build treating-therapist name lists for.
pub const KNOWN_DISCIPLINES: &[&str] = &[
    "physiotherapy",
    "occupational_therapy",
    "speech_therapy",
    "psychology",
    "social_work",
    "dietetics",
    "nursing",
];

/// Narrative fields that may be AI-filled. All are pre-seeded empty so the
/// instance always carries the keys.
const AI_ELIGIBLE_FIELDS: &[&str] = &[
    "background_history",
    "medical_status",
    "medical_history",
    "environmental_context",
    "social_context",
    "functional_status",
];

/// The subset actually generated at creation time, and from which cache
/// slot each is served.
const AI_GENERATED_AT_CREATE: &[(&str, ContentType)] = &[
    ("background_history", ContentType::BackgroundHistory),
    ("medical_status", ContentType::MedicalStatus),
];

/// How many of the newest clinical notes feed the generation context.
const CONTEXT_NOTE_LIMIT: usize = 3;

/// True when any creation-time AI field carries generated text, i.e.
/// generation actually ran and succeeded for this payload.
pub fn has_ai_content(data: &Map<String, Value>) -> bool {
    AI_GENERATED_AT_CREATE.iter().any(|(field, _)| {
        data.get(*field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    })
}

pub fn populate(
    template: &Template,
    patient: &PatientBundle,
    code_lookup: &HashMap<String, String>,
    generator: Option<&dyn ClinicalContentGenerator>,
) -> Map<String, Value> {
    let mut data = Map::new();

    let today = chrono::Local::now()
        .date_naive()
        .format(DATE_FORMAT)
        .to_string();
    data.insert("current_date".into(), Value::String(today.clone()));
    data.insert("report_date".into(), Value::String(today));

    apply_field_mapping(template, patient, &mut data);
    apply_derived_fields(patient, code_lookup, &mut data);
    apply_ai_fields(patient, generator, &mut data);

    data
}

/// Copy mapped `patient.*` attributes into the output under their
/// unqualified names, skipping absent or empty values.
fn apply_field_mapping(template: &Template, patient: &PatientBundle, data: &mut Map<String, Value>) {
    for (qualified, attr) in template.auto_population_mapping() {
        let Some(unqualified) = qualified.strip_prefix("patient.") else {
            continue;
        };
        let Some(value) = patient.demographics.get(&attr) else {
            continue;
        };
        if is_empty_value(value) {
            continue;
        }
        data.insert(unqualified.to_string(), value.clone());
    }
}

fn apply_derived_fields(
    patient: &PatientBundle,
    code_lookup: &HashMap<String, String>,
    data: &mut Map<String, Value>,
) {
    if let Some(earliest) = patient.admission_dates.iter().min() {
        data.insert(
            "admission_date".into(),
            Value::String(earliest.format(DATE_FORMAT).to_string()),
        );
    }

    if let Some(raw) = patient.diagnosis_codes.as_deref() {
        let rendered = format_diagnosis_codes(raw, code_lookup);
        if !rendered.is_empty() {
            data.insert("diagnosis_codes".into(), Value::String(rendered));
        }
    }

    for discipline in KNOWN_DISCIPLINES {
        let names: Vec<String> = patient
            .treating_therapists
            .iter()
            .filter(|t| t.profession == *discipline)
            .map(|t| format!("{} {}", t.first_name, t.last_name))
            .collect();
        if !names.is_empty() {
            data.insert(
                format!("{discipline}_therapists"),
                Value::String(names.join(", ")),
            );
        }
    }
}

fn apply_ai_fields(
    patient: &PatientBundle,
    generator: Option<&dyn ClinicalContentGenerator>,
    data: &mut Map<String, Value>,
) {
    for field in AI_ELIGIBLE_FIELDS {
        data.insert(field.to_string(), Value::String(String::new()));
    }

    if patient.clinical_notes.is_empty() {
        return;
    }
    let Some(generator) = generator else {
        return;
    };

    let context = recent_notes_context(patient);
    for (field, content_type) in AI_GENERATED_AT_CREATE {
        let prompt = format!("Summarize the patient's {} from the clinical notes.", field.replace('_', " "));
        match generator.generate(&prompt, &context, *content_type) {
            Ok(generated) => {
                data.insert(field.to_string(), Value::String(generated.content));
            }
            Err(e) => {
                tracing::warn!(
                    patient_id = patient.patient_id,
                    field,
                    "AI generation failed, leaving field empty: {e}"
                );
            }
        }
    }
}

/// Newest clinical notes concatenated into one generation context.
fn recent_notes_context(patient: &PatientBundle) -> String {
    let mut notes: Vec<_> = patient.clinical_notes.iter().collect();
    notes.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    notes
        .iter()
        .take(CONTEXT_NOTE_LIMIT)
        .map(|n| n.note_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse a JSON-array-or-comma-separated code list and render each code as
/// `"CODE: description"` where the lookup knows it, joined with `"; "`.
pub fn format_diagnosis_codes(raw: &str, code_lookup: &HashMap<String, String>) -> String {
    let codes: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(parsed) => parsed,
        Err(_) => raw.split(',').map(str::to_string).collect(),
    };

    codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|code| match code_lookup.get(code) {
            Some(description) => format!("{code}: {description}"),
            None => code.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{ApprovalStatus, TemplateType};
    use crate::providers::test_support::StubGenerator;
    use crate::providers::{ClinicalNote, TreatingTherapist};
    use chrono::NaiveDate;
    use serde_json::json;
    use uuid::Uuid;

    fn make_template(fields: Map<String, Value>) -> Template {
        let now = chrono::Local::now().naive_local();
        Template {
            id: Uuid::new_v4(),
            name: "Discharge".into(),
            description: String::new(),
            template_type: TemplateType::Discharge,
            practice_id: None,
            fields,
            sections: vec![],
            is_active: true,
            version: 1,
            approval_status: ApprovalStatus::Approved,
            created_at: now,
            updated_at: now,
        }
    }

    fn empty_template() -> Template {
        make_template(Map::new())
    }

    #[test]
    fn total_with_empty_inputs() {
        let data = populate(
            &empty_template(),
            &PatientBundle::default(),
            &HashMap::new(),
            None,
        );
        assert!(data.contains_key("current_date"));
        assert!(data.contains_key("report_date"));
        // AI-eligible fields are pre-seeded empty.
        assert_eq!(data.get("background_history"), Some(&json!("")));
        assert_eq!(data.get("medical_status"), Some(&json!("")));
    }

    #[test]
    fn mapped_patient_fields_copied_unqualified() {
        let mut fields = Map::new();
        fields.insert(
            "first_name".into(),
            json!({"type": "auto_populated", "label": "First name", "source": "patient.first_name"}),
        );
        fields.insert(
            "nickname".into(),
            json!({"type": "auto_populated", "label": "Nickname", "source": "patient.nickname"}),
        );
        let template = make_template(fields);

        let mut patient = PatientBundle::default();
        patient.demographics.insert("first_name".into(), json!("Ada"));
        patient.demographics.insert("nickname".into(), json!("  "));

        let data = populate(&template, &patient, &HashMap::new(), None);
        assert_eq!(data.get("first_name"), Some(&json!("Ada")));
        // Empty values are not copied.
        assert!(!data.contains_key("nickname"));
    }

    #[test]
    fn admission_date_is_earliest_booking() {
        let mut patient = PatientBundle::default();
        patient.admission_dates = vec![
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        ];
        let data = populate(&empty_template(), &patient, &HashMap::new(), None);
        assert_eq!(data.get("admission_date"), Some(&json!("2026-01-05")));
    }

    #[test]
    fn diagnosis_codes_json_and_comma_forms() {
        let lookup: HashMap<String, String> = [
            ("S72.0".to_string(), "Fracture of neck of femur".to_string()),
        ]
        .into();

        assert_eq!(
            format_diagnosis_codes(r#"["S72.0", "I10"]"#, &lookup),
            "S72.0: Fracture of neck of femur; I10"
        );
        assert_eq!(
            format_diagnosis_codes("S72.0, I10", &lookup),
            "S72.0: Fracture of neck of femur; I10"
        );
        assert_eq!(format_diagnosis_codes("", &lookup), "");
    }

    #[test]
    fn therapists_grouped_by_discipline() {
        let mut patient = PatientBundle::default();
        patient.treating_therapists = vec![
            TreatingTherapist {
                first_name: "Jo".into(),
                last_name: "Khumalo".into(),
                profession: "physiotherapy".into(),
            },
            TreatingTherapist {
                first_name: "Sam".into(),
                last_name: "Naidoo".into(),
                profession: "physiotherapy".into(),
            },
            TreatingTherapist {
                first_name: "Kim".into(),
                last_name: "Botha".into(),
                profession: "speech_therapy".into(),
            },
        ];
        let data = populate(&empty_template(), &patient, &HashMap::new(), None);
        assert_eq!(
            data.get("physiotherapy_therapists"),
            Some(&json!("Jo Khumalo, Sam Naidoo"))
        );
        assert_eq!(data.get("speech_therapy_therapists"), Some(&json!("Kim Botha")));
        assert!(!data.contains_key("psychology_therapists"));
    }

    fn patient_with_notes() -> PatientBundle {
        let mut patient = PatientBundle::default();
        patient.patient_id = "P1".into();
        patient.clinical_notes = vec![ClinicalNote {
            note_text: "Patient mobilizing with walker.".into(),
            discipline: Some("physiotherapy".into()),
            recorded_at: chrono::Local::now().naive_local(),
        }];
        patient
    }

    #[test]
    fn ai_fields_generated_when_notes_exist() {
        let generator = StubGenerator::responding("Generated narrative.");
        let data = populate(
            &empty_template(),
            &patient_with_notes(),
            &HashMap::new(),
            Some(&generator),
        );
        assert_eq!(data.get("background_history"), Some(&json!("Generated narrative.")));
        assert_eq!(data.get("medical_status"), Some(&json!("Generated narrative.")));
        // Only the creation-time subset is generated.
        assert_eq!(data.get("medical_history"), Some(&json!("")));
        assert_eq!(generator.calls.borrow().len(), 2);
        assert!(has_ai_content(&data));
    }

    #[test]
    fn no_generation_without_notes() {
        let generator = StubGenerator::responding("Should not appear.");
        let data = populate(
            &empty_template(),
            &PatientBundle::default(),
            &HashMap::new(),
            Some(&generator),
        );
        assert_eq!(data.get("background_history"), Some(&json!("")));
        assert!(generator.calls.borrow().is_empty());
    }

    #[test]
    fn generator_failure_leaves_fields_empty() {
        let generator = StubGenerator::failing();
        let data = populate(
            &empty_template(),
            &patient_with_notes(),
            &HashMap::new(),
            Some(&generator),
        );
        assert_eq!(data.get("background_history"), Some(&json!("")));
        assert_eq!(data.get("medical_status"), Some(&json!("")));
        assert!(!has_ai_content(&data));
    }
}
