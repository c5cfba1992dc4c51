//! External collaborator interfaces: patient data and AI content generation.
//!
//! Implementations live outside this crate (the practice-management CRUD
//! layer and the model runtime). Everything here is best-effort from the
//! workflow's point of view: a generator failure never fails report
//! creation — call sites log and leave the affected field empty.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::enums::ContentType;

/// One clinical note attached to a patient, newest-first ordering is the
/// provider's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub note_text: String,
    pub discipline: Option<String>,
    pub recorded_at: NaiveDateTime,
}

/// A therapist currently treating the patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatingTherapist {
    pub first_name: String,
    pub last_name: String,
    pub profession: String,
}

/// Everything auto-population needs about one patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientBundle {
    pub patient_id: String,
    /// Flat attribute map (first_name, date_of_birth, ...).
    pub demographics: Map<String, Value>,
    /// Booking dates; the earliest is treated as the admission date.
    pub admission_dates: Vec<NaiveDate>,
    /// Raw diagnosis code list, JSON array or comma separated.
    pub diagnosis_codes: Option<String>,
    pub clinical_notes: Vec<ClinicalNote>,
    pub treating_therapists: Vec<TreatingTherapist>,
}

/// Patient data provider (§ external collaborators). The CRUD side of the
/// application implements this over its own tables.
pub trait PatientDataProvider {
    fn patient_for_autopopulation(&self, patient_id: &str) -> Result<PatientBundle, ProviderError>;
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("patient not found: {0}")]
    PatientNotFound(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Output of one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
    /// Where the content came from (model name, "cache", ...).
    pub source: String,
    pub tokens_used: u32,
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

/// AI generator collaborator. Must be safely callable with no guaranteed
/// success; callers treat every error as absent content.
pub trait ClinicalContentGenerator {
    fn generate(
        &self,
        prompt: &str,
        patient_context: &str,
        content_type: ContentType,
    ) -> Result<GeneratedContent, GeneratorError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::RefCell;

    /// Generator stub: either echoes a canned response or always fails.
    pub struct StubGenerator {
        pub response: Option<String>,
        pub calls: RefCell<Vec<ContentType>>,
    }

    impl StubGenerator {
        pub fn responding(text: &str) -> Self {
            Self {
                response: Some(text.to_string()),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                response: None,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    /// Patient provider stub serving one fixed bundle.
    pub struct StubPatients {
        pub bundle: PatientBundle,
    }

    impl PatientDataProvider for StubPatients {
        fn patient_for_autopopulation(
            &self,
            _patient_id: &str,
        ) -> Result<PatientBundle, ProviderError> {
            Ok(self.bundle.clone())
        }
    }

    impl ClinicalContentGenerator for StubGenerator {
        fn generate(
            &self,
            _prompt: &str,
            _patient_context: &str,
            content_type: ContentType,
        ) -> Result<GeneratedContent, GeneratorError> {
            self.calls.borrow_mut().push(content_type);
            match &self.response {
                Some(text) => Ok(GeneratedContent {
                    content: text.clone(),
                    source: "stub".into(),
                    tokens_used: 42,
                }),
                None => Err(GeneratorError::Unavailable("stub offline".into())),
            }
        }
    }
}
