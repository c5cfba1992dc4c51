//! Service-level error taxonomy shared by the workflow and registry.
//!
//! Validation failures always carry the full list of violations, never just
//! the first. Conflicts (duplicate completion, duplicate template name) are
//! distinct from validation. Collaborator failures convert to
//! `DependencyUnavailable`; creation paths log it and degrade to empty
//! content rather than propagating.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::providers::{GeneratorError, ProviderError};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator (patient data provider, AI generator) failed.
    /// Creation paths log this and continue with empty content; it only
    /// propagates from operations that exist solely to call the
    /// collaborator.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("storage error: {0}")]
    Storage(DatabaseError),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden { reason: reason.into() }
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Self::ValidationFailed { errors }
    }
}

impl From<ProviderError> for WorkflowError {
    fn from(err: ProviderError) -> Self {
        WorkflowError::DependencyUnavailable(err.to_string())
    }
}

impl From<GeneratorError> for WorkflowError {
    fn from(err: GeneratorError) -> Self {
        WorkflowError::DependencyUnavailable(err.to_string())
    }
}

impl From<DatabaseError> for WorkflowError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { id, .. } => {
                WorkflowError::NotFound { entity: "record", id }
            }
            DatabaseError::ConstraintViolation(msg) => WorkflowError::Conflict(msg),
            other => WorkflowError::Storage(other),
        }
    }
}
