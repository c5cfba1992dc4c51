//! Clinical report workflow engine.
//!
//! The engineering core of a practice-management backend: a multi-party
//! report approval/completion process over a schema-driven template
//! system, backed by a time-bounded AI-content cache. Patient, therapist
//! and billing CRUD live elsewhere and reach this crate only through the
//! collaborator traits in [`providers`].
//!
//! Storage is a single SQLite database; a `&rusqlite::Connection` handle
//! is injected into each component, scoped to the process.

pub mod ai_cache;
pub mod authorization;
pub mod autopopulate;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod providers;
pub mod registry;
pub mod validator;
pub mod workflow;

pub use ai_cache::AiCache;
pub use errors::WorkflowError;
pub use registry::TemplateRegistry;
pub use validator::validate_field_schema;
pub use workflow::ReportWorkflow;
