use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ContentType;

/// A cached AI-generated text block.
///
/// Entries are append-only: regeneration inserts a new row rather than
/// updating in place, keeping an audit trail. Reads resolve to the newest
/// row where `is_valid` holds and `expires_at` is in the future.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCacheEntry {
    pub id: Uuid,
    pub patient_id: String,
    pub content_type: ContentType,
    pub discipline: Option<String>,
    pub content: String,
    /// Hash of the inputs that produced this content.
    pub source_fingerprint: String,
    pub generated_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub usage_count: i64,
    pub last_used_at: Option<NaiveDateTime>,
    pub is_valid: bool,
}

/// Usage accounting across cache entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_usage: i64,
}
