//! Time-bounded cache for AI-generated clinical text.
//!
//! Append-only log keyed by (patient, content type, discipline): every
//! regeneration inserts a new row and reads resolve to the newest valid
//! one, keeping an audit trail of what was generated when. Invalidation
//! is primarily TTL expiry; `invalidate` exists as an operator override.
//! Cache unavailability never blocks the caller — `get_or_miss` degrades
//! storage errors to a miss.

use chrono::Duration;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::repository::{
    cache_stats, get_newest_valid_entry, insert_cache_entry, invalidate_entries,
    purge_expired_entries, touch_cache_entry,
};
use crate::db::DatabaseError;
use crate::models::enums::ContentType;
use crate::models::{AiCacheEntry, CacheStats};

/// Entries live this long unless the caller asks otherwise.
pub const DEFAULT_TTL_DAYS: i64 = 7;

pub struct AiCache<'a> {
    conn: &'a Connection,
}

impl<'a> AiCache<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Newest valid entry for the key, or None. A hit bumps the usage
    /// count and touches last-used.
    pub fn get(
        &self,
        patient_id: &str,
        content_type: ContentType,
        discipline: Option<&str>,
    ) -> Result<Option<AiCacheEntry>, DatabaseError> {
        let now = chrono::Local::now().naive_local();
        let Some(entry) =
            get_newest_valid_entry(self.conn, patient_id, &content_type, discipline, now)?
        else {
            return Ok(None);
        };
        touch_cache_entry(self.conn, &entry.id, now)?;
        Ok(Some(AiCacheEntry {
            usage_count: entry.usage_count + 1,
            last_used_at: Some(now),
            ..entry
        }))
    }

    /// Like `get`, but storage failures degrade to a miss so the caller
    /// can fall through to regeneration.
    pub fn get_or_miss(
        &self,
        patient_id: &str,
        content_type: ContentType,
        discipline: Option<&str>,
    ) -> Option<AiCacheEntry> {
        match self.get(patient_id, content_type, discipline) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    patient_id,
                    content_type = content_type.as_str(),
                    "AI cache lookup failed, treating as miss: {e}"
                );
                None
            }
        }
    }

    /// Store newly generated content with the default TTL.
    pub fn put(
        &self,
        patient_id: &str,
        content_type: ContentType,
        content: &str,
        discipline: Option<&str>,
    ) -> Result<Uuid, DatabaseError> {
        self.put_with_ttl(patient_id, content_type, content, discipline, DEFAULT_TTL_DAYS)
    }

    /// Store newly generated content. Always inserts a fresh row; the
    /// previous generation stays behind as history.
    pub fn put_with_ttl(
        &self,
        patient_id: &str,
        content_type: ContentType,
        content: &str,
        discipline: Option<&str>,
        ttl_days: i64,
    ) -> Result<Uuid, DatabaseError> {
        let now = chrono::Local::now().naive_local();
        let entry = AiCacheEntry {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            content_type,
            discipline: discipline.map(String::from),
            content: content.to_string(),
            source_fingerprint: source_fingerprint(patient_id, content_type, discipline),
            generated_at: now,
            expires_at: now + Duration::days(ttl_days),
            usage_count: 0,
            last_used_at: None,
            is_valid: true,
        };
        insert_cache_entry(self.conn, &entry)?;
        tracing::debug!(
            patient_id,
            content_type = content_type.as_str(),
            ttl_days,
            "cached AI content"
        );
        Ok(entry.id)
    }

    /// Operator override: flip validity off for a patient's entries.
    pub fn invalidate(
        &self,
        patient_id: &str,
        content_type: Option<ContentType>,
    ) -> Result<u64, DatabaseError> {
        invalidate_entries(self.conn, patient_id, content_type.as_ref())
    }

    /// Remove rows past expiry.
    pub fn purge_expired(&self) -> Result<u64, DatabaseError> {
        purge_expired_entries(self.conn, chrono::Local::now().naive_local())
    }

    pub fn stats(&self, patient_id: Option<&str>) -> Result<CacheStats, DatabaseError> {
        cache_stats(self.conn, patient_id, chrono::Local::now().naive_local())
    }
}

/// Hash of the inputs that produced a cached result. Two generations for
/// the same key share a fingerprint; the generated_at ordering tells them
/// apart.
pub fn source_fingerprint(
    patient_id: &str,
    content_type: ContentType,
    discipline: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(patient_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(discipline.unwrap_or("").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::{open_memory_database, DATETIME_FORMAT};
    use rusqlite::params;

    fn expire_entry(conn: &Connection, id: &Uuid) {
        let past = (chrono::Local::now().naive_local() - Duration::days(1))
            .format(DATETIME_FORMAT)
            .to_string();
        conn.execute(
            "UPDATE ai_cache_entries SET expires_at = ?2 WHERE id = ?1",
            params![id.to_string(), past],
        )
        .unwrap();
    }

    #[test]
    fn put_then_get_returns_content() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        cache
            .put("P1", ContentType::MedicalHistory, "History of falls.", None)
            .unwrap();

        let entry = cache.get("P1", ContentType::MedicalHistory, None).unwrap().unwrap();
        assert_eq!(entry.content, "History of falls.");
    }

    #[test]
    fn expired_entry_is_a_miss_but_row_remains() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        let id = cache
            .put("P1", ContentType::MedicalHistory, "Old content.", None)
            .unwrap();
        expire_entry(&conn, &id);

        assert!(cache.get("P1", ContentType::MedicalHistory, None).unwrap().is_none());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ai_cache_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn each_hit_increments_usage_by_one() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        cache
            .put("P1", ContentType::TreatmentSummary, "Summary.", Some("physiotherapy"))
            .unwrap();

        let first = cache
            .get("P1", ContentType::TreatmentSummary, Some("physiotherapy"))
            .unwrap()
            .unwrap();
        assert_eq!(first.usage_count, 1);
        assert!(first.last_used_at.is_some());

        let second = cache
            .get("P1", ContentType::TreatmentSummary, Some("physiotherapy"))
            .unwrap()
            .unwrap();
        assert_eq!(second.usage_count, 2);
    }

    #[test]
    fn newest_valid_entry_wins() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        cache.put("P1", ContentType::MedicalStatus, "First generation.", None).unwrap();
        let second = cache
            .put("P1", ContentType::MedicalStatus, "Second generation.", None)
            .unwrap();
        // Force distinct generated_at so ordering is deterministic.
        conn.execute(
            "UPDATE ai_cache_entries SET generated_at = datetime(generated_at, '+1 minute')
             WHERE id = ?1",
            params![second.to_string()],
        )
        .unwrap();

        let entry = cache.get("P1", ContentType::MedicalStatus, None).unwrap().unwrap();
        assert_eq!(entry.content, "Second generation.");
        // Both rows remain — append-only audit trail.
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ai_cache_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn discipline_scopes_the_key() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        cache
            .put("P1", ContentType::TreatmentSummary, "Physio summary.", Some("physiotherapy"))
            .unwrap();

        assert!(cache.get("P1", ContentType::TreatmentSummary, None).unwrap().is_none());
        assert!(cache
            .get("P1", ContentType::TreatmentSummary, Some("speech_therapy"))
            .unwrap()
            .is_none());
        assert!(cache
            .get("P1", ContentType::TreatmentSummary, Some("physiotherapy"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn invalidate_hides_entries() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        cache.put("P1", ContentType::MedicalHistory, "Content.", None).unwrap();

        assert_eq!(cache.invalidate("P1", Some(ContentType::MedicalHistory)).unwrap(), 1);
        assert!(cache.get("P1", ContentType::MedicalHistory, None).unwrap().is_none());
    }

    #[test]
    fn purge_removes_only_expired_rows() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        let old = cache.put("P1", ContentType::MedicalHistory, "Old.", None).unwrap();
        cache.put("P1", ContentType::MedicalStatus, "Fresh.", None).unwrap();
        expire_entry(&conn, &old);

        assert_eq!(cache.purge_expired().unwrap(), 1);
        let stats = cache.stats(Some("P1")).unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.valid_entries, 1);
    }

    #[test]
    fn stats_aggregate_usage() {
        let conn = open_memory_database().unwrap();
        let cache = AiCache::new(&conn);
        cache.put("P1", ContentType::MedicalHistory, "A.", None).unwrap();
        cache.get("P1", ContentType::MedicalHistory, None).unwrap();
        cache.get("P1", ContentType::MedicalHistory, None).unwrap();

        let stats = cache.stats(None).unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_usage, 2);
    }

    #[test]
    fn fingerprint_stable_per_key() {
        let a = source_fingerprint("P1", ContentType::MedicalHistory, None);
        let b = source_fingerprint("P1", ContentType::MedicalHistory, None);
        let c = source_fingerprint("P1", ContentType::MedicalHistory, Some("physiotherapy"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
