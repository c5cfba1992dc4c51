use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::report::{parse_datetime, parse_uuid};
use crate::db::sqlite::DATETIME_FORMAT;
use crate::db::DatabaseError;
use crate::models::enums::ContentType;
use crate::models::{AiCacheEntry, CacheStats};

pub fn insert_cache_entry(conn: &Connection, entry: &AiCacheEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO ai_cache_entries (id, patient_id, content_type, discipline, content,
         source_fingerprint, generated_at, expires_at, usage_count, last_used_at, is_valid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            entry.id.to_string(),
            entry.patient_id,
            entry.content_type.as_str(),
            entry.discipline,
            entry.content,
            entry.source_fingerprint,
            entry.generated_at.format(DATETIME_FORMAT).to_string(),
            entry.expires_at.format(DATETIME_FORMAT).to_string(),
            entry.usage_count,
            entry
                .last_used_at
                .map(|dt| dt.format(DATETIME_FORMAT).to_string()),
            entry.is_valid as i32,
        ],
    )?;
    Ok(())
}

/// Newest valid, unexpired entry for the key. Append-only log: multiple
/// rows may exist per key; the most recent generation wins.
pub fn get_newest_valid_entry(
    conn: &Connection,
    patient_id: &str,
    content_type: &ContentType,
    discipline: Option<&str>,
    now: NaiveDateTime,
) -> Result<Option<AiCacheEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, content_type, discipline, content, source_fingerprint,
         generated_at, expires_at, usage_count, last_used_at, is_valid
         FROM ai_cache_entries
         WHERE patient_id = ?1 AND content_type = ?2
           AND (?3 IS NULL AND discipline IS NULL OR discipline = ?3)
           AND is_valid = 1 AND expires_at > ?4
         ORDER BY generated_at DESC
         LIMIT 1",
    )?;
    let mut rows = stmt.query_map(
        params![
            patient_id,
            content_type.as_str(),
            discipline,
            now.format(DATETIME_FORMAT).to_string(),
        ],
        cache_row_from_rusqlite,
    )?;
    match rows.next() {
        Some(row) => Ok(Some(cache_entry_from_row(row?)?)),
        None => Ok(None),
    }
}

/// Record a cache hit: bump usage count and touch last-used.
pub fn touch_cache_entry(
    conn: &Connection,
    id: &Uuid,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE ai_cache_entries SET usage_count = usage_count + 1, last_used_at = ?2
         WHERE id = ?1",
        params![id.to_string(), now.format(DATETIME_FORMAT).to_string()],
    )?;
    Ok(())
}

/// Flip validity off for a patient's entries, optionally for one content
/// type. Rows stay in place for the audit trail.
pub fn invalidate_entries(
    conn: &Connection,
    patient_id: &str,
    content_type: Option<&ContentType>,
) -> Result<u64, DatabaseError> {
    let affected = match content_type {
        Some(ct) => conn.execute(
            "UPDATE ai_cache_entries SET is_valid = 0
             WHERE patient_id = ?1 AND content_type = ?2 AND is_valid = 1",
            params![patient_id, ct.as_str()],
        )?,
        None => conn.execute(
            "UPDATE ai_cache_entries SET is_valid = 0 WHERE patient_id = ?1 AND is_valid = 1",
            params![patient_id],
        )?,
    };
    Ok(affected as u64)
}

/// Remove rows past expiry. Maintenance helper, not part of the read path.
pub fn purge_expired_entries(conn: &Connection, now: NaiveDateTime) -> Result<u64, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM ai_cache_entries WHERE expires_at <= ?1",
        params![now.format(DATETIME_FORMAT).to_string()],
    )?;
    Ok(affected as u64)
}

pub fn cache_stats(
    conn: &Connection,
    patient_id: Option<&str>,
    now: NaiveDateTime,
) -> Result<CacheStats, DatabaseError> {
    let now_str = now.format(DATETIME_FORMAT).to_string();
    let (total, valid, expired, usage): (i64, i64, i64, Option<i64>) = conn.query_row(
        "SELECT COUNT(*),
                SUM(CASE WHEN is_valid = 1 AND expires_at > ?2 THEN 1 ELSE 0 END),
                SUM(CASE WHEN expires_at <= ?2 THEN 1 ELSE 0 END),
                SUM(usage_count)
         FROM ai_cache_entries
         WHERE ?1 IS NULL OR patient_id = ?1",
        params![patient_id, now_str],
        |row| {
            Ok((
                row.get(0)?,
                row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                row.get(3)?,
            ))
        },
    )?;
    Ok(CacheStats {
        total_entries: total as usize,
        valid_entries: valid as usize,
        expired_entries: expired as usize,
        total_usage: usage.unwrap_or(0),
    })
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct CacheRow {
    id: String,
    patient_id: String,
    content_type: String,
    discipline: Option<String>,
    content: String,
    source_fingerprint: String,
    generated_at: String,
    expires_at: String,
    usage_count: i64,
    last_used_at: Option<String>,
    is_valid: i64,
}

fn cache_row_from_rusqlite(row: &rusqlite::Row) -> Result<CacheRow, rusqlite::Error> {
    Ok(CacheRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        content_type: row.get(2)?,
        discipline: row.get(3)?,
        content: row.get(4)?,
        source_fingerprint: row.get(5)?,
        generated_at: row.get(6)?,
        expires_at: row.get(7)?,
        usage_count: row.get(8)?,
        last_used_at: row.get(9)?,
        is_valid: row.get(10)?,
    })
}

fn cache_entry_from_row(raw: CacheRow) -> Result<AiCacheEntry, DatabaseError> {
    Ok(AiCacheEntry {
        id: parse_uuid(&raw.id)?,
        patient_id: raw.patient_id,
        content_type: ContentType::from_str(&raw.content_type)?,
        discipline: raw.discipline,
        content: raw.content,
        source_fingerprint: raw.source_fingerprint,
        generated_at: parse_datetime(&raw.generated_at),
        expires_at: parse_datetime(&raw.expires_at),
        usage_count: raw.usage_count,
        last_used_at: raw
            .last_used_at
            .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok()),
        is_valid: raw.is_valid != 0,
    })
}
