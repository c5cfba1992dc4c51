use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::report::{parse_datetime, parse_uuid};
use crate::db::sqlite::DATETIME_FORMAT;
use crate::db::DatabaseError;
use crate::models::enums::NotificationType;
use crate::models::Notification;

pub fn insert_notification(conn: &Connection, n: &Notification) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (id, report_id, recipient_id, notification_type, message,
         is_read, created_at, read_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            n.id.to_string(),
            n.report_id.to_string(),
            n.recipient_id,
            n.notification_type.as_str(),
            n.message,
            n.is_read as i32,
            n.created_at.format(DATETIME_FORMAT).to_string(),
            n.read_at.map(|dt| dt.format(DATETIME_FORMAT).to_string()),
        ],
    )?;
    Ok(())
}

pub fn list_notifications(
    conn: &Connection,
    recipient_id: &str,
    unread_only: bool,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, recipient_id, notification_type, message, is_read, created_at, read_at
         FROM notifications
         WHERE recipient_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![recipient_id, unread_only as i32], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        let (id, report_id, recipient_id, kind, message, is_read, created_at, read_at) = row?;
        notifications.push(Notification {
            id: parse_uuid(&id)?,
            report_id: parse_uuid(&report_id)?,
            recipient_id,
            notification_type: NotificationType::from_str(&kind)?,
            message,
            is_read: is_read != 0,
            created_at: parse_datetime(&created_at),
            read_at: read_at.and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok()),
        });
    }
    Ok(notifications)
}

/// Mark one notification read. Returns false when the row does not exist.
pub fn mark_notification_read(
    conn: &Connection,
    id: &Uuid,
    now: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE notifications SET is_read = 1, read_at = ?2 WHERE id = ?1 AND is_read = 0",
        params![id.to_string(), now.format(DATETIME_FORMAT).to_string()],
    )?;
    Ok(affected > 0)
}
