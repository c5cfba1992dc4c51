use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::report::{parse_datetime, parse_uuid};
use crate::db::sqlite::DATETIME_FORMAT;
use crate::db::DatabaseError;
use crate::models::ReportCompletion;

/// Insert a per-therapist completion row.
///
/// The UNIQUE(report_id, therapist_id) constraint makes a duplicate attempt
/// fail with `ConstraintViolation` instead of double-counting.
pub fn insert_completion(
    conn: &Connection,
    completion: &ReportCompletion,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO report_completions (id, report_id, therapist_id, completed_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            completion.id.to_string(),
            completion.report_id.to_string(),
            completion.therapist_id,
            completion.completed_at.format(DATETIME_FORMAT).to_string(),
            completion.notes,
        ],
    )
    .map_err(|e| DatabaseError::from_sqlite(e, "completion already recorded for this therapist"))?;
    Ok(())
}

pub fn get_completions(
    conn: &Connection,
    report_id: &Uuid,
) -> Result<Vec<ReportCompletion>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, therapist_id, completed_at, notes
         FROM report_completions WHERE report_id = ?1 ORDER BY completed_at",
    )?;
    let rows = stmt.query_map(params![report_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut completions = Vec::new();
    for row in rows {
        let (id, report_id, therapist_id, completed_at, notes) = row?;
        completions.push(ReportCompletion {
            id: parse_uuid(&id)?,
            report_id: parse_uuid(&report_id)?,
            therapist_id,
            completed_at: parse_datetime(&completed_at),
            notes,
        });
    }
    Ok(completions)
}

/// Delete one therapist's completion row. Returns false when absent.
pub fn delete_completion(
    conn: &Connection,
    report_id: &Uuid,
    therapist_id: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM report_completions WHERE report_id = ?1 AND therapist_id = ?2",
        params![report_id.to_string(), therapist_id],
    )?;
    Ok(affected > 0)
}

/// Delete every completion row for a report (reassignment path).
pub fn delete_all_completions(conn: &Connection, report_id: &Uuid) -> Result<u64, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM report_completions WHERE report_id = ?1",
        params![report_id.to_string()],
    )?;
    Ok(affected as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::report::insert_report;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{Priority, ReportStatus};
    use crate::models::Report;

    fn make_report(conn: &Connection) -> Uuid {
        let id = Uuid::new_v4();
        let now = chrono::Local::now().naive_local();
        insert_report(
            conn,
            &Report {
                id,
                patient_id: "P1".into(),
                report_type: "discharge".into(),
                template_id: None,
                title: "Discharge report".into(),
                status: ReportStatus::Pending,
                priority: Priority::Normal,
                assigned_therapist_ids: vec!["T1".into(), "T2".into()],
                disciplines: vec!["physiotherapy".into()],
                requested_by: Some("M1".into()),
                deadline_date: None,
                content: serde_json::Map::new(),
                ai_generated_sections: None,
                created_at: now,
                updated_at: now,
                completed_at: None,
            },
        )
        .unwrap();
        id
    }

    fn make_completion(report_id: Uuid, therapist: &str) -> ReportCompletion {
        ReportCompletion {
            id: Uuid::new_v4(),
            report_id,
            therapist_id: therapist.into(),
            completed_at: chrono::Local::now().naive_local(),
            notes: None,
        }
    }

    #[test]
    fn insert_and_list() {
        let conn = open_memory_database().unwrap();
        let report_id = make_report(&conn);
        insert_completion(&conn, &make_completion(report_id, "T1")).unwrap();

        let completions = get_completions(&conn, &report_id).unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].therapist_id, "T1");
    }

    #[test]
    fn duplicate_completion_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        let report_id = make_report(&conn);
        insert_completion(&conn, &make_completion(report_id, "T1")).unwrap();

        let err = insert_completion(&conn, &make_completion(report_id, "T1")).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)), "got {err}");
    }

    #[test]
    fn delete_all_clears_rows() {
        let conn = open_memory_database().unwrap();
        let report_id = make_report(&conn);
        insert_completion(&conn, &make_completion(report_id, "T1")).unwrap();
        insert_completion(&conn, &make_completion(report_id, "T2")).unwrap();

        assert_eq!(delete_all_completions(&conn, &report_id).unwrap(), 2);
        assert!(get_completions(&conn, &report_id).unwrap().is_empty());
    }

    #[test]
    fn delete_single_returns_presence() {
        let conn = open_memory_database().unwrap();
        let report_id = make_report(&conn);
        insert_completion(&conn, &make_completion(report_id, "T1")).unwrap();

        assert!(delete_completion(&conn, &report_id, "T1").unwrap());
        assert!(!delete_completion(&conn, &report_id, "T1").unwrap());
    }
}
