//! Repository layer — entity-scoped database operations.
//!
//! Free functions over an injected `&Connection`; one sub-module per
//! entity. All public functions are re-exported here.

mod ai_cache;
mod completion;
mod notification;
mod report;
mod template;
mod template_instance;

pub use ai_cache::*;
pub use completion::*;
pub use notification::*;
pub use report::*;
pub use template::*;
pub use template_instance::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::*;
    use crate::models::*;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use serde_json::json;
    use uuid::Uuid;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn make_report(conn: &Connection) -> Report {
        let now = chrono::Local::now().naive_local();
        let report = Report {
            id: Uuid::new_v4(),
            patient_id: "P-100".into(),
            report_type: "discharge".into(),
            template_id: None,
            title: "Discharge summary".into(),
            status: ReportStatus::Pending,
            priority: Priority::High,
            assigned_therapist_ids: vec!["T1".into(), "T2".into()],
            disciplines: vec!["physiotherapy".into(), "occupational_therapy".into()],
            requested_by: Some("M1".into()),
            deadline_date: NaiveDate::from_ymd_opt(2026, 9, 1),
            content: serde_json::Map::new(),
            ai_generated_sections: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        insert_report(conn, &report).unwrap();
        report
    }

    #[test]
    fn report_round_trip_preserves_collections() {
        let conn = test_db();
        let report = make_report(&conn);

        let loaded = get_report(&conn, &report.id).unwrap().unwrap();
        assert_eq!(loaded.assigned_therapist_ids, vec!["T1", "T2"]);
        assert_eq!(loaded.disciplines.len(), 2);
        assert_eq!(loaded.status, ReportStatus::Pending);
        assert_eq!(loaded.priority, Priority::High);
        assert_eq!(loaded.deadline_date, NaiveDate::from_ymd_opt(2026, 9, 1));
        assert!(loaded.completed_at.is_none());
    }

    #[test]
    fn list_for_user_matches_assignee_and_requester() {
        let conn = test_db();
        let report = make_report(&conn);

        assert_eq!(list_reports_for_user(&conn, "T1").unwrap().len(), 1);
        assert_eq!(list_reports_for_user(&conn, "M1").unwrap().len(), 1);
        assert!(list_reports_for_user(&conn, "T9").unwrap().is_empty());
        assert_eq!(list_reports_for_user(&conn, "T2").unwrap()[0].id, report.id);
    }

    #[test]
    fn update_missing_report_is_not_found() {
        let conn = test_db();
        let mut report = make_report(&conn);
        report.id = Uuid::new_v4();
        let err = update_report(&conn, &report).unwrap_err();
        assert!(matches!(err, crate::db::DatabaseError::NotFound { .. }));
    }

    #[test]
    fn delete_cascades_to_notifications_and_completions() {
        let conn = test_db();
        let report = make_report(&conn);
        let now = chrono::Local::now().naive_local();

        insert_completion(
            &conn,
            &ReportCompletion {
                id: Uuid::new_v4(),
                report_id: report.id,
                therapist_id: "T1".into(),
                completed_at: now,
                notes: None,
            },
        )
        .unwrap();
        insert_notification(
            &conn,
            &Notification {
                id: Uuid::new_v4(),
                report_id: report.id,
                recipient_id: "T2".into(),
                notification_type: NotificationType::Request,
                message: "New report assigned".into(),
                is_read: false,
                created_at: now,
                read_at: None,
            },
        )
        .unwrap();

        assert!(delete_report(&conn, &report.id).unwrap());
        assert!(!delete_report(&conn, &report.id).unwrap());
        assert!(get_completions(&conn, &report.id).unwrap().is_empty());
        assert!(list_notifications(&conn, "T2", false).unwrap().is_empty());
    }

    #[test]
    fn template_name_unique_within_scope() {
        let conn = test_db();
        let now = chrono::Local::now().naive_local();
        let mut fields = serde_json::Map::new();
        fields.insert("summary".into(), json!({"type": "paragraph", "label": "Summary"}));

        let make = |name: &str, practice: Option<&str>| Template {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            template_type: TemplateType::Progress,
            practice_id: practice.map(String::from),
            fields: fields.clone(),
            sections: vec!["summary".into()],
            is_active: true,
            version: 1,
            approval_status: ApprovalStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        insert_template(&conn, &make("Progress Note", None)).unwrap();
        let err = insert_template(&conn, &make("Progress Note", None)).unwrap_err();
        assert!(matches!(err, crate::db::DatabaseError::ConstraintViolation(_)));

        // Same name in a different practice scope is fine.
        insert_template(&conn, &make("Progress Note", Some("PR-1"))).unwrap();
    }

    #[test]
    fn notification_mark_read_sets_timestamp() {
        let conn = test_db();
        let report = make_report(&conn);
        let now = chrono::Local::now().naive_local();
        let n = Notification {
            id: Uuid::new_v4(),
            report_id: report.id,
            recipient_id: "T1".into(),
            notification_type: NotificationType::Reminder,
            message: "Deadline tomorrow".into(),
            is_read: false,
            created_at: now,
            read_at: None,
        };
        insert_notification(&conn, &n).unwrap();

        assert_eq!(list_notifications(&conn, "T1", true).unwrap().len(), 1);
        assert!(mark_notification_read(&conn, &n.id, now).unwrap());
        assert!(!mark_notification_read(&conn, &n.id, now).unwrap());
        assert!(list_notifications(&conn, "T1", true).unwrap().is_empty());

        let all = list_notifications(&conn, "T1", false).unwrap();
        assert!(all[0].is_read);
        assert!(all[0].read_at.is_some());
    }
}
