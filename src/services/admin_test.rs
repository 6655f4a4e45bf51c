use super::*;
use crate::services::store::{Fields, MemoryDocumentStore};
use serde_json::json;

fn raw(value: Value) -> Fields {
    value.as_object().cloned().expect("object")
}

fn notification(heading: &str) -> NotificationDraft {
    NotificationDraft { heading: heading.into(), description: "details".into(), ..Default::default() }
}

#[tokio::test]
async fn notifications_round_trip_newest_first() {
    let store = MemoryDocumentStore::new();
    create_notification(&store, notification("first")).await.expect("create");
    tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    let second = create_notification(&store, notification("second")).await.expect("create");

    let listed = list_notifications(&store).await.expect("list");
    let headings: Vec<_> = listed.iter().map(|n| n.heading.as_str()).collect();
    assert_eq!(headings, vec!["second", "first"]);

    update_notification(&store, second, notification("edited")).await.expect("update");
    delete_notification(&store, listed[1].id).await.expect("delete");

    let listed = list_notifications(&store).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].heading, "edited");
}

#[tokio::test]
async fn invalid_draft_never_reaches_store() {
    let store = MemoryDocumentStore::new();
    let err = create_notification(&store, notification("  ")).await.unwrap_err();
    assert!(matches!(err, AdminError::Invalid(RecordError::Missing("heading"))));
    assert_eq!(err.user_message(), "heading is required");
    assert!(store.get_all(NOTIFICATIONS).await.expect("get_all").is_empty());
}

#[tokio::test]
async fn updating_missing_course_hides_store_detail() {
    let store = MemoryDocumentStore::new();
    let draft = CourseDraft { heading: "Rust".into(), description: "d".into(), ..Default::default() };
    let err = update_course(&store, Uuid::new_v4(), draft).await.unwrap_err();

    assert!(matches!(err, AdminError::Store(StoreError::NotFound { .. })));
    assert_eq!(err.user_message(), GENERIC_FAILURE);
    assert_eq!(err.error_code(), "E_NOT_FOUND");
}

#[tokio::test]
async fn courses_skip_malformed_documents() {
    let store = MemoryDocumentStore::new();
    store
        .create(COURSES, raw(json!({ "heading": "Legacy" })))
        .await
        .expect("create raw");
    let draft = CourseDraft { heading: "Rust".into(), description: "d".into(), price: Some(json!("10")), ..Default::default() };
    create_course(&store, draft).await.expect("create");

    let courses = list_courses(&store).await.expect("list");
    assert_eq!(courses.len(), 1);
    assert!((courses[0].price - 10.0).abs() < f64::EPSILON);

    delete_course(&store, courses[0].id).await.expect("delete");
    assert!(list_courses(&store).await.expect("list").is_empty());
}

#[tokio::test]
async fn admissions_are_listed_after_submission() {
    let store = MemoryDocumentStore::new();
    let draft = AdmissionDraft {
        name: "Asha".into(),
        email: "asha@x.com".into(),
        course: "BCA".into(),
        ..Default::default()
    };
    submit_admission(&store, draft).await.expect("submit");

    let admissions = list_admissions(&store).await.expect("list");
    assert_eq!(admissions.len(), 1);
    assert_eq!(admissions[0].course, "BCA");
}

#[tokio::test]
async fn students_summaries_and_lookup() {
    let store = MemoryDocumentStore::new();
    store
        .create(STUDENTS, raw(json!({ "name": "Ravi", "course": "BSc", "email": "ravi@x.com" })))
        .await
        .expect("create");
    store
        .create(STUDENTS, raw(json!({ "name": "Mina", "grade": "A", "email": "mina@x.com" })))
        .await
        .expect("create");

    let summaries = list_students(&store).await.expect("list");
    assert!(summaries.contains(&StudentSummary { name: "Ravi".into(), grade: "BSc".into() }));

    let found = find_student_by_email(&store, "MINA@x.com").await.expect("lookup");
    assert_eq!(found.map(|s| s.grade), Some("A".into()));
    assert!(find_student_by_email(&store, "ghost@x.com").await.expect("lookup").is_none());
}

#[test]
fn admin_views_parse_and_map_collections() {
    assert_eq!(AdminView::from_str("courses"), Some(AdminView::Courses));
    assert_eq!(AdminView::from_str("admissions"), None);
    assert_eq!(AdminView::Students.collection(), STUDENTS);
    assert_eq!(AdminView::Notifications.order(), QueryOrder::newest_first());
}

#[test]
fn student_view_renders_summaries() {
    let docs = vec![Document { id: Uuid::new_v4(), fields: raw(json!({ "name": "Ravi", "course": "BSc", "rollNo": "7" })) }];
    let rendered = AdminView::Students.render(&docs).expect("render");
    assert_eq!(rendered, json!([{ "name": "Ravi", "grade": "BSc" }]));
}
