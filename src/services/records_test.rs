use super::*;
use serde_json::json;

const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

fn document(value: Value) -> Document {
    Document { id: Uuid::new_v4(), fields: value.as_object().cloned().expect("object") }
}

// =============================================================================
// data URLs
// =============================================================================

#[test]
fn accepts_image_data_urls() {
    assert!(is_image_data_url(PNG));
    assert!(is_image_data_url("data:image/svg+xml;base64,PHN2Zz4="));
}

#[test]
fn rejects_other_urls() {
    assert!(!is_image_data_url("https://x.com/a.png"));
    assert!(!is_image_data_url("data:text/plain;base64,aGk="));
    assert!(!is_image_data_url("data:image/png;base64,"));
    assert!(!is_image_data_url("data:image/png,raw"));
    assert!(!is_image_data_url("data:image/png;base64,<script>"));
}

// =============================================================================
// Notification
// =============================================================================

#[test]
fn notification_draft_trims_and_defaults() {
    let draft = NotificationDraft {
        heading: "  Exams ".into(),
        description: "Schedule out".into(),
        link: Some("   ".into()),
        image: None,
    };
    let fields = draft.into_fields().expect("valid");
    assert_eq!(fields["heading"], json!("Exams"));
    assert_eq!(fields["link"], json!(""));
    assert_eq!(fields["image"], json!(""));
}

#[test]
fn notification_draft_requires_heading_and_description() {
    let blank_heading = NotificationDraft { heading: " ".into(), description: "d".into(), ..Default::default() };
    assert_eq!(blank_heading.into_fields(), Err(RecordError::Missing("heading")));

    let blank_description = NotificationDraft { heading: "h".into(), ..Default::default() };
    assert_eq!(blank_description.into_fields(), Err(RecordError::Missing("description")));
}

#[test]
fn notification_draft_rejects_remote_image() {
    let draft = NotificationDraft {
        heading: "h".into(),
        description: "d".into(),
        image: Some("https://x.com/a.png".into()),
        ..Default::default()
    };
    assert_eq!(draft.into_fields(), Err(RecordError::NotImageDataUrl("image")));
}

#[test]
fn notification_parses_from_document() {
    let doc = document(json!({ "heading": "Exams", "description": "Soon", "image": PNG, "createdAt": 7 }));
    let parsed = Notification::from_document(&doc).expect("parse");
    assert_eq!(parsed.heading, "Exams");
    assert_eq!(parsed.link, "");
    assert_eq!(parsed.created_at, Some(7));
}

// =============================================================================
// Course
// =============================================================================

#[test]
fn course_draft_accepts_numeric_strings() {
    let draft = CourseDraft {
        heading: "Rust".into(),
        description: "Systems".into(),
        price: Some(json!("1500")),
        rating: Some(json!(4.5)),
        ..Default::default()
    };
    let fields = draft.into_fields().expect("valid");
    assert_eq!(fields["price"], json!(1500.0));
    assert_eq!(fields["rating"], json!(4.5));
    assert_eq!(fields["photo"], json!(""));
}

#[test]
fn course_draft_defaults_missing_numbers_to_zero() {
    let draft = CourseDraft { heading: "h".into(), description: "d".into(), price: Some(json!("")), ..Default::default() };
    let fields = draft.into_fields().expect("valid");
    assert_eq!(fields["price"], json!(0.0));
    assert_eq!(fields["rating"], json!(0.0));
}

#[test]
fn course_draft_range_checks() {
    let negative = CourseDraft { heading: "h".into(), description: "d".into(), price: Some(json!(-1)), ..Default::default() };
    assert_eq!(negative.into_fields(), Err(RecordError::OutOfRange("price")));

    let too_good = CourseDraft { heading: "h".into(), description: "d".into(), rating: Some(json!(6)), ..Default::default() };
    assert_eq!(too_good.into_fields(), Err(RecordError::OutOfRange("rating")));

    let garbage = CourseDraft { heading: "h".into(), description: "d".into(), price: Some(json!("cheap")), ..Default::default() };
    assert_eq!(garbage.into_fields(), Err(RecordError::WrongType("price")));
}

#[test]
fn course_parses_string_numbers_from_document() {
    let doc = document(json!({ "heading": "Rust", "description": "d", "price": "99", "rating": 3 }));
    let course = Course::from_document(&doc).expect("parse");
    assert!((course.price - 99.0).abs() < f64::EPSILON);
    assert!((course.rating - 3.0).abs() < f64::EPSILON);
}

#[test]
fn course_document_with_bad_type_fails() {
    let doc = document(json!({ "heading": ["x"], "description": "d" }));
    assert_eq!(Course::from_document(&doc), Err(RecordError::WrongType("heading")));
}

// =============================================================================
// Admission
// =============================================================================

#[test]
fn admission_draft_normalizes_email_and_drops_blanks() {
    let draft = AdmissionDraft {
        name: "Asha".into(),
        email: " Asha@X.com ".into(),
        course: "BCA".into(),
        phone: Some("  ".into()),
        gender: Some("F".into()),
        ..Default::default()
    };
    let fields = draft.into_fields().expect("valid");
    assert_eq!(fields["email"], json!("asha@x.com"));
    assert_eq!(fields["gender"], json!("F"));
    assert!(!fields.contains_key("phone"));
    assert!(!fields.contains_key("message"));
}

#[test]
fn admission_draft_validation() {
    let missing_email = AdmissionDraft { name: "a".into(), course: "c".into(), ..Default::default() };
    assert_eq!(missing_email.into_fields(), Err(RecordError::Missing("email")));

    let bad_email = AdmissionDraft { name: "a".into(), email: "nope".into(), course: "c".into(), ..Default::default() };
    assert_eq!(bad_email.into_fields(), Err(RecordError::InvalidEmail));

    let no_course = AdmissionDraft { name: "a".into(), email: "a@x.com".into(), ..Default::default() };
    assert_eq!(no_course.into_fields(), Err(RecordError::Missing("course")));
}

#[test]
fn admission_parses_optional_fields() {
    let doc = document(json!({ "name": "Asha", "email": "asha@x.com", "course": "BCA", "dob": "2001-02-03" }));
    let admission = Admission::from_document(&doc).expect("parse");
    assert_eq!(admission.dob.as_deref(), Some("2001-02-03"));
    assert_eq!(admission.message, None);
}

// =============================================================================
// Student
// =============================================================================

#[test]
fn student_grade_falls_back_to_course() {
    let doc = document(json!({ "name": "Ravi", "course": "BSc", "rollNo": 42 }));
    let student = Student::from_document(&doc).expect("parse");
    assert_eq!(student.grade, "BSc");
    assert_eq!(student.roll_no, "42");
}

#[test]
fn student_grade_wins_over_course() {
    let doc = document(json!({ "name": "Ravi", "grade": "A", "course": "BSc" }));
    assert_eq!(Student::from_document(&doc).expect("parse").grade, "A");

    let blank_grade = document(json!({ "name": "Ravi", "grade": "", "course": "BSc" }));
    assert_eq!(Student::from_document(&blank_grade).expect("parse").grade, "BSc");
}

#[test]
fn student_email_match_ignores_case() {
    let doc = document(json!({ "name": "Ravi", "email": "Ravi@X.com" }));
    let student = Student::from_document(&doc).expect("parse");
    assert!(student.has_email("ravi@x.com"));
    assert!(!student.has_email("other@x.com"));
}

#[test]
fn parse_all_skips_malformed_documents() {
    let docs = vec![
        document(json!({ "name": "Ravi", "grade": "A" })),
        document(json!({ "grade": "B" })),
    ];
    let students = parse_all(STUDENTS, &docs, Student::from_document);
    assert_eq!(students.len(), 1);
    assert_eq!(StudentSummary::from(students[0].clone()), StudentSummary { name: "Ravi".into(), grade: "A".into() });
}
