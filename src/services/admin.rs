//! Admin panel operations — typed CRUD over the document store.
//!
//! Store failures are logged with their cause and surfaced to callers as a
//! single generic message. No retries.

use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::frame::ErrorCode;
use crate::services::records::{
    ADMISSIONS, Admission, AdmissionDraft, COURSES, Course, CourseDraft, NOTIFICATIONS, Notification,
    NotificationDraft, RecordError, STUDENTS, Student, StudentSummary, parse_all,
};
use crate::services::store::{Direction, Document, DocumentStore, Fields, QueryOrder, StoreError};

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("invalid input: {0}")]
    Invalid(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdminError {
    /// Message safe to show the operator.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(e) => e.to_string(),
            Self::Store(_) => GENERIC_FAILURE.to_owned(),
        }
    }
}

impl ErrorCode for AdminError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }
}

fn logged<'a>(op: &'static str, collection: &'a str) -> impl FnOnce(StoreError) -> AdminError + 'a {
    move |e| {
        error!(op, %collection, error = %e, "document store call failed");
        AdminError::Store(e)
    }
}

// =============================================================================
// GENERIC HELPERS
// =============================================================================

async fn list_ordered<T>(
    store: &dyn DocumentStore,
    collection: &str,
    parse: fn(&Document) -> Result<T, RecordError>,
) -> Result<Vec<T>, AdminError> {
    let docs = store
        .query(collection, &QueryOrder::newest_first())
        .await
        .map_err(logged("query", collection))?;
    Ok(parse_all(collection, &docs, parse))
}

async fn list_unordered<T>(
    store: &dyn DocumentStore,
    collection: &str,
    parse: fn(&Document) -> Result<T, RecordError>,
) -> Result<Vec<T>, AdminError> {
    let docs = store
        .get_all(collection)
        .await
        .map_err(logged("get_all", collection))?;
    Ok(parse_all(collection, &docs, parse))
}

async fn create(
    store: &dyn DocumentStore,
    collection: &str,
    fields: Result<Fields, RecordError>,
) -> Result<Uuid, AdminError> {
    let fields = fields?;
    store
        .create(collection, fields)
        .await
        .map_err(logged("create", collection))
}

async fn update(
    store: &dyn DocumentStore,
    collection: &str,
    id: Uuid,
    fields: Result<Fields, RecordError>,
) -> Result<(), AdminError> {
    let fields = fields?;
    store
        .update(collection, id, fields)
        .await
        .map_err(logged("update", collection))
}

async fn delete(store: &dyn DocumentStore, collection: &str, id: Uuid) -> Result<(), AdminError> {
    store
        .delete(collection, id)
        .await
        .map_err(logged("delete", collection))
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Notifications, newest first.
///
/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn list_notifications(store: &dyn DocumentStore) -> Result<Vec<Notification>, AdminError> {
    list_ordered(store, NOTIFICATIONS, Notification::from_document).await
}

/// # Errors
///
/// Returns [`AdminError`] for invalid input or a failed store call.
pub async fn create_notification(store: &dyn DocumentStore, draft: NotificationDraft) -> Result<Uuid, AdminError> {
    create(store, NOTIFICATIONS, draft.into_fields()).await
}

/// # Errors
///
/// Returns [`AdminError`] for invalid input, a missing notification, or a
/// failed store call.
pub async fn update_notification(store: &dyn DocumentStore, id: Uuid, draft: NotificationDraft) -> Result<(), AdminError> {
    update(store, NOTIFICATIONS, id, draft.into_fields()).await
}

/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn delete_notification(store: &dyn DocumentStore, id: Uuid) -> Result<(), AdminError> {
    delete(store, NOTIFICATIONS, id).await
}

// =============================================================================
// COURSES
// =============================================================================

/// Courses, newest first.
///
/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn list_courses(store: &dyn DocumentStore) -> Result<Vec<Course>, AdminError> {
    list_ordered(store, COURSES, Course::from_document).await
}

/// # Errors
///
/// Returns [`AdminError`] for invalid input or a failed store call.
pub async fn create_course(store: &dyn DocumentStore, draft: CourseDraft) -> Result<Uuid, AdminError> {
    create(store, COURSES, draft.into_fields()).await
}

/// # Errors
///
/// Returns [`AdminError`] for invalid input, a missing course, or a failed
/// store call.
pub async fn update_course(store: &dyn DocumentStore, id: Uuid, draft: CourseDraft) -> Result<(), AdminError> {
    update(store, COURSES, id, draft.into_fields()).await
}

/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn delete_course(store: &dyn DocumentStore, id: Uuid) -> Result<(), AdminError> {
    delete(store, COURSES, id).await
}

// =============================================================================
// ADMISSIONS & STUDENTS
// =============================================================================

/// Every admission application, in submission order.
///
/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn list_admissions(store: &dyn DocumentStore) -> Result<Vec<Admission>, AdminError> {
    list_unordered(store, ADMISSIONS, Admission::from_document).await
}

/// # Errors
///
/// Returns [`AdminError`] for invalid input or a failed store call.
pub async fn submit_admission(store: &dyn DocumentStore, draft: AdmissionDraft) -> Result<Uuid, AdminError> {
    create(store, ADMISSIONS, draft.into_fields()).await
}

/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn list_students(store: &dyn DocumentStore) -> Result<Vec<StudentSummary>, AdminError> {
    let students = list_unordered(store, STUDENTS, Student::from_document).await?;
    Ok(students.into_iter().map(StudentSummary::from).collect())
}

/// The student record whose email matches `email`, if any.
///
/// # Errors
///
/// Returns [`AdminError::Store`] when the store call fails.
pub async fn find_student_by_email(store: &dyn DocumentStore, email: &str) -> Result<Option<Student>, AdminError> {
    let students = list_unordered(store, STUDENTS, Student::from_document).await?;
    Ok(students.into_iter().find(|s| s.has_email(email)))
}

// =============================================================================
// LIVE VIEWS
// =============================================================================

/// Admin view backed by a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminView {
    Notifications,
    Courses,
    Students,
}

impl AdminView {
    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "notifications" => Some(Self::Notifications),
            "courses" => Some(Self::Courses),
            "students" => Some(Self::Students),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Courses => "courses",
            Self::Students => "students",
        }
    }

    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Notifications => NOTIFICATIONS,
            Self::Courses => COURSES,
            Self::Students => STUDENTS,
        }
    }

    /// Students carry no creation stamp; order them by name.
    #[must_use]
    pub fn order(self) -> QueryOrder {
        match self {
            Self::Notifications | Self::Courses => QueryOrder::newest_first(),
            Self::Students => QueryOrder { field: "name".into(), direction: Direction::Asc },
        }
    }

    /// Parse a raw snapshot into the view's typed records, as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the records fail to serialize.
    pub fn render(self, docs: &[Document]) -> Result<Value, serde_json::Error> {
        let collection = self.collection();
        match self {
            Self::Notifications => serde_json::to_value(parse_all(collection, docs, Notification::from_document)),
            Self::Courses => serde_json::to_value(parse_all(collection, docs, Course::from_document)),
            Self::Students => serde_json::to_value(
                parse_all(collection, docs, Student::from_document)
                    .into_iter()
                    .map(StudentSummary::from)
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
