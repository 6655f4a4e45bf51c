//! Admin panel REST routes. Every handler sits behind [`AdminSession`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::frame::ErrorCode;
use crate::routes::auth::AdminSession;
use crate::services::admin::{self, AdminError};
use crate::services::records::{CourseDraft, NotificationDraft};
use crate::services::store::StoreError;
use crate::state::AppState;

pub(crate) fn admin_error_to_status(err: &AdminError) -> StatusCode {
    match err {
        AdminError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdminError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        AdminError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn admin_error_response(err: &AdminError) -> Response {
    let body = json!({ "error": err.user_message(), "code": err.error_code() });
    (admin_error_to_status(err), Json(body)).into_response()
}

fn created(id: Uuid) -> Response {
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

/// Log who changed what. Mutations only; reads are not audited.
fn audit(AdminSession(gated): &AdminSession, action: &'static str, collection: &'static str) {
    info!(subject = ?gated.session.subject_id, action, collection, "admin mutation");
}

fn done(result: Result<(), AdminError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => admin_error_response(&e),
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

pub async fn list_notifications(State(state): State<AppState>, _admin: AdminSession) -> Response {
    match admin::list_notifications(state.store.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

pub async fn create_notification(
    State(state): State<AppState>,
    actor: AdminSession,
    Json(draft): Json<NotificationDraft>,
) -> Response {
    audit(&actor, "create", "notifications");
    match admin::create_notification(state.store.as_ref(), draft).await {
        Ok(id) => created(id),
        Err(e) => admin_error_response(&e),
    }
}

pub async fn update_notification(
    State(state): State<AppState>,
    actor: AdminSession,
    Path(id): Path<Uuid>,
    Json(draft): Json<NotificationDraft>,
) -> Response {
    audit(&actor, "update", "notifications");
    done(admin::update_notification(state.store.as_ref(), id, draft).await)
}

pub async fn delete_notification(State(state): State<AppState>, actor: AdminSession, Path(id): Path<Uuid>) -> Response {
    audit(&actor, "delete", "notifications");
    done(admin::delete_notification(state.store.as_ref(), id).await)
}

// =============================================================================
// COURSES
// =============================================================================

pub async fn list_courses(State(state): State<AppState>, _admin: AdminSession) -> Response {
    match admin::list_courses(state.store.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

pub async fn create_course(State(state): State<AppState>, actor: AdminSession, Json(draft): Json<CourseDraft>) -> Response {
    audit(&actor, "create", "courses");
    match admin::create_course(state.store.as_ref(), draft).await {
        Ok(id) => created(id),
        Err(e) => admin_error_response(&e),
    }
}

pub async fn update_course(
    State(state): State<AppState>,
    actor: AdminSession,
    Path(id): Path<Uuid>,
    Json(draft): Json<CourseDraft>,
) -> Response {
    audit(&actor, "update", "courses");
    done(admin::update_course(state.store.as_ref(), id, draft).await)
}

pub async fn delete_course(State(state): State<AppState>, actor: AdminSession, Path(id): Path<Uuid>) -> Response {
    audit(&actor, "delete", "courses");
    done(admin::delete_course(state.store.as_ref(), id).await)
}

// =============================================================================
// ADMISSIONS & STUDENTS
// =============================================================================

pub async fn list_admissions(State(state): State<AppState>, _admin: AdminSession) -> Response {
    match admin::list_admissions(state.store.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

pub async fn list_students(State(state): State<AppState>, _admin: AdminSession) -> Response {
    match admin::list_students(state.store.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
