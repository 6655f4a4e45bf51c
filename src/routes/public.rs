//! Public routes — listings and the admission form. No session required.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::routes::admin::admin_error_response;
use crate::services::admin;
use crate::services::records::AdmissionDraft;
use crate::state::AppState;

/// `GET /api/notifications`
pub async fn list_notifications(State(state): State<AppState>) -> Response {
    match admin::list_notifications(state.store.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

/// `GET /api/courses`
pub async fn list_courses(State(state): State<AppState>) -> Response {
    match admin::list_courses(state.store.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

/// `POST /api/admissions`
pub async fn submit_admission(State(state): State<AppState>, Json(draft): Json<AdmissionDraft>) -> Response {
    match admin::submit_admission(state.store.as_ref(), draft).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(e) => admin_error_response(&e),
    }
}

#[cfg(test)]
#[path = "public_test.rs"]
mod tests;
