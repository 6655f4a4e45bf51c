//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the public listings, the realm auth endpoints, the
//! gated admin REST surface and the admin live-view websockets. Admin and
//! student handlers are protected by the realm gate extractors in [`auth`].

pub mod admin;
pub mod auth;
pub mod public;
pub mod views;

#[cfg(test)]
mod test_support;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/notifications", get(public::list_notifications))
        .route("/api/courses", get(public::list_courses))
        .route("/api/admissions", post(public::submit_admission))
        .route("/api/{realm}/sign-in", post(auth::sign_in))
        .route("/api/{realm}/logout", post(auth::logout))
        .route("/api/{realm}/session", get(auth::session))
        .route("/api/student/me", get(auth::student_me))
        .route(
            "/api/admin/notifications",
            get(admin::list_notifications).post(admin::create_notification),
        )
        .route(
            "/api/admin/notifications/{id}",
            patch(admin::update_notification).delete(admin::delete_notification),
        )
        .route("/api/admin/courses", get(admin::list_courses).post(admin::create_course))
        .route(
            "/api/admin/courses/{id}",
            patch(admin::update_course).delete(admin::delete_course),
        )
        .route("/api/admin/admissions", get(admin::list_admissions))
        .route("/api/admin/students", get(admin::list_students))
        .route("/api/admin/views/{view}/ws", get(views::handle_view))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
