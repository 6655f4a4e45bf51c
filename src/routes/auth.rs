//! Auth routes: sign-in, logout, session state and the realm gate extractors.
//!
//! DESIGN
//! ======
//! The visitor session token travels in an HttpOnly cookie. Protected
//! handlers take [`AdminSession`] or [`StudentSession`]; their extractors run
//! the realm's gate once and turn its single navigation into a `303 See
//! Other` to the realm's login route, so no protected handler runs for an
//! unauthorized visitor.

use std::sync::Arc;

use axum::extract::{FromRef, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::frame::ErrorCode;
use crate::services::admin;
use crate::services::auth::{AuthError, Credential};
use crate::services::gate::{GateState, NavigationLog};
use crate::services::login::{self, validate_sign_in_input};
use crate::services::session::{Realm, Session, VisitorSession, generate_token};
use crate::state::AppState;

pub const COOKIE_NAME: &str = "portal_session";

pub(crate) fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub(crate) fn auth_error_to_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredential | AuthError::UserNotFound | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthError::Network(_) => StatusCode::BAD_GATEWAY,
    }
}

fn parse_realm(raw: &str) -> Result<Realm, Response> {
    Realm::from_str(raw).ok_or_else(|| (StatusCode::NOT_FOUND, "unknown realm").into_response())
}

/// Resolve the visitor named by the session cookie, if it is still registered.
pub(crate) async fn lookup_visitor(state: &AppState, jar: &CookieJar) -> Option<Arc<VisitorSession>> {
    let token = jar.get(COOKIE_NAME).map(Cookie::value)?;
    if token.is_empty() {
        return None;
    }
    state.sessions.get(token).await
}

// =============================================================================
// GATE EXTRACTORS
// =============================================================================

/// Visitor that passed a realm's gate.
pub struct GatedVisitor {
    pub visitor: Arc<VisitorSession>,
    pub session: Session,
}

impl GatedVisitor {
    /// Credential held for `realm`. Absent under flag-based checks that were
    /// satisfied without one.
    #[must_use]
    pub fn credential(&self, realm: Realm) -> Option<Credential> {
        self.visitor.credential(realm)
    }
}

async fn gate_request(parts: &Parts, state: &AppState, realm: Realm) -> Result<GatedVisitor, Response> {
    let jar = CookieJar::from_headers(&parts.headers);
    let visitor = match lookup_visitor(state, &jar).await {
        Some(visitor) => visitor,
        // Unknown visitors are checked like any other, against empty state.
        None => Arc::new(VisitorSession::new(generate_token())),
    };

    let navigator = NavigationLog::new();
    let resolution = state
        .realm(realm)
        .gate(visitor.clone(), realm)
        .evaluate(&navigator)
        .await;

    match (resolution.state, navigator.last()) {
        (GateState::Authorized, _) => Ok(GatedVisitor { visitor, session: resolution.session }),
        (_, Some(route)) => Err(Redirect::to(&route).into_response()),
        (_, None) => Err(StatusCode::UNAUTHORIZED.into_response()),
    }
}

/// Admin-realm visitor. Rejects with a redirect to the admin login route.
pub struct AdminSession(pub GatedVisitor);

impl<S> axum::extract::FromRequestParts<S> for AdminSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        gate_request(parts, &app_state, Realm::Admin).await.map(Self)
    }
}

/// Student-realm visitor. Rejects with a redirect to the student login route.
pub struct StudentSession(pub GatedVisitor);

impl<S> axum::extract::FromRequestParts<S> for StudentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        gate_request(parts, &app_state, Realm::Student).await.map(Self)
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct SignInBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/{realm}/sign-in` — check credentials, open or reuse the visitor
/// session, and answer with the landing route to navigate to.
pub async fn sign_in(
    State(state): State<AppState>,
    Path(realm): Path<String>,
    jar: CookieJar,
    Json(body): Json<SignInBody>,
) -> Response {
    let realm = match parse_realm(&realm) {
        Ok(realm) => realm,
        Err(resp) => return resp,
    };
    let identifier = match validate_sign_in_input(&body.email, &body.password) {
        Ok(identifier) => identifier,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.user_message() }))).into_response(),
    };

    // New visitors sign in on an ephemeral session that is only registered,
    // and handed a cookie, once the credentials check out.
    let (visitor, known) = match lookup_visitor(&state, &jar).await {
        Some(visitor) => (visitor, true),
        None => (Arc::new(VisitorSession::new(generate_token())), false),
    };

    let realm_state = state.realm(realm);
    let navigator = NavigationLog::new();
    let result = login::sign_in(
        realm_state.provider.as_ref(),
        &visitor,
        realm,
        &identifier,
        &body.password,
        &navigator,
        &realm_state.landing_route,
    )
    .await;

    match result {
        Ok(credential) => {
            if !known {
                state.sessions.register(visitor.clone()).await;
            }
            let jar = jar.add(session_cookie(visitor.token().to_owned(), state.cookie_secure));
            let body = json!({
                "redirect": navigator.last(),
                "session": Session::authenticated(Some(credential.subject_id)),
            });
            (jar, Json(body)).into_response()
        }
        Err(e) => {
            let body = json!({ "error": e.user_message(), "code": e.error_code() });
            (auth_error_to_status(&e), Json(body)).into_response()
        }
    }
}

/// `POST /api/{realm}/logout` — clear the realm session and answer with the
/// login route. Provider sign-out runs in the background.
pub async fn logout(State(state): State<AppState>, Path(realm): Path<String>, jar: CookieJar) -> Response {
    let realm = match parse_realm(&realm) {
        Ok(realm) => realm,
        Err(resp) => return resp,
    };
    let realm_state = state.realm(realm);
    let navigator = NavigationLog::new();
    let visitor = lookup_visitor(&state, &jar)
        .await
        .unwrap_or_else(|| Arc::new(VisitorSession::new(generate_token())));

    login::logout(realm_state.provider.clone(), &visitor, realm, &navigator, &realm_state.login_route);
    if !visitor.is_signed_in_anywhere() && state.sessions.close(visitor.token()).await.is_some()
    {
        info!(realm = realm.as_str(), "visitor signed out of every realm; session closed");
    }
    Json(json!({ "redirect": navigator.last() })).into_response()
}

/// `GET /api/{realm}/session` — the visitor's session as the realm's
/// configured check sees it. Never redirects.
pub async fn session(State(state): State<AppState>, Path(realm): Path<String>, jar: CookieJar) -> Response {
    let realm = match parse_realm(&realm) {
        Ok(realm) => realm,
        Err(resp) => return resp,
    };
    let Some(visitor) = lookup_visitor(&state, &jar).await else {
        return Json(Session::anonymous()).into_response();
    };
    let realm_state = state.realm(realm);
    let check = crate::services::gate::session_check(realm_state.check, visitor, realm, realm_state.provider.clone());
    Json(check.check_session().await).into_response()
}

/// `GET /api/student/me` — the signed-in student's record.
pub async fn student_me(State(state): State<AppState>, StudentSession(gated): StudentSession) -> Response {
    // A flag-checked gate can pass without a credential to look up.
    let Some(credential) = gated.credential(Realm::Student) else {
        let e = AuthError::Unauthenticated;
        info!(subject = ?gated.session.subject_id, "student gate passed without a credential");
        let body = json!({ "error": e.user_message(), "code": e.error_code() });
        return (auth_error_to_status(&e), Json(body)).into_response();
    };
    match admin::find_student_by_email(state.store.as_ref(), &credential.email).await {
        Ok(Some(student)) => Json(student).into_response(),
        Ok(None) => {
            info!(subject = %credential.subject_id, "no student record for signed-in account");
            (StatusCode::NOT_FOUND, Json(json!({ "error": "No student record for this session." }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "student lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.user_message() }))).into_response()
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
