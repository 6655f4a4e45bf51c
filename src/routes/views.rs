//! Live admin views over websocket.
//!
//! DESIGN
//! ======
//! Each connection mounts the admin gate once. The live query is subscribed
//! only after the gate authorizes; an unauthorized visitor receives a single
//! `gate:redirect` frame and never sees view content.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `gate:checking`
//! 2. Gate settles:
//!    - authorized → `gate:authorized`, then `view:snapshot` on every change
//!    - unauthorized → `gate:redirect` with the login route
//! 3. Once authorized, client may send `session:logout` → done reply, then
//!    `gate:redirect`. At most one redirect is sent per connection.
//! 4. Close → drop the gate and the live query

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame::{Data, Frame, Status};
use crate::routes::auth::lookup_visitor;
use crate::services::admin::{AdminView, GENERIC_FAILURE};
use crate::services::gate::{GateState, Navigator, Render};
use crate::services::login;
use crate::services::session::{Realm, VisitorSession, generate_token};
use crate::services::store::{Document, LiveQuery, StoreError, subscribe_query};
use crate::state::AppState;

// =============================================================================
// NAVIGATION
// =============================================================================

/// Navigator that forwards routes to the connection loop.
struct ChannelNavigator(mpsc::UnboundedSender<String>);

impl Navigator for ChannelNavigator {
    fn replace(&self, route: &str) {
        // Receiver gone means the socket already closed.
        let _ = self.0.send(route.to_owned());
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_view(
    State(state): State<AppState>,
    Path(view): Path<String>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(view) = AdminView::from_str(&view) else {
        return (StatusCode::NOT_FOUND, "unknown view").into_response();
    };
    let visitor = match lookup_visitor(&state, &jar).await {
        Some(visitor) => visitor,
        None => Arc::new(VisitorSession::new(generate_token())),
    };
    ws.on_upgrade(move |socket| run_view(socket, state, visitor, view))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_view(mut socket: WebSocket, state: AppState, visitor: Arc<VisitorSession>, view: AdminView) {
    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel::<String>();
    let navigator: Arc<dyn Navigator> = Arc::new(ChannelNavigator(nav_tx));
    let gate = state.admin.gate(visitor.clone(), Realm::Admin);
    let mut mounted = gate.mount(navigator.clone());

    let checking = Frame::request("gate:checking", Data::new()).with_view(view.as_str());
    if send_frame(&mut socket, &checking).await.is_err() {
        return;
    }
    info!(view = view.as_str(), route = gate.redirect_to(), "view: gate mounted");

    let mut gate_pending = true;
    // At most one redirect per mount, whether it came from the gate or logout.
    let mut redirected = false;
    let mut live: Option<LiveQuery> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let reply = process_inbound_text(&state, &visitor, navigator.as_ref(), mounted.state(), view, &text);
                        if send_frame(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(route) = nav_rx.recv() => {
                live = None;
                if redirected {
                    debug!(view = view.as_str(), %route, "view: redirect already sent");
                    continue;
                }
                redirected = true;
                let redirect = Frame::request("gate:redirect", Data::new())
                    .with_view(view.as_str())
                    .with_data("route", route);
                if send_frame(&mut socket, &redirect).await.is_err() {
                    break;
                }
            }
            _ = mounted.settled(), if gate_pending => {
                gate_pending = false;
                if mounted.render() == Render::Children && !redirected {
                    let authorized = Frame::request("gate:authorized", Data::new())
                        .with_view(view.as_str())
                        .with_data("session", json!(mounted.session()));
                    if send_frame(&mut socket, &authorized).await.is_err() {
                        break;
                    }
                    live = Some(subscribe_query(state.store.clone(), view.collection(), view.order()));
                }
            }
            snapshot = next_snapshot(&mut live), if live.is_some() => {
                let Some(snapshot) = snapshot else {
                    live = None;
                    continue;
                };
                let frame = snapshot_frame(view, snapshot);
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(live);
    drop(mounted);
    info!(view = view.as_str(), "view: connection closed");
}

async fn next_snapshot(live: &mut Option<LiveQuery>) -> Option<Result<Vec<Document>, StoreError>> {
    match live.as_mut() {
        Some(query) => query.next().await,
        None => None,
    }
}

fn snapshot_frame(view: AdminView, snapshot: Result<Vec<Document>, StoreError>) -> Frame {
    let docs = match snapshot {
        Ok(docs) => docs,
        Err(e) => {
            warn!(view = view.as_str(), error = %e, "view: live query failed");
            return Frame::request("view:error", Data::new())
                .with_view(view.as_str())
                .error_coded(&e, GENERIC_FAILURE);
        }
    };
    match view.render(&docs) {
        Ok(records) => Frame::request("view:snapshot", Data::new())
            .with_view(view.as_str())
            .with_data("records", records),
        Err(e) => {
            warn!(view = view.as_str(), error = %e, "view: render failed");
            Frame::request("view:error", Data::new())
                .with_view(view.as_str())
                .error_coded(&StoreError::Decode(e), GENERIC_FAILURE)
        }
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse one inbound text frame and return the reply for the sender.
fn process_inbound_text(
    state: &AppState,
    visitor: &VisitorSession,
    navigator: &dyn Navigator,
    gate: GateState,
    view: AdminView,
    text: &str,
) -> Frame {
    let req: Frame = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            warn!(view = view.as_str(), error = %e, "view: invalid inbound frame");
            return Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
        }
    };
    if req.status != Status::Request {
        return req.error("expected a request frame");
    }

    info!(view = view.as_str(), id = %req.id, syscall = %req.syscall, "view: recv frame");
    match req.prefix() {
        "session" => handle_session(state, visitor, navigator, gate, &req),
        prefix => req.error(format!("unknown prefix: {prefix}")),
    }
}

fn handle_session(
    state: &AppState,
    visitor: &VisitorSession,
    navigator: &dyn Navigator,
    gate: GateState,
    req: &Frame,
) -> Frame {
    match req.syscall.as_str() {
        // Checking and Unauthorized views already own their one navigation.
        "session:logout" if gate != GateState::Authorized => req.error("view is not authorized"),
        "session:logout" => {
            let realm = &state.admin;
            login::logout(realm.provider.clone(), visitor, Realm::Admin, navigator, &realm.login_route);
            req.done()
        }
        other => req.error(format!("unknown syscall: {other}")),
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "view: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, "view: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "view: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "views_test.rs"]
mod tests;
