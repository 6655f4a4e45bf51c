//! Session gate — route protection for views.
//!
//! STATE MACHINE
//! =============
//! A gate is mounted once per view instance and moves
//! `Checking → Authorized | Unauthorized` on the first resolution its
//! session check delivers. Both resolved states are terminal for the mount:
//! the subscription is dropped as soon as the gate settles, and `Checking`
//! is never re-entered.
//!
//! - `Checking`: render a loading indicator only.
//! - `Authorized`: render the protected view, never navigate.
//! - `Unauthorized`: issue exactly one replace-navigation, render nothing.
//!
//! A check that never resolves leaves the gate in `Checking`. Nothing is
//! admitted on silence.
//!
//! CANCELLATION
//! ============
//! The resolver task and `MountedGate::drop` share a `mounted` flag under one
//! mutex. The task only transitions and navigates while holding the lock with
//! the flag set, so no navigation can fire after unmount returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::auth::{AuthProvider, Credential};
use crate::services::session::{FLAG_TRUE, Realm, Session, VisitorSession};

// =============================================================================
// NAVIGATION
// =============================================================================

/// Side-effect sink for gate and login/logout redirects.
pub trait Navigator: Send + Sync {
    /// Replace the current location with `route`.
    fn replace(&self, route: &str);
}

/// Navigator that records every replace call. Request/response handlers
/// turn the recorded route into their redirect response.
#[derive(Debug, Default)]
pub struct NavigationLog {
    routes: Mutex<Vec<String>>,
}

impl NavigationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for NavigationLog {
    fn replace(&self, route: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.to_owned());
    }
}

// =============================================================================
// GATE STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Checking,
    Authorized,
    Unauthorized,
}

/// What the wrapped view may show for a given gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    Loading,
    Children,
    Nothing,
}

impl GateState {
    #[must_use]
    pub fn render(self) -> Render {
        match self {
            Self::Checking => Render::Loading,
            Self::Authorized => Render::Children,
            Self::Unauthorized => Render::Nothing,
        }
    }

    #[must_use]
    pub fn is_settled(self) -> bool {
        self != Self::Checking
    }

    /// Apply one session resolution. Settled states absorb all input.
    #[must_use]
    pub fn resolve(self, session: &Session) -> Self {
        use crate::services::session::SessionStatus;

        match (self, session.status) {
            (Self::Checking, SessionStatus::Authenticated) => Self::Authorized,
            (Self::Checking, SessionStatus::Anonymous) => Self::Unauthorized,
            (state, _) => state,
        }
    }
}

// =============================================================================
// SESSION CHECK STRATEGIES
// =============================================================================

/// Polymorphic session-check mechanism a gate subscribes to.
#[async_trait]
pub trait SessionCheck: Send + Sync {
    /// One-shot read of the current session.
    async fn check_session(&self) -> Session;

    /// Session resolutions: the current one first, then one per change.
    fn on_change(&self) -> BoxStream<'static, Session>;
}

/// Which mechanism a realm's gates consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStrategy {
    /// Verify the held credential with the realm's auth provider.
    Provider,
    /// Trust the visitor's local flag. No integrity guarantee.
    Flag,
}

impl CheckStrategy {
    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "provider" => Some(Self::Provider),
            "flag" => Some(Self::Flag),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Flag => "flag",
        }
    }
}

/// Stream a watch channel: the current value first, then every change.
/// Ends when the sender is dropped.
fn watch_stream<T>(rx: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
    .boxed()
}

async fn verify_credential(provider: &dyn AuthProvider, credential: Option<Credential>) -> Session {
    let Some(credential) = credential else {
        return Session::anonymous();
    };
    if !credential.is_live() {
        return Session::anonymous();
    }
    match provider.verify(&credential).await {
        Ok(true) => Session::authenticated(Some(credential.subject_id)),
        Ok(false) => Session::anonymous(),
        Err(e) => {
            warn!(error = %e, "session verification failed; treating visitor as anonymous");
            Session::anonymous()
        }
    }
}

/// Checks the visitor's realm credential against the auth provider.
pub struct ProviderCheck {
    visitor: Arc<VisitorSession>,
    realm: Realm,
    provider: Arc<dyn AuthProvider>,
}

impl ProviderCheck {
    #[must_use]
    pub fn new(visitor: Arc<VisitorSession>, realm: Realm, provider: Arc<dyn AuthProvider>) -> Self {
        Self { visitor, realm, provider }
    }
}

#[async_trait]
impl SessionCheck for ProviderCheck {
    async fn check_session(&self) -> Session {
        verify_credential(self.provider.as_ref(), self.visitor.credential(self.realm)).await
    }

    fn on_change(&self) -> BoxStream<'static, Session> {
        let provider = self.provider.clone();
        watch_stream(self.visitor.subscribe_auth_state(self.realm))
            .then(move |credential| {
                let provider = provider.clone();
                async move { verify_credential(provider.as_ref(), credential).await }
            })
            .boxed()
    }
}

fn flag_session(value: Option<&str>) -> Session {
    if value == Some(FLAG_TRUE) {
        Session::authenticated(None)
    } else {
        Session::anonymous()
    }
}

/// Checks the visitor's locally persisted realm flag.
pub struct FlagCheck {
    visitor: Arc<VisitorSession>,
    realm: Realm,
}

impl FlagCheck {
    #[must_use]
    pub fn new(visitor: Arc<VisitorSession>, realm: Realm) -> Self {
        Self { visitor, realm }
    }
}

#[async_trait]
impl SessionCheck for FlagCheck {
    async fn check_session(&self) -> Session {
        flag_session(self.visitor.flags().get(self.realm.flag_key()).as_deref())
    }

    fn on_change(&self) -> BoxStream<'static, Session> {
        let key = self.realm.flag_key();
        watch_stream(self.visitor.flags().subscribe())
            .map(move |flags: HashMap<String, String>| flag_session(flags.get(key).map(String::as_str)))
            .boxed()
    }
}

/// Build the configured session check for one visitor and realm.
#[must_use]
pub fn session_check(
    strategy: CheckStrategy,
    visitor: Arc<VisitorSession>,
    realm: Realm,
    provider: Arc<dyn AuthProvider>,
) -> Arc<dyn SessionCheck> {
    match strategy {
        CheckStrategy::Provider => Arc::new(ProviderCheck::new(visitor, realm, provider)),
        CheckStrategy::Flag => Arc::new(FlagCheck::new(visitor, realm)),
    }
}

// =============================================================================
// GATE
// =============================================================================

/// Gate state plus the session that settled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub state: GateState,
    pub session: Session,
}

#[derive(Clone)]
pub struct SessionGate {
    check: Arc<dyn SessionCheck>,
    redirect_to: String,
}

impl SessionGate {
    #[must_use]
    pub fn new(check: Arc<dyn SessionCheck>, redirect_to: impl Into<String>) -> Self {
        Self { check, redirect_to: redirect_to.into() }
    }

    #[must_use]
    pub fn redirect_to(&self) -> &str {
        &self.redirect_to
    }

    /// Resolve once for a request/response surface. Navigates exactly once
    /// when the visitor is not authorized.
    pub async fn evaluate(&self, navigator: &dyn Navigator) -> Resolution {
        let session = self.check.check_session().await;
        let state = GateState::Checking.resolve(&session);
        if state == GateState::Unauthorized {
            info!(route = %self.redirect_to, "session gate: redirecting unauthenticated request");
            navigator.replace(&self.redirect_to);
        }
        Resolution { state, session }
    }

    /// Mount the gate for a long-lived view. Must be called inside a Tokio
    /// runtime.
    #[must_use]
    pub fn mount(&self, navigator: Arc<dyn Navigator>) -> MountedGate {
        let (state_tx, state_rx) =
            watch::channel(Resolution { state: GateState::Checking, session: Session::unknown() });
        let mounted = Arc::new(Mutex::new(true));
        let mut changes = self.check.on_change();
        let route = self.redirect_to.clone();
        let task_mounted = mounted.clone();

        let task = tokio::spawn(async move {
            while let Some(session) = changes.next().await {
                let state = GateState::Checking.resolve(&session);
                if !state.is_settled() {
                    continue;
                }

                let still_mounted = task_mounted.lock().unwrap_or_else(PoisonError::into_inner);
                if !*still_mounted {
                    return;
                }
                state_tx.send_replace(Resolution { state, session });
                if state == GateState::Unauthorized {
                    info!(route = %route, "session gate: redirecting unauthenticated visitor");
                    navigator.replace(&route);
                } else {
                    debug!("session gate: visitor authorized");
                }
                return;
            }
        });

        MountedGate { state_rx, mounted, task }
    }
}

/// A gate bound to one view instance. Dropping it unmounts the view and
/// releases the session subscription.
pub struct MountedGate {
    state_rx: watch::Receiver<Resolution>,
    mounted: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl MountedGate {
    #[must_use]
    pub fn state(&self) -> GateState {
        self.state_rx.borrow().state
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.state_rx.borrow().session.clone()
    }

    #[must_use]
    pub fn render(&self) -> Render {
        self.state().render()
    }

    /// Wait until the gate settles. Returns `Checking` if the check ended
    /// without ever resolving.
    pub async fn settled(&mut self) -> GateState {
        let settled = self
            .state_rx
            .wait_for(|r| r.state.is_settled())
            .await
            .map(|r| r.state);
        settled.unwrap_or_else(|_| self.state_rx.borrow().state)
    }
}

impl Drop for MountedGate {
    fn drop(&mut self) {
        *self.mounted.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
