//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the document store, the visitor session registry, and one
//! `RealmState` per realm naming the realm's auth provider, session-check
//! strategy and redirect routes. Gates are built per request or per view
//! connection from these parts.

use std::sync::Arc;

use crate::config::{AuthBackend, RealmConfig};
use crate::services::auth::{AccountAllowlist, AuthError, AuthProvider, StaticAuthProvider};
use crate::services::gate::{CheckStrategy, SessionGate, session_check};
use crate::services::identity_toolkit::IdentityToolkitProvider;
use crate::services::session::{Realm, SessionRegistry, VisitorSession};
use crate::services::store::DocumentStore;

// =============================================================================
// REALM STATE
// =============================================================================

pub struct RealmState {
    pub provider: Arc<dyn AuthProvider>,
    pub check: CheckStrategy,
    pub login_route: String,
    pub landing_route: String,
}

impl RealmState {
    /// Build a realm from config, constructing its auth provider.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Network` if the provider's HTTP client cannot be
    /// built.
    pub fn from_config(config: &RealmConfig) -> Result<Self, AuthError> {
        Ok(Self {
            provider: build_provider(&config.auth)?,
            check: config.check,
            login_route: config.login_route.clone(),
            landing_route: config.landing_route.clone(),
        })
    }

    /// Gate for one visitor in this realm, redirecting to the login route.
    #[must_use]
    pub fn gate(&self, visitor: Arc<VisitorSession>, realm: Realm) -> SessionGate {
        let check = session_check(self.check, visitor, realm, self.provider.clone());
        SessionGate::new(check, self.login_route.clone())
    }
}

fn build_provider(backend: &AuthBackend) -> Result<Arc<dyn AuthProvider>, AuthError> {
    match backend {
        AuthBackend::Static { accounts } => {
            let provider = accounts
                .iter()
                .fold(StaticAuthProvider::new(), |p, (id, secret)| p.with_account(id, secret));
            if provider.is_empty() {
                tracing::warn!("static auth provider has no accounts; every sign-in will be rejected");
            }
            Ok(Arc::new(provider))
        }
        AuthBackend::IdentityToolkit { base_url, api_key, allowlist } => Ok(Arc::new(IdentityToolkitProvider::new(
            base_url,
            api_key,
            AccountAllowlist::parse(allowlist),
        )?)),
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub sessions: SessionRegistry,
    pub admin: Arc<RealmState>,
    pub student: Arc<RealmState>,
    pub cookie_secure: bool,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, admin: RealmState, student: RealmState, cookie_secure: bool) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(),
            admin: Arc::new(admin),
            student: Arc::new(student),
            cookie_secure,
        }
    }

    #[must_use]
    pub fn realm(&self, realm: Realm) -> &RealmState {
        match realm {
            Realm::Admin => &self.admin,
            Realm::Student => &self.student,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
