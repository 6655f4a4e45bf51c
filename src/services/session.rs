//! Visitor sessions and the process-wide session registry.
//!
//! ARCHITECTURE
//! ============
//! Every signed-in browser is a `VisitorSession`, addressed by a random token
//! carried in an HttpOnly cookie. A visitor holds, per realm, the credential
//! its auth provider issued (published on a `watch` channel so gates can
//! subscribe) and a small string key/value store standing in for
//! browser-scoped storage.
//!
//! The `SessionRegistry` is the single process-wide owner of visitor
//! sessions. It is created once at start-up, torn down on shutdown, and swept
//! for idle visitors in the background. Views read derived state through it
//! and never touch another component's storage.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::frame::now_ms;
use crate::services::auth::Credential;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// REALM
// =============================================================================

/// Audience a session belongs to. Each realm has its own provider, gate
/// configuration, and local flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    Admin,
    Student,
}

/// Value the local flag holds while signed in. Anything else reads as
/// signed out.
pub const FLAG_TRUE: &str = "true";
pub const FLAG_FALSE: &str = "false";

impl Realm {
    pub const ALL: [Realm; 2] = [Realm::Admin, Realm::Student];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }

    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    /// Key of the locally persisted "logged in" marker for this realm.
    #[must_use]
    pub fn flag_key(self) -> &'static str {
        match self {
            Self::Admin => "isAdminLoggedIn",
            Self::Student => "isStudentLoggedIn",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Admin => 0,
            Self::Student => 1,
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unknown,
    Authenticated,
    Anonymous,
}

/// Read-only view of a visitor's session in one realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub subject_id: Option<String>,
    pub status: SessionStatus,
}

impl Session {
    #[must_use]
    pub fn unknown() -> Self {
        Self { subject_id: None, status: SessionStatus::Unknown }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { subject_id: None, status: SessionStatus::Anonymous }
    }

    #[must_use]
    pub fn authenticated(subject_id: Option<String>) -> Self {
        Self { subject_id, status: SessionStatus::Authenticated }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

// =============================================================================
// LOCAL FLAGS
// =============================================================================

/// Visitor-scoped string key/value store. Reads and writes are synchronous;
/// changes are published so a gate can watch a key.
pub struct LocalFlags {
    tx: watch::Sender<HashMap<String, String>>,
}

impl LocalFlags {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HashMap::new());
        Self { tx }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.tx.borrow().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.tx.send_modify(|flags| {
            flags.insert(key.to_owned(), value.to_owned());
        });
    }

    pub fn remove(&self, key: &str) {
        self.tx.send_if_modified(|flags| flags.remove(key).is_some());
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, String>> {
        self.tx.subscribe()
    }
}

impl Default for LocalFlags {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// VISITOR SESSION
// =============================================================================

pub struct VisitorSession {
    token: String,
    flags: LocalFlags,
    auth: [watch::Sender<Option<Credential>>; 2],
    last_seen_ms: AtomicI64,
}

impl VisitorSession {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            token,
            flags: LocalFlags::new(),
            auth: [watch::channel(None).0, watch::channel(None).0],
            last_seen_ms: AtomicI64::new(now_ms()),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn flags(&self) -> &LocalFlags {
        &self.flags
    }

    #[must_use]
    pub fn credential(&self, realm: Realm) -> Option<Credential> {
        self.auth[realm.index()].borrow().clone()
    }

    /// Subscribe to the realm's auth state. The receiver's current value is
    /// the credential held right now.
    #[must_use]
    pub fn subscribe_auth_state(&self, realm: Realm) -> watch::Receiver<Option<Credential>> {
        self.auth[realm.index()].subscribe()
    }

    /// Derived session: authenticated iff a live credential is held.
    #[must_use]
    pub fn session(&self, realm: Realm) -> Session {
        match self.credential(realm) {
            Some(credential) if credential.is_live() => Session::authenticated(Some(credential.subject_id)),
            _ => Session::anonymous(),
        }
    }

    /// True while any realm holds a live credential or a set flag.
    #[must_use]
    pub fn is_signed_in_anywhere(&self) -> bool {
        Realm::ALL.iter().any(|realm| {
            self.session(*realm).is_authenticated() || self.flags.get(realm.flag_key()).as_deref() == Some(FLAG_TRUE)
        })
    }

    pub(crate) fn record_sign_in(&self, realm: Realm, credential: Credential) {
        self.auth[realm.index()].send_replace(Some(credential));
        self.flags.set(realm.flag_key(), FLAG_TRUE);
    }

    pub(crate) fn record_sign_in_failure(&self, realm: Realm) {
        self.flags.set(realm.flag_key(), FLAG_FALSE);
    }

    /// Drop the realm's credential and flag, returning the credential that
    /// was held.
    pub(crate) fn clear(&self, realm: Realm) -> Option<Credential> {
        self.flags.remove(realm.flag_key());
        self.auth[realm.index()].send_replace(None)
    }

    fn touch(&self, now: i64) {
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    fn idle_ms(&self, now: i64) -> i64 {
        now - self.last_seen_ms.load(Ordering::Relaxed)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Process-wide owner of visitor sessions. Clone is cheap.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    visitors: Arc<RwLock<HashMap<String, Arc<VisitorSession>>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session under a fresh token.
    #[cfg(test)]
    pub async fn open(&self) -> Arc<VisitorSession> {
        let visitor = Arc::new(VisitorSession::new(generate_token()));
        self.register(visitor.clone()).await;
        visitor
    }

    /// Start tracking a visitor built elsewhere, e.g. after a successful
    /// sign-in on an ephemeral session.
    pub async fn register(&self, visitor: Arc<VisitorSession>) {
        visitor.touch(now_ms());
        let mut visitors = self.visitors.write().await;
        visitors.insert(visitor.token().to_owned(), visitor);
    }

    /// Look up a session and refresh its idle clock.
    pub async fn get(&self, token: &str) -> Option<Arc<VisitorSession>> {
        let visitors = self.visitors.read().await;
        let visitor = visitors.get(token)?.clone();
        visitor.touch(now_ms());
        Some(visitor)
    }

    pub async fn close(&self, token: &str) -> Option<Arc<VisitorSession>> {
        let removed = self.visitors.write().await.remove(token);
        if let Some(visitor) = &removed {
            for realm in Realm::ALL {
                visitor.clear(realm);
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.visitors.read().await.len()
    }

    /// Remove every session. Open gates observe their credentials vanish.
    pub async fn teardown(&self) -> usize {
        let drained: Vec<_> = self.visitors.write().await.drain().collect();
        for (_, visitor) in &drained {
            for realm in Realm::ALL {
                visitor.clear(realm);
            }
        }
        drained.len()
    }

    /// Remove sessions idle for longer than `idle_ttl_ms`. Returns the count.
    pub async fn sweep_idle(&self, idle_ttl_ms: i64, now: i64) -> usize {
        let mut visitors = self.visitors.write().await;
        let before = visitors.len();
        visitors.retain(|_, visitor| visitor.idle_ms(now) <= idle_ttl_ms);
        before - visitors.len()
    }
}

/// Spawn the idle-session sweeper. Returns a handle for shutdown.
pub fn spawn_session_sweeper(registry: SessionRegistry, idle_ttl: Duration, interval: Duration) -> JoinHandle<()> {
    let idle_ttl_ms = i64::try_from(idle_ttl.as_millis()).unwrap_or(i64::MAX);
    info!(idle_ttl_secs = idle_ttl.as_secs(), interval_secs = interval.as_secs(), "session sweeper configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let evicted = registry.sweep_idle(idle_ttl_ms, now_ms()).await;
            if evicted > 0 {
                let remaining = registry.len().await;
                info!(evicted, remaining, "session sweeper evicted idle visitors");
            }
        }
    })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
