//! Auth provider boundary and the static account provider.
//!
//! SYSTEM CONTEXT
//! ==============
//! Sign-in and credential verification are delegated to a hosted
//! authentication service behind the [`AuthProvider`] trait. Session gates
//! only ever see the outcome of [`AuthProvider::verify`]; sign-in failures
//! stay on the login surface.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::frame::{ErrorCode, now_ms};
use crate::services::session::{bytes_to_hex, generate_token};

/// Lifetime of credentials issued by [`StaticAuthProvider`].
pub const CREDENTIAL_TTL_MS: i64 = 60 * 60 * 1000;

// =============================================================================
// TYPES
// =============================================================================

/// Credential issued by an auth provider after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Credential {
    /// Opaque subject identifier assigned by the provider.
    pub subject_id: String,
    /// Normalized email of the signed-in account.
    pub email: String,
    /// Bearer token presented back to the provider for verification.
    #[serde(skip)]
    pub id_token: String,
    /// Expiry in milliseconds since Unix epoch.
    pub expires_at_ms: i64,
}

impl Credential {
    #[must_use]
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expires_at_ms > now
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_live_at(now_ms())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("user not found")]
    UserNotFound,
    #[error("auth provider unreachable: {0}")]
    Network(String),
    #[error("not signed in")]
    Unauthenticated,
}

impl AuthError {
    /// The single user-visible message for each failure case.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "Invalid email or password.",
            Self::UserNotFound => "No account found for that email.",
            Self::Network(_) => "Login failed. Please try again.",
            Self::Unauthenticated => "Please sign in to continue.",
        }
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "E_INVALID_CREDENTIAL",
            Self::UserNotFound => "E_USER_NOT_FOUND",
            Self::Network(_) => "E_AUTH_NETWORK",
            Self::Unauthenticated => "E_UNAUTHENTICATED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange an identifier/secret pair for a credential.
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError>;

    /// Revoke a credential. Callers treat this as fire-and-forget.
    async fn sign_out(&self, credential: &Credential) -> Result<(), AuthError>;

    /// Ask the provider whether a credential is still valid.
    async fn verify(&self, credential: &Credential) -> Result<bool, AuthError>;
}

/// Trim and lowercase an email, rejecting anything without a single `@`
/// separating two non-empty parts.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

fn hash_secret(secret: &str) -> String {
    bytes_to_hex(&Sha256::digest(secret.as_bytes()))
}

// =============================================================================
// STATIC PROVIDER
// =============================================================================

struct Account {
    subject_id: String,
    email: String,
    secret_hash: String,
}

/// Provider backed by a fixed set of configured accounts.
///
/// Used for the admin realm (`ADMIN_ID` / `ADMIN_PASSWORD`) and as the
/// disabled fallback when no hosted provider is configured. Secrets are kept
/// only as SHA-256 digests; issued tokens live in memory until sign-out or
/// expiry.
pub struct StaticAuthProvider {
    accounts: HashMap<String, Account>,
    issued: Mutex<HashMap<String, i64>>,
}

impl StaticAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self { accounts: HashMap::new(), issued: Mutex::new(HashMap::new()) }
    }

    /// Register an account. Identifiers that are not valid emails are ignored.
    #[must_use]
    pub fn with_account(mut self, identifier: &str, secret: &str) -> Self {
        let Some(email) = normalize_email(identifier) else {
            tracing::warn!("static auth account ignored: identifier is not an email");
            return self;
        };
        let subject_id = format!("static-{}", &hash_secret(&email)[..16]);
        self.accounts
            .insert(email.clone(), Account { subject_id, email, secret_hash: hash_secret(secret) });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn prune_expired(issued: &mut HashMap<String, i64>, now: i64) {
        issued.retain(|_, expires_at| *expires_at > now);
    }
}

impl Default for StaticAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
        let email = normalize_email(identifier).ok_or(AuthError::UserNotFound)?;
        let account = self.accounts.get(&email).ok_or(AuthError::UserNotFound)?;
        if account.secret_hash != hash_secret(secret) {
            return Err(AuthError::InvalidCredential);
        }

        let now = now_ms();
        let credential = Credential {
            subject_id: account.subject_id.clone(),
            email: account.email.clone(),
            id_token: generate_token(),
            expires_at_ms: now + CREDENTIAL_TTL_MS,
        };

        let mut issued = self
            .issued
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::prune_expired(&mut issued, now);
        issued.insert(credential.id_token.clone(), credential.expires_at_ms);
        Ok(credential)
    }

    async fn sign_out(&self, credential: &Credential) -> Result<(), AuthError> {
        let mut issued = self
            .issued
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        issued.remove(&credential.id_token);
        Ok(())
    }

    async fn verify(&self, credential: &Credential) -> Result<bool, AuthError> {
        let now = now_ms();
        let issued = self
            .issued
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(issued
            .get(&credential.id_token)
            .is_some_and(|expires_at| *expires_at > now))
    }
}

/// Set of accounts allowed through a provider that does not know about
/// realms. Empty means everyone the provider accepts.
#[derive(Debug, Clone, Default)]
pub struct AccountAllowlist {
    emails: HashSet<String>,
}

impl AccountAllowlist {
    /// Parse a comma-separated list of emails.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let emails = raw.split(',').filter_map(normalize_email).collect();
        Self { emails }
    }

    #[must_use]
    pub fn permits(&self, email: &str) -> bool {
        self.emails.is_empty() || normalize_email(email).is_some_and(|e| self.emails.contains(&e))
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
