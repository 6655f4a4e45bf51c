//! Login and logout actions.
//!
//! Sign-in errors stay on the login surface: they are mapped to one message
//! per case and never reach a gate. Logout always clears locally and
//! navigates once; the provider sign-out runs detached and may fail quietly.

use std::sync::Arc;

use tracing::{info, warn};

use crate::services::auth::{AuthError, AuthProvider, Credential, normalize_email};
use crate::services::gate::Navigator;
use crate::services::session::{Realm, VisitorSession};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignInInputError {
    #[error("email and password are required")]
    MissingField,
    #[error("email is malformed")]
    MalformedEmail,
}

impl SignInInputError {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingField => "Email and password are required.",
            Self::MalformedEmail => "Enter a valid email address.",
        }
    }
}

/// Validate a sign-in form. Returns the normalized identifier.
///
/// # Errors
///
/// Returns [`SignInInputError`] when a field is blank or the identifier is
/// not an email.
pub fn validate_sign_in_input(identifier: &str, secret: &str) -> Result<String, SignInInputError> {
    if identifier.trim().is_empty() || secret.trim().is_empty() {
        return Err(SignInInputError::MissingField);
    }
    normalize_email(identifier).ok_or(SignInInputError::MalformedEmail)
}

/// Sign a visitor into a realm and navigate to `landing` on success.
///
/// On failure the realm flag is set to `"false"`, nothing navigates, and
/// the provider error is returned for the login surface to display.
///
/// # Errors
///
/// Returns the provider's [`AuthError`] unchanged.
pub async fn sign_in(
    provider: &dyn AuthProvider,
    visitor: &VisitorSession,
    realm: Realm,
    identifier: &str,
    secret: &str,
    navigator: &dyn Navigator,
    landing: &str,
) -> Result<Credential, AuthError> {
    match provider.sign_in(identifier, secret).await {
        Ok(credential) => {
            info!(realm = realm.as_str(), subject = %credential.subject_id, "sign-in succeeded");
            visitor.record_sign_in(realm, credential.clone());
            navigator.replace(landing);
            Ok(credential)
        }
        Err(e) => {
            info!(realm = realm.as_str(), error = %e, "sign-in rejected");
            visitor.record_sign_in_failure(realm);
            Err(e)
        }
    }
}

/// Clear the visitor's realm session, revoke the credential in the
/// background, and navigate to `login_route` exactly once.
pub fn logout(
    provider: Arc<dyn AuthProvider>,
    visitor: &VisitorSession,
    realm: Realm,
    navigator: &dyn Navigator,
    login_route: &str,
) {
    if let Some(credential) = visitor.clear(realm) {
        tokio::spawn(async move {
            if let Err(e) = provider.sign_out(&credential).await {
                warn!(error = %e, "provider sign-out failed; local session already cleared");
            }
        });
    }
    info!(realm = realm.as_str(), route = login_route, "visitor logged out");
    navigator.replace(login_route);
}

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;
