//! Hosted auth provider over the Identity Toolkit REST API.
//!
//! DESIGN
//! ======
//! Password sign-in goes through `accounts:signInWithPassword`; credential
//! verification uses `accounts:lookup` with the issued id token. The hosted
//! service has no server-side sign-out for id tokens, so `sign_out` is a local
//! no-op and the visitor session drop is what ends access.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::auth::{AccountAllowlist, AuthError, AuthProvider, Credential, normalize_email};
use crate::frame::now_ms;

pub const DEFAULT_IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 15;
const CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    id_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map an Identity Toolkit error message onto the auth error taxonomy.
///
/// Messages look like `INVALID_PASSWORD` or
/// `TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account ...`.
pub(crate) fn map_provider_error(message: &str) -> AuthError {
    let code = message.split([' ', ':']).next().unwrap_or_default();
    match code {
        "EMAIL_NOT_FOUND" => AuthError::UserNotFound,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" | "INVALID_EMAIL" => {
            AuthError::InvalidCredential
        }
        _ => AuthError::Network(message.to_owned()),
    }
}

fn parse_expires_in(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
}

pub struct IdentityToolkitProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    allowlist: AccountAllowlist,
}

impl IdentityToolkitProvider {
    /// Build a provider for the given base URL and API key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Network` if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, allowlist: AccountAllowlist) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            allowlist,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{method}?key={}", self.base_url, self.api_key)
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<reqwest::Response, AuthError> {
        self.http
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))
    }
}

async fn read_error(resp: reqwest::Response) -> AuthError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => map_provider_error(&envelope.error.message),
        Err(_) => AuthError::Network(format!("{status}: {body}")),
    }
}

#[async_trait]
impl AuthProvider for IdentityToolkitProvider {
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
        let email = normalize_email(identifier).ok_or(AuthError::UserNotFound)?;
        let resp = self
            .post(
                "signInWithPassword",
                serde_json::json!({ "email": email, "password": secret, "returnSecureToken": true }),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }

        let body: SignInResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        if !self.allowlist.permits(&body.email) {
            tracing::warn!("identity toolkit sign-in rejected: account outside realm allowlist");
            return Err(AuthError::InvalidCredential);
        }

        let expires_in = parse_expires_in(body.expires_in.as_deref());
        Ok(Credential {
            subject_id: body.local_id,
            email: body.email.to_ascii_lowercase(),
            id_token: body.id_token,
            expires_at_ms: now_ms() + expires_in * 1000,
        })
    }

    async fn sign_out(&self, _credential: &Credential) -> Result<(), AuthError> {
        Ok(())
    }

    async fn verify(&self, credential: &Credential) -> Result<bool, AuthError> {
        if !credential.is_live() {
            return Ok(false);
        }
        let resp = self
            .post("lookup", serde_json::json!({ "idToken": credential.id_token }))
            .await?;
        if resp.status().is_client_error() {
            // Expired or revoked tokens come back as 400 INVALID_ID_TOKEN.
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }

        let body: LookupResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(body
            .users
            .iter()
            .any(|u| u.local_id == credential.subject_id && !u.disabled))
    }
}

#[cfg(test)]
#[path = "identity_toolkit_test.rs"]
mod tests;
