use super::*;

#[test]
fn map_provider_error_email_not_found() {
    assert_eq!(map_provider_error("EMAIL_NOT_FOUND"), AuthError::UserNotFound);
}

#[test]
fn map_provider_error_bad_password_variants() {
    for code in ["INVALID_PASSWORD", "INVALID_LOGIN_CREDENTIALS", "USER_DISABLED", "INVALID_EMAIL"] {
        assert_eq!(map_provider_error(code), AuthError::InvalidCredential, "{code}");
    }
}

#[test]
fn map_provider_error_strips_detail_suffix() {
    assert_eq!(
        map_provider_error("INVALID_LOGIN_CREDENTIALS : The supplied auth credential is incorrect"),
        AuthError::InvalidCredential
    );
}

#[test]
fn map_provider_error_unknown_is_network() {
    let err = map_provider_error("TOO_MANY_ATTEMPTS_TRY_LATER : slow down");
    assert!(matches!(err, AuthError::Network(_)));
}

#[test]
fn parse_expires_in_defaults() {
    assert_eq!(parse_expires_in(Some("1800")), 1800);
    assert_eq!(parse_expires_in(Some(" 60 ")), 60);
    assert_eq!(parse_expires_in(Some("soon")), DEFAULT_EXPIRES_IN_SECS);
    assert_eq!(parse_expires_in(Some("-5")), DEFAULT_EXPIRES_IN_SECS);
    assert_eq!(parse_expires_in(None), DEFAULT_EXPIRES_IN_SECS);
}

#[test]
fn endpoint_includes_method_and_key() {
    let provider = IdentityToolkitProvider::new("https://auth.example.com/v1/", "k123", AccountAllowlist::default())
        .expect("client builds");
    assert_eq!(
        provider.endpoint("signInWithPassword"),
        "https://auth.example.com/v1/accounts:signInWithPassword?key=k123"
    );
}

#[test]
fn sign_in_response_parses_camel_case() {
    let raw = r#"{"localId":"u1","email":"S@x.com","idToken":"tok","expiresIn":"3600","registered":true}"#;
    let body: SignInResponse = serde_json::from_str(raw).expect("parse");
    assert_eq!(body.local_id, "u1");
    assert_eq!(body.id_token, "tok");
    assert_eq!(body.expires_in.as_deref(), Some("3600"));
}

#[tokio::test]
async fn expired_credential_fails_verification_without_network() {
    let provider = IdentityToolkitProvider::new("http://127.0.0.1:9", "k", AccountAllowlist::default())
        .expect("client builds");
    let credential = Credential {
        subject_id: "u1".into(),
        email: "s@x.com".into(),
        id_token: "tok".into(),
        expires_at_ms: 1,
    };
    assert_eq!(provider.verify(&credential).await, Ok(false));
}

#[tokio::test]
async fn unreachable_provider_maps_to_network_error() {
    let provider = IdentityToolkitProvider::new("http://127.0.0.1:9", "k", AccountAllowlist::default())
        .expect("client builds");
    let err = provider
        .sign_in("student@x.com", "pw")
        .await
        .expect_err("nothing listens on port 9");
    assert!(matches!(err, AuthError::Network(_)));
}
