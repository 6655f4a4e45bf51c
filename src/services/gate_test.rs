use super::*;
use crate::services::auth::{AuthError, StaticAuthProvider};
use crate::services::session::{FLAG_FALSE, SessionStatus, generate_token};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep, timeout};

const LOGIN: &str = "/admin/login";

/// Session check driven by the test through an unbounded channel.
struct ScriptedCheck {
    current: Session,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Session>>>,
}

fn scripted(current: Session) -> (Arc<ScriptedCheck>, mpsc::UnboundedSender<Session>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ScriptedCheck { current, rx: Mutex::new(Some(rx)) }), tx)
}

#[async_trait]
impl SessionCheck for ScriptedCheck {
    async fn check_session(&self) -> Session {
        self.current.clone()
    }

    fn on_change(&self) -> BoxStream<'static, Session> {
        let rx = self
            .rx
            .lock()
            .expect("script mutex")
            .take()
            .expect("scripted check mounts once");
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|s| (s, rx)) }).boxed()
    }
}

struct FailingProvider;

#[async_trait]
impl AuthProvider for FailingProvider {
    async fn sign_in(&self, _identifier: &str, _secret: &str) -> Result<Credential, AuthError> {
        Err(AuthError::Network("partitioned".into()))
    }

    async fn sign_out(&self, _credential: &Credential) -> Result<(), AuthError> {
        Err(AuthError::Network("partitioned".into()))
    }

    async fn verify(&self, _credential: &Credential) -> Result<bool, AuthError> {
        Err(AuthError::Network("partitioned".into()))
    }
}

fn live_credential() -> Credential {
    Credential {
        subject_id: "subject-1".into(),
        email: "admin@x.com".into(),
        id_token: "tok".into(),
        expires_at_ms: i64::MAX,
    }
}

async fn settle(gate: &mut MountedGate) -> GateState {
    timeout(Duration::from_millis(500), gate.settled())
        .await
        .expect("gate should settle")
}

async fn wait_closed(tx: &mpsc::UnboundedSender<Session>) {
    timeout(Duration::from_millis(500), tx.closed())
        .await
        .expect("subscription should be released");
}

// =============================================================================
// GateState
// =============================================================================

#[test]
fn render_follows_state() {
    assert_eq!(GateState::Checking.render(), Render::Loading);
    assert_eq!(GateState::Authorized.render(), Render::Children);
    assert_eq!(GateState::Unauthorized.render(), Render::Nothing);
}

#[test]
fn resolve_from_checking() {
    let authed = Session::authenticated(Some("s".into()));
    assert_eq!(GateState::Checking.resolve(&authed), GateState::Authorized);
    assert_eq!(GateState::Checking.resolve(&Session::anonymous()), GateState::Unauthorized);
    assert_eq!(GateState::Checking.resolve(&Session::unknown()), GateState::Checking);
}

#[test]
fn settled_states_absorb_input() {
    let authed = Session::authenticated(None);
    assert_eq!(GateState::Authorized.resolve(&Session::anonymous()), GateState::Authorized);
    assert_eq!(GateState::Unauthorized.resolve(&authed), GateState::Unauthorized);
}

#[test]
fn check_strategy_parses_case_insensitively() {
    assert_eq!(CheckStrategy::from_str(" Provider "), Some(CheckStrategy::Provider));
    assert_eq!(CheckStrategy::from_str("FLAG"), Some(CheckStrategy::Flag));
    assert_eq!(CheckStrategy::from_str("both"), None);
    assert_eq!(CheckStrategy::Flag.as_str(), "flag");
}

// =============================================================================
// Mounted gate
// =============================================================================

#[tokio::test]
async fn checking_renders_loading_until_resolution() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    sleep(Duration::from_millis(30)).await;
    assert_eq!(gate.state(), GateState::Checking);
    assert_eq!(gate.render(), Render::Loading);
    assert!(nav.routes().is_empty());
    drop(tx);
}

#[tokio::test]
async fn authenticated_resolution_renders_children_without_navigation() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    tx.send(Session::authenticated(Some("subject-1".into()))).expect("gate listening");
    assert_eq!(settle(&mut gate).await, GateState::Authorized);
    assert_eq!(gate.render(), Render::Children);
    assert_eq!(gate.session().subject_id.as_deref(), Some("subject-1"));
    assert!(nav.routes().is_empty());
}

#[tokio::test]
async fn anonymous_resolution_navigates_exactly_once() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    tx.send(Session::anonymous()).expect("gate listening");
    assert_eq!(settle(&mut gate).await, GateState::Unauthorized);
    assert_eq!(gate.render(), Render::Nothing);

    // Later changes reach nobody: the subscription is gone.
    wait_closed(&tx).await;
    assert!(tx.send(Session::anonymous()).is_err());
    sleep(Duration::from_millis(30)).await;
    assert_eq!(nav.routes(), vec![LOGIN.to_owned()]);
}

#[tokio::test]
async fn authorized_gate_releases_subscription_and_ignores_later_changes() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    tx.send(Session::authenticated(None)).expect("gate listening");
    assert_eq!(settle(&mut gate).await, GateState::Authorized);
    wait_closed(&tx).await;
    assert_eq!(gate.state(), GateState::Authorized);
    assert!(nav.routes().is_empty());
}

#[tokio::test]
async fn unknown_resolution_keeps_checking() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    tx.send(Session::unknown()).expect("gate listening");
    sleep(Duration::from_millis(30)).await;
    assert_eq!(gate.state(), GateState::Checking);

    tx.send(Session::anonymous()).expect("gate listening");
    assert_eq!(settle(&mut gate).await, GateState::Unauthorized);
    assert_eq!(nav.routes().len(), 1);
}

#[tokio::test]
async fn never_resolving_check_stays_checking() {
    let (check, _tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    assert!(timeout(Duration::from_millis(80), gate.settled()).await.is_err());
    assert_eq!(gate.render(), Render::Loading);
    assert!(nav.routes().is_empty());
}

#[tokio::test]
async fn check_ending_without_resolution_reports_checking() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    drop(tx);
    assert_eq!(settle(&mut gate).await, GateState::Checking);
    assert!(nav.routes().is_empty());
}

#[tokio::test]
async fn unmount_before_resolution_never_navigates() {
    let (check, tx) = scripted(Session::unknown());
    let nav = Arc::new(NavigationLog::new());
    let gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    drop(gate);
    wait_closed(&tx).await;
    let _ = tx.send(Session::anonymous());
    sleep(Duration::from_millis(30)).await;
    assert!(nav.routes().is_empty());
}

// =============================================================================
// One-shot evaluation
// =============================================================================

#[tokio::test]
async fn evaluate_anonymous_navigates_once() {
    let (check, _tx) = scripted(Session::anonymous());
    let nav = NavigationLog::new();
    let resolution = SessionGate::new(check, LOGIN).evaluate(&nav).await;

    assert_eq!(resolution.state, GateState::Unauthorized);
    assert_eq!(nav.routes(), vec![LOGIN.to_owned()]);
}

#[tokio::test]
async fn evaluate_authenticated_does_not_navigate() {
    let (check, _tx) = scripted(Session::authenticated(Some("s".into())));
    let nav = NavigationLog::new();
    let resolution = SessionGate::new(check, LOGIN).evaluate(&nav).await;

    assert_eq!(resolution.state, GateState::Authorized);
    assert_eq!(resolution.session.status, SessionStatus::Authenticated);
    assert!(nav.last().is_none());
}

// =============================================================================
// ProviderCheck
// =============================================================================

#[tokio::test]
async fn provider_check_verifies_with_provider() {
    let provider = Arc::new(StaticAuthProvider::new().with_account("admin@x.com", "pw"));
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    let credential = provider.sign_in("admin@x.com", "pw").await.expect("sign in");
    visitor.record_sign_in(Realm::Admin, credential.clone());

    let check = ProviderCheck::new(visitor.clone(), Realm::Admin, provider.clone());
    assert!(check.check_session().await.is_authenticated());

    provider.sign_out(&credential).await.expect("revoke");
    assert_eq!(check.check_session().await, Session::anonymous());
}

#[tokio::test]
async fn provider_check_fails_closed_on_provider_error() {
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    visitor.record_sign_in(Realm::Admin, live_credential());

    let check = ProviderCheck::new(visitor, Realm::Admin, Arc::new(FailingProvider));
    assert_eq!(check.check_session().await, Session::anonymous());
}

#[tokio::test]
async fn provider_check_ignores_local_flag() {
    let provider = Arc::new(StaticAuthProvider::new());
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    visitor.flags().set(Realm::Admin.flag_key(), FLAG_TRUE);

    let check = ProviderCheck::new(visitor, Realm::Admin, provider);
    assert_eq!(check.check_session().await, Session::anonymous());
}

#[tokio::test]
async fn mounted_provider_gate_authorizes_signed_in_visitor() {
    let provider = Arc::new(StaticAuthProvider::new().with_account("admin@x.com", "pw"));
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    let credential = provider.sign_in("admin@x.com", "pw").await.expect("sign in");
    let subject = credential.subject_id.clone();
    visitor.record_sign_in(Realm::Admin, credential);

    let check = session_check(CheckStrategy::Provider, visitor, Realm::Admin, provider);
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    assert_eq!(settle(&mut gate).await, GateState::Authorized);
    assert_eq!(gate.session().subject_id, Some(subject));
    assert!(nav.routes().is_empty());
}

#[tokio::test]
async fn mounted_provider_gate_redirects_anonymous_visitor() {
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    let check = session_check(CheckStrategy::Provider, visitor, Realm::Admin, Arc::new(StaticAuthProvider::new()));
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    assert_eq!(settle(&mut gate).await, GateState::Unauthorized);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(nav.routes(), vec![LOGIN.to_owned()]);
}

// =============================================================================
// FlagCheck
// =============================================================================

#[tokio::test]
async fn flag_check_requires_literal_true() {
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    let check = FlagCheck::new(visitor.clone(), Realm::Admin);
    assert_eq!(check.check_session().await, Session::anonymous());

    for value in ["tfrue", "TRUE", "1", FLAG_FALSE, ""] {
        visitor.flags().set(Realm::Admin.flag_key(), value);
        assert_eq!(check.check_session().await, Session::anonymous(), "{value:?}");
    }

    visitor.flags().set(Realm::Admin.flag_key(), FLAG_TRUE);
    assert_eq!(check.check_session().await, Session::authenticated(None));
}

#[tokio::test]
async fn flag_check_is_realm_scoped() {
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    visitor.flags().set(Realm::Admin.flag_key(), FLAG_TRUE);

    let student = FlagCheck::new(visitor, Realm::Student);
    assert_eq!(student.check_session().await, Session::anonymous());
}

#[tokio::test]
async fn mounted_flag_gate_resolves_on_current_value() {
    let visitor = Arc::new(VisitorSession::new(generate_token()));
    visitor.flags().set(Realm::Admin.flag_key(), FLAG_TRUE);

    let check = session_check(CheckStrategy::Flag, visitor, Realm::Admin, Arc::new(StaticAuthProvider::new()));
    let nav = Arc::new(NavigationLog::new());
    let mut gate = SessionGate::new(check, LOGIN).mount(nav.clone());

    assert_eq!(settle(&mut gate).await, GateState::Authorized);
    assert!(nav.routes().is_empty());
}
