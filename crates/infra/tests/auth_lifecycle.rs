//! Authentication lifecycle against the in-memory stores.
//!
//! Covers: register → login → refresh rotation → reuse detection → logout,
//! plus the password-reset flow.

use std::sync::Arc;

use chrono::{Duration, Utc};

use hrdesk_auth::{
    AuthService, CredentialHasher, CredentialStore, DeviceMetadata, HashingParams, Role,
    SessionStore, TokenService,
};
use hrdesk_core::DomainError;
use hrdesk_infra::{InMemoryCredentialStore, InMemoryEmployeeDirectory, InMemorySessionStore};

struct Harness {
    auth: Arc<AuthService>,
    credentials: Arc<InMemoryCredentialStore>,
    sessions: Arc<InMemorySessionStore>,
}

fn setup() -> Harness {
    setup_with_tokens(TokenService::new(b"access-test-secret", b"refresh-test-secret"))
}

fn setup_with_tokens(tokens: TokenService) -> Harness {
    let roster = Arc::new(InMemoryEmployeeDirectory::with_emails(["a@x.com", "b@x.com"]));
    let credentials = Arc::new(InMemoryCredentialStore::new(roster));
    let sessions = Arc::new(InMemorySessionStore::new());
    let tokens = Arc::new(tokens);
    let hasher = CredentialHasher::new(HashingParams::insecure_fast()).unwrap();

    let auth = Arc::new(AuthService::new(
        credentials.clone(),
        sessions.clone(),
        tokens,
        hasher,
    ));
    Harness {
        auth,
        credentials,
        sessions,
    }
}

fn device(ua: &str) -> DeviceMetadata {
    DeviceMetadata {
        user_agent: Some(ua.to_string()),
        origin: Some("127.0.0.1".to_string()),
    }
}

fn assert_authentication(err: DomainError, message: &str) {
    match err {
        DomainError::Authentication(msg) => assert_eq!(msg, message),
        other => panic!("expected authentication error, got {other:?}"),
    }
}

#[tokio::test]
async fn register_requires_roster_entry() {
    let h = setup();
    let err = h.auth.register("stranger@x.com", "P1", "user").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(ref m) if m == "no employee record for this email"));
}

#[tokio::test]
async fn register_twice_conflicts() {
    let h = setup();
    h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let err = h.auth.register("A@x.com ", "P2", "admin").await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn register_validates_input() {
    let h = setup();
    let err = h.auth.register("", "P1", "user").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = h.auth.register("a@x.com", "P1", "owner").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(ref m) if m.starts_with("role must be one of")));

    let err = h.auth.register("not-an-email", "P1", "user").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(ref m) if m == "invalid email format"));
}

#[tokio::test]
async fn login_rejects_wrong_password_and_unknown_email_alike() {
    let h = setup();
    h.auth.register("a@x.com", "P1", "user").await.unwrap();

    let wrong = h.auth.login("a@x.com", "nope", device("A")).await.unwrap_err();
    let unknown = h.auth.login("ghost@x.com", "P1", device("A")).await.unwrap_err();
    assert_eq!(wrong, unknown);
    assert_authentication(wrong, "invalid credentials");
}

#[tokio::test]
async fn login_keeps_one_session_per_device() {
    let h = setup();
    let user = h.auth.register("a@x.com", "P1", "admin").await.unwrap();

    let first = h.auth.login("a@x.com", "P1", device("A")).await.unwrap();
    let subject = h.auth.authenticate(&first.access_token).unwrap();
    assert_eq!(subject.external_id, user);
    assert_eq!(subject.role, Role::Admin);
    assert_eq!(h.sessions.list_active(&user).await.unwrap().len(), 1);

    let second = h.auth.login("a@x.com", "P1", device("A")).await.unwrap();
    assert_ne!(first.refresh_token, second.refresh_token);
    assert_eq!(h.sessions.list_active(&user).await.unwrap().len(), 1);

    h.auth.login("a@x.com", "P1", device("B")).await.unwrap();
    assert_eq!(h.sessions.list_active(&user).await.unwrap().len(), 2);

    // The displaced device-A token no longer refreshes.
    let err = h.auth.refresh(&first.refresh_token).await.unwrap_err();
    assert_authentication(err, "refresh token reuse detected");
}

#[tokio::test]
async fn refresh_rotation_and_reuse_detection() {
    let h = setup();
    let user = h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let r1 = h.auth.login("a@x.com", "P1", device("A")).await.unwrap();
    h.auth.login("a@x.com", "P1", device("B")).await.unwrap();

    let r2 = h.auth.refresh(&r1.refresh_token).await.unwrap();
    assert_ne!(r2.refresh_token, r1.refresh_token);
    assert!(h.auth.authenticate(&r2.access_token).is_ok());

    let err = h.auth.refresh(&r1.refresh_token).await.unwrap_err();
    assert_authentication(err, "refresh token reuse detected");
    assert!(h.sessions.list_active(&user).await.unwrap().is_empty());

    // Revocation spares nobody: the freshly rotated token is dead too.
    let err = h.auth.refresh(&r2.refresh_token).await.unwrap_err();
    assert!(matches!(err, DomainError::Authentication(_)));
}

#[tokio::test]
async fn refresh_rejects_access_tokens_and_garbage() {
    let h = setup();
    h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let pair = h.auth.login("a@x.com", "P1", device("A")).await.unwrap();

    let err = h.auth.refresh(&pair.access_token).await.unwrap_err();
    assert_authentication(err, "invalid refresh token");

    let err = h.auth.refresh("not-a-jwt").await.unwrap_err();
    assert_authentication(err, "invalid refresh token");

    assert!(h.auth.authenticate(&pair.refresh_token).is_err());
}

#[tokio::test]
async fn concurrent_refresh_of_one_token_has_one_winner() {
    let h = setup();
    let user = h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let pair = h.auth.login("a@x.com", "P1", device("A")).await.unwrap();

    let a = {
        let auth = h.auth.clone();
        let token = pair.refresh_token.clone();
        tokio::spawn(async move { auth.refresh(&token).await })
    };
    let b = {
        let auth = h.auth.clone();
        let token = pair.refresh_token.clone();
        tokio::spawn(async move { auth.refresh(&token).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(h.sessions.list_active(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_sessions_drop_out_of_the_refresh_scan() {
    let h = setup_with_tokens(TokenService::with_ttls(
        b"access-test-secret",
        b"refresh-test-secret",
        Duration::minutes(15),
        Duration::seconds(1),
    ));
    let user = h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let stale = h.auth.login("a@x.com", "P1", device("Browser/1")).await.unwrap();
    h.auth.login("a@x.com", "P1", device("Browser/2")).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert!(h.sessions.list_active(&user).await.unwrap().is_empty());

    // An expired token is plainly invalid; it does not trip reuse detection.
    let err = h.auth.refresh(&stale.refresh_token).await.unwrap_err();
    assert_authentication(err, "invalid refresh token");
    assert!(h.sessions.all_for_user(&user).unwrap().iter().all(|s| !s.revoked));

    h.auth.login("a@x.com", "P1", device("Browser/3")).await.unwrap();
    let rows = h.sessions.all_for_user(&user).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_agent.as_deref(), Some("Browser/3"));
}

#[tokio::test]
async fn logout_then_refresh_fails() {
    let h = setup();
    let user = h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let phone = h.auth.login("a@x.com", "P1", device("phone")).await.unwrap();
    h.auth.login("a@x.com", "P1", device("laptop")).await.unwrap();

    h.auth.logout(&phone.refresh_token).await.unwrap();
    assert_eq!(h.sessions.list_active(&user).await.unwrap().len(), 1);
    assert_eq!(h.sessions.all_for_user(&user).unwrap().len(), 2);

    let err = h.auth.logout(&phone.refresh_token).await.unwrap_err();
    assert_authentication(err, "invalid token");

    let err = h.auth.refresh(&phone.refresh_token).await.unwrap_err();
    assert!(matches!(err, DomainError::Authentication(_)));
}

#[tokio::test]
async fn logout_leaves_other_devices_refreshable() {
    let h = setup();
    h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let phone = h.auth.login("a@x.com", "P1", device("phone")).await.unwrap();
    let laptop = h.auth.login("a@x.com", "P1", device("laptop")).await.unwrap();

    h.auth.logout(&phone.refresh_token).await.unwrap();
    assert!(h.auth.refresh(&laptop.refresh_token).await.is_ok());
}

#[tokio::test]
async fn password_reset_succeeds_exactly_once() {
    let h = setup();
    h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let session = h.auth.login("a@x.com", "P1", device("A")).await.unwrap();

    let ticket = h.auth.request_reset("a@x.com").await.unwrap();
    assert_eq!(ticket.token.len(), 64);

    h.auth.reset_password(&ticket.token, "P2").await.unwrap();

    let err = h.auth.reset_password(&ticket.token, "P3").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(ref m) if m == "invalid or expired token"));

    assert!(h.auth.login("a@x.com", "P1", device("A")).await.is_err());
    assert!(h.auth.login("a@x.com", "P2", device("A")).await.is_ok());

    // Sessions predating the reset were revoked.
    let err = h.auth.refresh(&session.refresh_token).await.unwrap_err();
    assert!(matches!(err, DomainError::Authentication(_)));
}

#[tokio::test]
async fn expired_reset_token_is_rejected() {
    let h = setup();
    h.auth.register("a@x.com", "P1", "user").await.unwrap();
    let ticket = h.auth.request_reset("a@x.com").await.unwrap();

    // Age the stored token past its 15 minute window.
    h.credentials
        .set_reset_token("a@x.com", &ticket.token, Utc::now() - Duration::minutes(16))
        .await
        .unwrap();

    let err = h.auth.reset_password(&ticket.token, "P2").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(ref m) if m == "invalid or expired token"));
    assert!(h.auth.login("a@x.com", "P1", device("A")).await.is_ok());
}

#[tokio::test]
async fn reset_request_for_unknown_email_looks_the_same() {
    let h = setup();
    let ticket = h.auth.request_reset("ghost@x.com").await.unwrap();
    assert_eq!(ticket.token.len(), 64);

    let err = h.auth.reset_password(&ticket.token, "P2").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn reset_requires_token_and_password() {
    let h = setup();
    let err = h.auth.reset_password("", "P2").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(ref m) if m == "token and newPassword are required"));
}
