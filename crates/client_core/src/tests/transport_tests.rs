use super::*;
use crate::test_support::*;
use serde_json::json;
use shared::domain::UserSummary;
use storage::{MemoryTokenStore, StoredSession};
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn attaches_stored_bearer_token() {
    let service = spawn_fake_service(Behaviour::default()).await;
    let transport = transport_for(&service.base_url, store_with(ALICE_TOKEN));

    let user: UserSummary = transport.get("/auth/me").await.expect("me");
    assert_eq!(user.name, "Alice");
    assert_eq!(
        *service.seen_bearers.lock().await,
        vec![Some(ALICE_TOKEN.to_string())]
    );
}

#[tokio::test]
async fn sends_no_authorization_without_stored_token() {
    let service = spawn_fake_service(Behaviour::default()).await;
    let store = Arc::new(MemoryTokenStore::new());
    let transport = transport_for(&service.base_url, store);
    let mut notices = transport.subscribe_expiry();

    let error = transport
        .get::<UserSummary>("/auth/me")
        .await
        .expect_err("anonymous request rejected");
    assert!(error.is_unauthorized());
    assert_eq!(*service.seen_bearers.lock().await, vec![None]);
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn login_rejection_keeps_store_and_emits_no_notice() {
    let service = spawn_fake_service(Behaviour {
        login_error: Some((401, json!({ "detail": "Incorrect email or password" }))),
        ..Behaviour::default()
    })
    .await;
    let store = store_with(ALICE_TOKEN);
    let transport = transport_for(&service.base_url, store.clone());
    let mut notices = transport.subscribe_expiry();

    let error = transport
        .post::<_, serde_json::Value>(
            "/auth/login",
            &json!({ "email": "alice@example.com", "password": "wrong" }),
        )
        .await
        .expect_err("login rejected");

    assert_eq!(error.status(), Some(401));
    assert_eq!(error.detail(), Some("Incorrect email or password"));
    assert_eq!(store.token().await.as_deref(), Some(ALICE_TOKEN));
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn concurrent_rejections_clear_store_and_notify_once() {
    let service = spawn_fake_service(Behaviour {
        delay: Duration::from_millis(100),
        ..Behaviour::default()
    })
    .await;
    let store = store_with("stale-token");
    let transport = transport_for(&service.base_url, store.clone());
    let mut notices = transport.subscribe_expiry();

    let (first, second) = tokio::join!(
        transport.get::<serde_json::Value>("/periods/"),
        transport.get::<serde_json::Value>("/periods/"),
    );
    assert!(first.expect_err("first rejected").is_unauthorized());
    assert!(second.expect_err("second rejected").is_unauthorized());

    assert!(store.read().await.is_none());
    let notice = notices.try_recv().expect("one notice");
    assert_eq!(notice.token, "stale-token");
    assert_eq!(notice.path, "/periods/");
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn stale_rejection_leaves_newer_token_alone() {
    let service = spawn_fake_service(Behaviour {
        delay: Duration::from_millis(200),
        ..Behaviour::default()
    })
    .await;
    let store = store_with("stale-token");
    let transport = transport_for(&service.base_url, store.clone());
    let mut notices = transport.subscribe_expiry();

    let pending = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.get::<serde_json::Value>("/periods/").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .save(&StoredSession::new(ALICE_TOKEN, alice()))
        .await
        .expect("save newer token");

    let result = pending.await.expect("request task");
    assert!(result.expect_err("stale token rejected").is_unauthorized());
    assert_eq!(store.token().await.as_deref(), Some(ALICE_TOKEN));
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn not_found_carries_server_detail() {
    let service = spawn_fake_service(Behaviour {
        profile: ProfileReply::Missing,
        ..Behaviour::default()
    })
    .await;
    let transport = transport_for(&service.base_url, store_with(ALICE_TOKEN));

    let error = transport
        .get::<serde_json::Value>("/profiles/me")
        .await
        .expect_err("no profile");
    assert!(error.is_not_found());
    assert_eq!(error.detail(), Some("Profile not found"));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let base_url = unreachable_base_url().await;
    let transport = transport_for(&base_url, Arc::new(MemoryTokenStore::new()));

    let error = transport
        .get::<serde_json::Value>("/auth/me")
        .await
        .expect_err("nothing listening");
    assert!(error.is_unreachable());
    assert_eq!(error.status(), None);
}

#[test]
fn base_url_path_prefix_is_kept() {
    let transport = Transport::new(
        "http://localhost:8001/api",
        Arc::new(MemoryTokenStore::new()),
    )
    .expect("transport");

    assert_eq!(
        transport.endpoint("/auth/me").expect("endpoint").as_str(),
        "http://localhost:8001/api/auth/me"
    );
    assert_eq!(
        transport.endpoint("periods/").expect("endpoint").as_str(),
        "http://localhost:8001/api/periods/"
    );
}

#[test]
fn malformed_base_url_is_rejected() {
    let result = Transport::new("not a url", Arc::new(MemoryTokenStore::new()));
    assert!(matches!(result, Err(TransportError::InvalidBaseUrl { .. })));
}

#[test]
fn credential_exchange_paths_are_recognized() {
    assert!(is_credential_exchange("/auth/login"));
    assert!(is_credential_exchange("auth/register/"));
    assert!(is_credential_exchange("/auth/login?next=home"));
    assert!(!is_credential_exchange("/auth/me"));
    assert!(!is_credential_exchange("/auth/logout"));
}
