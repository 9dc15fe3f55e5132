mod common;

use common::{default_products, harness, place_qris_order, test_config, SECRET};
use kedai::application::fulfillment::FulfillmentCoordinator;
use kedai::domain::session::Step;
use kedai::infrastructure::catalog::ProductCatalog;
use kedai::infrastructure::in_memory::{InMemoryCache, InMemoryCredentialVault};
use kedai::infrastructure::sandbox_gateway::SandboxGateway;
use kedai::infrastructure::session_store::SessionStore;
use kedai::interfaces::webhook::{WebhookAck, WebhookReceiver};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_bad_signature_is_rejected_without_side_effects() {
    let h = harness(test_config(), default_products()).await;
    let reference = place_qris_order(&h, "628111", "netflix").await;

    let body = format!(r#"{{"reference":"{reference}","status":"succeeded"}}"#);
    assert_eq!(
        h.receiver.handle(Some("wrong-secret"), &body).await,
        WebhookAck::Unauthorized
    );
    assert_eq!(h.receiver.handle(None, &body).await, WebhookAck::Unauthorized);

    // Nothing was settled.
    assert_eq!(h.vault.remaining("netflix").await, 2);
    assert_eq!(
        h.sessions.get("628111").await.step,
        Step::AwaitingPayment
    );
}

#[tokio::test]
async fn test_empty_secret_never_authenticates() {
    let sessions = Arc::new(SessionStore::new(
        Arc::new(InMemoryCache::new()),
        Duration::from_secs(1800),
    ));
    let coordinator = Arc::new(FulfillmentCoordinator::new(
        sessions,
        ProductCatalog::new(),
        Arc::new(SandboxGateway::new()),
        Arc::new(InMemoryCredentialVault::new()),
        Arc::new(InMemoryCache::new()),
    ));
    let receiver = WebhookReceiver::new(String::new(), coordinator, Vec::new());

    let body = r#"{"reference":"inv_1","status":"succeeded"}"#;
    // A missing signature must not match an unconfigured secret.
    assert_eq!(receiver.handle(None, body).await, WebhookAck::Unauthorized);
    assert_eq!(
        receiver.handle(Some(""), body).await,
        WebhookAck::Unauthorized
    );
}

#[tokio::test]
async fn test_malformed_payload_is_acknowledged() {
    let h = harness(test_config(), default_products()).await;
    let ack = h.receiver.handle(Some(SECRET), "not json at all").await;
    assert_eq!(ack, WebhookAck::Received(Vec::new()));
}

#[tokio::test]
async fn test_pending_status_makes_no_transition() {
    let h = harness(test_config(), default_products()).await;
    let reference = place_qris_order(&h, "628111", "netflix").await;

    let body = format!(r#"{{"reference":"{reference}","status":"pending"}}"#);
    let ack = h.receiver.handle(Some(SECRET), &body).await;
    assert_eq!(ack, WebhookAck::Received(Vec::new()));
    assert_eq!(
        h.sessions.get("628111").await.step,
        Step::AwaitingPayment
    );
}

#[tokio::test]
async fn test_unknown_reference_is_acknowledged() {
    let h = harness(test_config(), default_products()).await;
    let ack = h
        .receiver
        .handle(Some(SECRET), r#"{"reference":"inv_404","status":"succeeded"}"#)
        .await;
    assert_eq!(ack, WebhookAck::Received(Vec::new()));
}
