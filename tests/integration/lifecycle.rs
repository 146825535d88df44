//! Integration test: connection lifecycle churn.
//!
//! Verifies that identities stay monotonic across disconnects, that welcome
//! and announcement counts always reflect the registry size after the
//! triggering mutation, and that reconnecting clients get fresh identities.

use std::time::Duration;

use broadchat_client::{ChatClient, RetryPolicy, connect_with_retry};
use broadchat_proto::envelope::{Envelope, EnvelopeKind};

/// Start a relay server in-process and return a ws:// URL for connecting.
async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = broadchat_relay::relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start test relay server");
    (format!("ws://{addr}/ws"), handle)
}

/// Receive the next envelope with a test-friendly timeout.
async fn recv(client: &ChatClient) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("recv timed out")
        .expect("connection closed unexpectedly")
}

#[tokio::test]
async fn identities_stay_monotonic_across_churn() {
    let (url, _handle) = start_relay().await;

    let first = ChatClient::connect(&url).await.unwrap();
    assert_eq!(first.client_id(), "client-1");
    first.close().await;

    // The counter never rolls back to fill the gap.
    let second = ChatClient::connect(&url).await.unwrap();
    assert_eq!(second.client_id(), "client-2");

    let third = ChatClient::connect(&url).await.unwrap();
    assert_eq!(third.client_id(), "client-3");
}

#[tokio::test]
async fn welcome_count_reflects_live_registry_not_counter() {
    let (url, _handle) = start_relay().await;

    let alice = ChatClient::connect(&url).await.unwrap();
    let bob = ChatClient::connect(&url).await.unwrap();
    let _join = recv(&alice).await;

    bob.close().await;
    let leave = recv(&alice).await;
    assert_eq!(leave.kind, EnvelopeKind::Leave);
    assert_eq!(leave.clients_count, Some(1));

    // Two clients ever connected, but only one is live: the newcomer's
    // welcome counts connections, not identities handed out.
    let carol = ChatClient::connect(&url).await.unwrap();
    assert_eq!(carol.client_id(), "client-3");
    assert_eq!(carol.active_clients(), 2);
}

#[tokio::test]
async fn reconnecting_client_gets_fresh_identity() {
    let (url, _handle) = start_relay().await;

    let client = ChatClient::connect(&url).await.unwrap();
    assert_eq!(client.client_id(), "client-1");
    client.close().await;

    let policy = RetryPolicy::bounded(Duration::from_millis(50), 5);
    let reconnected = connect_with_retry(&url, &policy).await.unwrap();
    assert_eq!(reconnected.client_id(), "client-2");
    assert_eq!(reconnected.active_clients(), 1);
}

#[tokio::test]
async fn repeated_sessions_leave_registry_clean() {
    let (url, _handle) = start_relay().await;

    let observer = ChatClient::connect(&url).await.unwrap();

    for round in 2..=4u32 {
        let visitor = ChatClient::connect(&url).await.unwrap();
        assert_eq!(visitor.client_id(), format!("client-{round}"));

        let join = recv(&observer).await;
        assert_eq!(join.kind, EnvelopeKind::Join);
        assert_eq!(join.clients_count, Some(2));

        visitor.close().await;
        let leave = recv(&observer).await;
        assert_eq!(leave.kind, EnvelopeKind::Leave);
        assert_eq!(leave.clients_count, Some(1));
    }

    assert_eq!(observer.active_clients(), 1);
}
