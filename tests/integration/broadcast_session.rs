//! Integration test: a full multi-client broadcast session driven through
//! the client library against a real relay server.
//!
//! Covers the end-to-end collaborator flow: identity adoption, join
//! announcements, message fan-out with echo, local echo detection, and
//! leave announcements with the decremented client count.

use std::time::Duration;

use broadchat_client::ChatClient;
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
async fn three_clients_broadcast_session() {
    let (url, _handle) = start_relay().await;

    // Clients connect and are identified in accept order.
    let alice = ChatClient::connect(&url).await.unwrap();
    let bob = ChatClient::connect(&url).await.unwrap();
    let carol = ChatClient::connect(&url).await.unwrap();
    assert_eq!(alice.client_id(), "client-1");
    assert_eq!(bob.client_id(), "client-2");
    assert_eq!(carol.client_id(), "client-3");
    assert_eq!(carol.active_clients(), 3);

    // Alice saw both joins, Bob only Carol's, Carol none.
    let join_bob = recv(&alice).await;
    assert_eq!(join_bob.kind, EnvelopeKind::Join);
    assert_eq!(join_bob.client_id.as_deref(), Some("client-2"));
    assert_eq!(join_bob.clients_count, Some(2));

    let join_carol = recv(&alice).await;
    assert_eq!(join_carol.client_id.as_deref(), Some("client-3"));
    assert_eq!(join_carol.clients_count, Some(3));
    assert_eq!(alice.active_clients(), 3);

    let join_carol = recv(&bob).await;
    assert_eq!(join_carol.kind, EnvelopeKind::Join);
    assert_eq!(join_carol.client_id.as_deref(), Some("client-3"));

    // Bob speaks; everyone receives the same message, tagged with Bob's
    // identity, and only Bob recognizes it as his own.
    bob.send_text("hello everyone").await.unwrap();

    let to_alice = recv(&alice).await;
    let to_bob = recv(&bob).await;
    let to_carol = recv(&carol).await;
    for envelope in [&to_alice, &to_bob, &to_carol] {
        assert_eq!(envelope.kind, EnvelopeKind::Message);
        assert_eq!(envelope.client_id.as_deref(), Some("client-2"));
        assert_eq!(envelope.text.as_deref(), Some("hello everyone"));
    }
    assert!(!alice.is_mine(&to_alice));
    assert!(bob.is_mine(&to_bob));
    assert!(!carol.is_mine(&to_carol));

    // Carol leaves; the survivors are told with the decremented count.
    carol.close().await;

    for client in [&alice, &bob] {
        let leave = recv(client).await;
        assert_eq!(leave.kind, EnvelopeKind::Leave);
        assert_eq!(leave.client_id.as_deref(), Some("client-3"));
        assert_eq!(leave.clients_count, Some(2));
        assert_eq!(client.active_clients(), 2);
    }
}

#[tokio::test]
async fn departed_client_receives_no_further_traffic() {
    let (url, _handle) = start_relay().await;

    let alice = ChatClient::connect(&url).await.unwrap();
    let bob = ChatClient::connect(&url).await.unwrap();
    let _join = recv(&alice).await;

    bob.close().await;
    let leave = recv(&alice).await;
    assert_eq!(leave.kind, EnvelopeKind::Leave);

    // Traffic sent after the leave is fanned out to the remaining client
    // only; Bob's connection is gone and sees nothing.
    alice.send_text("anyone still here?").await.unwrap();
    let echo = recv(&alice).await;
    assert!(alice.is_mine(&echo));

    let bob_next = tokio::time::timeout(Duration::from_millis(300), bob.recv()).await;
    match bob_next {
        Err(_elapsed) => {}                    // nothing arrived, as required
        Ok(Err(_closed)) => {}                 // channel already drained and closed
        Ok(Ok(envelope)) => panic!("departed client received {envelope:?}"),
    }
}
