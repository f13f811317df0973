/// Tests for the process-wide session state: at most one live transport per
/// process, advisory warnings on redundant calls.
use std::time::Duration;

use dr_core::session::DrSession;
use dr_core::transport::State;
use dr_test_utils::MockRelayServer;

const WAIT: Duration = Duration::from_secs(2);

async fn wait_open(session: &DrSession) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some(t) = session.transport() {
            if t.state() == State::Open {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn holds_at_most_one_transport() {
    let server = MockRelayServer::start().await.expect("start relay");
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = DrSession::new();

    session
        .connect(&server.url(), "tok", dir.path())
        .expect("connect");
    assert!(session.is_connected());
    assert!(server.wait_for_clients(1, WAIT).await);

    // Redundant connect: warn and keep the existing connection.
    session
        .connect(&server.url(), "tok", dir.path())
        .expect("redundant connect is not an error");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(server.client_count(), 1);
    assert!(session.is_connected());

    session.disconnect().await;
    assert!(!session.is_connected());
}

#[tokio::test]
async fn every_disconnect_leaves_no_live_transport() {
    let server = MockRelayServer::start().await.expect("start relay");
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = DrSession::new();

    // Disconnect before any connect: warning, not an error.
    session.disconnect().await;
    assert!(!session.is_connected());

    session
        .connect(&server.url(), "tok", dir.path())
        .expect("connect");
    session.disconnect().await;
    assert!(!session.is_connected());
    session.disconnect().await;
    assert!(!session.is_connected());
}

#[tokio::test]
async fn send_command_without_connection_is_a_warned_noop() {
    let session = DrSession::new();
    session
        .send_command(&["rotate".to_owned()])
        .expect("no connection is advisory, not an error");
}

#[tokio::test]
async fn send_command_wraps_tokens_into_command_frame() {
    let server = MockRelayServer::start().await.expect("start relay");
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = DrSession::new();

    session
        .connect(&server.url(), "tok", dir.path())
        .expect("connect");
    assert!(wait_open(&session).await);

    session
        .send_command(&["rotate".to_owned(), "--all".to_owned()])
        .expect("send");

    // init frame + the wrapped command
    assert!(server.wait_for_received(2, WAIT).await);
    assert_eq!(
        server.received()[1],
        r#"{"kind":"command","data":"[\"rotate\",\"--all\"]"}"#
    );

    session.disconnect().await;
}
