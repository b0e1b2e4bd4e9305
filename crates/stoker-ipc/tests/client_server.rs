use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use stoker_core::{Outcome, PROTOCOL_VERSION, RequestEnvelope, WorkReply, WorkRequest};
use stoker_ipc::{
    UnixConnector, WorkHandler, connect_channel,
    codec::{decode, encode},
    execute,
    framing::{read_frame, write_frame},
    serve_channel,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

struct EchoHandler;

#[async_trait]
impl WorkHandler for EchoHandler {
    async fn handle(&self, request: WorkRequest) -> WorkReply {
        WorkReply::Done {
            exit_code: 0,
            stdout: request.arguments.join(" "),
            stderr: String::new(),
        }
    }
}

#[tokio::test]
async fn one_exchange_roundtrip_over_unix_socket() {
    let tmp = tempdir().expect("tempdir should be created");
    let endpoint = tmp.path().join("chan.sock");

    let shutdown = CancellationToken::new();
    let server = {
        let endpoint = endpoint.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { serve_channel(&endpoint, Arc::new(EchoHandler), shutdown).await })
    };

    // The accept loop may still be binding; the bounded connect retries.
    let connection = connect_channel(
        &UnixConnector,
        &endpoint,
        Duration::from_secs(2),
        &CancellationToken::new(),
    )
    .await
    .expect("client should connect");

    let request = WorkRequest {
        working_dir: "/work".to_string(),
        scratch_dir: "/tmp".to_string(),
        arguments: vec!["hello".to_string(), "server".to_string()],
        keep_alive_secs: None,
    };
    let outcome = execute(connection, &request, &CancellationToken::new()).await;

    match outcome {
        Outcome::Completed(output) => {
            assert_eq!(output.exit_code, 0);
            assert_eq!(output.stdout, "hello server");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    shutdown.cancel();
    server
        .await
        .expect("server task should join")
        .expect("server should exit cleanly");
}

#[tokio::test]
async fn connect_times_out_when_nothing_listens() {
    let tmp = tempdir().expect("tempdir should be created");
    let endpoint = tmp.path().join("absent.sock");

    let started = std::time::Instant::now();
    let connection = connect_channel(
        &UnixConnector,
        &endpoint,
        Duration::from_millis(200),
        &CancellationToken::new(),
    )
    .await;

    assert!(connection.is_none());
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "bounded connect must not wait past its budget"
    );
}

#[tokio::test]
async fn connect_cancellation_returns_promptly() {
    let tmp = tempdir().expect("tempdir should be created");
    let endpoint = tmp.path().join("absent.sock");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let connection = tokio::time::timeout(
        Duration::from_secs(1),
        connect_channel(&UnixConnector, &endpoint, Duration::from_secs(30), &cancel),
    )
    .await
    .expect("cancellation should end the connect wait promptly");

    assert!(connection.is_none());
}

#[tokio::test]
async fn server_declines_unknown_protocol_versions() {
    let tmp = tempdir().expect("tempdir should be created");
    let endpoint = tmp.path().join("chan.sock");

    let shutdown = CancellationToken::new();
    let server = {
        let endpoint = endpoint.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { serve_channel(&endpoint, Arc::new(EchoHandler), shutdown).await })
    };

    // Wait for the listener, then speak a future protocol version by hand.
    connect_channel(
        &UnixConnector,
        &endpoint,
        Duration::from_secs(2),
        &CancellationToken::new(),
    )
    .await
    .expect("client should connect");

    let mut stream = tokio::net::UnixStream::connect(&endpoint)
        .await
        .expect("raw connect should succeed");

    let envelope = RequestEnvelope {
        protocol: PROTOCOL_VERSION + 7,
        body: WorkRequest {
            working_dir: "/work".to_string(),
            scratch_dir: "/tmp".to_string(),
            arguments: vec!["true".to_string()],
            keep_alive_secs: None,
        },
    };
    let payload = encode(&envelope).expect("request should encode");
    write_frame(&mut stream, &payload)
        .await
        .expect("request should write");

    let frame = read_frame(&mut stream).await.expect("reply should arrive");
    let reply: stoker_core::ResponseEnvelope<WorkReply> =
        decode(&frame).expect("reply should decode");

    match reply.body {
        WorkReply::Declined { reason } => {
            assert!(reason.contains("protocol version"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    shutdown.cancel();
    server
        .await
        .expect("server task should join")
        .expect("server should exit cleanly");
}
