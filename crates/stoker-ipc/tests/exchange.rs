use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use stoker_core::{
    Outcome, PROTOCOL_VERSION, Rejection, RequestEnvelope, ResponseEnvelope, WorkReply, WorkRequest,
};
use stoker_ipc::{
    ServerConnection,
    codec::{decode, encode},
    execute,
    framing::{read_frame, write_frame},
};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, duplex};
use tokio_util::sync::CancellationToken;

fn request() -> WorkRequest {
    WorkRequest {
        working_dir: "/work".to_string(),
        scratch_dir: "/tmp".to_string(),
        arguments: vec!["echo".to_string(), "ok".to_string()],
        keep_alive_secs: None,
    }
}

async fn read_request(stream: &mut DuplexStream) -> RequestEnvelope<WorkRequest> {
    let frame = read_frame(stream).await.expect("request frame should arrive");
    decode(&frame).expect("request should decode")
}

async fn write_reply(stream: &mut DuplexStream, protocol: u32, reply: WorkReply) {
    let envelope = ResponseEnvelope {
        protocol,
        body: reply,
    };
    let payload = encode(&envelope).expect("reply should encode");
    write_frame(stream, &payload)
        .await
        .expect("reply should write");
}

#[tokio::test]
async fn well_formed_response_completes() {
    let (client, mut server) = duplex(4096);
    let peer = tokio::spawn(async move {
        let envelope = read_request(&mut server).await;
        assert_eq!(envelope.protocol, PROTOCOL_VERSION);
        write_reply(
            &mut server,
            PROTOCOL_VERSION,
            WorkReply::Done {
                exit_code: 0,
                stdout: "ok\n".to_string(),
                stderr: String::new(),
            },
        )
        .await;
    });

    let outcome = execute(
        ServerConnection::from_stream(client),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    match outcome {
        Outcome::Completed(output) => {
            assert_eq!(output.exit_code, 0);
            assert_eq!(output.stdout, "ok\n");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    peer.await.expect("peer should finish");
}

#[tokio::test]
async fn disconnect_before_response_rejects() {
    let (client, mut server) = duplex(4096);
    let peer = tokio::spawn(async move {
        let _ = read_request(&mut server).await;
        drop(server);
    });

    let outcome = execute(
        ServerConnection::from_stream(client),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::PeerDisconnected));
    peer.await.expect("peer should finish");
}

#[tokio::test]
async fn malformed_response_rejects() {
    let (client, mut server) = duplex(4096);
    let peer = tokio::spawn(async move {
        let _ = read_request(&mut server).await;
        write_frame(&mut server, b"definitely not cbor")
            .await
            .expect("garbage frame should write");
    });

    let outcome = execute(
        ServerConnection::from_stream(client),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::ResponseMalformed));
    peer.await.expect("peer should finish");
}

#[tokio::test]
async fn protocol_mismatch_rejects() {
    let (client, mut server) = duplex(4096);
    let peer = tokio::spawn(async move {
        let _ = read_request(&mut server).await;
        write_reply(
            &mut server,
            PROTOCOL_VERSION + 1,
            WorkReply::Done {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
        )
        .await;
    });

    let outcome = execute(
        ServerConnection::from_stream(client),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::ResponseMalformed));
    peer.await.expect("peer should finish");
}

#[tokio::test]
async fn declined_reply_rejects() {
    let (client, mut server) = duplex(4096);
    let peer = tokio::spawn(async move {
        let _ = read_request(&mut server).await;
        write_reply(
            &mut server,
            PROTOCOL_VERSION,
            WorkReply::Declined {
                reason: "busy".to_string(),
            },
        )
        .await;
    });

    let outcome = execute(
        ServerConnection::from_stream(client),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::ServerDeclined));
    peer.await.expect("peer should finish");
}

#[tokio::test]
async fn cancellation_wins_over_a_silent_server() {
    let (client, server) = duplex(4096);
    // Keep the peer alive but mute, so neither response nor disconnect fires.
    let peer = tokio::spawn(async move {
        let _keep = server;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        execute(ServerConnection::from_stream(client), &request(), &cancel),
    )
    .await
    .expect("cancellation should resolve the exchange promptly");

    assert_eq!(outcome, Outcome::Rejected(Rejection::Cancelled));
    peer.abort();
}

#[tokio::test]
async fn dead_peer_fails_the_request_write() {
    let (client, server) = duplex(64);
    drop(server);

    let outcome = execute(
        ServerConnection::from_stream(client),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::RequestWriteFailed));
}

/// Forwards to an inner duplex stream while counting drops, so tests can
/// assert the connection is closed exactly once on every exit path.
struct TrackedStream {
    inner: DuplexStream,
    drops: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn connection_closes_exactly_once_on_rejection() {
    let (client, mut server) = duplex(4096);
    let drops = Arc::new(AtomicUsize::new(0));
    let tracked = TrackedStream {
        inner: client,
        drops: Arc::clone(&drops),
    };

    let peer = tokio::spawn(async move {
        let _ = read_request(&mut server).await;
        drop(server);
    });

    let outcome = execute(
        ServerConnection::from_stream(tracked),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::PeerDisconnected));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    peer.await.expect("peer should finish");
}

#[tokio::test]
async fn connection_closes_exactly_once_on_completion() {
    let (client, mut server) = duplex(4096);
    let drops = Arc::new(AtomicUsize::new(0));
    let tracked = TrackedStream {
        inner: client,
        drops: Arc::clone(&drops),
    };

    let peer = tokio::spawn(async move {
        let _ = read_request(&mut server).await;
        write_reply(
            &mut server,
            PROTOCOL_VERSION,
            WorkReply::Done {
                exit_code: 3,
                stdout: String::new(),
                stderr: "boom\n".to_string(),
            },
        )
        .await;
    });

    let outcome = execute(
        ServerConnection::from_stream(tracked),
        &request(),
        &CancellationToken::new(),
    )
    .await;

    match outcome {
        Outcome::Completed(output) => assert_eq!(output.exit_code, 3),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    peer.await.expect("peer should finish");
}
