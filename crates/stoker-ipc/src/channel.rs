use std::{io, path::Path, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::UnixStream,
    time::{Instant, sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Interval between attempts against an endpoint that is not accepting yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Byte stream requirements for a channel transport.
pub trait ChannelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ChannelStream for T {}

/// One connected duplex channel to a server.
///
/// Single-owner: the exchange consumes the handle and the stream closes
/// when it drops, on every exit path.
pub struct ServerConnection {
    pub(crate) stream: Box<dyn ChannelStream>,
}

impl ServerConnection {
    /// Wraps an already-connected byte stream.
    pub fn from_stream(stream: impl ChannelStream + 'static) -> Self {
        Self {
            stream: Box::new(stream),
        }
    }
}

/// Capability for one transport-level connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &Path) -> io::Result<ServerConnection>;
}

/// Production connector over Unix domain sockets.
pub struct UnixConnector;

#[async_trait]
impl Connector for UnixConnector {
    async fn open(&self, endpoint: &Path) -> io::Result<ServerConnection> {
        let stream = UnixStream::connect(endpoint).await?;
        Ok(ServerConnection::from_stream(stream))
    }
}

/// Connects to a channel endpoint within a bounded wait.
///
/// An endpoint that is not accepting yet (`NotFound`,
/// `ConnectionRefused`) is retried until the deadline, since a freshly
/// launched server needs startup time before it binds. Expiry and
/// cancellation are expected outcomes, not faults; both return `None`.
pub async fn connect_channel(
    connector: &dyn Connector,
    endpoint: &Path,
    wait: Duration,
    cancel: &CancellationToken,
) -> Option<ServerConnection> {
    let deadline = Instant::now() + wait;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return None,
            attempt = timeout(remaining, connector.open(endpoint)) => attempt,
        };

        match attempt {
            Ok(Ok(connection)) => return Some(connection),
            Ok(Err(err)) if is_not_accepting(&err) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    tracing::debug!(endpoint = %endpoint.display(), "connect budget exhausted");
                    return None;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = sleep(remaining.min(CONNECT_RETRY_INTERVAL)) => {}
                }
            }
            Ok(Err(err)) => {
                tracing::debug!(endpoint = %endpoint.display(), error = %err, "connect attempt failed");
                return None;
            }
            Err(_) => {
                tracing::debug!(endpoint = %endpoint.display(), "connect timed out");
                return None;
            }
        }
    }
}

fn is_not_accepting(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}
