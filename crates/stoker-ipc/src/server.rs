use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use stoker_core::{PROTOCOL_VERSION, RequestEnvelope, ResponseEnvelope, WorkReply, WorkRequest};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::{
    IpcError,
    codec::{decode, encode},
    exchange::is_disconnect,
    framing::{read_frame, write_frame},
};

/// Server-side work execution hook.
#[async_trait]
pub trait WorkHandler: Send + Sync + 'static {
    async fn handle(&self, request: WorkRequest) -> WorkReply;
}

/// Accepts connections on `endpoint` until `shutdown` fires, serving
/// exactly one request/response exchange per connection.
pub async fn serve_channel(
    endpoint: &Path,
    handler: Arc<dyn WorkHandler>,
    shutdown: CancellationToken,
) -> Result<(), IpcError> {
    let listener = UnixListener::bind(endpoint)?;

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, handler).await {
                tracing::debug!(error = %err, "connection handler exited with error");
            }
        });
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    handler: Arc<dyn WorkHandler>,
) -> Result<(), IpcError> {
    let frame = match read_frame(&mut stream).await {
        Ok(frame) => frame,
        // A client that connected and went away without asking anything.
        Err(IpcError::Io(err)) if is_disconnect(&err) => return Ok(()),
        Err(err) => return Err(err),
    };

    let reply = match decode::<RequestEnvelope<WorkRequest>>(&frame) {
        Ok(request) if request.protocol != PROTOCOL_VERSION => WorkReply::Declined {
            reason: format!(
                "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
                request.protocol
            ),
        },
        Ok(request) => handler.handle(request.body).await,
        Err(err) => WorkReply::Declined {
            reason: format!("malformed request: {err}"),
        },
    };

    let envelope = ResponseEnvelope {
        protocol: PROTOCOL_VERSION,
        body: reply,
    };
    let payload = encode(&envelope)?;
    write_frame(&mut stream, &payload).await
}
