use std::io;

use stoker_core::{
    Outcome, PROTOCOL_VERSION, Rejection, RequestEnvelope, ResponseEnvelope, WorkOutput, WorkReply,
    WorkRequest,
};
use tokio_util::sync::CancellationToken;

use crate::{
    IpcError,
    channel::ServerConnection,
    codec::{decode, encode},
    framing::{read_frame, write_frame},
};

/// Writes one request, then races response arrival against peer
/// disconnection and caller cancellation to a single outcome.
///
/// A server that is alive but hung keeps the response read pending and
/// cannot be told apart from one that is slowly computing; only
/// disconnection is an unambiguous negative signal, so both are watched
/// concurrently rather than sequentially. The connection is consumed:
/// the stream closes on every exit path and no losing wait survives the
/// return.
pub async fn execute(
    mut connection: ServerConnection,
    request: &WorkRequest,
    cancel: &CancellationToken,
) -> Outcome {
    let envelope = RequestEnvelope {
        protocol: PROTOCOL_VERSION,
        body: request,
    };
    let payload = match encode(&envelope) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(error = %err, "request encode failed");
            return Outcome::Rejected(Rejection::RequestWriteFailed);
        }
    };

    if let Err(err) = write_frame(&mut connection.stream, &payload).await {
        tracing::debug!(error = %err, "request write failed");
        return Outcome::Rejected(Rejection::RequestWriteFailed);
    }

    let frame = tokio::select! {
        _ = cancel.cancelled() => return Outcome::Rejected(Rejection::Cancelled),
        read = read_frame(&mut connection.stream) => match read {
            Ok(frame) => frame,
            Err(IpcError::Io(err)) if is_disconnect(&err) => {
                tracing::debug!("server disconnected before answering");
                return Outcome::Rejected(Rejection::PeerDisconnected);
            }
            Err(err) => {
                tracing::debug!(error = %err, "response read failed");
                return Outcome::Rejected(Rejection::ResponseMalformed);
            }
        },
    };

    let response: ResponseEnvelope<WorkReply> = match decode(&frame) {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "response decode failed");
            return Outcome::Rejected(Rejection::ResponseMalformed);
        }
    };

    if response.protocol != PROTOCOL_VERSION {
        tracing::debug!(
            expected = PROTOCOL_VERSION,
            actual = response.protocol,
            "response spoke an unexpected protocol version"
        );
        return Outcome::Rejected(Rejection::ResponseMalformed);
    }

    match response.body {
        WorkReply::Done {
            exit_code,
            stdout,
            stderr,
        } => Outcome::Completed(WorkOutput {
            exit_code,
            stdout,
            stderr,
        }),
        WorkReply::Declined { reason } => {
            tracing::debug!(reason = %reason, "server declined the request");
            Outcome::Rejected(Rejection::ServerDeclined)
        }
    }
}

/// Error kinds meaning "the peer closed its end of the channel".
pub(crate) fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
