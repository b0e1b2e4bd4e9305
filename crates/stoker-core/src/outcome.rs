use thiserror::Error;

use crate::protocol::WorkOutput;

/// Result of one attempted server-assisted execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered; the payload carries the work's own result.
    Completed(WorkOutput),
    /// The server could not be used this time; the caller runs the work locally.
    Rejected(Rejection),
}

/// Why a server-assisted execution was declined.
///
/// Every variant uniformly means "proceed without server assistance";
/// none of them is a hard failure of the overall invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Channel identifier was empty or otherwise unusable.
    #[error("channel identifier is unusable")]
    EmptyChannel,
    /// No scratch directory could be resolved.
    #[error("no scratch directory available")]
    ScratchDirUnavailable,
    /// The client exclusion backend reported a failure.
    #[error("client exclusion unavailable")]
    ExclusionUnavailable,
    /// Waiting for the client exclusion exceeded its budget.
    #[error("timed out waiting for the client exclusion")]
    ExclusionTimeout,
    /// No server was running and starting one failed.
    #[error("worker launch failed")]
    LaunchFailed,
    /// Connecting to the channel endpoint exceeded its budget.
    #[error("timed out connecting to the channel endpoint")]
    ConnectTimeout,
    /// The caller's cancellation signal fired.
    #[error("cancelled by the caller")]
    Cancelled,
    /// The server closed the channel before answering.
    #[error("server disconnected before answering")]
    PeerDisconnected,
    /// Writing the request to the channel failed.
    #[error("failed to write the request")]
    RequestWriteFailed,
    /// The response could not be decoded or spoke the wrong protocol.
    #[error("response was malformed")]
    ResponseMalformed,
    /// The server answered but refused to perform the work.
    #[error("server declined the request")]
    ServerDeclined,
}
