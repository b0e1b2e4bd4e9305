use serde::{Deserialize, Serialize};

/// Wire protocol version expected by current binaries.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request envelope carrying the protocol version plus a typed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    /// Protocol version the sender speaks.
    pub protocol: u32,
    /// Typed request payload.
    pub body: T,
}

/// Response envelope carrying the protocol version plus a typed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    /// Protocol version the sender speaks.
    pub protocol: u32,
    /// Typed response payload.
    pub body: T,
}

/// One unit of work a client hands to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Directory the work runs in.
    pub working_dir: String,
    /// Scratch directory the server should use for temporary files.
    pub scratch_dir: String,
    /// Executable and argument vector.
    pub arguments: Vec<String>,
    /// Advisory hint: keep the server alive at least this long afterwards.
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,
}

/// Captured result of completed work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOutput {
    /// Exit code reported by the work.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Server answer for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkReply {
    /// Work ran; failures of the work itself arrive here as nonzero exit codes.
    Done {
        /// Exit code reported by the work.
        exit_code: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The server refused the exchange; the client falls back to local execution.
    Declined {
        /// Human-readable refusal reason.
        reason: String,
    },
}
