use thiserror::Error;

/// Transport and serialization failures for channel operations.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Underlying socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Request/response encoding failed.
    #[error("failed to encode cbor payload: {0}")]
    Encode(String),
    /// Request/response decoding failed.
    #[error("failed to decode cbor payload: {0}")]
    Decode(String),
    /// Frame size exceeded the maximum allowed payload.
    #[error("frame too large: {size} > {max}")]
    FrameTooLarge { size: u32, max: u32 },
}
