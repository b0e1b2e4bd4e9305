//! Async CBOR-over-Unix-socket transport for the stoker channel protocol.

mod error;

pub mod channel;
pub mod codec;
pub mod exchange;
pub mod framing;
pub mod server;

pub use channel::{ChannelStream, Connector, ServerConnection, UnixConnector, connect_channel};
pub use error::IpcError;
pub use exchange::execute;
pub use server::{WorkHandler, serve_channel};
