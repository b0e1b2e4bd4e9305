use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifies one logical client/server channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(
    /// Opaque channel identifier string.
    pub String,
);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Names of the two cross-process exclusion primitives for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNames {
    /// Serializes the launch-or-reuse decision among starting clients.
    pub client_lock: String,
    /// Held by a live server for as long as it listens on the channel.
    pub server_lock: String,
}

/// Derives the client/server lock names for a channel.
///
/// Pure and deterministic: the same channel id always yields the same
/// pair, distinct channels almost-certainly get disjoint pairs, and the
/// fixed suffixes keep the two roles distinguishable from each other.
pub fn derive_sync_names(channel: &ChannelId) -> SyncNames {
    let digest = short_digest(channel);
    SyncNames {
        client_lock: format!("stoker-{digest}.client"),
        server_lock: format!("stoker-{digest}.server"),
    }
}

/// Returns the socket file name acting as the channel endpoint.
pub fn endpoint_name(channel: &ChannelId) -> String {
    format!("stoker-{}.sock", short_digest(channel))
}

/// First 16 hex characters of the channel id's SHA-256.
///
/// Hashing keeps derived names inside socket-path length limits no
/// matter how long the channel identifier is.
fn short_digest(channel: &ChannelId) -> String {
    Sha256::digest(channel.0.as_bytes())
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
