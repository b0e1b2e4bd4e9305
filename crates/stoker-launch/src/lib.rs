//! Launch-or-reuse orchestration for channel servers.
//!
//! The coordinator serializes the "is a server running, and if not,
//! should I be the one to start it" decision across concurrently
//! starting client processes, then hands back a connected channel or a
//! uniform rejection the caller answers with local execution.

pub mod coordinator;
pub mod launcher;

pub use coordinator::{ChannelConfig, Coordinator};
pub use launcher::{LaunchError, ProcessLauncher, WorkerLauncher};
