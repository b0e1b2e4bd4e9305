pub mod naming;
pub mod outcome;
pub mod protocol;
pub mod scratch;

pub use naming::{ChannelId, SyncNames, derive_sync_names, endpoint_name};
pub use outcome::{Outcome, Rejection};
pub use protocol::{
    PROTOCOL_VERSION, RequestEnvelope, ResponseEnvelope, WorkOutput, WorkReply, WorkRequest,
};
pub use scratch::default_scratch_dir;
