//! Sans-io client protocol engine. `ClientProtocol` consumes connection
//! events and inbound packets, mutates session state, and returns
//! `ProtocolAction` lists for the embedding I/O layer to perform. No I/O
//! and no timers live here.

mod actions;
mod protocol;
mod state;

pub use actions::{AckKind, ProtocolAction, TimeoutId};
pub use protocol::ClientProtocol;
pub use state::{
    ClientSession, ClientState, DrainedRequests, PendingPublish, PendingSubscribe,
    PendingUnsubscribe, DEFAULT_MAX_INFLIGHT,
};
