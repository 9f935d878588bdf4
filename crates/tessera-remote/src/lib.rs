//! Tessera Remote
//!
//! Lets an operator call a subgraph of the caller's graph as if it were a
//! local function. A call registers on the session's channel, submits a
//! synthesized graph through the dispatcher, and waits for the matching
//! `node` status push.
//!
//! The crate also carries the batch fan-out rules shared by local and
//! remote callables; see [`batch`].

pub mod batch;
mod channel;
mod config;
mod error;
mod invoker;
mod pool;
mod subgraph;
mod ws;

pub use batch::{Slot, fan_out, is_batched, map};
pub use channel::{ChannelEvent, ChannelSink, Connector, NodeStatus, NodeStatusData, channel_url};
pub use config::RemoteConfig;
pub use error::RemoteError;
pub use invoker::{FnInvocable, Invocable, RemoteClient, RemoteInvoker, invocable_fn};
pub use pool::{ConnectionPool, SessionConnection, SocketWaitOutcome, Subscription};
pub use subgraph::{INPUT_OPERATOR, SynthesizedGraph, synthesize};
pub use ws::WsConnector;
