//! Session channel messages and transport seams.
//!
//! Every frame on the channel is a JSON envelope
//! `{ "event": <name>, "data": <payload> }`:
//!
//! | event                        | direction | payload                       |
//! |------------------------------|-----------|-------------------------------|
//! | `extensionregister`          | out       | `{ id }`                      |
//! | `extensionregister_response` | in        | `{ id, uuid }`                |
//! | `node`                       | in        | node status push              |
//! | `socketwait_cancel`          | in        | `{}`                          |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RemoteError;

/// A message on the session channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChannelEvent {
  /// Ask the dispatcher for a correlation id scoped to caller `id`.
  #[serde(rename = "extensionregister")]
  Register { id: String },

  /// Correlation id for caller `id`.
  #[serde(rename = "extensionregister_response")]
  Registered { id: String, uuid: String },

  /// Node status push. Kept raw so failures can carry the full payload.
  #[serde(rename = "node")]
  Node(Value),

  /// The dispatcher asks open socket waits to end.
  #[serde(rename = "socketwait_cancel")]
  SocketWaitCancel(Value),
}

/// Typed view of a `node` status push.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
  pub status: String,
  pub data: NodeStatusData,
  #[serde(default)]
  pub output: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatusData {
  pub id: String,
  #[serde(default)]
  pub output_ids: Vec<Value>,
}

impl NodeStatus {
  pub fn parse(payload: &Value) -> Option<Self> {
    serde_json::from_value(payload.clone()).ok()
  }

  /// Statuses that do not end the invocation.
  pub fn is_progress(&self) -> bool {
    matches!(self.status.as_str(), "running" | "pending" | "queued")
  }
}

impl ChannelEvent {
  /// Key under which a waiter for this event is registered.
  pub fn correlation_key(&self) -> Option<String> {
    match self {
      ChannelEvent::Registered { id, .. } => Some(id.clone()),
      ChannelEvent::Node(payload) => NodeStatus::parse(payload).map(|s| s.data.id),
      ChannelEvent::Register { .. } | ChannelEvent::SocketWaitCancel(_) => None,
    }
  }
}

/// Outbound half of an open session channel.
#[async_trait]
pub trait ChannelSink: Send + Sync {
  async fn send(&self, event: ChannelEvent) -> Result<(), RemoteError>;
}

/// Opens session channels.
///
/// Inbound events are pushed into `inbound` until the channel closes; the
/// implementation drops the sender on closure so readers observe it.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn connect(
    &self,
    url: &str,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
  ) -> Result<Box<dyn ChannelSink>, RemoteError>;
}

/// Map a dispatcher URL to its message-channel equivalent.
pub fn channel_url(dispatcher_url: &str) -> String {
  if let Some(rest) = dispatcher_url.strip_prefix("https://") {
    format!("wss://{}", rest)
  } else if let Some(rest) = dispatcher_url.strip_prefix("http://") {
    format!("ws://{}", rest)
  } else {
    dispatcher_url.to_string()
  }
}
