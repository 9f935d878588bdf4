//! Remote invocation error types.

use tessera_dispatcher::DispatcherError;

/// Errors raised while invoking a remote subgraph.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
  /// The session channel could not be established.
  #[error("failed to connect to {url} after {attempts} attempts: {message}")]
  Connection {
    url: String,
    attempts: u32,
    message: String,
  },

  /// The dispatcher rejected the synthesized graph.
  #[error("graph submission failed: {source}")]
  Submission {
    #[source]
    source: DispatcherError,
  },

  /// Neither a result nor an error arrived within the budget.
  #[error("{stage} timed out after {timeout_ms}ms")]
  Timeout { stage: &'static str, timeout_ms: u64 },

  /// The subgraph reported a terminal status other than `finished`.
  #[error("subgraph failed: {payload}")]
  Failed { payload: serde_json::Value },

  /// The session channel closed while a reply was pending.
  #[error("session channel closed")]
  ChannelClosed,

  /// The subgraph definition cannot be invoked.
  #[error("invalid subgraph: {message}")]
  InvalidGraph { message: String },

  /// Batch-marked arguments or batch results do not line up.
  #[error("invalid batch: {message}")]
  BatchShape { message: String },

  /// A local callable failed.
  #[error("callable failed: {message}")]
  Callable { message: String },
}

impl RemoteError {
  /// Whether the session channel should be dropped and recreated.
  pub fn poisons_channel(&self) -> bool {
    matches!(
      self,
      RemoteError::ChannelClosed | RemoteError::Connection { .. }
    )
  }
}
