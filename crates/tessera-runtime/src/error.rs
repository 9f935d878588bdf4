//! Pipeline error types.

use tessera_dispatcher::DispatcherError;

/// Errors raised while serving one invocation.
///
/// Every variant ends up as a `node_error` callback; none of them is
/// retried by the pipeline itself.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// No operator is registered under the requested id.
  #[error("unknown operator '{operator_id}'")]
  UnknownOperator { operator_id: String },

  /// The request's positional values do not line up with the parameters.
  #[error("input binding failed: {message}")]
  InputBinding { message: String },

  /// A `File` or `Dir` input could not be materialized.
  #[error("invalid file reference for input {index}: {message}")]
  InvalidFileReference { index: usize, message: String },

  /// The operator returned an error or panicked.
  #[error("operator execution failed:\n{trace}")]
  OperatorExecution { trace: String },

  /// Outputs could not be delivered to the dispatcher.
  #[error("failed to report outputs: {source}")]
  Reporting {
    #[source]
    source: DispatcherError,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl PipelineError {
  /// Text sent as the `error` field of `node_error`.
  pub fn trace(&self) -> String {
    match self {
      PipelineError::OperatorExecution { trace } => trace.clone(),
      other => {
        let mut trace = other.to_string();
        let mut source = std::error::Error::source(other);
        while let Some(cause) = source {
          trace.push_str(&format!("\n  caused by: {}", cause));
          source = cause.source();
        }
        trace
      }
    }
  }
}

/// Why an invocation could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
  #[error("invocation queue is full")]
  Full,

  #[error("invocation runner has stopped")]
  Closed,
}
