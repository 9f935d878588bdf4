use thiserror::Error;

/// Errors talking to the dispatcher.
#[derive(Debug, Error)]
pub enum DispatcherError {
  /// The request could not be sent or the response could not be read.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The dispatcher answered with a non-success status.
  #[error("dispatcher returned {status} for {endpoint}: {body}")]
  Status {
    endpoint: String,
    status: u16,
    body: String,
  },

  /// A message could not be encoded or a response decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Writing a downloaded file failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// No app by this name is published with outputs.
  #[error("unknown app: {name}")]
  UnknownApp { name: String },

  /// An app was called with the wrong number of arguments.
  #[error("app {app} takes {expected} inputs, got {actual}")]
  InputArity {
    app: String,
    expected: usize,
    actual: usize,
  },

  /// An app answered with outputs that do not match its declaration.
  #[error("app {app} declares outputs {expected:?}, got {actual:?}")]
  OutputMismatch {
    app: String,
    expected: Vec<String>,
    actual: Vec<String>,
  },
}
