use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tessera_dispatcher::{Dispatcher, DispatcherError, FilePart, ProgressMessage};
use tracing::warn;

/// What a handler can see of the invocation it serves.
///
/// This stands in for the reserved `log` and `batch` parameters: progress
/// messages go through [`OperatorContext::progress`] and batched execution
/// is visible through [`OperatorContext::is_batched`].
#[derive(Clone)]
pub struct OperatorContext {
  node_id: String,
  dispatcher_url: String,
  work_dir: PathBuf,
  batched: bool,
  dispatcher: Arc<dyn Dispatcher>,
}

impl OperatorContext {
  pub(crate) fn new(
    node_id: String,
    dispatcher_url: String,
    work_dir: PathBuf,
    batched: bool,
    dispatcher: Arc<dyn Dispatcher>,
  ) -> Self {
    Self {
      node_id,
      dispatcher_url,
      work_dir,
      batched,
      dispatcher,
    }
  }

  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  /// Private scratch directory for this call; removed once outputs are read.
  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  /// Whether this call is one element of a batch fan-out.
  pub fn is_batched(&self) -> bool {
    self.batched
  }

  /// Send a progress line to the dispatcher. Failures are logged only.
  pub async fn progress(&self, message: impl Into<String>) {
    let message = ProgressMessage {
      node: self.node_id.clone(),
      message: message.into(),
    };
    if let Err(e) = self
      .dispatcher
      .node_progress(&self.dispatcher_url, &message)
      .await
    {
      warn!(node_id = %self.node_id, error = %e, "progress_report_failed");
    }
  }

  /// Upload `data` and return the dispatcher's file handle.
  pub async fn upload(
    &self,
    file_name: impl Into<String>,
    data: Bytes,
  ) -> Result<Value, DispatcherError> {
    let part = FilePart {
      index: 0,
      file_name: file_name.into(),
      data,
    };
    self.dispatcher.upload(&self.dispatcher_url, part).await
  }
}

impl std::fmt::Debug for OperatorContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OperatorContext")
      .field("node_id", &self.node_id)
      .field("work_dir", &self.work_dir)
      .field("batched", &self.batched)
      .finish()
  }
}
