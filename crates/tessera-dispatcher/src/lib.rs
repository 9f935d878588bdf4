//! Tessera Dispatcher
//!
//! Outbound interface from an extension node to the dispatcher that
//! schedules graphs. The dispatcher never waits on the node's HTTP
//! response; everything it learns arrives through the callbacks here:
//!
//! | endpoint               | purpose                                   |
//! |------------------------|-------------------------------------------|
//! | `/node_finished`       | JSON outputs of a finished node           |
//! | `/node_finished_file`  | multipart outputs when files were produced|
//! | `/node_error`          | failure trace of a node                   |
//! | `/node_progress`       | progress log lines                        |
//! | `/run_graph`           | submit a synthesized subgraph             |
//! | `/upload`              | upload a file, returns a file handle      |
//!
//! The [`Dispatcher`] trait is the seam; [`HttpDispatcher`] is the reqwest
//! implementation used in production.
//!
//! [`AppClient`] is the caller side: it lists the apps under `/apps` and
//! runs them by name through `/api/run/{name}` within one session.

mod app;
mod error;
mod http;
mod types;

pub use app::{AppClient, AppTransport};
pub use error::DispatcherError;
pub use http::HttpDispatcher;
pub use types::{
  AppInfo, ErrorMessage, FilePart, FileReference, FinishedMessage, GraphSubmission,
  ProgressMessage,
};

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

/// Client for the dispatcher callback API.
///
/// Every method takes the dispatcher base URL since each invocation request
/// may name a different dispatcher.
#[async_trait]
pub trait Dispatcher: Send + Sync {
  /// Report plain outputs of a finished node.
  async fn node_finished(
    &self,
    dispatcher_url: &str,
    message: &FinishedMessage,
  ) -> Result<(), DispatcherError>;

  /// Report outputs that include generated files.
  ///
  /// `output` holds the JSON outputs with file slots blanked; `files` carries
  /// one part per file slot, keyed by its output index.
  async fn node_finished_file(
    &self,
    dispatcher_url: &str,
    node: &str,
    output: &[Value],
    files: Vec<FilePart>,
  ) -> Result<(), DispatcherError>;

  /// Report a node failure.
  async fn node_error(
    &self,
    dispatcher_url: &str,
    message: &ErrorMessage,
  ) -> Result<(), DispatcherError>;

  /// Send a progress log line for a running node.
  async fn node_progress(
    &self,
    dispatcher_url: &str,
    message: &ProgressMessage,
  ) -> Result<(), DispatcherError>;

  /// Submit a synthesized subgraph for execution.
  async fn run_graph(
    &self,
    dispatcher_url: &str,
    token: Option<&str>,
    submission: &GraphSubmission,
  ) -> Result<(), DispatcherError>;

  /// Upload a file and return the dispatcher's handle for it.
  async fn upload(&self, dispatcher_url: &str, file: FilePart) -> Result<Value, DispatcherError>;

  /// Download `url` into `dest`, returning the number of bytes written.
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DispatcherError>;
}

/// Join a dispatcher base URL and an endpoint path.
pub fn endpoint(dispatcher_url: &str, path: &str) -> String {
  format!(
    "{}/{}",
    dispatcher_url.trim_end_matches('/'),
    path.trim_start_matches('/')
  )
}
