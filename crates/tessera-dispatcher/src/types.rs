use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `/node_finished`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedMessage {
  pub node: String,
  pub output: Vec<Value>,
}

/// Body of `/node_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
  pub node: String,
  pub error: String,
}

/// Body of `/node_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
  pub node: String,
  pub message: String,
}

/// Body of `/run_graph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSubmission {
  /// Target graph followed by the synthetic input nodes.
  pub graph: Vec<Value>,
  /// Correlation id handed out by the session channel registration.
  pub uuid: String,
}

/// An app published by the dispatcher under `/apps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
  pub name: String,
  #[serde(default)]
  pub inputs: Vec<String>,
  #[serde(default)]
  pub outputs: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// A signed reference to a file held by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

impl FileReference {
  /// The artifact's base name: the declared name, or the last URL path
  /// segment with any query string removed.
  pub fn base_name(&self) -> String {
    if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
      return name.rsplit(['/', '\\']).next().unwrap_or(name).to_string();
    }

    let path = self.url.split(['?', '#']).next().unwrap_or_default();
    path
      .rsplit('/')
      .find(|segment| !segment.is_empty())
      .filter(|segment| !segment.contains(':'))
      .unwrap_or("artifact")
      .to_string()
  }
}

/// A generated file destined for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
  /// Output slot the file belongs to.
  pub index: usize,
  pub file_name: String,
  pub data: Bytes,
}
