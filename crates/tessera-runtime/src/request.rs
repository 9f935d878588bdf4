//! Inbound invocation requests.
//!
//! Body of `POST /operator/{operator_id}`:
//!
//! ```json
//! {
//!   "node": { "data": [{ "value": 1 }, 2], "input_handles": { "0": {} }, "token": "..." },
//!   "inputs": [41],
//!   "id": "node-7",
//!   "dispatcherurl": "http://dispatcher:9000",
//!   "session": "session-1"
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Raw request body as sent by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationBody {
  pub node: NodePayload,
  #[serde(default)]
  pub inputs: Vec<Value>,
  pub id: String,
  #[serde(default, rename = "dispatcherurl")]
  pub dispatcher_url: Option<String>,
  #[serde(default, alias = "uuid")]
  pub session: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodePayload {
  #[serde(default)]
  pub data: Vec<Value>,
  /// Slots fed by upstream edges, keyed by slot index.
  #[serde(default)]
  pub input_handles: Option<Map<String, Value>>,
  /// Bearer token for `run_graph` submissions.
  #[serde(default)]
  pub token: Option<String>,
}

/// One invocation of an operator on behalf of a graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
  pub node_id: String,
  pub operator_id: String,
  pub session_id: String,
  pub dispatcher_url: String,
  pub token: Option<String>,
  /// Values configured on the node, one per parameter.
  pub values: Vec<Value>,
  /// Raw `input_handles` keys.
  pub input_handles: Vec<String>,
  /// Upstream values, in handle order.
  pub inputs: Vec<Value>,
}

impl InvocationRequest {
  /// Build a request from a raw body.
  ///
  /// `default_dispatcher_url` is used when the body names no dispatcher; a
  /// request with neither cannot be reported on and is rejected.
  pub fn from_body(
    operator_id: impl Into<String>,
    body: InvocationBody,
    default_dispatcher_url: Option<&str>,
  ) -> Result<Self, PipelineError> {
    let dispatcher_url = body
      .dispatcher_url
      .filter(|url| !url.is_empty())
      .or_else(|| default_dispatcher_url.map(str::to_string))
      .ok_or_else(|| PipelineError::InputBinding {
        message: "request has no dispatcherurl and no default dispatcher is configured".to_string(),
      })?;

    let values = body
      .node
      .data
      .into_iter()
      .map(|item| match item {
        Value::Object(mut map) if map.contains_key("value") => {
          map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
      })
      .collect();

    let input_handles = body
      .node
      .input_handles
      .map(|handles| handles.into_iter().map(|(key, _)| key).collect())
      .unwrap_or_default();

    Ok(Self {
      session_id: body.session.unwrap_or_else(|| body.id.clone()),
      node_id: body.id,
      operator_id: operator_id.into(),
      dispatcher_url,
      token: body.node.token,
      values,
      input_handles,
      inputs: body.inputs,
    })
  }

  /// Positional values with upstream inputs substituted.
  ///
  /// Handle keys are slot indices; the k-th smallest index receives
  /// `inputs[k]`.
  pub fn positional_values(&self) -> Result<Vec<Value>, PipelineError> {
    let mut slots = BTreeMap::new();
    for key in &self.input_handles {
      let index: usize = key.trim().parse().map_err(|_| PipelineError::InputBinding {
        message: format!("input handle '{}' is not a slot index", key),
      })?;
      slots.insert(index, key);
    }

    let mut values = self.values.clone();
    for (k, (index, key)) in slots.into_iter().enumerate() {
      let input = self
        .inputs
        .get(k)
        .ok_or_else(|| PipelineError::InputBinding {
          message: format!(
            "input handle '{}' has no upstream value ({} inputs received)",
            key,
            self.inputs.len()
          ),
        })?;
      let slot = values
        .get_mut(index)
        .ok_or_else(|| PipelineError::InputBinding {
          message: format!(
            "input handle '{}' is out of range for {} values",
            key,
            self.values.len()
          ),
        })?;
      *slot = input.clone();
    }

    Ok(values)
  }
}
