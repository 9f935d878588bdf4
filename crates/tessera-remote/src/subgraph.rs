//! Subgraph synthesis.
//!
//! A callable subgraph has no inputs of its own once it leaves the caller's
//! graph. Each call argument becomes a synthetic `extractdata` node exposing
//! the value on a fresh output id, and the target graph's input slots are
//! rewired to those ids.

use serde_json::{Value, json};

use crate::error::RemoteError;

/// Operator name of the synthetic input nodes.
pub const INPUT_OPERATOR: &str = "extractdata";

/// A composite graph ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedGraph {
  /// Id assigned to the target graph; status pushes are keyed by it.
  pub graph_id: String,
  /// The target graph followed by one input node per argument.
  pub elements: Vec<Value>,
}

fn next_output_id(graph: &serde_json::Map<String, Value>) -> i64 {
  graph
    .get("output_ids")
    .and_then(Value::as_array)
    .and_then(|ids| {
      ids
        .iter()
        .filter_map(|o| o.get("id").and_then(Value::as_i64))
        .max()
    })
    .map_or(0, |max| max + 1)
}

/// Build the composite graph for one call.
///
/// `uid` scopes every synthesized id so concurrent calls never collide.
pub fn synthesize(uid: &str, graph: &Value, args: &[Value]) -> Result<SynthesizedGraph, RemoteError> {
  let mut target = graph.clone();
  let object = target
    .as_object_mut()
    .ok_or_else(|| RemoteError::InvalidGraph {
      message: format!("expected a graph object, got {}", graph),
    })?;

  if let Some(declared) = object.get("input_ids").and_then(Value::as_array)
    && !declared.is_empty()
    && declared.len() != args.len()
  {
    return Err(RemoteError::InvalidGraph {
      message: format!(
        "graph declares {} inputs, called with {}",
        declared.len(),
        args.len()
      ),
    });
  }

  let first_id = next_output_id(object);
  let inputs: Vec<Value> = args
    .iter()
    .enumerate()
    .map(|(idx, arg)| {
      json!({
        "id": format!("{}-input-{}", uid, idx),
        "data": arg,
        "operator": INPUT_OPERATOR,
        "input_ids": [],
        "output_ids": [{ "id": first_id + idx as i64 }],
      })
    })
    .collect();

  let graph_id = format!("{}-graph", uid);
  object.insert("id".to_string(), Value::String(graph_id.clone()));
  object.insert(
    "input_ids".to_string(),
    Value::Array(
      inputs
        .iter()
        .map(|node| node["output_ids"][0].clone())
        .collect(),
    ),
  );

  let mut elements = Vec::with_capacity(inputs.len() + 1);
  elements.push(target);
  elements.extend(inputs);

  Ok(SynthesizedGraph { graph_id, elements })
}
