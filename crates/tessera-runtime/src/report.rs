//! Result reporting.
//!
//! Plain outputs go to `node_finished` as a JSON array. If any slot holds a
//! file, the whole result goes to `node_finished_file` instead: the JSON
//! array with `""` at file slots, plus one file part per file slot.

use serde_json::Value;
use tessera_dispatcher::{Dispatcher, DispatcherError, ErrorMessage, FilePart, FinishedMessage};
use tracing::{debug, warn};

use crate::output::OutputValue;

/// Report a finished node.
pub async fn finished(
  dispatcher: &dyn Dispatcher,
  dispatcher_url: &str,
  node_id: &str,
  outputs: Vec<OutputValue>,
) -> Result<(), DispatcherError> {
  if !outputs.iter().any(OutputValue::is_file) {
    let message = FinishedMessage {
      node: node_id.to_string(),
      output: outputs
        .into_iter()
        .map(|output| match output {
          OutputValue::Value(value) => value,
          OutputValue::File { .. } => Value::Null,
        })
        .collect(),
    };
    debug!(node_id = %node_id, outputs = message.output.len(), "reporting node_finished");
    return dispatcher.node_finished(dispatcher_url, &message).await;
  }

  let mut json = Vec::with_capacity(outputs.len());
  let mut files = Vec::new();
  for (index, output) in outputs.into_iter().enumerate() {
    match output {
      OutputValue::Value(value) => json.push(value),
      OutputValue::File { name, data } => {
        json.push(Value::String(String::new()));
        files.push(FilePart {
          index,
          file_name: name,
          data,
        });
      }
    }
  }

  debug!(node_id = %node_id, outputs = json.len(), files = files.len(), "reporting node_finished_file");
  dispatcher
    .node_finished_file(dispatcher_url, node_id, &json, files)
    .await
}

/// Report a failed node. Best effort: a failure here is only logged.
pub async fn error(dispatcher: &dyn Dispatcher, dispatcher_url: &str, node_id: &str, trace: String) {
  let message = ErrorMessage {
    node: node_id.to_string(),
    error: trace,
  };
  if let Err(e) = dispatcher.node_error(dispatcher_url, &message).await {
    warn!(node_id = %node_id, error = %e, "error_report_failed");
  }
}

/// Fold the outputs of a batch fan-out into one result.
///
/// Slot `j` of the result is the list of slot-`j` values across calls, in
/// call order. Files are uploaded and replaced by their handles since a
/// list slot cannot carry a file part.
pub async fn aggregate_batch(
  dispatcher: &dyn Dispatcher,
  dispatcher_url: &str,
  num_outputs: usize,
  calls: Vec<Vec<OutputValue>>,
) -> Result<Vec<OutputValue>, DispatcherError> {
  let width = calls
    .iter()
    .map(Vec::len)
    .max()
    .unwrap_or(num_outputs)
    .max(num_outputs);
  let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(calls.len()); width];

  for outputs in calls {
    let len = outputs.len();
    for (j, output) in outputs.into_iter().enumerate() {
      let value = match output {
        OutputValue::Value(value) => value,
        OutputValue::File { name, data } => {
          let part = FilePart {
            index: j,
            file_name: name,
            data,
          };
          dispatcher.upload(dispatcher_url, part).await?
        }
      };
      columns[j].push(value);
    }
    for column in columns.iter_mut().skip(len) {
      column.push(Value::Null);
    }
  }

  Ok(
    columns
      .into_iter()
      .map(|column| OutputValue::Value(Value::Array(column)))
      .collect(),
  )
}
