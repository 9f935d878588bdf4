//! Reserved values with special meaning on the wire.
//!
//! These strings are shared with the dispatcher and with other extension
//! nodes, so they must never change.

use serde_json::Value;

/// Stands for "no value supplied" in a positional input slot.
pub const NULL_VALUE: &str = "<<tessera:null>>";

/// First element of a `[BATCH_MARKER, items]` pair marking a list as a batch
/// of argument values rather than a single list value.
pub const BATCH_MARKER: &str = "<<tessera:batch>>";

/// Sole argument of a warm-up call. Remote callables use it to open their
/// session channel without submitting any work.
pub const WARM_UP_TOKEN: &str = "<<tessera:warm-up>>";

/// Returns true when `value` is the null sentinel.
pub fn is_null(value: &Value) -> bool {
  value.as_str() == Some(NULL_VALUE)
}

/// Returns true when `args` is exactly one warm-up token.
pub fn is_warm_up(args: &[Value]) -> bool {
  matches!(args, [Value::String(s)] if s == WARM_UP_TOKEN)
}

/// Wrap `items` in a batch marker.
pub fn mark_batch(items: Vec<Value>) -> Value {
  Value::Array(vec![Value::String(BATCH_MARKER.to_string()), Value::Array(items)])
}

/// If `value` is a batch marker, return the batched items.
pub fn batch_items(value: &Value) -> Option<&[Value]> {
  match value.as_array().map(Vec::as_slice) {
    Some([Value::String(marker), Value::Array(items)]) if marker == BATCH_MARKER => {
      Some(items.as_slice())
    }
    _ => None,
  }
}
