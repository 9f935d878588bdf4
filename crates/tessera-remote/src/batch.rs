//! Batch fan-out.
//!
//! A single-argument function contract can stand for many calls: an argument
//! of the form `[BATCH_MARKER, items]` means "call once per item". When
//! several arguments are batch-marked they are zipped and must have equal
//! length; unmarked arguments are held fixed across every call.

use serde_json::Value;
use tessera_schema::sentinel::{WARM_UP_TOKEN, batch_items, mark_batch};
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::invoker::Invocable;

/// One positional argument, possibly standing for several calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
  Single(T),
  Batch(Vec<T>),
}

impl Slot<Value> {
  /// Classify a raw JSON argument.
  pub fn from_value(value: Value) -> Self {
    match batch_items(&value) {
      Some(items) => Slot::Batch(items.to_vec()),
      None => Slot::Single(value),
    }
  }
}

impl<T> Slot<T> {
  pub fn is_batch(&self) -> bool {
    matches!(self, Slot::Batch(_))
  }
}

/// Whether any slot is batch-marked.
pub fn is_batched<T>(slots: &[Slot<T>]) -> bool {
  slots.iter().any(Slot::is_batch)
}

/// Expand slots into per-call argument lists.
///
/// Without batch-marked slots this is a single call. Otherwise there is one
/// call per batch element; call `i` takes element `i` of every marked slot
/// and the value of every unmarked one.
pub fn fan_out<T: Clone>(slots: Vec<Slot<T>>) -> Result<Vec<Vec<T>>, RemoteError> {
  let mut calls: Option<usize> = None;
  for slot in &slots {
    if let Slot::Batch(items) = slot {
      match calls {
        Some(n) if n != items.len() => {
          return Err(RemoteError::BatchShape {
            message: format!(
              "batched arguments have different lengths ({} and {})",
              n,
              items.len()
            ),
          });
        }
        _ => calls = Some(items.len()),
      }
    }
  }

  let calls = calls.unwrap_or(1);
  Ok(
    (0..calls)
      .map(|i| {
        slots
          .iter()
          .map(|slot| match slot {
            Slot::Single(value) => value.clone(),
            Slot::Batch(items) => items[i].clone(),
          })
          .collect()
      })
      .collect(),
  )
}

/// Map `f` over `items` in batches of `batch_size` (one batch when unset).
///
/// A list item is taken as the argument list for one call; any other item
/// is a single argument. `f` is warmed up first so a remote callable opens
/// its session channel before real work is dispatched. Results come back
/// flattened in input order.
pub async fn map(
  items: Vec<Value>,
  f: &dyn Invocable,
  batch_size: Option<usize>,
) -> Result<Vec<Value>, RemoteError> {
  if items.is_empty() {
    return Ok(Vec::new());
  }

  if let Err(e) = f.invoke(vec![Value::String(WARM_UP_TOKEN.to_string())]).await {
    warn!(error = %e, "warm-up call failed, continuing");
  }

  let groups: Vec<Vec<Value>> = items
    .into_iter()
    .map(|item| match item {
      Value::Array(args) => args,
      scalar => vec![scalar],
    })
    .collect();

  let arity = groups[0].len();
  if let Some(bad) = groups.iter().find(|g| g.len() != arity) {
    return Err(RemoteError::BatchShape {
      message: format!(
        "item has {} arguments, expected {} like the first item",
        bad.len(),
        arity
      ),
    });
  }

  let size = batch_size.filter(|s| *s > 0).unwrap_or(groups.len());
  let mut results = Vec::with_capacity(groups.len());

  for (index, batch) in groups.chunks(size).enumerate() {
    let args: Vec<Value> = (0..arity)
      .map(|j| mark_batch(batch.iter().map(|group| group[j].clone()).collect()))
      .collect();

    debug!(batch = index, len = batch.len(), "dispatching batch");
    match f.invoke(args).await? {
      Value::Array(values) if values.len() == batch.len() => results.extend(values),
      other => {
        return Err(RemoteError::BatchShape {
          message: format!(
            "batch {} of {} items returned {}",
            index,
            batch.len(),
            other
          ),
        });
      }
    }
  }

  Ok(results)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::invoker::invocable_fn;
  use serde_json::json;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn test_single_batched_argument_holds_others_fixed() {
    let slots = vec![
      Slot::Batch(vec![json!(1), json!(2), json!(3)]),
      Slot::Single(json!("b")),
    ];
    let calls = fan_out(slots).unwrap();
    assert_eq!(
      calls,
      vec![
        vec![json!(1), json!("b")],
        vec![json!(2), json!("b")],
        vec![json!(3), json!("b")],
      ]
    );
  }

  #[test]
  fn test_all_batched_arguments_are_zipped() {
    let slots = vec![
      Slot::Batch(vec![json!(1), json!(2)]),
      Slot::Batch(vec![json!("x"), json!("y")]),
    ];
    let calls = fan_out(slots).unwrap();
    assert_eq!(
      calls,
      vec![vec![json!(1), json!("x")], vec![json!(2), json!("y")]]
    );
  }

  #[test]
  fn test_unequal_batches_rejected() {
    let slots = vec![
      Slot::Batch(vec![json!(1), json!(2)]),
      Slot::Batch(vec![json!("x")]),
    ];
    assert!(matches!(
      fan_out(slots),
      Err(RemoteError::BatchShape { .. })
    ));
  }

  #[test]
  fn test_unbatched_is_one_call() {
    let calls = fan_out(vec![Slot::Single(1), Slot::Single(2)]).unwrap();
    assert_eq!(calls, vec![vec![1, 2]]);
  }

  #[test]
  fn test_empty_batch_is_zero_calls() {
    let calls = fan_out(vec![Slot::<i32>::Batch(vec![]), Slot::Single(2)]).unwrap();
    assert!(calls.is_empty());
  }

  #[test]
  fn test_slot_from_marked_value() {
    let marked = mark_batch(vec![json!(1), json!(2)]);
    assert_eq!(
      Slot::from_value(marked),
      Slot::Batch(vec![json!(1), json!(2)])
    );
    assert_eq!(Slot::from_value(json!([1, 2])), Slot::Single(json!([1, 2])));
  }

  #[tokio::test]
  async fn test_map_doubles_for_every_batch_size() {
    for batch_size in [None, Some(1), Some(2), Some(3)] {
      let double = invocable_fn(|args: Vec<Value>| async move {
        let x = args[0].as_i64().unwrap_or_default();
        Ok(json!(x * 2))
      });
      let result = map(vec![json!(1), json!(2), json!(3)], &double, batch_size)
        .await
        .unwrap();
      assert_eq!(result, vec![json!(2), json!(4), json!(6)], "batch size {:?}", batch_size);
    }
  }

  #[tokio::test]
  async fn test_map_batches_are_bounded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let identity = invocable_fn(move |args: Vec<Value>| {
      counter.fetch_add(1, Ordering::SeqCst);
      async move { Ok(args[0].clone()) }
    });

    struct Batches<'a> {
      inner: &'a dyn Invocable,
      seen: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl Invocable for Batches<'_> {
      async fn invoke(&self, args: Vec<Value>) -> Result<Value, RemoteError> {
        if let Some(items) = args.first().and_then(batch_items) {
          self.seen.lock().unwrap().push(items.len());
        }
        self.inner.invoke(args).await
      }
    }

    let batches = Batches {
      inner: &identity,
      seen: std::sync::Mutex::new(Vec::new()),
    };
    let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
    let result = map(items.clone(), &batches, Some(2)).await.unwrap();

    assert_eq!(result, items);
    assert_eq!(*batches.seen.lock().unwrap(), vec![2, 2, 1]);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
  }

  #[tokio::test]
  async fn test_map_multi_argument_items() {
    let add = invocable_fn(|args: Vec<Value>| async move {
      Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
    });
    let result = map(vec![json!([1, 10]), json!([2, 20])], &add, Some(1))
      .await
      .unwrap();
    assert_eq!(result, vec![json!(11), json!(22)]);
  }

  #[tokio::test]
  async fn test_map_rejects_ragged_items() {
    let add = invocable_fn(|_args: Vec<Value>| async move { Ok(Value::Null) });
    let err = map(vec![json!([1, 2]), json!(3)], &add, None).await.unwrap_err();
    assert!(matches!(err, RemoteError::BatchShape { .. }));
  }
}
