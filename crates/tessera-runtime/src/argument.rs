use std::path::{Path, PathBuf};

use serde_json::Value;
use tessera_remote::RemoteInvoker;

/// A coerced call argument, aligned with one declared parameter.
#[derive(Debug, Clone)]
pub enum Argument {
  /// A plain JSON value (`Choice`, `Num`, `String`, `Bool`, `Json`).
  Value(Value),
  /// A downloaded file or extracted directory.
  Path(PathBuf),
  /// A subgraph bound to a remote callable.
  Func(RemoteInvoker),
  /// Several subgraphs, in declaration order.
  Funcs(Vec<RemoteInvoker>),
  /// The caller sent the null sentinel and the parameter has no default.
  Unset,
}

impl Argument {
  pub fn as_value(&self) -> Option<&Value> {
    match self {
      Argument::Value(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    self.as_value().and_then(Value::as_f64)
  }

  pub fn as_i64(&self) -> Option<i64> {
    self.as_value().and_then(Value::as_i64)
  }

  pub fn as_str(&self) -> Option<&str> {
    self.as_value().and_then(Value::as_str)
  }

  pub fn as_bool(&self) -> Option<bool> {
    self.as_value().and_then(Value::as_bool)
  }

  pub fn as_path(&self) -> Option<&Path> {
    match self {
      Argument::Path(path) => Some(path),
      _ => None,
    }
  }

  pub fn as_func(&self) -> Option<&RemoteInvoker> {
    match self {
      Argument::Func(invoker) => Some(invoker),
      _ => None,
    }
  }

  pub fn as_funcs(&self) -> Option<&[RemoteInvoker]> {
    match self {
      Argument::Funcs(invokers) => Some(invokers),
      _ => None,
    }
  }

  pub fn is_unset(&self) -> bool {
    matches!(self, Argument::Unset)
  }
}

impl From<Value> for Argument {
  fn from(value: Value) -> Self {
    Argument::Value(value)
  }
}
