//! Operator return values.
//!
//! Handlers return [`Outputs`], built from a single value or a tuple:
//!
//! ```ignore
//! Ok(json!(x + 1).into())
//! Ok((json!(count), Output::file("report.csv")).into())
//! ```

use std::path::PathBuf;

use bytes::Bytes;
use serde_json::Value;

/// One output slot as returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
  Value(Value),
  /// A file written by the handler, relative to its work dir.
  File(PathBuf),
}

impl Output {
  pub fn file(path: impl Into<PathBuf>) -> Self {
    Output::File(path.into())
  }
}

impl From<Value> for Output {
  fn from(value: Value) -> Self {
    Output::Value(value)
  }
}

/// The ordered outputs of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs(Vec<Output>);

impl Outputs {
  pub fn new(outputs: Vec<Output>) -> Self {
    Self(outputs)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_inner(self) -> Vec<Output> {
    self.0
  }
}

impl From<Output> for Outputs {
  fn from(output: Output) -> Self {
    Self(vec![output])
  }
}

impl From<Value> for Outputs {
  fn from(value: Value) -> Self {
    Self(vec![Output::Value(value)])
  }
}

impl From<Vec<Output>> for Outputs {
  fn from(outputs: Vec<Output>) -> Self {
    Self(outputs)
  }
}

impl<A, B> From<(A, B)> for Outputs
where
  A: Into<Output>,
  B: Into<Output>,
{
  fn from((a, b): (A, B)) -> Self {
    Self(vec![a.into(), b.into()])
  }
}

impl<A, B, C> From<(A, B, C)> for Outputs
where
  A: Into<Output>,
  B: Into<Output>,
  C: Into<Output>,
{
  fn from((a, b, c): (A, B, C)) -> Self {
    Self(vec![a.into(), b.into(), c.into()])
  }
}

/// An output slot after leaving the sandbox; files are held in memory since
/// the work dir is gone by the time they are reported.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
  Value(Value),
  File { name: String, data: Bytes },
}

impl OutputValue {
  pub fn is_file(&self) -> bool {
    matches!(self, OutputValue::File { .. })
  }
}
