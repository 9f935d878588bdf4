//! Input coercion.
//!
//! Turns a request's positional values into call arguments, one per declared
//! parameter:
//!
//! 1. upstream inputs replace the slots named by `input_handles`
//! 2. the null sentinel becomes the parameter's substitute (or unset)
//! 3. `File` references are downloaded, `Dir` archives downloaded and extracted
//! 4. `Func` / `Funcs` subgraphs are bound to remote callables
//!
//! A batch-marked value is coerced element by element and kept as a
//! [`Slot::Batch`] for fan-out.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tessera_dispatcher::FileReference;
use tessera_remote::{RemoteInvoker, Slot};
use tessera_schema::sentinel::{batch_items, is_null};
use tessera_schema::{OperatorSchema, Parameter, ParameterType};
use tracing::debug;

use crate::archive::extract_zip;
use crate::argument::Argument;
use crate::error::PipelineError;
use crate::request::InvocationRequest;
use crate::runtime::ExtensionRuntime;

/// Coerce `request` against `schema`, materializing files under `scratch`.
pub async fn coerce(
  runtime: &ExtensionRuntime,
  schema: &OperatorSchema,
  request: &InvocationRequest,
  scratch: &Path,
) -> Result<Vec<Slot<Argument>>, PipelineError> {
  let values = request.positional_values()?;
  if values.len() != schema.parameters.len() {
    return Err(PipelineError::InputBinding {
      message: format!(
        "operator '{}' takes {} arguments, got {}",
        schema.operator_id,
        schema.parameters.len(),
        values.len()
      ),
    });
  }

  let coercer = Coercer { runtime, request };
  let mut slots = Vec::with_capacity(values.len());

  for (index, (param, value)) in schema.parameters.iter().zip(values).enumerate() {
    let slot = match batch_items(&value) {
      Some(items) => {
        let mut coerced = Vec::with_capacity(items.len());
        for (k, item) in items.iter().enumerate() {
          let dest = scratch.join(format!("input-{}-{}", index, k));
          coerced.push(coercer.coerce_value(index, param, item.clone(), &dest).await?);
        }
        Slot::Batch(coerced)
      }
      None => {
        let dest = scratch.join(format!("input-{}", index));
        Slot::Single(coercer.coerce_value(index, param, value, &dest).await?)
      }
    };
    slots.push(slot);
  }

  Ok(slots)
}

struct Coercer<'a> {
  runtime: &'a ExtensionRuntime,
  request: &'a InvocationRequest,
}

impl Coercer<'_> {
  async fn coerce_value(
    &self,
    index: usize,
    param: &Parameter,
    value: Value,
    dest: &Path,
  ) -> Result<Argument, PipelineError> {
    if is_null(&value) {
      return Ok(match param.null_substitute() {
        Some(substitute) => Argument::Value(substitute),
        None => Argument::Unset,
      });
    }

    match param.ty.inner() {
      ParameterType::File { allowed_extensions } => {
        let reference = file_reference(index, value)?;
        check_extension(index, &reference, allowed_extensions.as_deref())?;
        let path = self.fetch(index, &reference, dest).await?;
        Ok(Argument::Path(path))
      }
      ParameterType::Dir => {
        let reference = file_reference(index, value)?;
        let path = self.fetch_dir(index, &reference, dest).await?;
        Ok(Argument::Path(path))
      }
      ParameterType::Func => Ok(Argument::Func(self.invoker(index, value)?)),
      ParameterType::Funcs => match value {
        Value::Array(graphs) => Ok(Argument::Funcs(
          graphs
            .into_iter()
            .map(|graph| self.invoker(index, graph))
            .collect::<Result<_, _>>()?,
        )),
        other => Err(PipelineError::InputBinding {
          message: format!("input {} expects a list of subgraphs, got {}", index, other),
        }),
      },
      _ => Ok(Argument::Value(value)),
    }
  }

  /// Bind a subgraph to a remote callable. Nothing is sent until it is called.
  fn invoker(&self, index: usize, graph: Value) -> Result<RemoteInvoker, PipelineError> {
    if !graph.is_object() {
      return Err(PipelineError::InputBinding {
        message: format!("input {} expects a subgraph object, got {}", index, graph),
      });
    }
    Ok(RemoteInvoker::new(
      self.runtime.remote().clone(),
      self.request.dispatcher_url.clone(),
      self.request.session_id.clone(),
      self.request.token.clone(),
      graph,
    ))
  }

  async fn fetch(
    &self,
    index: usize,
    reference: &FileReference,
    dest: &Path,
  ) -> Result<PathBuf, PipelineError> {
    let name = reference.base_name();
    if name == "." || name == ".." {
      return Err(PipelineError::InvalidFileReference {
        index,
        message: format!("invalid file name '{}'", name),
      });
    }

    tokio::fs::create_dir_all(dest).await?;
    let path = dest.join(&name);
    let bytes = self
      .runtime
      .dispatcher()
      .download(&reference.url, &path)
      .await
      .map_err(|e| PipelineError::InvalidFileReference {
        index,
        message: format!("download of {} failed: {}", reference.url, e),
      })?;

    debug!(index, file = %path.display(), bytes, "input fetched");
    Ok(path)
  }

  /// Download an archive and extract it next to itself, into a directory
  /// named after the archive without its `.zip` suffix.
  async fn fetch_dir(
    &self,
    index: usize,
    reference: &FileReference,
    dest: &Path,
  ) -> Result<PathBuf, PipelineError> {
    let archive = self.fetch(index, reference, &dest.join(".archive")).await?;
    let name = reference.base_name();
    let dir_name = name
      .strip_suffix(".zip")
      .or_else(|| name.strip_suffix(".ZIP"))
      .filter(|stem| !stem.is_empty())
      .unwrap_or(name.as_str())
      .to_string();
    let out_dir = dest.join(dir_name);

    let target = out_dir.clone();
    tokio::task::spawn_blocking(move || extract_zip(&archive, &target))
      .await
      .map_err(|e| PipelineError::InvalidFileReference {
        index,
        message: format!("archive extraction aborted: {}", e),
      })?
      .map_err(|e| PipelineError::InvalidFileReference {
        index,
        message: format!("{:#}", e),
      })?;

    Ok(out_dir)
  }
}

fn file_reference(index: usize, value: Value) -> Result<FileReference, PipelineError> {
  serde_json::from_value(value).map_err(|e| PipelineError::InvalidFileReference {
    index,
    message: format!("expected {{ \"url\": .. }}: {}", e),
  })
}

fn check_extension(
  index: usize,
  reference: &FileReference,
  allowed: Option<&[String]>,
) -> Result<(), PipelineError> {
  let Some(allowed) = allowed.filter(|a| !a.is_empty()) else {
    return Ok(());
  };

  let name = reference.base_name().to_lowercase();
  let matches = allowed.iter().any(|ext| {
    let ext = ext.trim_start_matches('.').to_lowercase();
    name.ends_with(&format!(".{}", ext))
  });

  if matches {
    Ok(())
  } else {
    Err(PipelineError::InvalidFileReference {
      index,
      message: format!("'{}' does not have one of the extensions {:?}", name, allowed),
    })
  }
}
