//! The per-invocation pipeline: look up, coerce, execute, report.

use tessera_remote::{fan_out, is_batched};
use tracing::{error, info, instrument};

use crate::error::PipelineError;
use crate::input::coerce;
use crate::output::OutputValue;
use crate::report;
use crate::request::InvocationRequest;
use crate::runtime::ExtensionRuntime;
use crate::sandbox::{self, CallSite};

/// Serve one invocation end to end.
///
/// The outcome always reaches the dispatcher: outputs through a finished
/// callback, any failure (including a failed finished callback) through
/// `node_error`. The returned error is for logging only.
#[instrument(
  name = "invocation",
  skip(runtime, request),
  fields(
    node_id = %request.node_id,
    operator_id = %request.operator_id,
    session_id = %request.session_id,
  )
)]
pub async fn execute(
  runtime: &ExtensionRuntime,
  request: InvocationRequest,
) -> Result<(), PipelineError> {
  info!("invocation_started");

  let dispatcher = runtime.dispatcher().as_ref();
  let outcome = match run(runtime, &request).await {
    Ok(outputs) => report::finished(dispatcher, &request.dispatcher_url, &request.node_id, outputs)
      .await
      .map_err(|source| PipelineError::Reporting { source }),
    Err(e) => Err(e),
  };

  match &outcome {
    Ok(()) => info!("invocation_finished"),
    Err(e) => {
      error!(error = %e, "invocation_failed");
      report::error(dispatcher, &request.dispatcher_url, &request.node_id, e.trace()).await;
    }
  }

  outcome
}

async fn run(
  runtime: &ExtensionRuntime,
  request: &InvocationRequest,
) -> Result<Vec<OutputValue>, PipelineError> {
  let operator = runtime
    .registry()
    .get(&request.operator_id)
    .ok_or_else(|| PipelineError::UnknownOperator {
      operator_id: request.operator_id.clone(),
    })?;

  // Downloaded inputs live until the outputs have been collected.
  let scratch = tempfile::Builder::new()
    .prefix("tessera-inputs-")
    .tempdir()?;
  let slots = coerce(runtime, operator.schema(), request, scratch.path()).await?;

  let site = CallSite {
    node_id: request.node_id.clone(),
    dispatcher_url: request.dispatcher_url.clone(),
    dispatcher: runtime.dispatcher().clone(),
  };

  if !is_batched(&slots) {
    let args = fan_out(slots)
      .map_err(|e| PipelineError::InputBinding {
        message: e.to_string(),
      })?
      .pop()
      .unwrap_or_default();
    return sandbox::run(&operator, &site, args, false).await;
  }

  let calls = fan_out(slots).map_err(|e| PipelineError::InputBinding {
    message: e.to_string(),
  })?;
  info!(calls = calls.len(), "batch_fan_out");

  let mut results = Vec::with_capacity(calls.len());
  for args in calls {
    results.push(sandbox::run(&operator, &site, args, true).await?);
  }

  report::aggregate_batch(
    runtime.dispatcher().as_ref(),
    &request.dispatcher_url,
    operator.schema().num_outputs,
    results,
  )
  .await
  .map_err(|source| PipelineError::Reporting { source })
}
