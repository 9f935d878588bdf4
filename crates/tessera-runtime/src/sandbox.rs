//! Execution sandbox.
//!
//! Each call gets its own temporary work dir, handed to the handler through
//! [`OperatorContext::work_dir`]. The process working directory is never
//! touched, so concurrent calls cannot interfere. The handler runs on its own
//! task so a panic is contained and reported like an error.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use tessera_dispatcher::Dispatcher;
use tracing::{debug, warn};

use crate::argument::Argument;
use crate::context::OperatorContext;
use crate::error::PipelineError;
use crate::operator::Operator;
use crate::output::{Output, OutputValue};

/// Identifies the node a sandboxed call runs for.
#[derive(Clone)]
pub struct CallSite {
  pub node_id: String,
  pub dispatcher_url: String,
  pub dispatcher: Arc<dyn Dispatcher>,
}

/// Run `operator` with `args` and collect its outputs.
pub async fn run(
  operator: &Operator,
  site: &CallSite,
  args: Vec<Argument>,
  batched: bool,
) -> Result<Vec<OutputValue>, PipelineError> {
  let work_dir = tempfile::Builder::new().prefix("tessera-call-").tempdir()?;
  let ctx = OperatorContext::new(
    site.node_id.clone(),
    site.dispatcher_url.clone(),
    work_dir.path().to_path_buf(),
    batched,
    site.dispatcher.clone(),
  );

  let handler = operator.handler();
  let joined = tokio::spawn(async move { handler.call(ctx, args).await }).await;

  let outputs = match joined {
    Ok(Ok(outputs)) => outputs,
    Ok(Err(e)) => {
      return Err(PipelineError::OperatorExecution {
        trace: format!("{:?}", e),
      });
    }
    Err(e) if e.is_panic() => {
      return Err(PipelineError::OperatorExecution {
        trace: format!("operator panicked: {}", panic_message(e.into_panic())),
      });
    }
    Err(e) => {
      return Err(PipelineError::OperatorExecution {
        trace: format!("operator task aborted: {}", e),
      });
    }
  };

  let expected = operator.schema().num_outputs;
  if outputs.len() != expected {
    warn!(
      operator_id = %operator.id(),
      expected,
      actual = outputs.len(),
      "operator returned an unexpected number of outputs"
    );
  }

  let mut values = Vec::with_capacity(outputs.len());
  for output in outputs.into_inner() {
    match output {
      Output::Value(value) => values.push(OutputValue::Value(value)),
      Output::File(path) => {
        let path = work_dir.path().join(path);
        let data = tokio::fs::read(&path)
          .await
          .map_err(|e| PipelineError::OperatorExecution {
            trace: format!("output file {} could not be read: {}", path.display(), e),
          })?;
        let name = path
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_else(|| "output".to_string());
        debug!(file = %name, bytes = data.len(), "output file captured");
        values.push(OutputValue::File {
          name,
          data: Bytes::from(data),
        });
      }
    }
  }

  drop(work_dir);
  Ok(values)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
