//! Remote subgraph callables.
//!
//! A [`RemoteInvoker`] is what an operator receives for a `Func` parameter.
//! Calling it runs one protocol attempt after another until a result arrives
//! or the attempt ceiling is hit:
//!
//! ```text
//! CONNECTING ─▶ REGISTERED ─▶ GRAPH_SUBMITTED ─▶ FINISHED | FAILED | TIMED_OUT
//! ```
//!
//! Every attempt uses a fresh caller id, correlation id and synthetic graph.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tessera_dispatcher::{Dispatcher, GraphSubmission};
use tessera_schema::sentinel::{batch_items, is_warm_up};
use tracing::{debug, info, instrument, warn};

use crate::batch::{Slot, fan_out};
use crate::channel::{ChannelEvent, Connector, NodeStatus};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::pool::{ConnectionPool, SocketWaitOutcome};
use crate::subgraph::synthesize;

/// Something an operator can call with positional JSON arguments.
#[async_trait]
pub trait Invocable: Send + Sync {
  async fn invoke(&self, args: Vec<Value>) -> Result<Value, RemoteError>;
}

/// Shared state behind every [`RemoteInvoker`]: the connection pool, the
/// dispatcher client used for submissions, and the retry policy.
pub struct RemoteClient {
  pool: ConnectionPool,
  dispatcher: Arc<dyn Dispatcher>,
  config: RemoteConfig,
}

impl RemoteClient {
  pub fn new(
    connector: Arc<dyn Connector>,
    dispatcher: Arc<dyn Dispatcher>,
    config: RemoteConfig,
  ) -> Self {
    Self {
      pool: ConnectionPool::new(connector, config.clone()),
      dispatcher,
      config,
    }
  }

  pub fn pool(&self) -> &ConnectionPool {
    &self.pool
  }

  pub fn config(&self) -> &RemoteConfig {
    &self.config
  }
}

/// A subgraph bound to the dispatcher context it must run in.
#[derive(Clone)]
pub struct RemoteInvoker {
  client: Arc<RemoteClient>,
  dispatcher_url: String,
  session_id: String,
  token: Option<String>,
  graph: Value,
  timeout: Duration,
}

impl fmt::Debug for RemoteInvoker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RemoteInvoker")
      .field("dispatcher_url", &self.dispatcher_url)
      .field("session_id", &self.session_id)
      .field("graph", &self.graph.get("id"))
      .field("timeout", &self.timeout)
      .finish()
  }
}

impl RemoteInvoker {
  pub fn new(
    client: Arc<RemoteClient>,
    dispatcher_url: impl Into<String>,
    session_id: impl Into<String>,
    token: Option<String>,
    graph: Value,
  ) -> Self {
    let timeout = client.config.timeout;
    Self {
      client,
      dispatcher_url: dispatcher_url.into(),
      session_id: session_id.into(),
      token,
      graph,
      timeout,
    }
  }

  /// Override the per-attempt result budget.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn graph(&self) -> &Value {
    &self.graph
  }

  pub fn session_id(&self) -> &str {
    &self.session_id
  }

  /// Run the subgraph with `args`, retrying whole attempts on failure.
  #[instrument(
    name = "remote_invoke",
    skip(self, args),
    fields(session_id = %self.session_id, num_args = args.len())
  )]
  pub async fn call(&self, args: Vec<Value>) -> Result<Value, RemoteError> {
    let attempts = self.client.config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
      match self.attempt(&args).await {
        Ok(value) => {
          info!(attempt, "remote_invocation_finished");
          return Ok(value);
        }
        Err(e @ RemoteError::InvalidGraph { .. }) => return Err(e),
        Err(e) => {
          warn!(attempt, max_attempts = attempts, error = %e, "remote_invocation_attempt_failed");
          if e.poisons_channel() {
            self.client.pool.evict(&self.session_id).await;
          }
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or(RemoteError::ChannelClosed))
  }

  async fn attempt(&self, args: &[Value]) -> Result<Value, RemoteError> {
    // An uninvocable graph fails before the session channel is touched.
    let uid = uuid::Uuid::new_v4().to_string();
    let synthesized = synthesize(&uid, &self.graph, args)?;

    let conn = self
      .client
      .pool
      .get_or_create(&self.session_id, &self.dispatcher_url)
      .await?;
    let correlation = conn
      .register(&uid, self.client.config.registration_timeout)
      .await?;
    debug!(caller_id = %uid, correlation = %correlation, "registered");

    // Subscribe before submitting so an early status push is not lost.
    let mut subscription = conn.subscribe(synthesized.graph_id.clone())?;

    let submission = GraphSubmission {
      graph: synthesized.elements,
      uuid: correlation,
    };
    self
      .client
      .dispatcher
      .run_graph(&self.dispatcher_url, self.token.as_deref(), &submission)
      .await
      .map_err(|source| RemoteError::Submission { source })?;
    debug!(graph_id = %synthesized.graph_id, "graph submitted");

    let wait = async {
      while let Some(event) = subscription.recv().await {
        let ChannelEvent::Node(payload) = event else {
          continue;
        };
        let Some(status) = NodeStatus::parse(&payload) else {
          continue;
        };
        if status.is_progress() {
          continue;
        }
        return if status.status == "finished" {
          Ok(result_value(&status))
        } else {
          Err(RemoteError::Failed { payload })
        };
      }
      Err(RemoteError::ChannelClosed)
    };

    tokio::time::timeout(self.timeout, wait)
      .await
      .unwrap_or(Err(RemoteError::Timeout {
        stage: "subgraph",
        timeout_ms: self.timeout.as_millis() as u64,
      }))
  }

  /// Open the session channel and register once, without submitting work.
  pub async fn warm_up(&self) -> Result<(), RemoteError> {
    let conn = self
      .client
      .pool
      .get_or_create(&self.session_id, &self.dispatcher_url)
      .await?;
    let uid = uuid::Uuid::new_v4().to_string();
    conn
      .register(&uid, self.client.config.registration_timeout)
      .await?;
    debug!(session_id = %self.session_id, "session warmed up");
    Ok(())
  }

  /// Keep the session channel alive with no pending work.
  pub async fn socket_wait(&self, timeout: Duration) -> Result<SocketWaitOutcome, RemoteError> {
    let conn = self
      .client
      .pool
      .get_or_create(&self.session_id, &self.dispatcher_url)
      .await?;
    Ok(conn.socket_wait(timeout).await)
  }
}

/// Result of a `finished` push: the single output, or all outputs when
/// there are several. A subgraph without declared outputs yields `null`.
fn result_value(status: &NodeStatus) -> Value {
  if status.data.output_ids.is_empty() {
    return Value::Null;
  }
  match &status.output {
    Value::Array(outputs) if outputs.len() == 1 => outputs[0].clone(),
    other => other.clone(),
  }
}

#[async_trait]
impl Invocable for RemoteInvoker {
  async fn invoke(&self, args: Vec<Value>) -> Result<Value, RemoteError> {
    if is_warm_up(&args) {
      self.warm_up().await?;
      return Ok(Value::Null);
    }
    self.call(args).await
  }
}

/// A local async closure usable wherever an [`Invocable`] is expected.
///
/// Batch-marked arguments are fanned out locally, one closure call per
/// element, and the results collected into a list.
pub struct FnInvocable<F> {
  f: F,
}

pub fn invocable_fn<F, Fut>(f: F) -> FnInvocable<F>
where
  F: Fn(Vec<Value>) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Value, RemoteError>> + Send,
{
  FnInvocable { f }
}

#[async_trait]
impl<F, Fut> Invocable for FnInvocable<F>
where
  F: Fn(Vec<Value>) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Value, RemoteError>> + Send,
{
  async fn invoke(&self, args: Vec<Value>) -> Result<Value, RemoteError> {
    if is_warm_up(&args) {
      return Ok(Value::Null);
    }

    if !args.iter().any(|arg| batch_items(arg).is_some()) {
      return (self.f)(args).await;
    }

    let slots: Vec<Slot<Value>> = args.into_iter().map(Slot::from_value).collect();
    let mut results = Vec::new();
    for call in fan_out(slots)? {
      results.push((self.f)(call).await?);
    }
    Ok(Value::Array(results))
  }
}
