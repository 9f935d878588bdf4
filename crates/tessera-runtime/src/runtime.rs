//! Extension runtime context.
//!
//! The [`ExtensionRuntime`] owns everything invocations share: the operator
//! registry, the dispatcher client, and the remote client with its
//! per-session connection pool. It is built once at startup and handed to
//! the request handler and the worker pool.

use std::sync::Arc;

use tessera_dispatcher::{Dispatcher, HttpDispatcher};
use tessera_remote::{Connector, RemoteClient, RemoteConfig, WsConnector};

use crate::error::PipelineError;
use crate::pipeline;
use crate::registry::OperatorRegistry;
use crate::request::{InvocationBody, InvocationRequest};

/// Configuration for the runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
  /// Dispatcher used when a request does not name one.
  pub dispatcher_url: Option<String>,
  pub remote: RemoteConfig,
}

pub struct ExtensionRuntime {
  registry: OperatorRegistry,
  dispatcher: Arc<dyn Dispatcher>,
  remote: Arc<RemoteClient>,
  config: RuntimeConfig,
}

impl ExtensionRuntime {
  pub fn new(
    registry: OperatorRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    connector: Arc<dyn Connector>,
    config: RuntimeConfig,
  ) -> Self {
    let remote = Arc::new(RemoteClient::new(
      connector,
      dispatcher.clone(),
      config.remote.clone(),
    ));
    Self {
      registry,
      dispatcher,
      remote,
      config,
    }
  }

  /// A runtime talking HTTP to the dispatcher and websockets for sessions.
  pub fn with_http(registry: OperatorRegistry, config: RuntimeConfig) -> Self {
    Self::new(
      registry,
      Arc::new(HttpDispatcher::new()),
      Arc::new(WsConnector::new()),
      config,
    )
  }

  pub fn registry(&self) -> &OperatorRegistry {
    &self.registry
  }

  pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
    &self.dispatcher
  }

  pub fn remote(&self) -> &Arc<RemoteClient> {
    &self.remote
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Build a request for `operator_id` from a raw body.
  pub fn request(
    &self,
    operator_id: &str,
    body: InvocationBody,
  ) -> Result<InvocationRequest, PipelineError> {
    InvocationRequest::from_body(operator_id, body, self.config.dispatcher_url.as_deref())
  }

  /// Serve one invocation; see [`pipeline::execute`].
  pub async fn execute(&self, request: InvocationRequest) -> Result<(), PipelineError> {
    pipeline::execute(self, request).await
  }
}
