//! Session-scoped client for apps published by the dispatcher.
//!
//! `GET /apps` lists what can be called; `POST /api/run/{name}` runs one app
//! inside a session and answers with its outputs keyed by output name.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::error::DispatcherError;
use crate::types::AppInfo;

/// Transport for the app API.
#[async_trait]
pub trait AppTransport: Send + Sync {
  /// List the apps published under `/apps`.
  async fn list_apps(&self, dispatcher_url: &str) -> Result<Vec<AppInfo>, DispatcherError>;

  /// Run `name` with a body of `{ "uuid": session, <input>: <value>, ... }`.
  async fn run_app(
    &self,
    dispatcher_url: &str,
    token: &str,
    name: &str,
    body: &Map<String, Value>,
  ) -> Result<Map<String, Value>, DispatcherError>;
}

/// Calls dispatcher apps within one session.
pub struct AppClient {
  transport: Arc<dyn AppTransport>,
  dispatcher_url: String,
  token: String,
  session_id: String,
  apps: Vec<AppInfo>,
}

impl AppClient {
  /// Fetch the app list and open a session. A fresh session id is generated
  /// when none is given.
  #[instrument(skip(transport, token))]
  pub async fn begin(
    transport: Arc<dyn AppTransport>,
    dispatcher_url: &str,
    token: &str,
    session_id: Option<String>,
  ) -> Result<Self, DispatcherError> {
    let apps = transport.list_apps(dispatcher_url).await?;
    let session_id = session_id
      .filter(|id| !id.is_empty())
      .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    debug!(apps = apps.len(), session_id = %session_id, "app list fetched");

    Ok(Self {
      transport,
      dispatcher_url: dispatcher_url.to_string(),
      token: token.to_string(),
      session_id,
      apps,
    })
  }

  pub fn session_id(&self) -> &str {
    &self.session_id
  }

  /// Names of the callable apps. Apps without outputs are not listed.
  pub fn app_names(&self) -> Vec<&str> {
    self
      .apps
      .iter()
      .filter(|app| !app.outputs.is_empty())
      .map(|app| app.name.as_str())
      .collect()
  }

  pub fn app(&self, name: &str) -> Option<&AppInfo> {
    self.apps.iter().find(|app| app.name == name)
  }

  /// Run `name` with positional `args`, returning its outputs in declared
  /// order.
  #[instrument(skip(self, args), fields(session_id = %self.session_id))]
  pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, DispatcherError> {
    let app = self
      .app(name)
      .filter(|app| !app.outputs.is_empty())
      .ok_or_else(|| DispatcherError::UnknownApp {
        name: name.to_string(),
      })?;

    if args.len() != app.inputs.len() {
      return Err(DispatcherError::InputArity {
        app: app.name.clone(),
        expected: app.inputs.len(),
        actual: args.len(),
      });
    }

    let mut body = Map::new();
    body.insert("uuid".to_string(), Value::String(self.session_id.clone()));
    for (input, value) in app.inputs.iter().zip(args) {
      body.insert(input.clone(), value);
    }

    info!(app = %app.name, "launching app");
    let mut outputs = self
      .transport
      .run_app(&self.dispatcher_url, &self.token, &app.name, &body)
      .await?;

    if outputs.len() != app.outputs.len()
      || !app.outputs.iter().all(|key| outputs.contains_key(key))
    {
      return Err(DispatcherError::OutputMismatch {
        app: app.name.clone(),
        expected: app.outputs.clone(),
        actual: outputs.keys().cloned().collect(),
      });
    }
    Ok(
      app
        .outputs
        .iter()
        .filter_map(|key| outputs.remove(key))
        .collect(),
    )
  }
}
