#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tessera_dispatcher::{
  Dispatcher, DispatcherError, ErrorMessage, FilePart, FinishedMessage, GraphSubmission,
  ProgressMessage,
};
use tessera_remote::{ChannelEvent, ChannelSink, Connector, RemoteConfig, RemoteError};
use tessera_runtime::{
  ExtensionRuntime, InvocationBody, InvocationRequest, OperatorRegistry, Outputs, RuntimeConfig,
};
use tokio::sync::mpsc;

pub const DISPATCHER: &str = "http://dispatcher";

/// Dispatcher that records every callback and serves downloads from memory.
#[derive(Default)]
pub struct RecordingDispatcher {
  pub files: Mutex<HashMap<String, Vec<u8>>>,
  pub finished: Mutex<Vec<FinishedMessage>>,
  pub finished_files: Mutex<Vec<(String, Vec<Value>, Vec<FilePart>)>>,
  pub errors: Mutex<Vec<ErrorMessage>>,
  pub progress: Mutex<Vec<ProgressMessage>>,
  pub uploads: Mutex<Vec<FilePart>>,
  pub fail_progress: bool,
  pub fail_error: bool,
}

impl RecordingDispatcher {
  pub fn serve(&self, url: &str, data: Vec<u8>) {
    self.files.lock().unwrap().insert(url.to_string(), data);
  }

  pub fn finished(&self) -> Vec<FinishedMessage> {
    self.finished.lock().unwrap().clone()
  }

  pub fn errors(&self) -> Vec<ErrorMessage> {
    self.errors.lock().unwrap().clone()
  }

  pub fn callbacks(&self) -> usize {
    self.finished.lock().unwrap().len()
      + self.finished_files.lock().unwrap().len()
      + self.errors.lock().unwrap().len()
  }
}

fn unavailable(endpoint: &str) -> DispatcherError {
  DispatcherError::Status {
    endpoint: endpoint.to_string(),
    status: 503,
    body: "unavailable".to_string(),
  }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
  async fn node_finished(&self, _: &str, message: &FinishedMessage) -> Result<(), DispatcherError> {
    self.finished.lock().unwrap().push(message.clone());
    Ok(())
  }

  async fn node_finished_file(
    &self,
    _: &str,
    node: &str,
    output: &[Value],
    files: Vec<FilePart>,
  ) -> Result<(), DispatcherError> {
    self
      .finished_files
      .lock()
      .unwrap()
      .push((node.to_string(), output.to_vec(), files));
    Ok(())
  }

  async fn node_error(&self, _: &str, message: &ErrorMessage) -> Result<(), DispatcherError> {
    if self.fail_error {
      return Err(unavailable("node_error"));
    }
    self.errors.lock().unwrap().push(message.clone());
    Ok(())
  }

  async fn node_progress(&self, _: &str, message: &ProgressMessage) -> Result<(), DispatcherError> {
    if self.fail_progress {
      return Err(unavailable("node_progress"));
    }
    self.progress.lock().unwrap().push(message.clone());
    Ok(())
  }

  async fn run_graph(
    &self,
    _: &str,
    _: Option<&str>,
    _: &GraphSubmission,
  ) -> Result<(), DispatcherError> {
    Err(unavailable("run_graph"))
  }

  async fn upload(&self, _: &str, file: FilePart) -> Result<Value, DispatcherError> {
    let handle = json!({ "url": format!("http://store/{}", file.file_name), "name": file.file_name });
    self.uploads.lock().unwrap().push(file);
    Ok(handle)
  }

  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DispatcherError> {
    let data = self
      .files
      .lock()
      .unwrap()
      .get(url)
      .cloned()
      .ok_or_else(|| DispatcherError::Status {
        endpoint: url.to_string(),
        status: 404,
        body: "not found".to_string(),
      })?;
    tokio::fs::write(dest, &data).await?;
    Ok(data.len() as u64)
  }
}

/// Connector for runtimes whose operators never call subgraphs.
pub struct OfflineConnector;

#[async_trait]
impl Connector for OfflineConnector {
  async fn connect(
    &self,
    url: &str,
    _inbound: mpsc::UnboundedSender<ChannelEvent>,
  ) -> Result<Box<dyn ChannelSink>, RemoteError> {
    Err(RemoteError::Connection {
      url: url.to_string(),
      attempts: 1,
      message: "offline".to_string(),
    })
  }
}

pub fn runtime(registry: OperatorRegistry, dispatcher: Arc<RecordingDispatcher>) -> ExtensionRuntime {
  let config = RuntimeConfig {
    dispatcher_url: Some(DISPATCHER.to_string()),
    remote: RemoteConfig {
      max_connect_attempts: 1,
      backoff_base: Duration::from_millis(1),
      ..RemoteConfig::default()
    },
  };
  ExtensionRuntime::new(registry, dispatcher, Arc::new(OfflineConnector), config)
}

/// A request for `operator_id` on node `n1` with the given node values.
pub fn request(runtime: &ExtensionRuntime, operator_id: &str, values: Vec<Value>) -> InvocationRequest {
  let data: Vec<Value> = values.into_iter().map(|v| json!({ "value": v })).collect();
  let body: InvocationBody =
    serde_json::from_value(json!({ "node": { "data": data }, "id": "n1" })).unwrap();
  runtime.request(operator_id, body).unwrap()
}

pub fn ok(outputs: impl Into<Outputs>) -> anyhow::Result<Outputs> {
  Ok(outputs.into())
}

/// A zip archive of stored entries; names ending in `/` are directories.
pub fn stored_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
  let mut body = Vec::new();
  let mut central = Vec::new();

  for (name, data) in entries {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    let crc = crc.sum();
    let offset = body.len() as u32;
    let size = data.len() as u32;
    let name_len = name.len() as u16;

    body.extend_from_slice(&0x04034b50u32.to_le_bytes());
    body.extend_from_slice(&20u16.to_le_bytes()); // version needed
    body.extend_from_slice(&0u16.to_le_bytes()); // flags
    body.extend_from_slice(&0u16.to_le_bytes()); // stored
    body.extend_from_slice(&0u32.to_le_bytes()); // time, date
    body.extend_from_slice(&crc.to_le_bytes());
    body.extend_from_slice(&size.to_le_bytes());
    body.extend_from_slice(&size.to_le_bytes());
    body.extend_from_slice(&name_len.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes()); // extra
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(data);

    central.extend_from_slice(&0x02014b50u32.to_le_bytes());
    central.extend_from_slice(&20u16.to_le_bytes()); // version made by
    central.extend_from_slice(&20u16.to_le_bytes()); // version needed
    central.extend_from_slice(&0u16.to_le_bytes()); // flags
    central.extend_from_slice(&0u16.to_le_bytes()); // stored
    central.extend_from_slice(&0u32.to_le_bytes()); // time, date
    central.extend_from_slice(&crc.to_le_bytes());
    central.extend_from_slice(&size.to_le_bytes());
    central.extend_from_slice(&size.to_le_bytes());
    central.extend_from_slice(&name_len.to_le_bytes());
    central.extend_from_slice(&0u16.to_le_bytes()); // extra
    central.extend_from_slice(&0u16.to_le_bytes()); // comment
    central.extend_from_slice(&0u16.to_le_bytes()); // disk
    central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
    central.extend_from_slice(&offset.to_le_bytes());
    central.extend_from_slice(name.as_bytes());
  }

  let central_offset = body.len() as u32;
  let count = entries.len() as u16;
  body.extend_from_slice(&central);
  body.extend_from_slice(&0x06054b50u32.to_le_bytes());
  body.extend_from_slice(&0u16.to_le_bytes()); // disk
  body.extend_from_slice(&0u16.to_le_bytes()); // central directory disk
  body.extend_from_slice(&count.to_le_bytes());
  body.extend_from_slice(&count.to_le_bytes());
  body.extend_from_slice(&(central.len() as u32).to_le_bytes());
  body.extend_from_slice(&central_offset.to_le_bytes());
  body.extend_from_slice(&0u16.to_le_bytes()); // comment
  body
}
