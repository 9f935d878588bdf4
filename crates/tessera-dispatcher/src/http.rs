use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::app::AppTransport;
use crate::error::DispatcherError;
use crate::types::{
  AppInfo, ErrorMessage, FilePart, FinishedMessage, GraphSubmission, ProgressMessage,
};
use crate::{Dispatcher, endpoint};

/// reqwest-backed [`Dispatcher`].
#[derive(Debug, Clone, Default)]
pub struct HttpDispatcher {
  client: Client,
}

impl HttpDispatcher {
  pub fn new() -> Self {
    Self::with_client(Client::new())
  }

  /// Use a preconfigured client (timeouts, proxies, TLS roots).
  pub fn with_client(client: Client) -> Self {
    Self { client }
  }

  async fn send(&self, url: String, request: RequestBuilder) -> Result<Response, DispatcherError> {
    let response = request.send().await?;
    let status = response.status();
    debug!(endpoint = %url, status = status.as_u16(), "dispatcher responded");

    if status.is_success() {
      Ok(response)
    } else {
      let body = response.text().await.unwrap_or_default();
      Err(DispatcherError::Status {
        endpoint: url,
        status: status.as_u16(),
        body,
      })
    }
  }

  async fn post_json<T: serde::Serialize + Sync>(
    &self,
    dispatcher_url: &str,
    path: &str,
    body: &T,
  ) -> Result<(), DispatcherError> {
    let url = endpoint(dispatcher_url, path);
    let request = self.client.post(&url).json(body);
    self.send(url, request).await.map(|_| ())
  }
}

fn file_part(file: FilePart) -> Part {
  Part::bytes(file.data.to_vec()).file_name(file.file_name)
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
  async fn node_finished(
    &self,
    dispatcher_url: &str,
    message: &FinishedMessage,
  ) -> Result<(), DispatcherError> {
    self.post_json(dispatcher_url, "node_finished", message).await
  }

  async fn node_finished_file(
    &self,
    dispatcher_url: &str,
    node: &str,
    output: &[Value],
    files: Vec<FilePart>,
  ) -> Result<(), DispatcherError> {
    let url = endpoint(dispatcher_url, "node_finished_file");

    let mut form = Form::new()
      .text("node", node.to_string())
      .text("output", serde_json::to_string(output)?);
    for file in files {
      form = form.part(file.index.to_string(), file_part(file));
    }

    let request = self.client.post(&url).multipart(form);
    self.send(url, request).await.map(|_| ())
  }

  async fn node_error(
    &self,
    dispatcher_url: &str,
    message: &ErrorMessage,
  ) -> Result<(), DispatcherError> {
    self.post_json(dispatcher_url, "node_error", message).await
  }

  async fn node_progress(
    &self,
    dispatcher_url: &str,
    message: &ProgressMessage,
  ) -> Result<(), DispatcherError> {
    self.post_json(dispatcher_url, "node_progress", message).await
  }

  async fn run_graph(
    &self,
    dispatcher_url: &str,
    token: Option<&str>,
    submission: &GraphSubmission,
  ) -> Result<(), DispatcherError> {
    let url = endpoint(dispatcher_url, "run_graph");
    let mut request = self.client.post(&url).json(submission);
    if let Some(token) = token {
      request = request.bearer_auth(token);
    }
    self.send(url, request).await.map(|_| ())
  }

  async fn upload(&self, dispatcher_url: &str, file: FilePart) -> Result<Value, DispatcherError> {
    let url = endpoint(dispatcher_url, "upload");
    let form = Form::new().part("file", file_part(file));
    let request = self.client.post(&url).multipart(form);
    let response = self.send(url, request).await?;
    Ok(response.json().await?)
  }

  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DispatcherError> {
    let request = self.client.get(url);
    let response = self.send(url.to_string(), request).await?;

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      file.write_all(&bytes).await?;
      written += bytes.len() as u64;
    }

    file.flush().await?;
    Ok(written)
  }
}

#[async_trait]
impl AppTransport for HttpDispatcher {
  async fn list_apps(&self, dispatcher_url: &str) -> Result<Vec<AppInfo>, DispatcherError> {
    let url = endpoint(dispatcher_url, "apps");
    let request = self.client.get(&url);
    let response = self.send(url, request).await?;
    Ok(response.json().await?)
  }

  async fn run_app(
    &self,
    dispatcher_url: &str,
    token: &str,
    name: &str,
    body: &Map<String, Value>,
  ) -> Result<Map<String, Value>, DispatcherError> {
    let url = endpoint(dispatcher_url, &format!("api/run/{}", name));
    let request = self.client.post(&url).bearer_auth(token).json(body);
    let response = self.send(url, request).await?;
    Ok(response.json().await?)
  }
}
