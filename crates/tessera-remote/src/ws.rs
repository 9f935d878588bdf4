//! Websocket transport for session channels.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::channel::{ChannelEvent, ChannelSink, Connector};
use crate::error::RemoteError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens session channels as websocket connections.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl Connector for WsConnector {
  async fn connect(
    &self,
    url: &str,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
  ) -> Result<Box<dyn ChannelSink>, RemoteError> {
    let (stream, _) = connect_async(url)
      .await
      .map_err(|e| RemoteError::Connection {
        url: url.to_string(),
        attempts: 1,
        message: e.to_string(),
      })?;

    let (write, mut read) = stream.split();
    let reader = tokio::spawn(async move {
      while let Some(frame) = read.next().await {
        let text = match frame {
          Ok(Message::Text(text)) => text,
          Ok(Message::Close(_)) => break,
          Ok(_) => continue,
          Err(e) => {
            warn!(error = %e, "session channel read failed");
            break;
          }
        };

        match serde_json::from_str::<ChannelEvent>(text.as_str()) {
          Ok(event) => {
            if inbound.send(event).is_err() {
              break;
            }
          }
          Err(e) => debug!(error = %e, "ignoring unrecognized channel frame"),
        }
      }
      // `inbound` drops here, which closes the connection's routes.
    });

    Ok(Box::new(WsSink {
      write: Mutex::new(write),
      reader,
    }))
  }
}

struct WsSink {
  write: Mutex<SplitSink<WsStream, Message>>,
  reader: JoinHandle<()>,
}

#[async_trait]
impl ChannelSink for WsSink {
  async fn send(&self, event: ChannelEvent) -> Result<(), RemoteError> {
    let frame = serde_json::to_string(&event).map_err(|_| RemoteError::ChannelClosed)?;
    self
      .write
      .lock()
      .await
      .send(Message::text(frame))
      .await
      .map_err(|e| {
        warn!(error = %e, "session channel write failed");
        RemoteError::ChannelClosed
      })
  }
}

impl Drop for WsSink {
  fn drop(&mut self) {
    self.reader.abort();
  }
}
