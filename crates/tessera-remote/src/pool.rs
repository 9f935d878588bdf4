//! Per-session channel pool.
//!
//! One physical channel per session id, shared by every remote invocation in
//! that session. Each connection runs a single reader task that routes inbound
//! events to the waiter registered under the event's correlation key, so
//! concurrent invocations on one channel never see each other's replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelSink, Connector, NodeStatus, channel_url};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

type Waiters = Mutex<HashMap<String, mpsc::UnboundedSender<ChannelEvent>>>;

/// Shared routing state between a connection and its reader task.
struct Routes {
  waiters: Waiters,
  socket_wait: Notify,
  completed: Notify,
  closed: CancellationToken,
}

impl Routes {
  fn dispatch(&self, event: ChannelEvent) {
    if let ChannelEvent::SocketWaitCancel(_) = event {
      debug!("socket wait cancelled by dispatcher");
      self.socket_wait.notify_waiters();
      return;
    }

    let Some(key) = event.correlation_key() else {
      debug!(?event, "dropping uncorrelated channel event");
      return;
    };

    if let ChannelEvent::Node(payload) = &event
      && NodeStatus::parse(payload).is_some_and(|s| s.status == "finished")
    {
      self.completed.notify_waiters();
    }

    let waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
    match waiters.get(&key) {
      Some(sender) => {
        let _ = sender.send(event);
      }
      None => debug!(correlation = %key, "no waiter for channel event"),
    }
  }

  fn close(&self) {
    self.closed.cancel();
    // Dropping the senders wakes every waiter with a closed channel.
    self
      .waiters
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clear();
    self.socket_wait.notify_waiters();
  }
}

/// Receives the events routed to one correlation key.
///
/// The route is removed when the subscription is dropped.
pub struct Subscription {
  key: String,
  receiver: mpsc::UnboundedReceiver<ChannelEvent>,
  routes: Arc<Routes>,
}

impl Subscription {
  /// Next event for this key, or `None` once the channel has closed.
  pub async fn recv(&mut self) -> Option<ChannelEvent> {
    self.receiver.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self
      .routes
      .waiters
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .remove(&self.key);
  }
}

/// How a socket wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketWaitOutcome {
  /// The dispatcher sent `socketwait_cancel`.
  Cancelled,
  /// A graph on the session finished.
  Completed,
  /// The channel closed.
  Closed,
  /// The wait budget ran out.
  TimedOut,
}

/// An open channel for one session.
pub struct SessionConnection {
  session_id: String,
  sink: Box<dyn ChannelSink>,
  routes: Arc<Routes>,
  reader: JoinHandle<()>,
}

impl SessionConnection {
  fn new(
    session_id: String,
    sink: Box<dyn ChannelSink>,
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
  ) -> Self {
    let routes = Arc::new(Routes {
      waiters: Mutex::new(HashMap::new()),
      socket_wait: Notify::new(),
      completed: Notify::new(),
      closed: CancellationToken::new(),
    });

    let reader_routes = routes.clone();
    let reader_session = session_id.clone();
    let reader = tokio::spawn(async move {
      while let Some(event) = inbound.recv().await {
        reader_routes.dispatch(event);
      }
      info!(session_id = %reader_session, "session channel closed");
      reader_routes.close();
    });

    Self {
      session_id,
      sink,
      routes,
      reader,
    }
  }

  pub fn session_id(&self) -> &str {
    &self.session_id
  }

  pub fn is_closed(&self) -> bool {
    self.routes.closed.is_cancelled()
  }

  /// Register a waiter for events correlated by `key`.
  pub fn subscribe(&self, key: impl Into<String>) -> Result<Subscription, RemoteError> {
    if self.is_closed() {
      return Err(RemoteError::ChannelClosed);
    }

    let key = key.into();
    let (sender, receiver) = mpsc::unbounded_channel();
    self
      .routes
      .waiters
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(key.clone(), sender);

    Ok(Subscription {
      key,
      receiver,
      routes: self.routes.clone(),
    })
  }

  pub async fn send(&self, event: ChannelEvent) -> Result<(), RemoteError> {
    if self.is_closed() {
      return Err(RemoteError::ChannelClosed);
    }
    self.sink.send(event).await
  }

  /// Register caller `caller_id` and return the dispatcher's correlation id.
  pub async fn register(&self, caller_id: &str, timeout: Duration) -> Result<String, RemoteError> {
    let mut subscription = self.subscribe(caller_id)?;
    self
      .send(ChannelEvent::Register {
        id: caller_id.to_string(),
      })
      .await?;

    let reply = tokio::time::timeout(timeout, async {
      while let Some(event) = subscription.recv().await {
        if let ChannelEvent::Registered { uuid, .. } = event {
          return Ok(uuid);
        }
      }
      Err(RemoteError::ChannelClosed)
    })
    .await;

    reply.unwrap_or(Err(RemoteError::Timeout {
      stage: "registration",
      timeout_ms: timeout.as_millis() as u64,
    }))
  }

  /// Hold the channel open until the dispatcher cancels, a graph on the
  /// session finishes, the channel closes, or `timeout` elapses.
  pub async fn socket_wait(&self, timeout: Duration) -> SocketWaitOutcome {
    if self.is_closed() {
      return SocketWaitOutcome::Closed;
    }

    tokio::select! {
      _ = self.routes.socket_wait.notified() => {
        if self.is_closed() {
          SocketWaitOutcome::Closed
        } else {
          SocketWaitOutcome::Cancelled
        }
      }
      _ = self.routes.completed.notified() => SocketWaitOutcome::Completed,
      _ = self.routes.closed.cancelled() => SocketWaitOutcome::Closed,
      _ = tokio::time::sleep(timeout) => SocketWaitOutcome::TimedOut,
    }
  }
}

impl Drop for SessionConnection {
  fn drop(&mut self) {
    self.reader.abort();
  }
}

type Slot = Arc<tokio::sync::Mutex<Option<Arc<SessionConnection>>>>;

/// Process-wide map of session id to open channel.
///
/// Entries live for the life of the pool; a connection is only replaced
/// after it has closed or been evicted.
pub struct ConnectionPool {
  connector: Arc<dyn Connector>,
  config: RemoteConfig,
  slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
  pub fn new(connector: Arc<dyn Connector>, config: RemoteConfig) -> Self {
    Self {
      connector,
      config,
      slots: Mutex::new(HashMap::new()),
    }
  }

  fn slot(&self, session_id: &str) -> Slot {
    self
      .slots
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .entry(session_id.to_string())
      .or_default()
      .clone()
  }

  /// Number of sessions with a live channel.
  pub fn live_sessions(&self) -> usize {
    let slots: Vec<Slot> = self
      .slots
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .values()
      .cloned()
      .collect();

    slots
      .iter()
      .filter(|slot| {
        slot
          .try_lock()
          .map(|conn| conn.as_ref().is_some_and(|c| !c.is_closed()))
          .unwrap_or(true)
      })
      .count()
  }

  /// Return the session's channel, opening it if needed.
  ///
  /// Concurrent callers for the same session wait on one another so only a
  /// single physical channel is ever opened per session.
  pub async fn get_or_create(
    &self,
    session_id: &str,
    dispatcher_url: &str,
  ) -> Result<Arc<SessionConnection>, RemoteError> {
    let slot = self.slot(session_id);
    let mut guard = slot.lock().await;

    if let Some(conn) = guard.as_ref()
      && !conn.is_closed()
    {
      return Ok(conn.clone());
    }

    let conn = Arc::new(self.connect(session_id, dispatcher_url).await?);
    *guard = Some(conn.clone());
    Ok(conn)
  }

  /// Drop the session's channel so the next use reconnects.
  pub async fn evict(&self, session_id: &str) {
    let slot = self.slot(session_id);
    let mut guard = slot.lock().await;
    if guard.take().is_some() {
      info!(session_id = %session_id, "evicted session channel");
    }
  }

  async fn connect(
    &self,
    session_id: &str,
    dispatcher_url: &str,
  ) -> Result<SessionConnection, RemoteError> {
    let url = channel_url(dispatcher_url);
    let attempts = self.config.max_connect_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
      let (sender, receiver) = mpsc::unbounded_channel();
      match self.connector.connect(&url, sender).await {
        Ok(sink) => {
          info!(session_id = %session_id, url = %url, attempt, "session channel connected");
          return Ok(SessionConnection::new(
            session_id.to_string(),
            sink,
            receiver,
          ));
        }
        Err(e) => {
          last_error = e.to_string();
          warn!(session_id = %session_id, url = %url, attempt, error = %e, "session channel connect failed");
          if attempt + 1 < attempts {
            tokio::time::sleep(self.config.backoff(attempt)).await;
          }
        }
      }
    }

    Err(RemoteError::Connection {
      url,
      attempts,
      message: last_error,
    })
  }
}
