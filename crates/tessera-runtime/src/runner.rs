//! Invocation worker pool.
//!
//! The `InvocationRunner` owns a bounded queue of accepted requests and runs
//! them on spawned tasks, at most `workers` at a time. The HTTP layer only
//! holds an [`InvocationSender`], so accepting a request never waits on
//! execution.
//!
//! # Usage
//!
//! ```ignore
//! let runner = InvocationRunner::new(runtime, RunnerConfig::default());
//! let sender = runner.sender();
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(runner.start(cancel.clone()));
//!
//! sender.try_submit(request)?;
//! ```

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::request::InvocationRequest;
use crate::runtime::ExtensionRuntime;

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Maximum concurrently executing invocations.
  pub workers: usize,
  /// Accepted invocations waiting for a worker.
  pub queue_size: usize,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      workers: 16,
      queue_size: 1024,
    }
  }
}

/// Cloneable handle for enqueueing invocations.
#[derive(Debug, Clone)]
pub struct InvocationSender {
  sender: mpsc::Sender<InvocationRequest>,
}

impl InvocationSender {
  /// Enqueue without waiting; fails when the queue is full or the runner
  /// has stopped.
  pub fn try_submit(&self, request: InvocationRequest) -> Result<(), QueueError> {
    self.sender.try_send(request).map_err(|e| match e {
      mpsc::error::TrySendError::Full(_) => QueueError::Full,
      mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
    })
  }

  /// Enqueue, waiting for queue space.
  pub async fn submit(&self, request: InvocationRequest) -> Result<(), QueueError> {
    self
      .sender
      .send(request)
      .await
      .map_err(|_| QueueError::Closed)
  }
}

pub struct InvocationRunner {
  sender: mpsc::Sender<InvocationRequest>,
  receiver: mpsc::Receiver<InvocationRequest>,
  runtime: Arc<ExtensionRuntime>,
  workers: usize,
}

impl InvocationRunner {
  pub fn new(runtime: Arc<ExtensionRuntime>, config: RunnerConfig) -> Self {
    let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
    Self {
      sender,
      receiver,
      runtime,
      workers: config.workers.max(1),
    }
  }

  pub fn sender(&self) -> InvocationSender {
    InvocationSender {
      sender: self.sender.clone(),
    }
  }

  /// Run the execution loop until `cancel` fires or every sender is gone.
  ///
  /// Invocations already started are allowed to finish before this returns;
  /// queued ones that have not started are dropped.
  pub async fn start(self, cancel: CancellationToken) {
    let Self {
      sender,
      mut receiver,
      runtime,
      workers,
    } = self;
    // Only external senders keep the loop alive.
    drop(sender);

    let permits = Arc::new(Semaphore::new(workers));
    info!(workers, "invocation runner started");

    loop {
      let permit = tokio::select! {
        _ = cancel.cancelled() => {
          info!("invocation runner cancelled");
          break;
        }
        permit = permits.clone().acquire_owned() => match permit {
          Ok(permit) => permit,
          Err(_) => break,
        },
      };

      let request = tokio::select! {
        _ = cancel.cancelled() => {
          info!("invocation runner cancelled");
          break;
        }
        request = receiver.recv() => match request {
          Some(request) => request,
          None => {
            info!("invocation runner channel closed");
            break;
          }
        },
      };

      debug!(node_id = %request.node_id, "invocation dequeued");
      let runtime = runtime.clone();
      tokio::spawn(async move {
        let _permit = permit;
        let _ = runtime.execute(request).await;
      });
    }

    // Wait for in-flight invocations.
    if permits.acquire_many(workers as u32).await.is_err() {
      warn!("worker permits closed before in-flight invocations finished");
    }
    info!("invocation runner stopped");
  }
}
