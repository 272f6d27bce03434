//! Channel-based start requests.
//!
//! The [`EngineInbox`] owns an mpsc channel of start requests. Triggers hold
//! a [`StartRequestSender`] and never touch the engine directly; each request
//! carries a oneshot reply with the run id or the engine's refusal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::WorkflowEngine;
use crate::error::{DeliveryError, EngineError};

/// A request to start one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
  pub workflow_id: String,
  pub input: serde_json::Value,
}

struct Envelope {
  request: StartRequest,
  reply: oneshot::Sender<Result<String, EngineError>>,
}

/// Receives start requests and hands them to the engine.
///
/// # Usage
///
/// ```ignore
/// let inbox = EngineInbox::new(engine.clone());
///
/// // Give senders to triggers
/// let sender = inbox.sender();
///
/// // Run the receive loop
/// let cancel = CancellationToken::new();
/// tokio::spawn(inbox.start(cancel.clone()));
/// ```
pub struct EngineInbox {
  sender: mpsc::Sender<Envelope>,
  receiver: mpsc::Receiver<Envelope>,
  engine: WorkflowEngine,
}

impl EngineInbox {
  /// Create an inbox sized by the engine's `inbox_buffer`.
  pub fn new(engine: WorkflowEngine) -> Self {
    let buffer_size = engine.config().inbox_buffer;
    Self::with_buffer_size(engine, buffer_size)
  }

  pub fn with_buffer_size(engine: WorkflowEngine, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));
    Self {
      sender,
      receiver,
      engine,
    }
  }

  /// A sender handle using the engine's delivery timeout.
  pub fn sender(&self) -> StartRequestSender {
    StartRequestSender {
      sender: self.sender.clone(),
      timeout: self.engine.config().delivery_timeout,
    }
  }

  /// Run the receive loop until `cancel` fires or every sender is gone.
  ///
  /// Dropping the inbox makes every outstanding sender report
  /// [`DeliveryError::Unreachable`].
  pub async fn start(mut self, cancel: CancellationToken) {
    info!("engine_inbox_started");
    // Only outside senders should keep the loop alive.
    drop(self.sender);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("engine_inbox_cancelled");
          break;
        }
        envelope = self.receiver.recv() => {
          let Some(Envelope { request, reply }) = envelope else {
            info!("engine_inbox_closed");
            break;
          };
          // The sender timed out and reported the request as undelivered.
          if reply.is_closed() {
            warn!(workflow_id = %request.workflow_id, "start_request_abandoned");
            continue;
          }
          let result = self.engine.start(&request.workflow_id, request.input);
          if let Err(e) = &result {
            warn!(workflow_id = %request.workflow_id, error = %e, "start_request_rejected");
          }
          let _ = reply.send(result);
        }
      }
    }
  }
}

/// Delivers start requests to an [`EngineInbox`].
///
/// Every call to [`deliver`](Self::deliver) sends at most once; it never
/// retries.
#[derive(Debug, Clone)]
pub struct StartRequestSender {
  sender: mpsc::Sender<Envelope>,
  timeout: Duration,
}

impl StartRequestSender {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Whether the inbox has gone away.
  pub fn is_closed(&self) -> bool {
    self.sender.is_closed()
  }

  /// Hand `request` to the engine and wait for its run id.
  pub async fn deliver(&self, request: StartRequest) -> Result<String, DeliveryError> {
    let timed_out = DeliveryError::TimedOut {
      timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
    };
    let (reply, response) = oneshot::channel();

    match self
      .sender
      .send_timeout(Envelope { request, reply }, self.timeout)
      .await
    {
      Ok(()) => {}
      Err(SendTimeoutError::Closed(_)) => return Err(DeliveryError::Unreachable),
      Err(SendTimeoutError::Timeout(_)) => return Err(timed_out),
    }

    match tokio::time::timeout(self.timeout, response).await {
      Ok(Ok(Ok(run_id))) => Ok(run_id),
      Ok(Ok(Err(e))) => Err(DeliveryError::Rejected(e)),
      // Inbox dropped the request without answering
      Ok(Err(_)) => Err(DeliveryError::Unreachable),
      Err(_) => Err(timed_out),
    }
  }
}

impl std::fmt::Debug for Envelope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Envelope")
      .field("request", &self.request)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;
  use cadence_config::{StateDef, WorkflowDef};
  use cadence_task::{InvocationContext, TaskError, TaskHandler, TaskRegistry};
  use serde_json::json;

  use super::*;
  use crate::config::EngineConfig;
  use crate::run::RunPhase;

  struct Echo;

  #[async_trait]
  impl TaskHandler for Echo {
    async fn call(
      &self,
      _ctx: &InvocationContext,
      input: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
      Ok(input)
    }
  }

  fn engine() -> WorkflowEngine {
    let mut registry = TaskRegistry::new();
    registry.register("Echo", Arc::new(Echo));
    let engine = WorkflowEngine::new(EngineConfig::default(), registry);
    engine
      .register_definition(&WorkflowDef {
        workflow_id: "echo".to_string(),
        name: "Echo".to_string(),
        states: vec![StateDef::task("Echo", 1000)],
      })
      .unwrap();
    engine
  }

  fn request(workflow_id: &str) -> StartRequest {
    StartRequest {
      workflow_id: workflow_id.to_string(),
      input: json!({ "n": 1 }),
    }
  }

  #[tokio::test]
  async fn test_deliver_starts_run() {
    let engine = engine();
    let inbox = EngineInbox::new(engine.clone());
    let sender = inbox.sender();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(inbox.start(cancel.clone()));

    let run_id = sender.deliver(request("echo")).await.unwrap();
    let status = engine.wait(&run_id).await.unwrap();
    assert_eq!(status.phase, RunPhase::Succeeded);

    cancel.cancel();
    handle.await.unwrap();
  }

  #[tokio::test]
  async fn test_deliver_rejected() {
    let engine = engine();
    let inbox = EngineInbox::new(engine);
    let sender = inbox.sender();
    let cancel = CancellationToken::new();
    tokio::spawn(inbox.start(cancel.clone()));

    let err = sender.deliver(request("missing")).await.unwrap_err();
    assert!(matches!(
      err,
      DeliveryError::Rejected(EngineError::UnknownWorkflow { .. })
    ));
    cancel.cancel();
  }

  #[tokio::test]
  async fn test_dropped_inbox_is_unreachable() {
    let engine = engine();
    let inbox = EngineInbox::new(engine.clone());
    let sender = inbox.sender();
    drop(inbox);

    assert!(sender.is_closed());
    let err = sender.deliver(request("echo")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Unreachable));
    assert!(engine.runs().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_idle_inbox_times_out() {
    let inbox = EngineInbox::with_buffer_size(engine(), 1);
    let sender = inbox.sender().with_timeout(Duration::from_millis(100));

    // Accepted into the buffer but nobody answers
    let err = sender.deliver(request("echo")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::TimedOut { timeout_ms: 100 }));
    drop(inbox);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timed_out_request_never_starts_a_run() {
    let engine = engine();
    let inbox = EngineInbox::with_buffer_size(engine.clone(), 4);
    let sender = inbox.sender().with_timeout(Duration::from_millis(100));

    let err = sender.deliver(request("echo")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::TimedOut { .. }));

    // The stalled loop resumes with the abandoned request still buffered.
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(inbox.start(cancel.clone()));
    let run_id = sender.deliver(request("echo")).await.unwrap();
    engine.wait(&run_id).await.unwrap();

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, run_id);

    cancel.cancel();
    handle.await.unwrap();
  }
}
