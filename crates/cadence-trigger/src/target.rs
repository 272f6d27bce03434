use async_trait::async_trait;
use cadence_engine::{DeliveryError, StartRequest, StartRequestSender};

/// Where the scheduler delivers start requests.
#[async_trait]
pub trait StartRequestTarget: Send + Sync {
  /// Deliver once. Implementations must not retry.
  async fn deliver(&self, request: StartRequest) -> Result<String, DeliveryError>;
}

#[async_trait]
impl StartRequestTarget for StartRequestSender {
  async fn deliver(&self, request: StartRequest) -> Result<String, DeliveryError> {
    StartRequestSender::deliver(self, request).await
  }
}
