//! Delivery of composed messages.

use std::sync::Arc;

use log::{error, info, warn};

use crate::error::GatewayError;
use crate::protocol::{MessagingClient, OutboundMessage, SendResponse};
use crate::types::JID;

pub struct SendOrchestrator {
    client: Arc<dyn MessagingClient>,
}

impl SendOrchestrator {
    pub fn new(client: Arc<dyn MessagingClient>) -> Self {
        Self { client }
    }

    /// Send once. On failure a single reconnect is attempted so the next
    /// request finds a live session; this send is not retried.
    pub async fn send(
        &self,
        recipient: &JID,
        message: &OutboundMessage,
        media_handle: Option<&str>,
    ) -> Result<SendResponse, GatewayError> {
        match self.client.send(recipient, message, media_handle).await {
            Ok(ack) => {
                info!("Sent {} message {} to {}", message.kind(), ack.id, recipient);
                Ok(ack)
            }
            Err(err) => {
                error!("Sending {} message to {} failed: {err}", message.kind(), recipient);
                if let Err(reconnect_err) = self.client.connect().await {
                    warn!("Reconnect after failed send also failed: {reconnect_err}");
                }
                Err(GatewayError::SendFailed(err))
            }
        }
    }
}
