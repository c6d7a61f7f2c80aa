//! Request validation and message construction.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, warn};
use serde::Deserialize;

use crate::error::GatewayError;
use crate::protocol::{MediaType, MessagingClient, OutboundMessage};
use crate::types::{parse_recipient, JID};

/// Body of `POST /v1/send-message`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub message: String,
    /// Base64 image; the message text becomes its caption.
    #[serde(default)]
    pub image: Option<String>,
}

impl SendRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.phone_number.is_empty() {
            return Err(GatewayError::InvalidRequest("phone number must not be empty".into()));
        }
        if self.message.is_empty() {
            return Err(GatewayError::InvalidRequest("message must not be empty".into()));
        }
        Ok(())
    }

    /// The image payload, if one was sent. An empty string counts as none.
    pub fn image_payload(&self) -> Option<&str> {
        self.image.as_deref().filter(|image| !image.is_empty())
    }
}

/// A message ready to hand to the send orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub recipient: JID,
    pub message: OutboundMessage,
    pub media_handle: Option<String>,
}

pub struct MessageComposer {
    client: Arc<dyn MessagingClient>,
}

impl MessageComposer {
    pub fn new(client: Arc<dyn MessagingClient>) -> Self {
        Self { client }
    }

    pub async fn compose(&self, req: &SendRequest) -> Result<ComposedMessage, GatewayError> {
        req.validate()?;

        let recipient = parse_recipient(&req.phone_number);
        if !recipient.valid {
            return Err(GatewayError::InvalidRecipient(req.phone_number.clone()));
        }

        let Some(payload) = req.image_payload() else {
            return Ok(ComposedMessage {
                recipient: recipient.jid,
                message: OutboundMessage::text(req.message.as_str()),
                media_handle: None,
            });
        };

        // Line-wrapped base64 (MIME, `base64` CLI output) is accepted.
        let unwrapped: Vec<u8> = payload
            .bytes()
            .filter(|b| !matches!(b, b'\r' | b'\n'))
            .collect();
        let data = BASE64
            .decode(&unwrapped)
            .map_err(|e| GatewayError::ImageProcessingFailed(format!("invalid base64: {e}")))?;
        if data.is_empty() {
            return Err(GatewayError::ImageProcessingFailed("image is empty".into()));
        }

        if !self.client.is_connected().await {
            if let Err(err) = self.client.connect().await {
                warn!("Connect before upload failed: {err}");
            }
        }

        let upload = self
            .client
            .upload(data.clone(), MediaType::Image)
            .await
            .map_err(GatewayError::UploadFailed)?;
        debug!("Uploaded {} byte image for {}", data.len(), recipient.jid);

        Ok(ComposedMessage {
            recipient: recipient.jid,
            message: OutboundMessage::image(req.message.as_str(), &upload, &data),
            media_handle: Some(upload.handle),
        })
    }
}
