//! Protocol module for high-level WhatsApp operations.
//!
//! Defines the capability set the gateway needs from a client session
//! (connect, upload, send, pairing) together with the values exchanged
//! across it. Everything behind [`MessagingClient`] is owned by the client.

pub mod message;
pub mod qr;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::client::ClientError;
use crate::types::{MessageID, JID};

pub use message::{generate_message_id, ImageMessage, OutboundMessage};

/// Media categories accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
}

impl MediaType {
    /// HKDF info string used when expanding a media key.
    pub fn app_info(&self) -> &'static str {
        match self {
            MediaType::Image => "WhatsApp Image Keys",
        }
    }
}

/// Result of a media upload. The gateway passes these values through into
/// the outgoing message without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub url: String,
    pub direct_path: String,
    pub handle: String,
    pub media_key: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Server acknowledgment for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResponse {
    #[serde(rename = "ID")]
    pub id: MessageID,
    #[serde(rename = "Timestamp")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "ServerID", skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i32>,
}

/// QR channel event types.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingEvent {
    /// New QR code to display
    Code {
        /// The QR code data string
        code: String,
        /// Timeout before next code
        timeout: Duration,
    },
    /// Pairing successful
    Success,
    /// Pairing timed out
    Timeout,
    /// Error during pairing
    Error(String),
}

impl PairingEvent {
    /// Event name as emitted on the pairing channel.
    pub fn name(&self) -> &str {
        match self {
            PairingEvent::Code { .. } => "code",
            PairingEvent::Success => "success",
            PairingEvent::Timeout => "timeout",
            PairingEvent::Error(_) => "error",
        }
    }
}

/// QR channel for receiving pairing events.
pub type PairingChannel = mpsc::Receiver<PairingEvent>;

/// Operations the gateway performs against a client session.
///
/// Implementations must be safe to share between request tasks.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Open (or reuse) the connection to the server. Connecting an already
    /// connected session is a no-op.
    async fn connect(&self) -> Result<(), ClientError>;

    async fn disconnect(&self) -> Result<(), ClientError>;

    async fn is_connected(&self) -> bool;

    /// Whether a paired device identity is stored.
    async fn has_identity(&self) -> bool;

    /// Open the pairing channel. Must be called before `connect` on an
    /// unpaired session so the first code is not missed.
    async fn pairing_channel(&self) -> Result<PairingChannel, ClientError>;

    async fn upload(&self, data: Vec<u8>, media_type: MediaType)
        -> Result<UploadResponse, ClientError>;

    async fn send(
        &self,
        to: &JID,
        message: &OutboundMessage,
        media_handle: Option<&str>,
    ) -> Result<SendResponse, ClientError>;
}
