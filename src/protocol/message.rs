//! Outgoing message construction.
//!
//! A request produces exactly one [`OutboundMessage`]: plain conversation
//! text, or an image whose media fields come straight from the upload.

use rand::Rng;

use super::UploadResponse;

/// Generate a unique message ID.
pub fn generate_message_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    format!("3EB0{:016X}", u64::from_be_bytes(bytes))
}

/// Image payload of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub caption: String,
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub mimetype: String,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Message body handed to the client's send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text { body: String },
    Image(ImageMessage),
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        OutboundMessage::Text { body: body.into() }
    }

    /// Build an image message from an upload result and the plaintext bytes
    /// that were uploaded.
    pub fn image(caption: impl Into<String>, upload: &UploadResponse, data: &[u8]) -> Self {
        OutboundMessage::Image(ImageMessage {
            caption: caption.into(),
            url: upload.url.clone(),
            direct_path: upload.direct_path.clone(),
            media_key: upload.media_key.clone(),
            mimetype: detect_mime_type(data).to_string(),
            file_enc_sha256: upload.file_enc_sha256.clone(),
            file_sha256: upload.file_sha256.clone(),
            file_length: data.len() as u64,
        })
    }

    /// Short label used in logs and the session log.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Text { .. } => "text",
            OutboundMessage::Image(_) => "image",
        }
    }

    /// Conversation text or caption.
    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text { body } => body,
            OutboundMessage::Image(image) => &image.caption,
        }
    }
}

/// Sniff a MIME type from leading magic bytes.
///
/// Unknown content falls back to `application/octet-stream`.
pub fn detect_mime_type(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}
