use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::KeyPair;
use crate::protocol::qr::PairingKeys;

/// Sent-message entries kept in the session log.
pub const MAX_SENT_LOG: usize = 500;

/// Device keys persisted with the session, hex encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceKeys {
    pub noise_private: String,
    pub identity_private: String,
    pub adv_secret: String,
}

impl DeviceKeys {
    pub fn generate() -> Self {
        let adv_secret: [u8; 32] = rand::random();
        Self {
            noise_private: hex::encode(KeyPair::generate().private),
            identity_private: hex::encode(KeyPair::generate().private),
            adv_secret: hex::encode(adv_secret),
        }
    }

    /// Public halves plus the adv secret, as advertised in pairing codes.
    pub fn pairing_keys(&self) -> Result<PairingKeys, hex::FromHexError> {
        Ok(PairingKeys {
            noise_public: KeyPair::from_private_key(decode32(&self.noise_private)?).public,
            identity_public: KeyPair::from_private_key(decode32(&self.identity_private)?).public,
            adv_secret: decode32(&self.adv_secret)?,
        })
    }
}

fn decode32(value: &str) -> Result<[u8; 32], hex::FromHexError> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(value, &mut out)?;
    Ok(out)
}

/// An outbound message recorded after a successful send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub to: String,
    pub kind: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_handle: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Session state persisted between runs: device identity and message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    /// JID associated with the paired account, if any.
    pub registered_jid: Option<String>,
    /// Human-readable device name.
    pub device_name: String,
    pub keys: DeviceKeys,
    #[serde(default)]
    pub sent: Vec<SentMessage>,
}

impl SessionState {
    /// Create a new unpaired session with fresh device keys.
    pub fn with_device_name(device_name: impl Into<String>) -> Self {
        Self {
            registered_jid: None,
            device_name: device_name.into(),
            keys: DeviceKeys::generate(),
            sent: Vec::new(),
        }
    }

    /// Whether a device has been registered.
    pub fn is_registered(&self) -> bool {
        self.registered_jid.is_some()
    }

    pub fn register(&mut self, jid: impl Into<String>) {
        self.registered_jid = Some(jid.into());
    }

    /// Append to the sent log, dropping the oldest entries past the cap.
    /// Returns the dropped entries.
    pub fn record_sent(&mut self, message: SentMessage) -> Vec<SentMessage> {
        self.sent.push(message);
        if self.sent.len() > MAX_SENT_LOG {
            let excess = self.sent.len() - MAX_SENT_LOG;
            return self.sent.drain(..excess).collect();
        }
        Vec::new()
    }

    /// Load a session from disk. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn persist(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, serialized).await
    }
}
