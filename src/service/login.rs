//! Login gating: new pairing handshake vs. reconnect of a paired session.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::error::GatewayError;
use crate::protocol::{MessagingClient, PairingEvent};

/// Result of a login attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Code to render as a QR image and scan from the phone.
    Code(String),
    /// A paired identity exists and the session is connected.
    AlreadyLoggedIn,
}

pub struct SessionGatekeeper {
    client: Arc<dyn MessagingClient>,
    timeout: Duration,
}

impl SessionGatekeeper {
    pub fn new(client: Arc<dyn MessagingClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn obtain_login_code(&self) -> Result<LoginOutcome, GatewayError> {
        if self.client.has_identity().await {
            if !self.client.is_connected().await {
                self.client.connect().await.map_err(|err| {
                    warn!("Reconnect of paired session failed: {err}");
                    GatewayError::ReconnectFailed(err)
                })?;
            }
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        // The channel has to exist before connecting or the first code is lost.
        let mut pairing = self
            .client
            .pairing_channel()
            .await
            .map_err(|err| GatewayError::PairingChannel(err.to_string()))?;
        self.client.connect().await.map_err(GatewayError::ConnectFailed)?;

        let event = tokio::time::timeout(self.timeout, pairing.recv())
            .await
            .map_err(|_| GatewayError::LoginTimedOut)?
            .ok_or_else(|| GatewayError::PairingChannel("channel closed before a code arrived".into()))?;

        let code = match event {
            PairingEvent::Code { code, .. } => code,
            other => {
                warn!("Pairing channel produced {:?} instead of a code", other);
                other.name().to_string()
            }
        };
        info!("Issued login code");
        Ok(LoginOutcome::Code(code))
    }
}
