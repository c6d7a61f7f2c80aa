//! Request orchestration between the HTTP layer and the client session.

mod compose;
mod login;
mod send;

use std::sync::Arc;
use std::time::Duration;

pub use compose::{ComposedMessage, MessageComposer, SendRequest};
pub use login::{LoginOutcome, SessionGatekeeper};
pub use send::SendOrchestrator;

use crate::error::GatewayError;
use crate::protocol::{qr, MessagingClient, SendResponse};

/// Login result as served to HTTP callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResponse {
    QrPng(Vec<u8>),
    AlreadyLoggedIn,
}

/// Wires the gatekeeper, composer and orchestrator around one client.
pub struct GatewayService {
    gatekeeper: SessionGatekeeper,
    composer: MessageComposer,
    orchestrator: SendOrchestrator,
}

impl GatewayService {
    pub fn new(client: Arc<dyn MessagingClient>, login_timeout: Duration) -> Self {
        Self {
            gatekeeper: SessionGatekeeper::new(client.clone(), login_timeout),
            composer: MessageComposer::new(client.clone()),
            orchestrator: SendOrchestrator::new(client),
        }
    }

    pub async fn login(&self) -> Result<LoginResponse, GatewayError> {
        match self.gatekeeper.obtain_login_code().await? {
            LoginOutcome::Code(code) => Ok(LoginResponse::QrPng(qr::render_png(&code)?)),
            LoginOutcome::AlreadyLoggedIn => Ok(LoginResponse::AlreadyLoggedIn),
        }
    }

    pub async fn send_message(&self, req: &SendRequest) -> Result<SendResponse, GatewayError> {
        let composed = self.composer.compose(req).await?;
        self.orchestrator
            .send(
                &composed.recipient,
                &composed.message,
                composed.media_handle.as_deref(),
            )
            .await
    }
}
