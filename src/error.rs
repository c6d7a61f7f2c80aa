//! Request-level errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::client::ClientError;
use crate::protocol::qr::QrError;

/// Everything a login or send request can fail with.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid recipient {0:?}")]
    InvalidRecipient(String),
    #[error("{0}")]
    Bind(String),
    #[error("failed to process image: {0}")]
    ImageProcessingFailed(String),
    #[error("failed to upload image: {0}")]
    UploadFailed(#[source] ClientError),
    #[error("failed to send message: {0}")]
    SendFailed(#[source] ClientError),
    #[error("session is paired but reconnect failed: {0}")]
    ReconnectFailed(#[source] ClientError),
    #[error("failed to connect: {0}")]
    ConnectFailed(#[source] ClientError),
    #[error("pairing channel unavailable: {0}")]
    PairingChannel(String),
    #[error("timed out waiting for a login code")]
    LoginTimedOut,
    #[error(transparent)]
    QrRender(#[from] QrError),
}

impl GatewayError {
    /// Client mistakes map to 400; upstream and infrastructure failures to 5xx.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_)
            | GatewayError::InvalidRecipient(_)
            | GatewayError::Bind(_)
            | GatewayError::ImageProcessingFailed(_) => StatusCode::BAD_REQUEST,
            GatewayError::UploadFailed(_) | GatewayError::SendFailed(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ReconnectFailed(_) | GatewayError::ConnectFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::LoginTimedOut => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::PairingChannel(_) | GatewayError::QrRender(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match &self {
            GatewayError::Bind(detail) => json!({ "error": detail }),
            other => json!({ "message": other.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_requests() {
        assert_eq!(
            GatewayError::InvalidRequest("phone number must not be empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::ImageProcessingFailed("bad base64".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn upstream_errors_are_server_side() {
        assert_eq!(
            GatewayError::SendFailed(ClientError::NotConnected).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::ReconnectFailed(ClientError::NotConnected).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(GatewayError::LoginTimedOut.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn messages_carry_the_cause() {
        let err = GatewayError::SendFailed(ClientError::SendFailed("websocket closed".into()));
        assert_eq!(err.to_string(), "failed to send message: send failed: websocket closed");
    }
}
