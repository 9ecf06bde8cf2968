use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::TransitionDenied;

/// Every failure the protocol can surface to an agent.
///
/// Variants map one-to-one onto the wire error taxonomy; rendering into the
/// HTTP envelope happens exactly once, at the gateway boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{message}")]
    Validation {
        param: Option<String>,
        message: String,
    },
    #[error("request body is not valid JSON")]
    InvalidJson,
    #[error("checkout session {0} was not found")]
    SessionNotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("missing or invalid credential")]
    Unauthorized,
    #[error("request signature rejected: {0}")]
    SignatureInvalid(String),
    #[error("{0}")]
    PaymentAuthorizationFailed(String),
    #[error("{0}")]
    PaymentCaptureFailed(String),
    #[error("a previous request with this idempotency key failed; retry with a new key")]
    IdempotentReplayOfFailure,
    #[error("timed out waiting for a concurrent request with the same idempotency key")]
    IdempotencyTimeout,
    #[error("upstream dependency failure")]
    Upstream(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl ProtocolError {
    pub fn validation(param: impl Into<String>, message: impl Into<String>) -> Self {
        ProtocolError::Validation {
            param: Some(param.into()),
            message: message.into(),
        }
    }

    pub fn validation_bare(message: impl Into<String>) -> Self {
        ProtocolError::Validation {
            param: None,
            message: message.into(),
        }
    }

    /// Envelope `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Unauthorized | ProtocolError::SignatureInvalid(_) => {
                "authentication_error"
            }
            ProtocolError::Upstream(_) | ProtocolError::Internal(_) => "api_error",
            _ => "invalid_request_error",
        }
    }

    /// Envelope `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Validation { .. } => "validation_error",
            ProtocolError::InvalidJson => "invalid_json",
            ProtocolError::SessionNotFound(_) => "session_not_found",
            ProtocolError::InvalidState(_) => "invalid_state",
            ProtocolError::Unauthorized => "unauthorized",
            ProtocolError::SignatureInvalid(_) => "signature_invalid",
            ProtocolError::PaymentAuthorizationFailed(_) => "payment_authorization_failed",
            ProtocolError::PaymentCaptureFailed(_) => "payment_capture_failed",
            ProtocolError::IdempotentReplayOfFailure => "idempotency_error",
            ProtocolError::IdempotencyTimeout => "idempotency_timeout",
            ProtocolError::Upstream(_) | ProtocolError::Internal(_) => "api_error",
        }
    }

    pub fn param(&self) -> Option<&str> {
        match self {
            ProtocolError::Validation { param, .. } => param.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ProtocolError::Unauthorized | ProtocolError::SignatureInvalid(_) => {
                StatusCode::UNAUTHORIZED
            }
            ProtocolError::PaymentAuthorizationFailed(_)
            | ProtocolError::PaymentCaptureFailed(_) => StatusCode::PAYMENT_REQUIRED,
            ProtocolError::IdempotentReplayOfFailure | ProtocolError::IdempotencyTimeout => {
                StatusCode::CONFLICT
            }
            ProtocolError::Upstream(_) | ProtocolError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to put on the wire. Internal causes are never exposed.
    pub fn client_message(&self) -> String {
        match self {
            ProtocolError::Upstream(_) | ProtocolError::Internal(_) => {
                "internal server error".into()
            }
            other => other.to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind().into(),
                code: self.code().into(),
                message: self.client_message(),
                param: self.param().map(str::to_string),
            },
        }
    }
}

impl From<anyhow::Error> for ProtocolError {
    fn from(err: anyhow::Error) -> Self {
        ProtocolError::Internal(err)
    }
}

impl From<TransitionDenied> for ProtocolError {
    fn from(denied: TransitionDenied) -> Self {
        ProtocolError::InvalidState(denied.to_string())
    }
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}
