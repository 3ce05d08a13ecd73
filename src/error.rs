use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

// The hub actor stopped or its mailbox is full
impl From<actix::MailboxError> for AppError {
    fn from(err: actix::MailboxError) -> Self {
        AppError::InternalError(format!("relay hub unavailable: {}", err))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Reasons an inbound event is dropped. The protocol has no reply channel,
/// so these are logged rather than sent back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("{event} from unregistered sender {sender}")]
    UnregisteredSender { event: &'static str, sender: String },

    #[error("{event} from {user}, who is not a member of {group}")]
    NotAMember {
        event: &'static str,
        group: String,
        user: String,
    },

    #[error("Unknown group: {0}")]
    UnknownGroup(String),
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(String),
}

impl From<serde_json::Error> for WebSocketError {
    fn from(err: serde_json::Error) -> Self {
        WebSocketError::InvalidFormat(err.to_string())
    }
}
