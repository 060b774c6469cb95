//! Error types for mb-messenger

use thiserror::Error;

/// mb-messenger error type
#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Graph API error: {0}")]
    Api(String),

    #[error("Graph API request failed: {0}")]
    Request(String),

    #[error("Webhook verification failed")]
    WebhookVerificationFailed,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Unsupported webhook object: {0}")]
    UnsupportedObject(String),

    #[error("Unknown payload: {0}")]
    UnknownPayload(String),

    #[error("Unknown setup mode: {0}")]
    UnknownSetupMode(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("JSON serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for MessengerError {
    fn from(err: reqwest::Error) -> Self {
        MessengerError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for MessengerError {
    fn from(err: serde_json::Error) -> Self {
        MessengerError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MessengerError>;
