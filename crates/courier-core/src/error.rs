//! Error types for the Courier dispatch engine.
//!
//! Every failure that reaches a caller is a [`DispatchError`]. Engine-raised
//! conditions carry a stable [`key`](DispatchError::key) classification and
//! structured diagnostic [`data`](DispatchError::data); handler-raised failures
//! use [`DispatchError::failed`] to do the same.

use serde_json::{Value, json};
use thiserror::Error;

/// Stable classification keys.
///
/// `PRE_HANDLER_FAILURE` and `HANDLER_FAILURE` are log classifications only:
/// the invoker records them and re-raises the original error unchanged.
pub mod keys {
    /// No registered handler matches the message name.
    pub const NO_SUCH_HANDLER: &str = "NO_SUCH_HANDLER";
    /// A pre-handler failed.
    pub const PRE_HANDLER_FAILURE: &str = "PRE_HANDLER_FAILURE";
    /// The matched handler or the post-handler failed.
    pub const HANDLER_FAILURE: &str = "HANDLER_FAILURE";
    /// A payload or response could not be (de)serialized.
    pub const CODEC_ERROR: &str = "CODEC_ERROR";
    /// A late-bound context factory was used before it was wired.
    pub const UNBOUND_CONTEXT_FACTORY: &str = "UNBOUND_CONTEXT_FACTORY";
}

/// Errors surfaced by a dispatch.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No handler is registered for the message name.
    #[error("no handler registered for message '{message_name}'")]
    NoSuchHandler {
        /// The name that was looked up.
        message_name: String,
        /// Every name registered at the time of the lookup.
        registered_names: Vec<String>,
    },

    /// A typed failure raised by handler code.
    #[error("{key}: {message}")]
    Failed {
        /// Classification of the failure.
        key: String,
        /// Human-readable message.
        message: String,
        /// Structured diagnostic data.
        data: Value,
    },

    /// Serialization or deserialization of a message body or response failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The forward-reference context factory was used before being bound.
    #[error("context factory used before it was bound")]
    UnboundFactory,
}

impl DispatchError {
    /// Creates a typed failure with no diagnostic data.
    pub fn failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            key: key.into(),
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Attaches diagnostic data to a [`Failed`](Self::Failed) error.
    ///
    /// Other variants compute their data and are returned unchanged.
    pub fn with_data(self, data: Value) -> Self {
        match self {
            Self::Failed { key, message, .. } => Self::Failed { key, message, data },
            other => other,
        }
    }

    /// Returns the classification key.
    pub fn key(&self) -> &str {
        match self {
            Self::NoSuchHandler { .. } => keys::NO_SUCH_HANDLER,
            Self::Failed { key, .. } => key,
            Self::Codec(_) => keys::CODEC_ERROR,
            Self::UnboundFactory => keys::UNBOUND_CONTEXT_FACTORY,
        }
    }

    /// Returns structured diagnostic data for this error.
    pub fn data(&self) -> Value {
        match self {
            Self::NoSuchHandler {
                message_name,
                registered_names,
            } => json!({
                "messageName": message_name,
                "registeredNames": registered_names,
            }),
            Self::Failed { data, .. } => data.clone(),
            Self::Codec(reason) => json!({ "reason": reason }),
            Self::UnboundFactory => Value::Null,
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
