//! Error types for Relay Sync

use thiserror::Error;

/// Main error type for bridge operations
///
/// Cloneable so a terminated [`Subscription`](crate::Subscription) can hand
/// the same cause to every observer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Caller-supplied options are malformed or contradictory
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Chat name could not be turned into a topic
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Envelope construction, submission or filter registration failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound envelope or message body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outbound payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Polling loop terminated on a filter or network failure
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Error reported by the sync engine
    #[error("Sync engine error: {0}")]
    Engine(String),

    /// Sealing or opening an envelope failed
    #[error("Crypto error: {0}")]
    Crypto(String),
}

/// Result type alias using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<postcard::Error> for BridgeError {
    fn from(e: postcard::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::InvalidOptions("both destinations set".to_string());
        assert_eq!(format!("{}", err), "Invalid options: both destinations set");
    }

    #[test]
    fn test_error_from_postcard() {
        let err: BridgeError = postcard::Error::DeserializeUnexpectedEnd.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }
}
