//! Destination options for the protocol contract
//!
//! Every call targets exactly one destination: a public chat name or a
//! recipient public key. Validation runs before any side effect.

use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};
use crate::types::PublicKey;

/// Default lookback window of a history request
const DEFAULT_REQUEST_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of messages returned by a history request
const DEFAULT_REQUEST_LIMIT: usize = 1000;

/// Destination of a call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Public chat name, empty for private chats
    pub chat_name: String,
    /// Recipient key for private chats
    pub recipient: Option<PublicKey>,
}

impl ChatOptions {
    /// Target a public chat.
    pub fn public(chat_name: impl Into<String>) -> Self {
        Self {
            chat_name: chat_name.into(),
            recipient: None,
        }
    }

    /// Target a private chat with `recipient`.
    pub fn private(recipient: PublicKey) -> Self {
        Self {
            chat_name: String::new(),
            recipient: Some(recipient),
        }
    }

    /// Exactly one of chat name and recipient must be set.
    pub fn validate(&self) -> BridgeResult<()> {
        match (self.chat_name.is_empty(), self.recipient.is_some()) {
            (true, false) => Err(BridgeError::InvalidOptions(
                "field chat_name or recipient is required".to_string(),
            )),
            (false, true) => Err(BridgeError::InvalidOptions(
                "fields chat_name and recipient both set".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Options for `Protocol::subscribe`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeOptions {
    pub chat: ChatOptions,
}

impl SubscribeOptions {
    pub fn validate(&self) -> BridgeResult<()> {
        self.chat.validate()
    }
}

impl From<ChatOptions> for SubscribeOptions {
    fn from(chat: ChatOptions) -> Self {
        Self { chat }
    }
}

/// Options for `Protocol::send`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub chat: ChatOptions,
}

impl SendOptions {
    pub fn validate(&self) -> BridgeResult<()> {
        self.chat.validate()
    }
}

impl From<ChatOptions> for SendOptions {
    fn from(chat: ChatOptions) -> Self {
        Self { chat }
    }
}

/// Parameters of a historic-message request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub chat: ChatOptions,
    pub limit: usize,
    /// Window start, Unix seconds
    pub from: i64,
    /// Window end, Unix seconds
    pub to: i64,
}

impl RequestOptions {
    /// Messages from the last 24 hours, at most 1000.
    pub fn default_window(chat: ChatOptions) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            chat,
            limit: DEFAULT_REQUEST_LIMIT,
            from: now - DEFAULT_REQUEST_WINDOW.as_secs() as i64,
            to: now,
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        self.chat.validate()?;
        if self.from > self.to {
            return Err(BridgeError::InvalidOptions(
                "request window ends before it starts".to_string(),
            ));
        }
        Ok(())
    }
}
