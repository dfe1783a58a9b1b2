//! Cancelable delivery handle

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

/// Handle to an active subscription
///
/// Terminated either by the caller ([`unsubscribe`](Self::unsubscribe)) or
/// by its polling loop on an unrecoverable error, which is then available
/// from [`err`](Self::err). The first termination wins.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    token: CancellationToken,
    error: Arc<Mutex<Option<BridgeError>>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop delivery without an error.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// Terminate with `err` attached.
    pub fn cancel(&self, err: BridgeError) {
        {
            let mut slot = self.error.lock();
            if slot.is_none() && !self.token.is_cancelled() {
                *slot = Some(err);
            }
        }
        self.token.cancel();
    }

    /// Resolves once the subscription has terminated.
    pub async fn done(&self) {
        self.token.cancelled().await
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cause of termination, `None` while active or after `unsubscribe`.
    pub fn err(&self) -> Option<BridgeError> {
        self.error.lock().clone()
    }
}
