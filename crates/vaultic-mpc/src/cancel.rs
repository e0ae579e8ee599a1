//! Caller-facing cancellation.
//!
//! A watch channel carries the flag; the coordinator checks the token at
//! every suspension point via [`with_cancel`], so cancellation is
//! observed within one await.

use std::future::Future;
use tokio::sync::watch;
use vaultic_core::{Error, Result};

pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
    // Keeps the channel open for tokens made by `never()`.
    _keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle { sender },
        CancelToken {
            receiver,
            _keepalive: None,
        },
    )
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

impl CancelToken {
    /// A token that never fires, for callers without cancellation needs.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _keepalive: Some(std::sync::Arc::new(sender)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when cancellation is requested; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Handle dropped without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Race a fallible future against the token.
pub async fn with_cancel<T, F>(token: &CancelToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        outcome = future => outcome,
    }
}
