//! Poll-until-predicate-or-timeout, the only loop shape the
//! coordinator's wait states use.

use crate::cancel::CancelToken;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use vaultic_core::{Error, Result};

/// Run `attempt` every `interval` until it yields `Some`, the deadline
/// passes (`PeerTimeout`), or the token fires (`Cancelled`).
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancelToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(value) = attempt().await? {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::PeerTimeout);
        }
        let nap = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
