//! Relay client (C3): a stateless HTTP message bus.
//!
//! The relay treats `from`, `to` and `body` as opaque; only the SHA-256
//! `hash` of the body is meaningful to it (deduplication and DELETE
//! addressing). Sessions expire server-side after ~5 minutes.

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vaultic_core::{Error, Result};

pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

/// One encrypted MPC round message in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessage {
    pub session_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub body: String,
    pub hash: String,
    pub sequence_no: u64,
}

impl RelayMessage {
    pub fn new(
        session_id: impl Into<String>,
        from: impl Into<String>,
        to: Vec<String>,
        body: impl Into<String>,
        sequence_no: u64,
    ) -> Self {
        let body = body.into();
        let hash = body_hash(&body);
        Self {
            session_id: session_id.into(),
            from: from.into(),
            to,
            body,
            hash,
            sequence_no,
        }
    }
}

/// SHA-256 of the message body, lowercase hex.
pub fn body_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            transport,
        }
    }

    /// Join (or create) a session.
    pub async fn join_session(&self, session_id: &str, party_id: &str) -> Result<()> {
        let request = HttpRequest::new(Method::Post, format!("{}/{session_id}", self.base_url))
            .json(&vec![party_id])?;
        let response = self.send_with_retry(request).await?;
        self.expect_success(&response, "join session")?;
        Ok(())
    }

    /// Current participant list. An unknown session is an empty list,
    /// not an error.
    pub async fn participants(&self, session_id: &str) -> Result<Vec<String>> {
        let request = HttpRequest::new(Method::Get, format!("{}/{session_id}", self.base_url));
        let response = self.send_with_retry(request).await?;
        self.list_or_empty(response)
    }

    /// Best-effort session teardown.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let request = HttpRequest::new(Method::Delete, format!("{}/{session_id}", self.base_url));
        let response = self.send_with_retry(request).await?;
        self.expect_success(&response, "end session")?;
        Ok(())
    }

    /// Commit the participant list and mark the session started.
    pub async fn start_session(&self, session_id: &str, parties: &[String]) -> Result<()> {
        let request = HttpRequest::new(
            Method::Post,
            format!("{}/start/{session_id}", self.base_url),
        )
        .json(&parties)?;
        let response = self.send_with_retry(request).await?;
        self.expect_live(&response, "start session")?;
        Ok(())
    }

    pub async fn started_parties(&self, session_id: &str) -> Result<Vec<String>> {
        let request = HttpRequest::new(
            Method::Get,
            format!("{}/start/{session_id}", self.base_url),
        );
        let response = self.send_with_retry(request).await?;
        self.list_or_empty(response)
    }

    /// Signal that this party finished keygen.
    pub async fn mark_complete(&self, session_id: &str, party_id: &str) -> Result<()> {
        let request = HttpRequest::new(
            Method::Post,
            format!("{}/complete/{session_id}", self.base_url),
        )
        .json(&vec![party_id])?;
        let response = self.send_with_retry(request).await?;
        self.expect_live(&response, "mark complete")?;
        Ok(())
    }

    pub async fn completed_parties(&self, session_id: &str) -> Result<Vec<String>> {
        let request = HttpRequest::new(
            Method::Get,
            format!("{}/complete/{session_id}", self.base_url),
        );
        let response = self.send_with_retry(request).await?;
        self.list_or_empty(response)
    }

    pub async fn post_message(&self, message: &RelayMessage) -> Result<()> {
        let request = HttpRequest::new(
            Method::Post,
            format!("{}/message/{}", self.base_url, message.session_id),
        )
        .json(message)?;
        let response = self.send_with_retry(request).await?;
        self.expect_live(&response, "post message")?;
        Ok(())
    }

    /// Drain messages addressed to `party_id`, in sequence order.
    /// Consumers must [ack](Self::ack_message) each one after use.
    pub async fn fetch_messages(
        &self,
        session_id: &str,
        party_id: &str,
    ) -> Result<Vec<RelayMessage>> {
        let request = HttpRequest::new(
            Method::Get,
            format!("{}/message/{session_id}/{party_id}", self.base_url),
        );
        let response = self.send_with_retry(request).await?;
        if response.status == 404 {
            return Ok(Vec::new());
        }
        self.expect_success(&response, "fetch messages")?;
        let mut messages: Vec<RelayMessage> = response.json()?;
        messages.sort_by_key(|m| m.sequence_no);
        Ok(messages)
    }

    pub async fn ack_message(&self, session_id: &str, party_id: &str, hash: &str) -> Result<()> {
        let request = HttpRequest::new(
            Method::Delete,
            format!("{}/message/{session_id}/{party_id}/{hash}", self.base_url),
        );
        let response = self.send_with_retry(request).await?;
        self.expect_live(&response, "ack message")?;
        Ok(())
    }

    /// Single-slot shared setup blob, raw bytes.
    pub async fn upload_setup_message(&self, session_id: &str, payload: &[u8]) -> Result<()> {
        let request = HttpRequest::new(
            Method::Post,
            format!("{}/setup-message/{session_id}", self.base_url),
        )
        .bytes(payload.to_vec());
        let response = self.send_with_retry(request).await?;
        self.expect_live(&response, "upload setup message")?;
        Ok(())
    }

    pub async fn setup_message(&self, session_id: &str) -> Result<Vec<u8>> {
        let request = HttpRequest::new(
            Method::Get,
            format!("{}/setup-message/{session_id}", self.base_url),
        );
        let response = self.send_with_retry(request).await?;
        if response.status == 404 {
            return Err(Error::SessionExpired);
        }
        self.expect_success(&response, "setup message")?;
        Ok(response.body)
    }

    pub async fn ping(&self) -> Result<()> {
        let request = HttpRequest::new(Method::Get, format!("{}/ping", self.base_url));
        let response = self.send_with_retry(request).await?;
        self.expect_success(&response, "ping")?;
        Ok(())
    }

    /// Exponential backoff with jitter on network errors and 5xx; 4xx
    /// fails immediately.
    async fn send_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.transport.execute(request.clone()).await;
            match outcome {
                Ok(response) if response.status >= 500 && attempt < RETRY_MAX_ATTEMPTS => {
                    warn!(url = %request.url, status = response.status, attempt, "relay 5xx, retrying");
                }
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < RETRY_MAX_ATTEMPTS => {
                    warn!(url = %request.url, error = %err, attempt, "relay transport error, retrying");
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }

    fn list_or_empty(&self, response: HttpResponse) -> Result<Vec<String>> {
        if response.status == 404 {
            return Ok(Vec::new());
        }
        self.expect_success(&response, "list")?;
        if response.body.is_empty() {
            return Ok(Vec::new());
        }
        response.json()
    }

    fn expect_success(&self, response: &HttpResponse, action: &str) -> Result<()> {
        if response.is_success() {
            debug!(action, status = response.status, "relay ok");
            return Ok(());
        }
        if response.status >= 500 {
            return Err(Error::RelayTransport(format!(
                "{action}: status {}",
                response.status
            )));
        }
        Err(Error::ServerRefused(format!(
            "{action}: status {}",
            response.status
        )))
    }

    /// Like `expect_success`, but a 404 means the session has already
    /// been reaped by the relay.
    fn expect_live(&self, response: &HttpResponse, action: &str) -> Result<()> {
        if response.status == 404 {
            return Err(Error::SessionExpired);
        }
        self.expect_success(response, action)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = RETRY_BASE_DELAY.saturating_mul(1 << attempt.saturating_sub(1).min(8));
    let capped = exp.min(RETRY_MAX_DELAY);
    let jitter = rand::thread_rng().gen_range(0..=50);
    capped + Duration::from_millis(jitter)
}
