//! Fast-Vault server client.
//!
//! The server holds one share of every 2-of-2 fast vault and joins MPC
//! sessions as a regular peer once asked to create or sign.

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use vaultic_core::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct FastVaultCreateRequest {
    pub name: String,
    pub session_id: String,
    pub hex_encryption_key: String,
    pub hex_chain_code: String,
    pub local_party_id: String,
    pub encryption_password: String,
    pub email: String,
    pub lib_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FastSignRequest {
    pub public_key: String,
    pub messages: Vec<String>,
    pub session: String,
    pub hex_encryption_key: String,
    pub derive_path: String,
    pub is_ecdsa: bool,
    pub vault_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FastResendRequest {
    pub public_key_ecdsa: String,
    pub password: String,
    pub email: String,
}

/// Minimal metadata the server is willing to reveal about a hosted
/// vault share.
#[derive(Debug, Clone, Deserialize)]
pub struct FastVaultMetadata {
    pub name: String,
    pub public_key_ecdsa: String,
    #[serde(default)]
    pub public_key_eddsa: String,
    #[serde(default)]
    pub hex_chain_code: String,
    #[serde(default)]
    pub local_party_id: String,
}

#[derive(Clone)]
pub struct FastVaultClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl FastVaultClient {
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

    /// Ask the server to generate its share and join the keygen session.
    pub async fn create(&self, request: &FastVaultCreateRequest) -> Result<()> {
        let http = HttpRequest::new(Method::Post, format!("{}/vault/create", self.base_url))
            .json(request)?;
        let response = self.transport.execute(http).await?;
        self.expect_success(&response, "create vault")?;
        debug!(session_id = %request.session_id, "fast-vault create accepted");
        Ok(())
    }

    /// Ask the server to co-sign. Returns the session id the server will
    /// join. The body is a JSON string; surrounding quotes are part of
    /// the wire quirk and are stripped here.
    pub async fn sign(&self, request: &FastSignRequest) -> Result<String> {
        let http = HttpRequest::new(Method::Post, format!("{}/vault/sign", self.base_url))
            .json(request)?;
        let response = self.transport.execute(http).await?;
        self.expect_success(&response, "sign")?;
        let session = response.text();
        Ok(session.trim().trim_matches('"').to_string())
    }

    /// Check an email verification code. 200 means valid, anything else
    /// does not.
    pub async fn verify(&self, public_key_ecdsa: &str, code: &str) -> Result<bool> {
        let http = HttpRequest::new(
            Method::Get,
            format!("{}/vault/verify/{public_key_ecdsa}/{code}", self.base_url),
        );
        let response = self.transport.execute(http).await?;
        Ok(response.is_success())
    }

    /// Re-send the verification email. Server-side rate limit is about
    /// one per 3 minutes.
    pub async fn resend(&self, request: &FastResendRequest) -> Result<()> {
        let http = HttpRequest::new(Method::Post, format!("{}/vault/resend", self.base_url))
            .json(request)?;
        let response = self.transport.execute(http).await?;
        self.expect_success(&response, "resend")?;
        Ok(())
    }

    /// Fetch hosted-share metadata; the password travels in the
    /// `x-password` header.
    pub async fn get(&self, public_key_ecdsa: &str, password: &str) -> Result<FastVaultMetadata> {
        let http = HttpRequest::new(
            Method::Get,
            format!("{}/vault/get/{public_key_ecdsa}", self.base_url),
        )
        .header("x-password", password);
        let response = self.transport.execute(http).await?;
        if response.status == 404 {
            return Err(Error::VaultNotFound(public_key_ecdsa.to_string()));
        }
        self.expect_success(&response, "get vault")?;
        response
            .json()
            .map_err(|_| Error::CorruptedData("fast-vault metadata".into()))
    }

    fn expect_success(&self, response: &HttpResponse, action: &str) -> Result<()> {
        if response.is_success() {
            return Ok(());
        }
        if response.status >= 500 {
            return Err(Error::RelayTransport(format!(
                "fast-vault {action}: status {}",
                response.status
            )));
        }
        Err(Error::ServerRefused(format!(
            "fast-vault {action}: status {}",
            response.status
        )))
    }
}
