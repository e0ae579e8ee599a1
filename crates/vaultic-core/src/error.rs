use thiserror::Error;

/// Error surface shared by every Vaultic component.
///
/// One flat enum rather than per-module error types: callers at the SDK
/// facade match on the kind, and the kind plus a short human message is
/// all that may cross the API boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("password required for encrypted vault")]
    PasswordRequired,

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage quota exceeded")]
    StorageQuotaExceeded,

    #[error("vault not found: {0}")]
    VaultNotFound(String),

    #[error("key share missing for {0}")]
    KeyShareMissing(String),

    #[error("session expired")]
    SessionExpired,

    #[error("timed out waiting for peers")]
    PeerTimeout,

    #[error("relay transport error: {0}")]
    RelayTransport(String),

    #[error("server refused request: {0}")]
    ServerRefused(String),

    #[error("keygen failed: {0}")]
    KeygenFailed(String),

    #[error("keysign failed: {0}")]
    KeysignFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures worth retrying at the transport layer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RelayTransport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptedData(format!("json: {err}"))
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::CorruptedData(format!("protobuf: {err}"))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::CorruptedData(format!("base64: {err}"))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::CorruptedData(format!("hex: {err}"))
    }
}
