//! Vaultic MPC: relay messaging, keygen/keysign coordination and the
//! signing orchestrator, behind the [`sdk::Sdk`] facade.
//!
//! The threshold cryptography itself (DKLS, Schnorr) is an injected
//! [`tss::TssEngine`]; this crate owns everything around it: sessions,
//! peer discovery, round sequencing, retries, cancellation, and the
//! fast-vault server handshake.

pub mod cancel;
pub mod chain;
pub mod fast_vault;
pub mod keygen;
pub mod keysign;
pub mod poll;
pub mod relay;
pub mod sdk;
pub mod session;
pub mod signing;
pub mod transport;
pub mod tss;

pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use sdk::{Sdk, SdkConfig};
pub use signing::{SignOptions, Signature, SignatureFormat, SigningMode, SigningPayload};
