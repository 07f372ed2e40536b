//! # push-ece
//!
//! Web Push cryptography for fedipush.
//!
//! This crate provides:
//! - [`keys`]: P-256 key generation and ECDH shared-secret derivation
//! - [`aesgcm`]: the `aesgcm` HTTP Encrypted-Content-Encoding, including
//!   `Crypto-Key` / `Encryption` header parsing
//!
//! Only the `aesgcm` draft encoding is supported; it is what Mastodon-family
//! servers send.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aesgcm;
mod error;
pub mod keys;

pub use aesgcm::{decrypt, encrypt, encrypt_with, EncryptedPayload, EncryptionParams};
pub use error::EceError;
pub use keys::{derive_shared_secret, generate, public_key_of, GeneratedKeys};
