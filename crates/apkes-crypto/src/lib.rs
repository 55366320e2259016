//! # APKES Crypto
//!
//! Cryptographic primitives for the Adaptable Pairwise Key Establishment
//! Scheme (APKES).
//!
//! This crate provides:
//! - AES-128 pairwise-key derivation (single-block encryption of the
//!   challenge pair under the long-term shared secret)
//! - AES-128-GCM authenticated encryption for securing HELLOACK/ACK frames
//! - CSPRNG-backed challenge and scratch-buffer generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Derivation | AES-128 (single block) | 128-bit |
//! | Frame AEAD | AES-128-GCM | 128-bit |
//! | Randomness | OS CSPRNG (`rand_core::OsRng`) | n/a |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod random;

pub use error::CryptoError;
pub use kdf::derive_pairwise_key;

/// Length in bytes of a handshake challenge (`CHALLENGE_LEN`).
pub const CHALLENGE_LEN: usize = 8;

/// Length in bytes of the pairwise key, the shared secret, and the
/// `metadata` scratch buffer used to derive the former from the latter.
pub const KEY_LEN: usize = 16;
