//! # APKES Core
//!
//! Core protocol implementation of the Adaptable Pairwise Key Establishment
//! Scheme (APKES): a link-layer security bootstrap for resource-constrained
//! wireless nodes.
//!
//! APKES authenticates one-hop neighbors and derives a pairwise symmetric
//! key with each of them via a three-message handshake:
//!
//! ```text
//! Initiator                          Responder
//!    |-------------- HELLO -------------->|   (broadcast, unauthenticated)
//!    |<------------ HELLOACK -------------|   (unicast, secured)
//!    |--------------- ACK --------------->|   (unicast, secured)
//! ```
//!
//! This crate provides:
//! - [`engine`]: the handshake state machine and bootstrap driver
//! - [`neighbor`]: the fixed-capacity neighbor table
//! - [`secret_provider`]: pluggable long-term shared secret lookup
//! - [`frame`]: command frame wire format and the frame gateway abstraction
//! - [`flash`]: append-only keying-material persistence
//! - [`config`]: tunable protocol parameters
//! - [`identity`]: node address types
//! - [`replay`]: per-neighbor anti-replay window
//! - [`error`]: the drop-reason / propagated-error split
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use apkes_core::config::ApkesConfig;
//! use apkes_core::engine::Engine;
//! use apkes_core::flash::InMemoryFlashStore;
//! use apkes_core::frame::LoopbackNetwork;
//! use apkes_core::identity::ExtAddr;
//! use apkes_core::secret_provider::PlainSecretProvider;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let network = LoopbackNetwork::new();
//! let own_addr = ExtAddr::new([1; 8]);
//! let gateway = network.join(own_addr);
//!
//! let engine = Engine::new(
//!     own_addr,
//!     ApkesConfig::default(),
//!     Box::new(gateway),
//!     Box::new(PlainSecretProvider::new([0x42; 16])),
//!     Box::new(InMemoryFlashStore::new(4096)),
//! )
//! .expect("valid configuration");
//!
//! tokio::task::LocalSet::new()
//!     .run_until(engine.run_bootstrap(|_engine| {}))
//!     .await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod flash;
pub mod frame;
pub mod identity;
pub mod neighbor;
pub mod replay;
pub mod secret_provider;

pub use config::ApkesConfig;
pub use engine::Engine;
pub use error::{ApkesError, DropReason, DropResult};
pub use identity::{ExtAddr, ShortAddr};
pub use neighbor::{NeighborHandle, NeighborStatus};

/// Length in bytes of a handshake challenge.
pub const CHALLENGE_LEN: usize = apkes_crypto::CHALLENGE_LEN;

/// Length in bytes of the pairwise key and long-term shared secret.
pub const KEY_LEN: usize = apkes_crypto::KEY_LEN;
