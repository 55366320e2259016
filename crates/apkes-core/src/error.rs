//! Error types for the APKES handshake engine.
//!
//! Two error families, per `spec.md` §7:
//!
//! - [`DropReason`] covers protocol-level rejections (resource exhaustion,
//!   authentication failure, protocol-state violation, replay, unknown
//!   command id). These are never surfaced to the caller of
//!   [`crate::engine::Engine::on_command_frame`] - the spec requires silent
//!   drops - but are used internally to drive a single `tracing` event per
//!   drop and are returned directly from unit-tested handler functions so
//!   tests can assert *why* a frame was rejected.
//! - [`ApkesError`] covers genuine construction/usage mistakes (invalid
//!   configuration, flash region overflow) that *do* propagate to the
//!   caller.

use thiserror::Error;

/// Why a command frame or handler step was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    /// No wait-timer slot available (`MAX_TENTATIVE_NEIGHBORS` exhausted).
    #[error("wait-timer pool exhausted")]
    WaitTimerPoolFull,

    /// Neighbor table has no free entry.
    #[error("neighbor table full")]
    NeighborTableFull,

    /// HELLO received from a peer that already has an entry.
    #[error("HELLO from already-known peer")]
    AlreadyKnownPeer,

    /// The secret provider returned no secret for this peer.
    #[error("no shared secret available")]
    NoSecret,

    /// Decrypt-and-verify of a secured unicast frame failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// HELLOACK challenge did not match the most recent outgoing challenge.
    #[error("challenge mismatch")]
    ChallengeMismatch,

    /// Frame arrived while the neighbor was in a state that does not accept it.
    #[error("protocol-state violation")]
    ProtocolStateViolation,

    /// Anti-replay window rejected the frame as a replay.
    #[error("replayed frame")]
    Replayed,

    /// Payload was too short to contain the fields the command requires.
    #[error("payload too short")]
    PayloadTooShort,

    /// Command identifier not recognized.
    #[error("unknown command id: 0x{0:02X}")]
    UnknownCommand(u8),
}

/// Errors that propagate to callers of `apkes-core` constructors and
/// configuration builders.
#[derive(Debug, Error)]
pub enum ApkesError {
    /// `ApkesConfig::validate` rejected the configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The flash keying-material store's fixed region overflowed.
    #[error("flash region overflow: offset {offset} + len {len} > capacity {capacity}")]
    FlashOverflow {
        /// Offset the write/read started at.
        offset: usize,
        /// Length requested.
        len: usize,
        /// Total region capacity.
        capacity: usize,
    },
}

/// Result alias for handler functions that drop frames via [`DropReason`].
pub type DropResult<T> = Result<T, DropReason>;
