//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG (`rand_core::OsRng`).
//! This is the "CSPRNG primitive" `spec.md` calls an external collaborator:
//! APKES never rolls its own generator, only wraps the OS source in the
//! shapes the handshake needs (8-byte challenges, 16-byte scratch buffers).

use rand_core::{OsRng, RngCore};

/// Fill a buffer with random bytes from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// Generate a fresh 8-byte challenge (`CHALLENGE_LEN`).
pub fn random_challenge() -> [u8; 8] {
    let mut buf = [0u8; 8];
    fill_random(&mut buf);
    buf
}

/// Generate a fresh 16-byte value (used for scratch/metadata buffers).
pub fn random_16() -> [u8; 16] {
    let mut buf = [0u8; 16];
    fill_random(&mut buf);
    buf
}
