//! Authenticated encryption for secured unicast command frames.
//!
//! `spec.md` treats the actual wire encryption of HELLOACK/ACK as the Frame
//! Gateway's concern ("decrypt/verify unicast frames with a given key") and
//! treats the underlying block cipher as an external primitive. This module
//! is the thin AEAD wrapper `apkes-core`'s `FrameGateway` implementations
//! build on: AES-128-GCM keyed by either the long-term secret (HELLOACK,
//! which must be openable before the receiver can derive the pairwise key -
//! see `DESIGN.md`) or the freshly derived pairwise key (ACK).

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Nonce};
use zeroize::Zeroizing;

use crate::CryptoError;

/// Nonce length for AES-128-GCM.
pub const NONCE_LEN: usize = 12;

/// Seal `plaintext` under `key`, returning `nonce || ciphertext || tag`.
///
/// A fresh random nonce is generated per call and prepended to the output
/// so `open` can recover it; this is the standard construction used when a
/// key may plausibly be reused across more than one message.
pub fn seal(key: &[u8; 16], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let key = Zeroizing::new(*key);
    let cipher = Aes128Gcm::new_from_slice(key.as_ref()).expect("AES-128 key is exactly 16 bytes");
    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
    let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + 16);
    out.extend_from_slice(&nonce);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            aes_gcm::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .expect("encryption with a valid 12-byte nonce cannot fail");
    out.extend_from_slice(&ciphertext);
    out
}

/// Open a buffer produced by [`seal`] under `key`, verifying `aad`.
///
/// Returns `Err(CryptoError::DecryptionFailed)` for too-short input or an
/// authentication failure - the two are deliberately not distinguished so
/// callers cannot use timing/error shape to probe frame structure.
pub fn open(key: &[u8; 16], aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let key = Zeroizing::new(*key);
    let cipher = Aes128Gcm::new_from_slice(key.as_ref()).expect("AES-128 key is exactly 16 bytes");
    cipher
        .decrypt(nonce, aes_gcm::aead::Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}
