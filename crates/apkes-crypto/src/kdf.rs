//! Pairwise-key derivation.
//!
//! APKES binds a derived key to both peers' challenges and the long-term
//! shared secret by running one AES-128 block encryption over a 16-byte
//! scratch buffer (`metadata = peer_challenge || own_challenge`) keyed by
//! the secret. The ciphertext *is* the pairwise key. Since the input is
//! exactly one 16-byte block this is a single-block ECB encryption - no
//! padding, mode, or IV is needed, matching the hardware AES primitive a
//! constrained radio (e.g. a CC2420) exposes.

use aes::Aes128;
use cipher::{BlockEncrypt, KeyInit};
use generic_array::GenericArray;
use zeroize::Zeroizing;

/// Encrypt `metadata` in place under `secret`, yielding the pairwise key.
///
/// `metadata` is expected to already hold `peer_challenge || own_challenge`
/// (see `spec.md` §4.1.4). The buffer is overwritten with the derived key.
pub fn derive_pairwise_key(secret: &[u8; 16], metadata: &mut [u8; 16]) {
    let secret = Zeroizing::new(*secret);
    let cipher = Aes128::new_from_slice(secret.as_ref()).expect("AES-128 key is exactly 16 bytes");
    let block = GenericArray::from_mut_slice(metadata);
    cipher.encrypt_block(block);
}
