//! Pluggable long-term shared secret lookup.
//!
//! `spec.md` §4.2 specifies two asymmetric lookups because the two sides of
//! a handshake know different things at the point they need the secret: the
//! HELLOACK receiver already knows the peer's extended address from the
//! HELLO it sent, while the HELLO receiver only learns the sender's address
//! from the frame it just parsed. Keeping them as separate trait methods
//! (rather than one symmetric `get_secret(ExtAddr)`) lets a provider that
//! derives secrets from frame content - not just identity - implement the
//! two directions differently.

use crate::identity::ExtAddr;

/// Source of the long-term pairwise shared secret between this node and a
/// peer.
pub trait SecretProvider {
    /// Collaborator-defined setup hook, run once before the provider is
    /// handed to an [`Engine`](crate::engine::Engine). A no-op by default;
    /// present for parity with providers that need to load keying material
    /// from elsewhere before the first lookup.
    fn init(&mut self) {}

    /// Look up the secret to use when this node is processing a HELLO
    /// (i.e. it will be replying with a HELLOACK).
    fn get_secret_with_hello_sender(&self, sender: &ExtAddr) -> Option<[u8; 16]>;

    /// Look up the secret to use when this node is processing a HELLOACK
    /// (i.e. it already sent the HELLO and is verifying the reply).
    fn get_secret_with_helloack_sender(&self, sender: &ExtAddr) -> Option<[u8; 16]>;
}

/// A single network-wide secret shared by every node, per `spec.md` §4.2's
/// "plain" variant.
#[derive(Clone)]
pub struct PlainSecretProvider {
    secret: [u8; 16],
}

impl PlainSecretProvider {
    /// Wrap a fixed, pre-shared network secret.
    #[must_use]
    pub fn new(secret: [u8; 16]) -> Self {
        Self { secret }
    }
}

impl SecretProvider for PlainSecretProvider {
    fn get_secret_with_hello_sender(&self, _sender: &ExtAddr) -> Option<[u8; 16]> {
        Some(self.secret)
    }

    fn get_secret_with_helloack_sender(&self, _sender: &ExtAddr) -> Option<[u8; 16]> {
        Some(self.secret)
    }
}

/// Per-peer pre-shared secrets, per `spec.md` §4.2's "pairing" variant.
///
/// Nodes not present in the pairing list have no secret and cannot complete
/// a handshake; this is the provider a deployment with pre-distributed
/// pairwise keys (rather than one network-wide key) uses.
#[derive(Clone, Default)]
pub struct PairingSecretProvider {
    secrets: std::collections::HashMap<ExtAddr, [u8; 16]>,
}

impl PairingSecretProvider {
    /// An empty pairing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pre-shared secret for `peer`.
    pub fn insert(&mut self, peer: ExtAddr, secret: [u8; 16]) {
        self.secrets.insert(peer, secret);
    }
}

impl SecretProvider for PairingSecretProvider {
    fn get_secret_with_hello_sender(&self, sender: &ExtAddr) -> Option<[u8; 16]> {
        self.secrets.get(sender).copied()
    }

    fn get_secret_with_helloack_sender(&self, sender: &ExtAddr) -> Option<[u8; 16]> {
        self.secrets.get(sender).copied()
    }
}
