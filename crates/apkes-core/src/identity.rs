//! Address types identifying nodes on the radio network.
//!
//! IEEE 802.15.4 networks address nodes two ways: a globally unique 8-byte
//! extended address burned into the radio, and a short 2-byte address
//! assigned after association. APKES authenticates neighbors by extended
//! address (the short address is not trusted until a key exists) but still
//! carries the short address once known, since the frame gateway addresses
//! outgoing unicasts by whichever the link layer prefers.

use std::fmt;

/// An 8-byte extended (long) hardware address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtAddr(pub [u8; 8]);

impl ExtAddr {
    /// Construct from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Borrow the underlying bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Derive a short address from the low 16 bits of this extended
    /// address, for use where no link-layer-assigned short address exists
    /// yet (APKES itself does no association; see the HELLOACK/ACK
    /// trailer in `spec.md` §4.1.3/§6).
    #[must_use]
    pub fn derived_short_addr(&self) -> ShortAddr {
        ShortAddr(u16::from_be_bytes([self.0[6], self.0[7]]))
    }
}

impl fmt::Debug for ExtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtAddr({})", hex::encode(self.0))
    }
}

impl fmt::Display for ExtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 2-byte short address assigned after association.
///
/// `0xFFFF` conventionally means "unassigned" at the link layer, but APKES
/// treats that as an ordinary value; callers decide what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortAddr(pub u16);

impl ShortAddr {
    /// The broadcast short address.
    pub const BROADCAST: ShortAddr = ShortAddr(0xFFFF);
}

impl fmt::Display for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_addr_debug_is_hex() {
        let addr = ExtAddr([0xAA; 8]);
        assert_eq!(format!("{addr:?}"), "ExtAddr(aaaaaaaaaaaaaaaa)");
    }

    #[test]
    fn short_addr_broadcast() {
        assert_eq!(ShortAddr::BROADCAST.0, 0xFFFF);
    }

    #[test]
    fn derived_short_addr_uses_low_two_bytes() {
        let addr = ExtAddr([0, 0, 0, 0, 0, 0, 0x12, 0x34]);
        assert_eq!(addr.derived_short_addr(), ShortAddr(0x1234));
    }
}
