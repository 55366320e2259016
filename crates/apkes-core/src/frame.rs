//! Command frame encoding/decoding and the link-layer gateway abstraction.
//!
//! `spec.md` §4.4 treats actual radio transmission as an external
//! collaborator ("Frame Gateway: send/receive raw link-layer frames") and
//! gives the three command frames a wire format of one command-id byte
//! followed by a command-specific payload. This module owns that wire
//! format and the [`FrameGateway`] trait; [`LoopbackGateway`] is the
//! in-memory reference implementation used by tests and the demo binary.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::DropReason;
use crate::identity::{ExtAddr, ShortAddr};

/// Length in bytes of the broadcast (EBEAP) key carried in HELLOACK/ACK
/// trailers when `ApkesConfig::ebeap_with_encryption` is enabled.
pub const NEIGHBOR_BROADCAST_KEY_LEN: usize = 16;

/// Command identifier occupying the first byte of every APKES frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    /// Unauthenticated broadcast announcing a fresh challenge.
    Hello = 0x0A,
    /// Secured unicast reply carrying the responder's challenge.
    HelloAck = 0x0B,
    /// Secured unicast confirmation completing the handshake.
    Ack = 0x0C,
}

impl TryFrom<u8> for CommandId {
    type Error = DropReason;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0A => Ok(Self::Hello),
            0x0B => Ok(Self::HelloAck),
            0x0C => Ok(Self::Ack),
            other => Err(DropReason::UnknownCommand(other)),
        }
    }
}

/// Trailer appended to HELLOACK, selected by
/// `ApkesConfig::ebeap_with_encryption` (§4.1.3/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeTrailer {
    /// Broadcast (EBEAP) key bytes, carried when broadcast encryption is
    /// enabled.
    BroadcastKey([u8; NEIGHBOR_BROADCAST_KEY_LEN]),
    /// Sender's short address, carried when broadcast encryption is
    /// disabled.
    ShortAddr(ShortAddr),
}

impl HandshakeTrailer {
    fn encode(self, out: &mut Vec<u8>) {
        match self {
            Self::BroadcastKey(key) => {
                out.push(0x01);
                out.extend_from_slice(&key);
            }
            Self::ShortAddr(addr) => {
                out.push(0x00);
                out.extend_from_slice(&addr.0.to_be_bytes());
            }
        }
    }

    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), DropReason> {
        let (&tag, rest) = buf.split_first().ok_or(DropReason::PayloadTooShort)?;
        match tag {
            0x00 => {
                if rest.len() < 2 {
                    return Err(DropReason::PayloadTooShort);
                }
                let (addr_bytes, rest) = rest.split_at(2);
                let addr = ShortAddr(u16::from_be_bytes(
                    addr_bytes.try_into().expect("split_at(2) yields 2 bytes"),
                ));
                Ok((Self::ShortAddr(addr), rest))
            }
            0x01 => {
                if rest.len() < NEIGHBOR_BROADCAST_KEY_LEN {
                    return Err(DropReason::PayloadTooShort);
                }
                let (key_bytes, rest) = rest.split_at(NEIGHBOR_BROADCAST_KEY_LEN);
                let key: [u8; NEIGHBOR_BROADCAST_KEY_LEN] =
                    key_bytes.try_into().expect("checked length above");
                Ok((Self::BroadcastKey(key), rest))
            }
            _ => Err(DropReason::PayloadTooShort),
        }
    }
}

/// A parsed or to-be-sent command frame.
#[derive(Debug, Clone)]
pub enum CommandFrame {
    /// `HELLO`: broadcaster's fresh challenge, unauthenticated.
    Hello {
        /// Sender's extended address.
        sender: ExtAddr,
        /// Fresh challenge for this bootstrap round.
        challenge: [u8; 8],
    },
    /// `HELLOACK`: secured reply carrying the responder's challenge and an
    /// echo of the sender's challenge, sealed under the long-term secret.
    HelloAck {
        /// Sender's extended address.
        sender: ExtAddr,
        /// Sender's index for this neighbor entry, so the peer may tag
        /// future frames cheaply.
        local_index: u8,
        /// Broadcast key or short address, per `EBEAP_WITH_ENCRYPTION`.
        trailer: HandshakeTrailer,
        /// Opaque sealed payload (nonce || ciphertext || tag).
        sealed: Vec<u8>,
    },
    /// `ACK`: secured confirmation sealed under the freshly derived
    /// pairwise key.
    Ack {
        /// Sender's extended address.
        sender: ExtAddr,
        /// Sender's index for this neighbor entry.
        local_index: u8,
        /// Broadcast key, present only when broadcast encryption is
        /// enabled.
        broadcast_key: Option<[u8; NEIGHBOR_BROADCAST_KEY_LEN]>,
        /// Opaque sealed payload (nonce || ciphertext || tag).
        sealed: Vec<u8>,
    },
}

impl CommandFrame {
    /// Extended address of whoever sent this frame.
    #[must_use]
    pub fn sender(&self) -> ExtAddr {
        match self {
            Self::Hello { sender, .. }
            | Self::HelloAck { sender, .. }
            | Self::Ack { sender, .. } => *sender,
        }
    }

    /// Serialize to the wire format: one command-id byte, then the
    /// sender's 8-byte extended address, then the command body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Hello { sender, challenge } => {
                out.push(CommandId::Hello as u8);
                out.extend_from_slice(sender.as_bytes());
                out.extend_from_slice(challenge);
            }
            Self::HelloAck {
                sender,
                local_index,
                trailer,
                sealed,
            } => {
                out.push(CommandId::HelloAck as u8);
                out.extend_from_slice(sender.as_bytes());
                out.push(*local_index);
                trailer.encode(&mut out);
                out.extend_from_slice(sealed);
            }
            Self::Ack {
                sender,
                local_index,
                broadcast_key,
                sealed,
            } => {
                out.push(CommandId::Ack as u8);
                out.extend_from_slice(sender.as_bytes());
                out.push(*local_index);
                match broadcast_key {
                    Some(key) => {
                        out.push(0x01);
                        out.extend_from_slice(key);
                    }
                    None => out.push(0x00),
                }
                out.extend_from_slice(sealed);
            }
        }
        out
    }

    /// Parse a frame off the wire.
    ///
    /// # Errors
    ///
    /// Returns [`DropReason::PayloadTooShort`] if the buffer is too short
    /// to contain the command-specific fields, or
    /// [`DropReason::UnknownCommand`] if the command-id byte is not
    /// recognized.
    pub fn decode(buf: &[u8]) -> Result<Self, DropReason> {
        let (&command_id, rest) = buf.split_first().ok_or(DropReason::PayloadTooShort)?;
        let command = CommandId::try_from(command_id)?;

        if rest.len() < 8 {
            return Err(DropReason::PayloadTooShort);
        }
        let (sender_bytes, body) = rest.split_at(8);
        let sender = ExtAddr(sender_bytes.try_into().expect("split_at(8) yields 8 bytes"));

        match command {
            CommandId::Hello => {
                let challenge: [u8; 8] = body
                    .try_into()
                    .map_err(|_| DropReason::PayloadTooShort)?;
                Ok(Self::Hello { sender, challenge })
            }
            CommandId::HelloAck => {
                let (&local_index, rest) =
                    body.split_first().ok_or(DropReason::PayloadTooShort)?;
                let (trailer, rest) = HandshakeTrailer::decode(rest)?;
                Ok(Self::HelloAck {
                    sender,
                    local_index,
                    trailer,
                    sealed: rest.to_vec(),
                })
            }
            CommandId::Ack => {
                let (&local_index, rest) =
                    body.split_first().ok_or(DropReason::PayloadTooShort)?;
                let (&marker, rest) = rest.split_first().ok_or(DropReason::PayloadTooShort)?;
                let (broadcast_key, rest) = match marker {
                    0x00 => (None, rest),
                    0x01 => {
                        if rest.len() < NEIGHBOR_BROADCAST_KEY_LEN {
                            return Err(DropReason::PayloadTooShort);
                        }
                        let (key_bytes, rest) = rest.split_at(NEIGHBOR_BROADCAST_KEY_LEN);
                        (
                            Some(key_bytes.try_into().expect("checked length above")),
                            rest,
                        )
                    }
                    _ => return Err(DropReason::PayloadTooShort),
                };
                Ok(Self::Ack {
                    sender,
                    local_index,
                    broadcast_key,
                    sealed: rest.to_vec(),
                })
            }
        }
    }
}

/// Destination of an outgoing command frame.
#[derive(Debug, Clone, Copy)]
pub enum Destination {
    /// Sent to every neighbor that can hear it.
    Broadcast,
    /// Sent to a single, already-identified peer.
    Unicast(ExtAddr),
}

/// External collaborator responsible for link-layer framing and
/// transmission.
///
/// `spec.md` scopes actual radio I/O out of the handshake engine; this
/// trait is the seam the engine calls through. [`LoopbackGateway`] is the
/// in-memory reference implementation used for tests and the demo.
pub trait FrameGateway {
    /// Transmit `frame` to `destination`.
    fn send(&self, destination: Destination, frame: CommandFrame);

    /// Drain all frames received since the last call.
    fn receive(&self) -> Vec<CommandFrame>;
}

/// In-memory loopback [`FrameGateway`] sharing a queue with its peers.
///
/// Every gateway created from the same [`LoopbackNetwork`] delivers
/// broadcasts to all other members and unicasts only to the named
/// recipient, modeling a single-hop radio neighborhood without any actual
/// I/O.
#[derive(Clone)]
pub struct LoopbackGateway {
    own_addr: ExtAddr,
    network: Rc<RefCell<LoopbackNetworkState>>,
}

struct LoopbackNetworkState {
    inboxes: std::collections::HashMap<ExtAddr, VecDeque<CommandFrame>>,
}

/// A shared in-memory radio neighborhood for [`LoopbackGateway`]s.
#[derive(Clone)]
pub struct LoopbackNetwork {
    state: Rc<RefCell<LoopbackNetworkState>>,
}

impl LoopbackNetwork {
    /// Create an empty network with no members.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopbackNetworkState {
                inboxes: std::collections::HashMap::new(),
            })),
        }
    }

    /// Join the network as `addr`, returning its gateway handle.
    pub fn join(&self, addr: ExtAddr) -> LoopbackGateway {
        self.state.borrow_mut().inboxes.entry(addr).or_default();
        LoopbackGateway {
            own_addr: addr,
            network: Rc::clone(&self.state),
        }
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGateway for LoopbackGateway {
    fn send(&self, destination: Destination, frame: CommandFrame) {
        let mut state = self.network.borrow_mut();
        match destination {
            Destination::Broadcast => {
                for (addr, inbox) in state.inboxes.iter_mut() {
                    if *addr != self.own_addr {
                        inbox.push_back(frame.clone());
                    }
                }
            }
            Destination::Unicast(peer) => {
                if let Some(inbox) = state.inboxes.get_mut(&peer) {
                    inbox.push_back(frame);
                }
            }
        }
    }

    fn receive(&self) -> Vec<CommandFrame> {
        let mut state = self.network.borrow_mut();
        match state.inboxes.get_mut(&self.own_addr) {
            Some(inbox) => inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
