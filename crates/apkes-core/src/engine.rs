//! The handshake engine: bootstrap driver and HELLO/HELLOACK/ACK state machine.
//!
//! Grounded on the teacher's `Node` (`node::node::Node`), which wraps shared
//! state in `Arc<NodeInner>` and hands out cheap clones whose methods
//! `tokio::spawn` background work against the same inner state. APKES has no
//! cross-task sharing requirement - `spec.md` §5 is explicit that the engine
//! runs as a single cooperative task - so the inner state sits behind `Rc`
//! and `RefCell` instead of `Arc` and `Mutex`/`RwLock`, and background work
//! is scheduled with `tokio::task::spawn_local` onto the caller's
//! `LocalSet` rather than `tokio::spawn`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand_core::{OsRng, RngCore};
use tracing::{debug, trace, warn};

use apkes_crypto::{aead, derive_pairwise_key, random};

use crate::config::ApkesConfig;
use crate::error::{ApkesError, DropReason, DropResult};
use crate::flash::FlashKeyStore;
use crate::frame::{CommandFrame, Destination, FrameGateway, HandshakeTrailer};
use crate::identity::ExtAddr;
use crate::neighbor::{NeighborHandle, NeighborStatus, NeighborTable};
use crate::secret_provider::SecretProvider;

struct WaitTimerPool {
    capacity: usize,
    in_use: usize,
}

impl WaitTimerPool {
    fn new(capacity: usize) -> Self {
        Self { capacity, in_use: 0 }
    }

    fn try_acquire(&mut self) -> bool {
        if self.in_use < self.capacity {
            self.in_use += 1;
            true
        } else {
            false
        }
    }

    fn release(&mut self) {
        self.in_use = self.in_use.saturating_sub(1);
    }
}

struct EngineInner {
    own_addr: ExtAddr,
    config: ApkesConfig,
    gateway: Box<dyn FrameGateway>,
    secrets: Box<dyn SecretProvider>,
    flash: RefCell<Box<dyn FlashKeyStore>>,
    neighbors: RefCell<NeighborTable>,
    wait_timers: RefCell<WaitTimerPool>,
    current_challenge: RefCell<Option<[u8; 8]>>,
    bootstrapped: RefCell<bool>,
}

/// A running APKES handshake engine for one node.
///
/// Cheaply cloneable; every clone shares the same inner state via `Rc`.
/// Clones are handed into `tokio::task::spawn_local` closures the way the
/// teacher's `Node` hands `Arc` clones into `tokio::spawn`.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    /// Construct a new engine. Fails if `config` does not validate.
    ///
    /// # Errors
    ///
    /// Returns [`ApkesError::InvalidConfig`] if `config.validate()` fails.
    pub fn new(
        own_addr: ExtAddr,
        config: ApkesConfig,
        gateway: Box<dyn FrameGateway>,
        secrets: Box<dyn SecretProvider>,
        flash: Box<dyn FlashKeyStore>,
    ) -> Result<Self, ApkesError> {
        config.validate()?;
        let max_tentative = config.max_tentative_neighbors;
        let max_neighbors = config.max_neighbors;
        Ok(Self {
            inner: Rc::new(EngineInner {
                own_addr,
                config,
                gateway,
                secrets,
                flash: RefCell::new(flash),
                neighbors: RefCell::new(NeighborTable::new(max_neighbors)),
                wait_timers: RefCell::new(WaitTimerPool::new(max_tentative)),
                current_challenge: RefCell::new(None),
                bootstrapped: RefCell::new(false),
            }),
        })
    }

    /// Whether [`Engine::run_bootstrap`] has run to completion.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        *self.inner.bootstrapped.borrow()
    }

    /// This node's extended address.
    #[must_use]
    pub fn own_addr(&self) -> ExtAddr {
        self.inner.own_addr
    }

    /// The challenge broadcast in the most recent HELLO, if any.
    #[must_use]
    pub fn current_challenge(&self) -> Option<[u8; 8]> {
        *self.inner.current_challenge.borrow()
    }

    /// Lifecycle state of `peer`, if a table entry exists for it.
    #[must_use]
    pub fn neighbor_status(&self, peer: ExtAddr) -> Option<NeighborStatus> {
        let neighbors = self.inner.neighbors.borrow();
        let handle = neighbors.find(&peer)?;
        neighbors.get(handle).map(|entry| entry.status)
    }

    /// Derived pairwise key for `peer`, once the handshake has reached
    /// [`NeighborStatus::Permanent`].
    #[must_use]
    pub fn pairwise_key(&self, peer: ExtAddr) -> Option<[u8; 16]> {
        let neighbors = self.inner.neighbors.borrow();
        let handle = neighbors.find(&peer)?;
        neighbors.get(handle).and_then(|entry| entry.pairwise_key)
    }

    /// Number of entries currently in the neighbor table.
    #[must_use]
    pub fn neighbor_count(&self) -> usize {
        self.inner.neighbors.borrow().len()
    }

    /// Append a peer's extended address and derived key to the flash
    /// keying-material store, so the pairing survives a reboot.
    fn persist_key(&self, peer: ExtAddr, key: [u8; 16]) {
        let mut record = Vec::with_capacity(24);
        record.extend_from_slice(peer.as_bytes());
        record.extend_from_slice(&key);
        if let Err(err) = self.inner.flash.borrow_mut().append(&record) {
            warn!(peer = %peer, %err, "failed to persist pairwise key to flash");
        }
    }

    /// Broadcast a HELLO carrying a fresh challenge, replacing whatever
    /// challenge the previous round used.
    pub fn send_hello(&self) {
        let challenge = random::random_challenge();
        *self.inner.current_challenge.borrow_mut() = Some(challenge);
        trace!(peer = %self.inner.own_addr, "broadcasting HELLO");
        self.inner.gateway.send(
            Destination::Broadcast,
            CommandFrame::Hello {
                sender: self.inner.own_addr,
                challenge,
            },
        );
    }

    /// Run the bootstrap phase: `config.rounds` rounds of broadcasting a
    /// fresh HELLO and draining/dispatching inbound frames for
    /// `config.round_duration`, then invoke `on_complete` exactly once.
    pub async fn run_bootstrap<C>(&self, on_complete: C)
    where
        C: FnOnce(&Engine) + 'static,
    {
        for round in 0..self.inner.config.rounds {
            debug!(round, "starting bootstrap round");
            self.send_hello();
            self.drain_inbox_for(self.inner.config.round_duration).await;
        }
        *self.inner.bootstrapped.borrow_mut() = true;
        on_complete(self);
    }

    async fn drain_inbox_for(&self, duration: Duration) {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            self.pump_inbox();
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Dispatch every frame currently queued on the gateway.
    pub fn pump_inbox(&self) {
        for frame in self.inner.gateway.receive() {
            self.on_command_frame(frame);
        }
    }

    /// Dispatch a single already-received command frame.
    ///
    /// This is the outward-facing contract: a rejected frame is logged
    /// and silently discarded, never surfaced as an error to the caller.
    /// Use [`Engine::process_command_frame`] where the drop reason itself
    /// needs to be observed (tests).
    pub fn on_command_frame(&self, frame: CommandFrame) {
        let sender = frame.sender();
        if let Err(reason) = self.process_command_frame(frame) {
            debug!(peer = %sender, %reason, "dropped command frame");
        }
    }

    /// Dispatch a single command frame, returning the [`DropReason`] on
    /// rejection instead of swallowing it.
    pub fn process_command_frame(&self, frame: CommandFrame) -> DropResult<()> {
        match frame {
            CommandFrame::Hello { sender, challenge } => self.handle_hello(sender, challenge),
            CommandFrame::HelloAck {
                sender,
                local_index,
                trailer,
                sealed,
            } => self.handle_helloack(sender, local_index, trailer, sealed),
            CommandFrame::Ack {
                sender,
                local_index,
                broadcast_key,
                sealed,
            } => self.handle_ack(sender, local_index, broadcast_key, sealed),
        }
    }

    fn handle_hello(&self, sender: ExtAddr, challenge: [u8; 8]) -> DropResult<()> {
        if sender == self.inner.own_addr {
            return Err(DropReason::ProtocolStateViolation);
        }
        {
            let neighbors = self.inner.neighbors.borrow();
            if neighbors.find(&sender).is_some() {
                return Err(DropReason::AlreadyKnownPeer);
            }
            if neighbors.is_full() {
                return Err(DropReason::NeighborTableFull);
            }
        }
        if !self.inner.wait_timers.borrow_mut().try_acquire() {
            return Err(DropReason::WaitTimerPoolFull);
        }

        let secret = match self.inner.secrets.get_secret_with_hello_sender(&sender) {
            Some(secret) => secret,
            None => {
                self.inner.wait_timers.borrow_mut().release();
                return Err(DropReason::NoSecret);
            }
        };

        let handle = match self.inner.neighbors.borrow_mut().insert(sender) {
            Some(handle) => handle,
            None => {
                self.inner.wait_timers.borrow_mut().release();
                return Err(DropReason::NeighborTableFull);
            }
        };
        {
            let mut neighbors = self.inner.neighbors.borrow_mut();
            let entry = neighbors.get_mut(handle).expect("just inserted");
            entry.status = NeighborStatus::Tentative;
            entry.peer_challenge = Some(challenge);
        }

        let engine = self.clone();
        let delay = random_delay(self.inner.config.max_waiting_period);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            engine.send_helloack(handle, sender, secret);
        });

        Ok(())
    }

    fn send_helloack(&self, handle: NeighborHandle, peer: ExtAddr, secret: [u8; 16]) {
        let peer_challenge = {
            let neighbors = self.inner.neighbors.borrow();
            match neighbors.get(handle) {
                Some(entry) if entry.status == NeighborStatus::Tentative => {
                    Some(entry.peer_challenge.expect("set by handle_hello"))
                }
                _ => None,
            }
        };
        // In all cases, free the wait-timer record (spec.md §4.1.3).
        self.inner.wait_timers.borrow_mut().release();
        let Some(peer_challenge) = peer_challenge else {
            return;
        };

        let own_challenge = random::random_challenge();
        let mut metadata = [0u8; 16];
        metadata[..8].copy_from_slice(&peer_challenge);
        metadata[8..].copy_from_slice(&own_challenge);
        derive_pairwise_key(&secret, &mut metadata);
        let pairwise_key = metadata;

        {
            let mut neighbors = self.inner.neighbors.borrow_mut();
            let entry = neighbors.get_mut(handle).expect("entry still present");
            entry.status = NeighborStatus::TentativeAwaitingAck;
            entry.own_challenge = Some(own_challenge);
            entry.pairwise_key = Some(pairwise_key);
        }

        let mut plaintext = Vec::with_capacity(20);
        plaintext.extend_from_slice(&0u32.to_be_bytes());
        plaintext.extend_from_slice(&peer_challenge);
        plaintext.extend_from_slice(&own_challenge);
        let sealed = aead::seal(&secret, self.inner.own_addr.as_bytes(), &plaintext);

        let trailer = if self.inner.config.ebeap_with_encryption {
            let key = self
                .inner
                .config
                .broadcast_key
                .expect("validated by ApkesConfig::validate");
            HandshakeTrailer::BroadcastKey(key)
        } else {
            HandshakeTrailer::ShortAddr(self.inner.own_addr.derived_short_addr())
        };

        self.inner.gateway.send(
            Destination::Unicast(peer),
            CommandFrame::HelloAck {
                sender: self.inner.own_addr,
                local_index: handle.0 as u8,
                trailer,
                sealed,
            },
        );

        let engine = self.clone();
        let ack_delay = self.inner.config.ack_delay;
        tokio::task::spawn_local(async move {
            tokio::time::sleep(ack_delay).await;
            engine.expire_if_still_awaiting(handle);
        });
    }

    fn expire_if_still_awaiting(&self, handle: NeighborHandle) {
        let mut neighbors = self.inner.neighbors.borrow_mut();
        let still_waiting = matches!(
            neighbors.get(handle).map(|entry| entry.status),
            Some(NeighborStatus::TentativeAwaitingAck)
        );
        if still_waiting {
            neighbors.remove(handle);
            warn!("neighbor expired waiting for ACK");
        }
    }

    fn handle_helloack(
        &self,
        sender: ExtAddr,
        local_index: u8,
        trailer: HandshakeTrailer,
        sealed: Vec<u8>,
    ) -> DropResult<()> {
        let secret = self
            .inner
            .secrets
            .get_secret_with_helloack_sender(&sender)
            .ok_or(DropReason::NoSecret)?;

        let plaintext = aead::open(&secret, sender.as_bytes(), &sealed)
            .map_err(|_| DropReason::AuthenticationFailed)?;
        if plaintext.len() != 20 {
            return Err(DropReason::PayloadTooShort);
        }
        let (counter_bytes, rest) = plaintext.split_at(4);
        let counter = u32::from_be_bytes(counter_bytes.try_into().expect("4 bytes"));
        // Wire order is `peer_challenge[8] || own_challenge[8]` from the
        // HELLOACK sender's point of view: the first field is the echo of
        // *our* broadcast challenge, the second is the sender's fresh
        // challenge to pair with it (spec.md §4.1.5/§6).
        let (echoed_bytes, peer_challenge_bytes) = rest.split_at(8);
        let echoed: [u8; 8] = echoed_bytes.try_into().expect("split_at(8) yields 8 bytes");
        let peer_challenge: [u8; 8] = peer_challenge_bytes
            .try_into()
            .expect("split_at(8) yields 8 bytes");

        let own_challenge = self
            .inner
            .current_challenge
            .borrow()
            .ok_or(DropReason::ProtocolStateViolation)?;
        if echoed != own_challenge {
            return Err(DropReason::ChallengeMismatch);
        }

        trace!(peer = %sender, local_index, "received peer's local index in HELLOACK");

        // State resolution by the existing entry's status (spec.md §4.1.5).
        let existing = self.inner.neighbors.borrow().find(&sender);
        let handle = match existing {
            Some(handle) => {
                let status = self
                    .inner
                    .neighbors
                    .borrow()
                    .get(handle)
                    .map(|entry| entry.status);
                match status {
                    Some(NeighborStatus::Permanent) => {
                        let mut neighbors = self.inner.neighbors.borrow_mut();
                        let entry = neighbors.get_mut(handle).expect("checked above");
                        if !entry.replay_window.accept(counter) {
                            return Err(DropReason::Replayed);
                        }
                        handle
                    }
                    Some(NeighborStatus::Tentative) => handle,
                    Some(NeighborStatus::TentativeAwaitingAck) | Some(NeighborStatus::Free)
                    | None => {
                        return Err(DropReason::ProtocolStateViolation);
                    }
                }
            }
            None => {
                if self.inner.neighbors.borrow().is_full() {
                    return Err(DropReason::NeighborTableFull);
                }
                self.inner
                    .neighbors
                    .borrow_mut()
                    .insert(sender)
                    .ok_or(DropReason::NeighborTableFull)?
            }
        };

        let mut metadata = [0u8; 16];
        metadata[..8].copy_from_slice(&own_challenge);
        metadata[8..].copy_from_slice(&peer_challenge);
        derive_pairwise_key(&secret, &mut metadata);
        let pairwise_key = metadata;

        let short_addr = match trailer {
            HandshakeTrailer::ShortAddr(addr) => Some(addr),
            HandshakeTrailer::BroadcastKey(_) => None,
        };
        {
            let mut neighbors = self.inner.neighbors.borrow_mut();
            let entry = neighbors.get_mut(handle).expect("just resolved above");
            entry.own_challenge = Some(own_challenge);
            entry.peer_challenge = Some(peer_challenge);
            entry.pairwise_key = Some(pairwise_key);
            entry.status = NeighborStatus::Permanent;
            if short_addr.is_some() {
                entry.short_addr = short_addr;
            }
        }
        self.persist_key(sender, pairwise_key);

        let broadcast_key = if self.inner.config.ebeap_with_encryption {
            self.inner.config.broadcast_key
        } else {
            None
        };
        let mut ack_payload = Vec::with_capacity(12);
        ack_payload.extend_from_slice(&0u32.to_be_bytes());
        ack_payload.extend_from_slice(&peer_challenge);
        let sealed_ack = aead::seal(&pairwise_key, self.inner.own_addr.as_bytes(), &ack_payload);

        self.inner.gateway.send(
            Destination::Unicast(sender),
            CommandFrame::Ack {
                sender: self.inner.own_addr,
                local_index: handle.0 as u8,
                broadcast_key,
                sealed: sealed_ack,
            },
        );

        Ok(())
    }

    fn handle_ack(
        &self,
        sender: ExtAddr,
        local_index: u8,
        broadcast_key: Option<[u8; crate::frame::NEIGHBOR_BROADCAST_KEY_LEN]>,
        sealed: Vec<u8>,
    ) -> DropResult<()> {
        let handle = self
            .inner
            .neighbors
            .borrow()
            .find(&sender)
            .ok_or(DropReason::ProtocolStateViolation)?;

        let (pairwise_key, own_challenge, status) = {
            let neighbors = self.inner.neighbors.borrow();
            let entry = neighbors.get(handle).ok_or(DropReason::ProtocolStateViolation)?;
            (entry.pairwise_key, entry.own_challenge, entry.status)
        };
        if status != NeighborStatus::TentativeAwaitingAck {
            return Err(DropReason::ProtocolStateViolation);
        }
        let pairwise_key = pairwise_key.ok_or(DropReason::ProtocolStateViolation)?;
        let own_challenge = own_challenge.ok_or(DropReason::ProtocolStateViolation)?;

        let plaintext = aead::open(&pairwise_key, sender.as_bytes(), &sealed)
            .map_err(|_| DropReason::AuthenticationFailed)?;
        if plaintext.len() != 12 {
            return Err(DropReason::PayloadTooShort);
        }
        let (counter_bytes, echoed_bytes) = plaintext.split_at(4);
        let counter = u32::from_be_bytes(counter_bytes.try_into().expect("4 bytes"));
        let echoed: [u8; 8] = echoed_bytes.try_into().expect("split_at(8) yields 8 bytes");
        if echoed != own_challenge {
            return Err(DropReason::ChallengeMismatch);
        }

        trace!(
            peer = %sender,
            local_index,
            has_broadcast_key = broadcast_key.is_some(),
            "received peer's ACK trailer"
        );

        let mut neighbors = self.inner.neighbors.borrow_mut();
        let entry = neighbors.get_mut(handle).expect("checked above");
        if !entry.replay_window.accept(counter) {
            return Err(DropReason::Replayed);
        }
        entry.status = NeighborStatus::Permanent;
        drop(neighbors);
        self.persist_key(sender, pairwise_key);

        Ok(())
    }
}

fn random_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_millis = max.as_millis().max(1) as u64;
    let millis = OsRng.next_u64() % max_millis;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::InMemoryFlashStore;
    use crate::frame::LoopbackNetwork;
    use crate::identity::ShortAddr;
    use crate::secret_provider::{PairingSecretProvider, PlainSecretProvider};
    use tokio::task::LocalSet;

    fn quick_config() -> ApkesConfig {
        ApkesConfig::default()
            .with_round_duration(Duration::from_millis(200))
            .with_max_waiting_period(Duration::from_millis(10))
            .with_ack_delay(Duration::from_millis(50))
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn full_handshake_reaches_permanent_on_both_sides() {
        let network = LoopbackNetwork::new();
        let addr_a = ExtAddr([1; 8]);
        let addr_b = ExtAddr([2; 8]);
        let gw_a = network.join(addr_a);
        let gw_b = network.join(addr_b);
        let secret_provider = PlainSecretProvider::new([0x11; 16]);

        let engine_a = Engine::new(
            addr_a,
            quick_config(),
            Box::new(gw_a.clone()),
            Box::new(secret_provider.clone()),
            Box::new(InMemoryFlashStore::new(64)),
        )
        .unwrap();
        let engine_b = Engine::new(
            addr_b,
            quick_config(),
            Box::new(gw_b.clone()),
            Box::new(secret_provider),
            Box::new(InMemoryFlashStore::new(64)),
        )
        .unwrap();

        LocalSet::new()
            .run_until(async move {
                engine_a.send_hello();
                engine_b.pump_inbox();
                tokio::time::sleep(Duration::from_millis(20)).await;
                engine_a.pump_inbox();
                engine_b.pump_inbox();

                assert_eq!(
                    engine_a.neighbor_status(addr_b),
                    Some(NeighborStatus::Permanent)
                );
                assert_eq!(
                    engine_b.neighbor_status(addr_a),
                    Some(NeighborStatus::Permanent)
                );
                assert_eq!(
                    engine_a.pairwise_key(addr_b),
                    engine_b.pairwise_key(addr_a)
                );
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn flood_protection_bounds_concurrent_tentative_neighbors() {
        let network = LoopbackNetwork::new();
        let addr_b = ExtAddr([2; 8]);
        let gw_b = network.join(addr_b);
        let secret_provider = PlainSecretProvider::new([0x22; 16]);

        let config = quick_config().with_max_tentative_neighbors(1);
        let engine_b = Engine::new(
            addr_b,
            config,
            Box::new(gw_b),
            Box::new(secret_provider),
            Box::new(InMemoryFlashStore::new(64)),
        )
        .unwrap();

        LocalSet::new()
            .run_until(async move {
                let first = CommandFrame::Hello {
                    sender: ExtAddr([10; 8]),
                    challenge: [1; 8],
                };
                let second = CommandFrame::Hello {
                    sender: ExtAddr([11; 8]),
                    challenge: [2; 8],
                };
                assert!(engine_b.process_command_frame(first).is_ok());
                assert_eq!(
                    engine_b.process_command_frame(second),
                    Err(DropReason::WaitTimerPoolFull)
                );
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_secret_drops_hello() {
        let network = LoopbackNetwork::new();
        let addr_b = ExtAddr([2; 8]);
        let gw_b = network.join(addr_b);

        let engine_b = Engine::new(
            addr_b,
            quick_config(),
            Box::new(gw_b),
            Box::new(PairingSecretProvider::new()),
            Box::new(InMemoryFlashStore::new(64)),
        )
        .unwrap();

        LocalSet::new()
            .run_until(async move {
                let hello = CommandFrame::Hello {
                    sender: ExtAddr([10; 8]),
                    challenge: [1; 8],
                };
                assert_eq!(engine_b.process_command_frame(hello), Err(DropReason::NoSecret));
                assert_eq!(engine_b.neighbor_count(), 0);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stale_challenge_in_helloack_is_rejected() {
        let network = LoopbackNetwork::new();
        let addr_a = ExtAddr([1; 8]);
        let gw_a = network.join(addr_a);
        let secret = [0x33u8; 16];

        let engine_a = Engine::new(
            addr_a,
            quick_config(),
            Box::new(gw_a),
            Box::new(PlainSecretProvider::new(secret)),
            Box::new(InMemoryFlashStore::new(64)),
        )
        .unwrap();

        LocalSet::new()
            .run_until(async move {
                engine_a.send_hello();
                let stale_challenge = engine_a.current_challenge().unwrap();
                engine_a.send_hello();

                let mut plaintext = Vec::new();
                plaintext.extend_from_slice(&0u32.to_be_bytes());
                plaintext.extend_from_slice(&stale_challenge);
                plaintext.extend_from_slice(&[0xAA; 8]);
                let sealed = aead::seal(&secret, ExtAddr([2; 8]).as_bytes(), &plaintext);

                let frame = CommandFrame::HelloAck {
                    sender: ExtAddr([2; 8]),
                    local_index: 0,
                    trailer: HandshakeTrailer::ShortAddr(ShortAddr(0)),
                    sealed,
                };
                assert_eq!(
                    engine_a.process_command_frame(frame),
                    Err(DropReason::ChallengeMismatch)
                );
            })
            .await;
    }
}
