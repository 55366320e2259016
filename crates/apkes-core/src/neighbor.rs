//! Neighbor table: fixed-capacity storage of handshake state per peer.
//!
//! Grounded on the teacher's peer map (`node::multi_peer::MultiPeerCoordinator`),
//! which keys a fixed-shape record by peer identity behind a lock. APKES runs
//! on a single cooperative task with no cross-task sharing, so the lock
//! becomes a plain `RefCell` and the map is bounded at construction time
//! instead of growing without limit.

use std::collections::HashMap;

use crate::identity::{ExtAddr, ShortAddr};
use crate::replay::ReplayWindow;

/// Lifecycle state of a neighbor table entry, per `spec.md` §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStatus {
    /// Entry exists but no handshake has begun (rarely stored explicitly;
    /// included for completeness of the state space).
    Free,
    /// Peer was heard via HELLO; the randomized HELLOACK reply delay is
    /// in progress, and no pairwise key exists yet.
    Tentative,
    /// HELLOACK has been sent; the pairwise key is derived and stored,
    /// and the engine is awaiting the peer's ACK to promote this entry to
    /// `PERMANENT`.
    TentativeAwaitingAck,
    /// ACK verified; pairwise key established and usable.
    Permanent,
}

/// Opaque handle to a neighbor table row, stable for the row's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeighborHandle(pub(crate) usize);

/// One neighbor table row.
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    /// Extended address of the peer.
    pub ext_addr: ExtAddr,
    /// Short address of the peer, once known.
    pub short_addr: Option<ShortAddr>,
    /// Current lifecycle state.
    pub status: NeighborStatus,
    /// Our most recently sent challenge to this peer.
    pub own_challenge: Option<[u8; 8]>,
    /// The peer's challenge, once received.
    pub peer_challenge: Option<[u8; 8]>,
    /// Derived pairwise key, once the handshake completes.
    pub pairwise_key: Option<[u8; 16]>,
    /// Anti-replay window for frames received from this peer.
    pub replay_window: ReplayWindow,
}

impl NeighborEntry {
    fn new(ext_addr: ExtAddr) -> Self {
        Self {
            ext_addr,
            short_addr: None,
            status: NeighborStatus::Free,
            own_challenge: None,
            peer_challenge: None,
            pairwise_key: None,
            replay_window: ReplayWindow::new(),
        }
    }
}

/// Fixed-capacity neighbor table keyed by extended address.
///
/// Capacity is enforced at insertion: once `capacity` entries exist,
/// [`NeighborTable::insert`] returns `None` rather than growing the map,
/// matching the fixed-size neighbor table a constrained mote would hold in
/// static memory.
#[derive(Debug)]
pub struct NeighborTable {
    capacity: usize,
    entries: HashMap<NeighborHandle, NeighborEntry>,
    by_addr: HashMap<ExtAddr, NeighborHandle>,
    next_handle: usize,
}

impl NeighborTable {
    /// Create an empty table bounded at `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            by_addr: HashMap::with_capacity(capacity),
            next_handle: 0,
        }
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the table has no remaining free slot.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Look up an existing entry by extended address.
    #[must_use]
    pub fn find(&self, ext_addr: &ExtAddr) -> Option<NeighborHandle> {
        self.by_addr.get(ext_addr).copied()
    }

    /// Insert a fresh entry for `ext_addr`, failing if the table is full or
    /// the address is already known.
    pub fn insert(&mut self, ext_addr: ExtAddr) -> Option<NeighborHandle> {
        if self.is_full() || self.by_addr.contains_key(&ext_addr) {
            return None;
        }
        let handle = NeighborHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(handle, NeighborEntry::new(ext_addr));
        self.by_addr.insert(ext_addr, handle);
        Some(handle)
    }

    /// Borrow an entry by handle.
    #[must_use]
    pub fn get(&self, handle: NeighborHandle) -> Option<&NeighborEntry> {
        self.entries.get(&handle)
    }

    /// Mutably borrow an entry by handle.
    pub fn get_mut(&mut self, handle: NeighborHandle) -> Option<&mut NeighborEntry> {
        self.entries.get_mut(&handle)
    }

    /// Remove an entry, freeing its slot.
    pub fn remove(&mut self, handle: NeighborHandle) -> Option<NeighborEntry> {
        let entry = self.entries.remove(&handle)?;
        self.by_addr.remove(&entry.ext_addr);
        Some(entry)
    }

    /// Number of entries currently in [`NeighborStatus::Tentative`] or
    /// [`NeighborStatus::TentativeAwaitingAck`].
    #[must_use]
    pub fn tentative_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| {
                matches!(
                    e.status,
                    NeighborStatus::Tentative | NeighborStatus::TentativeAwaitingAck
                )
            })
            .count()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&NeighborHandle, &NeighborEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_respects_capacity() {
        let mut table = NeighborTable::new(1);
        assert!(table.insert(ExtAddr([1; 8])).is_some());
        assert!(table.insert(ExtAddr([2; 8])).is_none());
    }

    #[test]
    fn insert_rejects_duplicate_address() {
        let mut table = NeighborTable::new(4);
        assert!(table.insert(ExtAddr([1; 8])).is_some());
        assert!(table.insert(ExtAddr([1; 8])).is_none());
    }

    #[test]
    fn remove_frees_slot_and_address() {
        let mut table = NeighborTable::new(1);
        let handle = table.insert(ExtAddr([1; 8])).unwrap();
        table.remove(handle);
        assert!(table.is_empty());
        assert!(table.insert(ExtAddr([1; 8])).is_some());
    }

    #[test]
    fn tentative_count_tracks_status() {
        let mut table = NeighborTable::new(4);
        let a = table.insert(ExtAddr([1; 8])).unwrap();
        let b = table.insert(ExtAddr([2; 8])).unwrap();
        table.get_mut(a).unwrap().status = NeighborStatus::Tentative;
        table.get_mut(b).unwrap().status = NeighborStatus::Permanent;
        assert_eq!(table.tentative_count(), 1);
    }
}
