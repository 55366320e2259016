//! Flash keying-material store.
//!
//! `spec.md` §4.3 models the non-volatile region a mote uses to persist
//! derived keying material across reboots as a single append-only linear
//! region with an erase operation and a process-local write cursor. The
//! trait lets a real deployment swap in an actual flash driver; the
//! in-memory implementation here is the reference used for testing and by
//! the `demo` binary.

use crate::error::ApkesError;

/// Append-only keying-material region with a fixed byte capacity.
pub trait FlashKeyStore {
    /// Total capacity of the region in bytes.
    fn capacity(&self) -> usize;

    /// Bytes written since the region was last erased.
    fn len(&self) -> usize;

    /// Erase the region, resetting the write cursor to zero.
    fn erase(&mut self);

    /// Append `data` at the current cursor, advancing it.
    ///
    /// # Errors
    ///
    /// Returns [`ApkesError::FlashOverflow`] if `data` would not fit in the
    /// remaining capacity.
    fn append(&mut self, data: &[u8]) -> Result<(), ApkesError>;

    /// Read `len` bytes starting at `offset`, without moving the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ApkesError::FlashOverflow`] if the requested range exceeds
    /// what has been written.
    fn restore(&self, offset: usize, len: usize) -> Result<Vec<u8>, ApkesError>;
}

/// In-memory reference [`FlashKeyStore`].
#[derive(Debug, Clone)]
pub struct InMemoryFlashStore {
    capacity: usize,
    data: Vec<u8>,
}

impl InMemoryFlashStore {
    /// Create an empty store with the given byte capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: Vec::with_capacity(capacity),
        }
    }
}

impl FlashKeyStore for InMemoryFlashStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn erase(&mut self) {
        self.data.clear();
    }

    fn append(&mut self, data: &[u8]) -> Result<(), ApkesError> {
        if self.data.len() + data.len() > self.capacity {
            return Err(ApkesError::FlashOverflow {
                offset: self.data.len(),
                len: data.len(),
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn restore(&self, offset: usize, len: usize) -> Result<Vec<u8>, ApkesError> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ApkesError::FlashOverflow {
                offset,
                len,
                capacity: self.data.len(),
            })?;
        Ok(self.data[offset..end].to_vec())
    }
}
