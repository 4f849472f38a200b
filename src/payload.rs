use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded, append-only byte buffer with concurrent tail reads.
///
/// Exactly one writer — the fetch coordinator holding the leader role —
/// calls [`Payload::append`]. Any number of readers call
/// [`Payload::read_from`] concurrently. Bytes below `len` are immutable
/// once published; `len` is the single synchronization point between
/// writer and readers.
pub struct Payload {
    storage: UnsafeCell<Box<[u8]>>,
    len: AtomicUsize,
    capacity: usize,
}

// SAFETY: `storage` is mutated only through `append`, which the
// directory guarantees is called by a single leader at a time for a
// given entry. Readers only ever see the byte range
// `[0, len)`, and `len` is only ever bumped past bytes that have
// already been written, so reader and writer ranges never overlap.
unsafe impl Sync for Payload {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

impl Payload {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `bytes`, failing with [`CapacityExceeded`] rather than
    /// growing past `capacity`. Must only be called by the leader.
    pub fn append(&self, bytes: &[u8]) -> Result<(), CapacityExceeded> {
        if bytes.is_empty() {
            return Ok(());
        }
        let current = self.len.load(Ordering::Relaxed);
        let new_len = current + bytes.len();
        if new_len > self.capacity {
            return Err(CapacityExceeded);
        }
        // SAFETY: only the leader reaches this line, and it writes to
        // `[current, new_len)`, a range no reader can observe until the
        // `Release` store below runs.
        unsafe {
            let storage = &mut *self.storage.get();
            storage[current..new_len].copy_from_slice(bytes);
        }
        self.len.store(new_len, Ordering::Release);
        Ok(())
    }

    /// Returns the bytes written so far from `offset` onward. Safe to
    /// call from any number of readers while the leader keeps appending.
    pub fn read_from(&self, offset: usize) -> &[u8] {
        let len = self.len.load(Ordering::Acquire);
        if offset >= len {
            return &[];
        }
        // SAFETY: `len` was just observed with `Acquire`, synchronizing
        // with the leader's `Release` store; `[0, len)` is fully written
        // and will not be mutated again.
        unsafe {
            let storage = &*self.storage.get();
            &storage[offset..len]
        }
    }

    /// Returns the full buffer written so far. Convenience for the
    /// cache-hit path, which always starts at offset 0.
    pub fn snapshot(&self) -> &[u8] {
        self.read_from(0)
    }
}
