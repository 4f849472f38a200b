use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::ProxyError;
use crate::payload::Payload;
use crate::slot::{LeaderToken, Slot, SlotState};

/// Role returned by [`Directory::find_or_insert`].
pub enum FindOrInsert {
    /// Sole upstream fetcher for this URL; must resolve the returned
    /// token exactly once.
    Leader(LeaderToken),
    /// An upstream fetch for this URL is already in flight.
    Follower(Arc<Slot>),
    /// The URL is cached and ready.
    Hit(Arc<Slot>),
}

/// Fixed-capacity associative store with LRU eviction and a
/// linearizable `find_or_insert`. `N` is fixed at
/// construction, not grown afterward; linear scan is acceptable for
/// the small `N` this system targets.
pub struct Directory {
    global: Mutex<()>,
    slots: Box<[Arc<Slot>]>,
    tick: AtomicU64,
    max_bytes: usize,
}

impl Directory {
    pub fn new(n_entries: usize, max_bytes: usize) -> Self {
        let slots = (0..n_entries)
            .map(|_| Slot::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            global: Mutex::new(()),
            slots,
            tick: AtomicU64::new(1),
            max_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// The critical primitive. Holds the directory-global mutex for
    /// the entire decision (scan, evict-or-reuse, admit); all
    /// subsequent byte transfer happens outside it, bounding the
    /// critical section to O(N) work.
    pub fn find_or_insert(&self, url: &[u8]) -> Result<FindOrInsert, ProxyError> {
        let _guard = self.global.lock();

        // Step 1: scan for an existing entry with this key. An Error
        // entry is present-but-unsatisfying: it is ignored on lookup
        // (forces a new fetch) but, to preserve key uniqueness (no
        // duplicate keys), it is reclaimed to Empty right here rather
        // than left occupying its slot while a second slot is admitted
        // for the same URL.
        for slot in self.slots.iter() {
            let mut meta = slot.meta.lock();
            if meta.key.as_deref() != Some(url) {
                continue;
            }
            match meta.state {
                SlotState::Ready => {
                    meta.lru_stamp = self.next_tick();
                    drop(meta);
                    return Ok(FindOrInsert::Hit(slot.clone()));
                }
                SlotState::Loading => {
                    meta.lru_stamp = self.next_tick();
                    drop(meta);
                    return Ok(FindOrInsert::Follower(slot.clone()));
                }
                SlotState::Error => {
                    meta.key = None;
                    meta.state = SlotState::Empty;
                    meta.payload = None;
                    meta.size_full = false;
                    break;
                }
                SlotState::Empty => unreachable!("a keyed slot cannot be Empty"),
            }
        }

        // Step 2: an Empty slot (possibly the one just reclaimed above).
        if let Some(slot) = self.find_empty_slot() {
            return Ok(self.admit(slot, url));
        }

        // Step 3: evict the non-Loading entry with the smallest
        // lru_stamp (a Loading entry is never
        // evicted). If every slot is Loading, admission fails.
        match self.find_eviction_candidate() {
            Some(slot) => {
                let mut meta = slot.meta.lock();
                let evicted_key = meta.key.take();
                let evicted_stamp = meta.lru_stamp;
                meta.payload = None;
                meta.size_full = false;
                meta.state = SlotState::Empty;
                drop(meta);
                if let Some(evicted_key) = evicted_key {
                    info!(
                        evicted_url = %String::from_utf8_lossy(&evicted_key),
                        lru_stamp = evicted_stamp,
                        incoming_url = %String::from_utf8_lossy(url),
                        "evicting LRU entry to admit a new URL"
                    );
                }
                Ok(self.admit(slot, url))
            }
            None => Err(ProxyError::Saturated),
        }
    }

    fn find_empty_slot(&self) -> Option<Arc<Slot>> {
        for slot in self.slots.iter() {
            let meta = slot.meta.lock();
            if meta.state == SlotState::Empty {
                drop(meta);
                return Some(slot.clone());
            }
        }
        None
    }

    fn find_eviction_candidate(&self) -> Option<Arc<Slot>> {
        let mut best: Option<(Arc<Slot>, u64)> = None;
        for slot in self.slots.iter() {
            let meta = slot.meta.lock();
            if meta.state == SlotState::Loading {
                continue;
            }
            let stamp = meta.lru_stamp;
            drop(meta);
            if best.as_ref().map_or(true, |(_, b)| stamp < *b) {
                best = Some((slot.clone(), stamp));
            }
        }
        best.map(|(slot, _)| slot)
    }

    fn admit(&self, slot: Arc<Slot>, url: &[u8]) -> FindOrInsert {
        let payload = Arc::new(Payload::new(self.max_bytes));
        let mut meta = slot.meta.lock();
        meta.key = Some(url.to_vec().into_boxed_slice());
        meta.state = SlotState::Loading;
        meta.payload = Some(payload.clone());
        meta.lru_stamp = self.next_tick();
        meta.size_full = false;
        drop(meta);
        FindOrInsert::Leader(LeaderToken::new(slot, payload))
    }

    /// Administrative removal. If the entry is Loading, waiters
    /// observe `Error`.
    pub fn delete(&self, url: &[u8]) {
        let _guard = self.global.lock();
        for slot in self.slots.iter() {
            let mut meta = slot.meta.lock();
            if meta.key.as_deref() != Some(url) {
                continue;
            }
            meta.key = None;
            meta.payload = None;
            meta.size_full = false;
            meta.state = SlotState::Empty;
            drop(meta);
            slot.notify.notify_waiters();
            return;
        }
    }

    /// Releases all payloads and wakes every waiter with `Error`.
    pub fn shutdown(&self) {
        let _guard = self.global.lock();
        for slot in self.slots.iter() {
            let mut meta = slot.meta.lock();
            match meta.state {
                // Mirrors LeaderToken::finish's Loading -> Error path:
                // key stays put so a later find_or_insert can find and
                // reclaim this slot, preserving E1 (state = Empty iff
                // key = absent).
                SlotState::Loading => meta.state = SlotState::Error,
                SlotState::Ready | SlotState::Error => {
                    meta.key = None;
                    meta.state = SlotState::Empty;
                }
                SlotState::Empty => {}
            }
            meta.payload = None;
            drop(meta);
            slot.notify.notify_waiters();
        }
    }
}
