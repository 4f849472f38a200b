use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::payload::Payload;

/// `Empty` iff `key = "absent"`. `Ready`/`Error` are sticky
/// until eviction or explicit deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Loading,
    Ready,
    Error,
}

pub(crate) struct SlotMeta {
    pub(crate) key: Option<Box<[u8]>>,
    pub(crate) state: SlotState,
    pub(crate) payload: Option<Arc<Payload>>,
    pub(crate) lru_stamp: u64,
    pub(crate) size_full: bool,
}

impl SlotMeta {
    fn empty() -> Self {
        Self {
            key: None,
            state: SlotState::Empty,
            payload: None,
            lru_stamp: 0,
            size_full: false,
        }
    }
}

/// One slot in the directory. Metadata (`state`, `key`, `lru_stamp`,
/// the size-full flag) lives behind `meta`; the condition for waiters
/// is `notify`, broadcast on every successful append, every terminal
/// transition, and on explicit deletion/shutdown.
pub struct Slot {
    pub(crate) meta: Mutex<SlotMeta>,
    pub(crate) notify: Notify,
}

impl Slot {
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self {
            meta: Mutex::new(SlotMeta::empty()),
            notify: Notify::new(),
        })
    }

    pub fn state(&self) -> SlotState {
        self.meta.lock().state
    }

    pub fn payload(&self) -> Option<Arc<Payload>> {
        self.meta.lock().payload.clone()
    }

    pub fn lru_stamp(&self) -> u64 {
        self.meta.lock().lru_stamp
    }
}

/// The one-shot handle the leader uses to resolve its fetch. Dropping
/// it without calling [`LeaderToken::publish_ready`] or
/// [`LeaderToken::publish_error`] — e.g. on an early `return` or panic
/// unwind — publishes `Error`, so the one-shot contract holds even
/// when the leader task aborts unexpectedly.
pub struct LeaderToken {
    slot: Arc<Slot>,
    payload: Arc<Payload>,
    completed: bool,
}

impl LeaderToken {
    pub(crate) fn new(slot: Arc<Slot>, payload: Arc<Payload>) -> Self {
        Self {
            slot,
            payload,
            completed: false,
        }
    }

    pub fn payload(&self) -> &Arc<Payload> {
        &self.payload
    }

    /// Wakes followers blocked on this slot's condition after a
    /// successful append, so they re-check `len` without waiting for
    /// the timeout or a terminal transition.
    pub fn notify_progress(&self) {
        self.slot.notify.notify_waiters();
    }

    /// Marks that the response has grown past the entry's capacity.
    /// The leader keeps forwarding bytes to the client but stops
    /// appending; the entry still resolves to `Error` on completion.
    pub fn mark_size_full(&self) {
        self.slot.meta.lock().size_full = true;
    }

    pub fn is_size_full(&self) -> bool {
        self.slot.meta.lock().size_full
    }

    pub fn publish_ready(mut self) {
        self.finish(SlotState::Ready, true);
    }

    pub fn publish_error(mut self) {
        self.finish(SlotState::Error, false);
    }

    fn finish(&mut self, state: SlotState, keep_payload: bool) {
        self.completed = true;
        let mut meta = self.slot.meta.lock();
        meta.state = state;
        if !keep_payload {
            meta.payload = None;
        }
        drop(meta);
        self.slot.notify.notify_waiters();
    }
}

impl Drop for LeaderToken {
    fn drop(&mut self) {
        if !self.completed {
            self.finish(SlotState::Error, false);
        }
    }
}
