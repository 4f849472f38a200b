//! The follower path: a client that arrived while the
//! entry was `Loading` tails the payload buffer as the leader fills
//! it, rather than waiting idle for the whole response.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{classify_write_error, ProxyError, WriteOutcome};
use crate::slot::{Slot, SlotState};

/// Default total-inactivity timeout applied per wait attempt.
pub const DEFAULT_FOLLOWER_TIMEOUT: Duration = Duration::from_secs(10);

/// Tails `slot`'s payload from offset 0, writing newly-available bytes
/// to `client` as the leader appends them. Returns once the entry
/// reaches a terminal state (or the follower's own client disconnects
/// or times out).
pub async fn run_follower<C>(
    slot: Arc<Slot>,
    mut client: C,
    timeout: Duration,
) -> Result<(), ProxyError>
where
    C: AsyncWrite + Unpin,
{
    let mut offset = 0usize;

    loop {
        // Registering for the next notification before inspecting the
        // slot, not after, is what makes this race-free: `Notify`
        // guarantees a `notify_waiters()` call landing any time after
        // this `notified()` is created — even before it is awaited —
        // is still observed when we `await` it below.
        let notified = slot.notify.notified();
        tokio::pin!(notified);

        // Snapshot state and payload together so a concurrent eviction
        // (which clears `payload`) can't be observed as "Ready with no
        // buffer" — the terminal state is always read alongside it.
        let (state, payload) = {
            let meta = slot.meta.lock();
            (meta.state, meta.payload.clone())
        };

        if let Some(payload) = payload.as_ref() {
            let chunk = payload.read_from(offset);
            if !chunk.is_empty() {
                match client.write_all(chunk).await {
                    Ok(()) => offset += chunk.len(),
                    Err(e) => {
                        return match classify_write_error(&e) {
                            WriteOutcome::ClientDisconnected => {
                                Err(ProxyError::ClientDisconnected)
                            }
                            WriteOutcome::Fatal => Err(ProxyError::UpstreamIoError(e)),
                        };
                    }
                }
                // Bytes may have arrived since we read `offset`; loop
                // again immediately rather than blocking, so a fast
                // leader doesn't force us through a wasted wait.
                continue;
            }
            if state == SlotState::Ready && offset >= payload.len() {
                return Ok(());
            }
        }

        if state == SlotState::Error {
            // Partial bytes already sent are not reversible; simply stop forwarding and close.
            return Err(ProxyError::NonCacheable);
        }

        match tokio::time::timeout(timeout, notified).await {
            Ok(()) => {}
            Err(_) => return Err(ProxyError::Timeout),
        }
    }
}
