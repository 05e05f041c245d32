use std::sync::{Condvar, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::media::types::EncodedFrame;

#[derive(Default)]
struct Slot {
    front: EncodedFrame,
    back: EncodedFrame,
    pending: bool,
}

/// Single-slot mailbox between one producer (the pipeline worker) and its
/// consumer. The producer writes `back` and raises `pending`; it cannot write
/// again until the consumer has swapped `back` to `front`.
#[derive(Default)]
pub struct FrameExchange {
    slot: Mutex<Slot>,
    consumed: Condvar,
}

impl FrameExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks while a frame is pending. Returns false if `stop` fired first.
    pub fn wait_consumed(&self, stop: &CancellationToken) -> bool {
        let mut slot = self.lock();
        while slot.pending && !stop.is_cancelled() {
            slot = self.consumed.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
        !stop.is_cancelled()
    }

    /// Stores `frame` as the pending frame, first waiting for the previous one
    /// to be taken. Returns false (and drops `frame`) if `stop` fired.
    pub fn publish(&self, frame: EncodedFrame, stop: &CancellationToken) -> bool {
        let mut slot = self.lock();
        while slot.pending && !stop.is_cancelled() {
            slot = self.consumed.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
        if stop.is_cancelled() {
            return false;
        }
        slot.back = frame;
        slot.pending = true;
        true
    }

    /// Consumer side: promotes the pending frame if any, then returns the
    /// most recent frame (default/unsuccessful before the first publish).
    pub fn take_latest(&self) -> EncodedFrame {
        let mut slot = self.lock();
        if slot.pending {
            let Slot { front, back, .. } = &mut *slot;
            std::mem::swap(front, back);
            slot.pending = false;
            self.consumed.notify_all();
        }
        slot.front.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Wakes a blocked producer so it can observe a stop request.
    pub fn wake(&self) {
        let _slot = self.lock();
        self.consumed.notify_all();
    }
}
