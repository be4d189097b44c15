//! Bounded frame queue shared between the USB completion context and the
//! bridge pump.
//!
//! All access goes through a blocking mutex held only for the duration of
//! a push or pop, so the USB side never waits on the pump.  The pump parks
//! on a waker that the next push wakes.
//!
//! Frames handed out with [`FrameQueue::take_reserved`] keep their slot
//! until [`FrameQueue::complete_reserved`] or
//! [`FrameQueue::requeue_front`], so putting a busy frame back at the head
//! can never fail for lack of room.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use heapless::Deque;

use super::frame::NetworkFrame;
use crate::error::BridgeError;

struct QueueState<const N: usize> {
    frames: Deque<NetworkFrame, N>,
    capacity: usize,
    reserved: usize,
    open: bool,
    waker: WakerRegistration,
}

impl<const N: usize> QueueState<N> {
    fn occupied(&self) -> usize {
        self.frames.len() + self.reserved
    }
}

/// Bounded FIFO of [`NetworkFrame`]s with a runtime capacity of at most `N`.
pub struct FrameQueue<M: RawMutex, const N: usize> {
    state: Mutex<M, RefCell<QueueState<N>>>,
}

impl<M: RawMutex, const N: usize> FrameQueue<M, N> {
    /// Create a closed queue holding at most `capacity` frames
    /// (clamped to `1..=N`).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RefCell::new(QueueState {
                frames: Deque::new(),
                capacity: capacity.clamp(1, N),
                reserved: 0,
                open: false,
                waker: WakerRegistration::new(),
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut QueueState<N>) -> R) -> R {
        self.state.lock(|s| f(&mut s.borrow_mut()))
    }

    pub fn capacity(&self) -> usize {
        self.with(|s| s.capacity)
    }

    /// Frames waiting in the queue (reserved frames excluded).
    pub fn len(&self) -> usize {
        self.with(|s| s.frames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames taken for transmission but not yet completed.
    pub fn reserved(&self) -> usize {
        self.with(|s| s.reserved)
    }

    pub fn is_open(&self) -> bool {
        self.with(|s| s.open)
    }

    /// Start accepting frames.
    pub fn open(&self) {
        self.with(|s| s.open = true);
    }

    /// Append a frame.
    ///
    /// Fails with `Congested` when full and `LinkNotReady` when closed; the
    /// frame is dropped in both cases.
    pub fn push_back(&self, frame: NetworkFrame) -> Result<(), BridgeError> {
        self.with(|s| {
            if !s.open {
                return Err(BridgeError::LinkNotReady);
            }
            if s.occupied() >= s.capacity {
                return Err(BridgeError::Congested);
            }
            s.frames
                .push_back(frame)
                .map_err(|_| BridgeError::Congested)?;
            s.waker.wake();
            Ok(())
        })
    }

    pub fn pop_front(&self) -> Option<NetworkFrame> {
        self.with(|s| s.frames.pop_front())
    }

    /// Pop the head frame and keep its slot reserved.
    pub fn take_reserved(&self) -> Option<NetworkFrame> {
        self.with(|s| {
            let frame = s.frames.pop_front()?;
            s.reserved += 1;
            Some(frame)
        })
    }

    /// Release the slot of a reserved frame that left the queue for good.
    pub fn complete_reserved(&self) {
        self.with(|s| s.reserved = s.reserved.saturating_sub(1));
    }

    /// Put a reserved frame back at the head, ahead of everything queued
    /// after it.
    ///
    /// Only fails once the queue has been closed, in which case the frame
    /// is discarded.
    pub fn requeue_front(&self, frame: NetworkFrame) -> Result<(), BridgeError> {
        self.with(|s| {
            if !s.open || s.reserved == 0 {
                return Err(BridgeError::LinkNotReady);
            }
            s.reserved -= 1;
            s.frames
                .push_front(frame)
                .map_err(|_| BridgeError::Congested)?;
            s.waker.wake();
            Ok(())
        })
    }

    /// Close the queue, discard every frame and release all slots.
    ///
    /// Returns the number of queued frames dropped.
    pub fn close_and_drain(&self) -> usize {
        self.with(|s| {
            s.open = false;
            let dropped = s.frames.len();
            s.frames.clear();
            s.reserved = 0;
            s.waker.wake();
            dropped
        })
    }

    pub fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.with(|s| {
            if s.frames.is_empty() {
                s.waker.register(cx.waker());
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
    }

    /// Wait until at least one frame is queued.
    pub async fn wait_ready(&self) {
        poll_fn(|cx| self.poll_ready(cx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type Queue = FrameQueue<NoopRawMutex, 4>;

    fn frame(tag: u8) -> NetworkFrame {
        NetworkFrame::from_slice(&[tag; 60]).unwrap()
    }

    fn tag(frame: &NetworkFrame) -> u8 {
        frame.as_slice()[0]
    }

    #[test]
    fn closed_queue_rejects_frames() {
        let q = Queue::new(4);
        assert!(!q.is_open());
        assert_eq!(q.push_back(frame(1)), Err(BridgeError::LinkNotReady));
        assert!(q.is_empty());
    }

    #[test]
    fn capacity_is_clamped_to_storage() {
        assert_eq!(Queue::new(0).capacity(), 1);
        assert_eq!(Queue::new(100).capacity(), 4);
        assert_eq!(Queue::new(2).capacity(), 2);
    }

    #[test]
    fn full_queue_reports_congestion() {
        let q = Queue::new(2);
        q.open();
        q.push_back(frame(1)).unwrap();
        q.push_back(frame(2)).unwrap();
        assert_eq!(q.push_back(frame(3)), Err(BridgeError::Congested));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn reserved_slot_blocks_producer_until_completed() {
        let q = Queue::new(2);
        q.open();
        q.push_back(frame(1)).unwrap();
        q.push_back(frame(2)).unwrap();

        let taken = q.take_reserved().unwrap();
        assert_eq!(tag(&taken), 1);
        assert_eq!(q.reserved(), 1);
        assert_eq!(q.push_back(frame(3)), Err(BridgeError::Congested));

        q.complete_reserved();
        assert_eq!(q.reserved(), 0);
        q.push_back(frame(3)).unwrap();
    }

    #[test]
    fn requeue_goes_back_to_the_head() {
        let q = Queue::new(3);
        q.open();
        for t in 1..=3 {
            q.push_back(frame(t)).unwrap();
        }
        let first = q.take_reserved().unwrap();
        q.requeue_front(first).unwrap();

        assert_eq!(q.reserved(), 0);
        let order: heapless::Vec<u8, 4> =
            core::iter::from_fn(|| q.pop_front()).map(|f| tag(&f)).collect();
        assert_eq!(order.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn close_and_drain_discards_everything() {
        let q = Queue::new(4);
        q.open();
        for t in 1..=3 {
            q.push_back(frame(t)).unwrap();
        }
        let in_flight = q.take_reserved().unwrap();

        assert_eq!(q.close_and_drain(), 2);
        assert!(q.is_empty());
        assert_eq!(q.reserved(), 0);
        assert!(!q.is_open());
        assert_eq!(q.requeue_front(in_flight), Err(BridgeError::LinkNotReady));
    }
}
