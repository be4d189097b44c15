//! Per-interface frame counters.
//!
//! Updated from both execution contexts with relaxed atomics; readers take
//! a [`StatsSnapshot`].

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub struct InterfaceStats {
    rx_frames: AtomicU32,
    rx_congested: AtomicU32,
    rx_not_ready: AtomicU32,
    rx_malformed: AtomicU32,
    rx_oversized: AtomicU32,
    tx_frames: AtomicU32,
    tx_congested: AtomicU32,
    tx_not_ready: AtomicU32,
    tx_oversized: AtomicU32,
    tx_busy_retries: AtomicU32,
    drained: AtomicU32,
}

/// Point-in-time copy of [`InterfaceStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatsSnapshot {
    /// Frames handed to the IP stack.
    pub rx_frames: u32,
    pub rx_congested: u32,
    pub rx_not_ready: u32,
    pub rx_malformed: u32,
    pub rx_oversized: u32,
    /// Frames accepted by the USB transmit path.
    pub tx_frames: u32,
    pub tx_congested: u32,
    pub tx_not_ready: u32,
    pub tx_oversized: u32,
    pub tx_busy_retries: u32,
    /// Frames discarded when a session stopped.
    pub drained: u32,
}

impl StatsSnapshot {
    /// Every frame dropped on either path, for any reason.
    ///
    /// Saturates at `u32::MAX`; the individual counters wrap.
    pub fn total_dropped(&self) -> u32 {
        [
            self.rx_congested,
            self.rx_not_ready,
            self.rx_malformed,
            self.rx_oversized,
            self.tx_congested,
            self.tx_not_ready,
            self.tx_oversized,
            self.drained,
        ]
        .into_iter()
        .fold(0u32, u32::saturating_add)
    }
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl InterfaceStats {
    pub const fn new() -> Self {
        Self {
            rx_frames: AtomicU32::new(0),
            rx_congested: AtomicU32::new(0),
            rx_not_ready: AtomicU32::new(0),
            rx_malformed: AtomicU32::new(0),
            rx_oversized: AtomicU32::new(0),
            tx_frames: AtomicU32::new(0),
            tx_congested: AtomicU32::new(0),
            tx_not_ready: AtomicU32::new(0),
            tx_oversized: AtomicU32::new(0),
            tx_busy_retries: AtomicU32::new(0),
            drained: AtomicU32::new(0),
        }
    }

    pub fn rx_frame(&self) {
        bump(&self.rx_frames);
    }

    pub fn rx_congested(&self) {
        bump(&self.rx_congested);
    }

    pub fn rx_not_ready(&self) {
        bump(&self.rx_not_ready);
    }

    pub fn rx_malformed(&self) {
        bump(&self.rx_malformed);
    }

    pub fn rx_oversized(&self) {
        bump(&self.rx_oversized);
    }

    pub fn tx_frame(&self) {
        bump(&self.tx_frames);
    }

    pub fn tx_congested(&self) {
        bump(&self.tx_congested);
    }

    pub fn tx_not_ready(&self) {
        bump(&self.tx_not_ready);
    }

    pub fn tx_oversized(&self) {
        bump(&self.tx_oversized);
    }

    pub fn tx_busy_retry(&self) {
        bump(&self.tx_busy_retries);
    }

    pub fn drained(&self, frames: usize) {
        let frames = u32::try_from(frames).unwrap_or(u32::MAX);
        self.drained.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU32| c.load(Ordering::Relaxed);
        StatsSnapshot {
            rx_frames: get(&self.rx_frames),
            rx_congested: get(&self.rx_congested),
            rx_not_ready: get(&self.rx_not_ready),
            rx_malformed: get(&self.rx_malformed),
            rx_oversized: get(&self.rx_oversized),
            tx_frames: get(&self.tx_frames),
            tx_congested: get(&self.tx_congested),
            tx_not_ready: get(&self.tx_not_ready),
            tx_oversized: get(&self.tx_oversized),
            tx_busy_retries: get(&self.tx_busy_retries),
            drained: get(&self.drained),
        }
    }
}
