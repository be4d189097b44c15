//! Frame transport adapter - the USB-facing edge of the bridge.
//!
//! Turns raw USB network-class payloads into [`NetworkFrame`]s on the way
//! in and hands queued frames to the USB transmit path on the way out.
//! It owns the receive/transmit queue pair and the interface statistics
//! but makes no scheduling decisions; that is the pump's job.
//!
//! Every entry point here is non-blocking so it can be called straight
//! from the USB completion context.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::frame::NetworkFrame;
use super::link::LinkStateMachine;
use super::notifier::{BridgeEvent, EventNotifier};
use super::queue::FrameQueue;
use super::stats::{InterfaceStats, StatsSnapshot};
use crate::error::BridgeError;

/// Frames discarded when a session stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrainReport {
    pub rx_discarded: usize,
    pub tx_discarded: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.rx_discarded + self.tx_discarded
    }

    pub fn merge(self, other: DrainReport) -> Self {
        Self {
            rx_discarded: self.rx_discarded + other.rx_discarded,
            tx_discarded: self.tx_discarded + other.tx_discarded,
        }
    }
}

pub struct TransportAdapter<'a, M: RawMutex, const N: usize> {
    rx: FrameQueue<M, N>,
    tx: FrameQueue<M, N>,
    stats: InterfaceStats,
    /// Link down-edge count when the queues were last opened.
    opened_at: AtomicU32,
    link: &'a LinkStateMachine<'a, M>,
    notifier: &'a EventNotifier<M>,
}

impl<'a, M: RawMutex, const N: usize> TransportAdapter<'a, M, N> {
    pub fn new(
        link: &'a LinkStateMachine<'a, M>,
        notifier: &'a EventNotifier<M>,
        rx_capacity: usize,
        tx_capacity: usize,
    ) -> Self {
        Self {
            rx: FrameQueue::new(rx_capacity),
            tx: FrameQueue::new(tx_capacity),
            stats: InterfaceStats::new(),
            opened_at: AtomicU32::new(link.down_edges()),
            link,
            notifier,
        }
    }

    pub fn link(&self) -> &'a LinkStateMachine<'a, M> {
        self.link
    }

    pub fn rx_queue(&self) -> &FrameQueue<M, N> {
        &self.rx
    }

    pub fn tx_queue(&self) -> &FrameQueue<M, N> {
        &self.tx
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn counters(&self) -> &InterfaceStats {
        &self.stats
    }

    /// Inbound payload from the USB OUT endpoint.
    ///
    /// Oversized payloads are refused before touching the queue; frames
    /// offered while the link is not Up are counted and dropped.
    pub fn submit_received(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        let frame = match NetworkFrame::from_slice(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.rx_oversized();
                return Err(e);
            }
        };
        if !self.link.is_up() {
            self.stats.rx_not_ready();
            return Err(BridgeError::LinkNotReady);
        }
        match self.rx.push_back(frame) {
            Ok(()) => Ok(()),
            Err(BridgeError::Congested) => {
                self.stats.rx_congested();
                self.notifier.publish(BridgeEvent::Congested);
                Err(BridgeError::Congested)
            }
            Err(e) => {
                self.stats.rx_not_ready();
                Err(e)
            }
        }
    }

    /// Outbound frame from the IP stack (its frame-output callback).
    pub fn submit_transmit(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        let frame = match NetworkFrame::from_slice(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.tx_oversized();
                return Err(e);
            }
        };
        if !self.link.is_up() {
            self.stats.tx_not_ready();
            return Err(BridgeError::LinkNotReady);
        }
        match self.tx.push_back(frame) {
            Ok(()) => Ok(()),
            Err(BridgeError::Congested) => {
                self.stats.tx_congested();
                self.notifier.publish(BridgeEvent::Congested);
                Err(BridgeError::Congested)
            }
            Err(e) => {
                self.stats.tx_not_ready();
                Err(e)
            }
        }
    }

    /// Next received frame for the IP stack.
    pub fn take_received(&self) -> Option<NetworkFrame> {
        self.rx.pop_front()
    }

    /// Next frame for the USB IN endpoint; its queue slot stays reserved
    /// until [`Self::mark_transmit_complete`] or [`Self::requeue_transmit`].
    pub fn take_next_to_transmit(&self) -> Option<NetworkFrame> {
        self.tx.take_reserved()
    }

    /// The USB transmit path accepted `frame`.
    pub fn mark_transmit_complete(&self, frame: NetworkFrame) {
        self.tx.complete_reserved();
        self.stats.tx_frame();
        drop(frame);
    }

    /// The USB transmit path was busy; put `frame` back at the head.
    pub fn requeue_transmit(&self, frame: NetworkFrame) -> Result<(), BridgeError> {
        self.stats.tx_busy_retry();
        self.tx.requeue_front(frame)
    }

    /// Allocate the queue pair for a new session.
    ///
    /// Frames still queued from before the link last went Down belong to a
    /// dead session: they are discarded, counted as drained and reported.
    /// Opening again within the same link session keeps what is queued.
    pub fn open(&self) -> DrainReport {
        let downs = self.link.down_edges();
        let stale = if self.opened_at.swap(downs, Ordering::AcqRel) != downs {
            self.drain()
        } else {
            DrainReport::default()
        };
        self.rx.open();
        self.tx.open();
        stale
    }

    /// Close both queues, discarding everything still queued.
    pub fn drain(&self) -> DrainReport {
        let report = DrainReport {
            rx_discarded: self.rx.close_and_drain(),
            tx_discarded: self.tx.close_and_drain(),
        };
        self.stats.drained(report.total());
        report
    }
}
