//! Bridge pump - moves frames between the queue pair and the IP stack.
//!
//! One pump per interface, running in the network task.  Each cycle does
//! at most one receive hand-off and one transmit hand-off so neither
//! direction can starve the other, and re-checks the link after every
//! hand-off so a Down transition is observed within one cycle.
//!
//! When the link leaves Up the pump finishes the hand-off in progress,
//! drains both queues and returns a [`DrainReport`] as its stop
//! acknowledgement.

use core::convert::Infallible;
use core::future;

use embassy_futures::select::{select, select3, Either, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::link::LinkState;
use super::notifier::{BridgeEvent, EventNotifier};
use super::registry::{InterfaceHandle, InterfaceRegistry};
use super::transport::{DrainReport, TransportAdapter};
use super::{FrameSink, IpStack};
use crate::error::BridgeError;

pub struct BridgePump<'a, M: RawMutex, const N: usize> {
    adapter: &'a TransportAdapter<'a, M, N>,
    notifier: &'a EventNotifier<M>,
    /// Last submit came back busy; wait for the sink's ready signal.
    tx_blocked: bool,
}

impl<'a, M: RawMutex, const N: usize> BridgePump<'a, M, N> {
    pub fn new(adapter: &'a TransportAdapter<'a, M, N>, notifier: &'a EventNotifier<M>) -> Self {
        Self {
            adapter,
            notifier,
            tx_blocked: false,
        }
    }

    /// Serve the interface forever: bring it up whenever the USB side
    /// mounts, pump frames while Up, drain on Down.
    ///
    /// Returns only on a configuration error, after forcing the link Down.
    pub async fn run<D: IpStack, K: FrameSink, const R: usize>(
        &mut self,
        registry: &mut InterfaceRegistry<'_, M, D, R>,
        handle: InterfaceHandle,
        sink: &mut K,
    ) -> Result<Infallible, BridgeError> {
        let link = self.adapter.link();
        loop {
            while link.state() == LinkState::Down {
                link.wait_change().await;
            }

            if link.state() == LinkState::Configuring {
                match registry.start(handle, link) {
                    Ok(()) => {}
                    // The USB side moved the link under us; re-evaluate.
                    Err(e) if e.is_transient() || link.state() != LinkState::Configuring => {
                        continue
                    }
                    Err(e) => {
                        error!("pump: interface start failed: {}", e);
                        link.on_driver_error();
                        return Err(e);
                    }
                }
            }

            if !link.is_up() {
                continue;
            }

            let stack = registry.driver_mut(handle)?;
            self.run_session(stack, sink).await;
        }
    }

    /// Pump frames until the link leaves Up, then drain.
    ///
    /// The report covers every frame this session discarded, including
    /// leftovers found when it opened the queues.
    pub async fn run_session<S: IpStack, K: FrameSink>(
        &mut self,
        stack: &mut S,
        sink: &mut K,
    ) -> DrainReport {
        let link = self.adapter.link();
        let stale = self.adapter.open();
        if stale.total() > 0 {
            debug!("pump: discarded {} frames queued before the last link edge", stale.total());
        }
        self.tx_blocked = false;
        info!("pump: session started");

        while link.is_up() {
            let rx_done = self.service_rx(stack);
            if !link.is_up() {
                break;
            }
            let tx_done = self.service_tx(sink).await;
            stack.poll();
            if !(rx_done || tx_done) {
                self.idle(sink).await;
            }
        }

        let report = self.adapter.drain().merge(stale);
        info!(
            "pump: session stopped, discarded {} rx / {} tx",
            report.rx_discarded,
            report.tx_discarded
        );
        report
    }

    /// Hand one received frame to the IP stack.
    fn service_rx<S: IpStack>(&mut self, stack: &mut S) -> bool {
        if !self.adapter.link().is_up() {
            return false;
        }
        let Some(frame) = self.adapter.take_received() else {
            return false;
        };
        match stack.input(frame) {
            Ok(()) => self.adapter.counters().rx_frame(),
            Err(_) => {
                debug!("pump: IP stack rejected malformed frame");
                self.adapter.counters().rx_malformed();
                self.notifier.publish(BridgeEvent::MalformedFrame);
            }
        }
        true
    }

    /// Submit one queued frame to the USB transmit path.
    async fn service_tx<K: FrameSink>(&mut self, sink: &mut K) -> bool {
        if self.tx_blocked {
            // Only look; parking on the sink is idle()'s job, where a
            // received frame or a link change can still wake us.
            if let Either::Second(()) = select(sink.ready(), future::ready(())).await {
                return false;
            }
            self.tx_blocked = false;
        }

        let Some(frame) = self.adapter.take_next_to_transmit() else {
            return false;
        };
        match sink.submit(frame.as_slice()).await {
            Ok(()) => self.adapter.mark_transmit_complete(frame),
            Err(_) => {
                trace!("pump: transmit busy, requeueing");
                self.tx_blocked = true;
                if self.adapter.requeue_transmit(frame).is_err() {
                    debug!("pump: in-flight frame dropped, queue closed");
                }
            }
        }
        true
    }

    /// Park until there is something to do.
    async fn idle<K: FrameSink>(&mut self, sink: &mut K) {
        let link = self.adapter.link();
        let rx = self.adapter.rx_queue();
        if self.tx_blocked {
            if let Either3::Second(()) =
                select3(rx.wait_ready(), sink.ready(), link.wait_change()).await
            {
                self.tx_blocked = false;
            }
        } else {
            let tx = self.adapter.tx_queue();
            select3(rx.wait_ready(), tx.wait_ready(), link.wait_change()).await;
        }
    }
}
