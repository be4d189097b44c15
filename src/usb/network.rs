//! CDC-NCM glue between the USB endpoints and the bridge.
//!
//! The receive loop is the USB completion context: it hands every datagram
//! to [`TransportAdapter::submit_received`](usbnet::bridge::TransportAdapter::submit_received)
//! and never waits on the bridge.
//!
//! Transmit is split in two.  [`NcmSink`] is the pump's side of a one-slot
//! channel; [`transmit_loop`] owns the IN endpoint and empties the slot one
//! transfer at a time, so a host that stops reading stalls only this loop.

use defmt::{debug, info, trace, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_usb::class::cdc_ncm::{Receiver, Sender};
use embassy_usb::driver::EndpointError;

use usbnet::bridge::{SlotSink, TransmitSlot};

use super::device::UsbDriver;
use crate::Adapter;

pub type NcmReceiver = Receiver<'static, UsbDriver>;
pub type NcmSender = Sender<'static, UsbDriver>;

pub type TxSlot = TransmitSlot<CriticalSectionRawMutex>;

/// The pump's view of the NCM transmit path.
pub type NcmSink = SlotSink<'static, CriticalSectionRawMutex>;

/// Large enough for any datagram in one NTB, so oversized frames reach
/// the adapter and are counted there.
const RX_BUF_LEN: usize = 2048;

/// Forward host datagrams to the bridge forever.
pub async fn receive_loop(mut receiver: NcmReceiver, adapter: &'static Adapter) -> ! {
    let mut buf = [0u8; RX_BUF_LEN];
    loop {
        if receiver.wait_connection().await.is_err() {
            continue;
        }
        info!("ncm: host connected");

        loop {
            match receiver.read_packet(&mut buf).await {
                Ok(n) => {
                    if let Err(e) = adapter.submit_received(&buf[..n]) {
                        trace!("ncm: rx dropped ({})", e);
                    }
                }
                Err(EndpointError::BufferOverflow) => {
                    warn!("ncm: datagram exceeds receive buffer");
                }
                Err(EndpointError::Disabled) => {
                    // Data interface switched off while still configured:
                    // the host reset the function.
                    if adapter.link().on_host_reset() {
                        info!("ncm: host reset the interface");
                    }
                    break;
                }
            }
        }
    }
}

/// Write frames from `slot` to the IN endpoint forever.
pub async fn transmit_loop(mut sender: NcmSender, slot: &'static TxSlot) -> ! {
    loop {
        let frame = slot.receive().await;
        if let Err(e) = sender.write_packet(frame.as_slice()).await {
            // Disabled while the host is away; the frame is lost like any
            // other in flight at a link edge.
            debug!("ncm: tx write failed ({})", e);
        }
    }
}
