//! One-slot transmit hand-off.
//!
//! [`SlotSink`] is the pump's side of a single-frame channel; a writer task
//! on the other side owns the USB IN endpoint and empties the slot one
//! transfer at a time.  While the writer is busy the slot stays full and
//! `submit` reports [`TransmitBusy`], so a host that stops reading stalls
//! the writer and never the pump.

use core::future::poll_fn;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

use super::frame::NetworkFrame;
use super::FrameSink;
use crate::error::TransmitBusy;

/// Frame slot shared between the pump and the endpoint writer.
pub type TransmitSlot<M> = Channel<M, NetworkFrame, 1>;

pub struct SlotSink<'a, M: RawMutex> {
    slot: &'a TransmitSlot<M>,
}

impl<'a, M: RawMutex> SlotSink<'a, M> {
    pub fn new(slot: &'a TransmitSlot<M>) -> Self {
        Self { slot }
    }
}

impl<M: RawMutex> FrameSink for SlotSink<'_, M> {
    async fn ready(&mut self) {
        poll_fn(|cx| self.slot.poll_ready_to_send(cx)).await
    }

    async fn submit(&mut self, frame: &[u8]) -> Result<(), TransmitBusy> {
        // Frames come off the bridge queue, so they always fit.
        let Ok(frame) = NetworkFrame::from_slice(frame) else {
            warn!("sink: frame over MTU dropped");
            return Ok(());
        };
        self.slot.try_send(frame).map_err(|_| {
            trace!("sink: writer busy");
            TransmitBusy
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::select::{select, Either};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn frame(tag: u8) -> [u8; 20] {
        let mut f = [0u8; 20];
        f[14] = tag;
        f
    }

    #[test]
    fn second_frame_is_busy_until_writer_takes_the_first() {
        let slot = TransmitSlot::<NoopRawMutex>::new();
        let mut sink = SlotSink::new(&slot);

        assert_eq!(block_on(sink.submit(&frame(1))), Ok(()));
        assert_eq!(block_on(sink.submit(&frame(2))), Err(TransmitBusy));

        let taken = slot.try_receive().unwrap();
        assert_eq!(taken.as_slice()[14], 1);
        assert_eq!(block_on(sink.submit(&frame(2))), Ok(()));
    }

    #[test]
    fn ready_waits_for_a_free_slot() {
        let slot = TransmitSlot::<NoopRawMutex>::new();
        let mut sink = SlotSink::new(&slot);

        block_on(sink.ready());
        block_on(sink.submit(&frame(1))).unwrap();

        let full = block_on(select(sink.ready(), core::future::ready(())));
        assert!(matches!(full, Either::Second(())));

        slot.try_receive().unwrap();
        let freed = block_on(select(sink.ready(), core::future::ready(())));
        assert!(matches!(freed, Either::First(())));
    }
}
