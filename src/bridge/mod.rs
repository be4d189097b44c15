//! USB-to-IP network bridge.
//!
//! Presents a USB network-class endpoint to the host and a packet
//! interface to the local IP stack, across two execution contexts:
//!
//! - **USB completion context** - short, never waits.  Calls
//!   [`TransportAdapter::submit_received`] and the link's mount/unmount
//!   hooks.
//! - **Network task** - runs the [`BridgePump`], owns the
//!   [`InterfaceRegistry`] and the IP stack.
//!
//! The only state shared between them is the bounded [`FrameQueue`] pair
//! and the link's atomic state.
//!
//! ```text
//! USB OUT ─► TransportAdapter.rx ─► BridgePump ─► IpStack::input
//! USB IN  ◄─ FrameSink ◄─ BridgePump ◄─ TransportAdapter.tx ◄─ IP output
//! ```

pub mod frame;
pub mod link;
pub mod notifier;
pub mod pump;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod stats;
pub mod transport;


pub use frame::{EthernetHeader, MacAddress, NetworkFrame};
pub use link::{LinkState, LinkStateMachine};
pub use notifier::{BridgeEvent, EventNotifier, EventSubscriber};
pub use pump::BridgePump;
pub use queue::FrameQueue;
pub use registry::{
    InterfaceAddressing, InterfaceHandle, InterfaceIdentity, InterfaceRegistry, InterfaceSnapshot,
};
pub use sink::{SlotSink, TransmitSlot};
pub use stats::{InterfaceStats, StatsSnapshot};
pub use transport::{DrainReport, TransportAdapter};

use crate::error::{Malformed, TransmitBusy};

/// The local IP stack as seen by the bridge.
///
/// Frames the stack wants to send go back through
/// [`TransportAdapter::submit_transmit`].
pub trait IpStack {
    /// Inject one received frame.
    fn input(&mut self, frame: NetworkFrame) -> Result<(), Malformed>;

    /// Hardware address of the interface; called once on attach.
    fn set_mac(&mut self, mac: MacAddress);

    /// IPv4 configuration; called before the interface serves traffic and
    /// again on every address change.
    fn set_ip_info(&mut self, addressing: &InterfaceAddressing);

    /// Service timers and local sockets; called once per pump cycle.
    fn poll(&mut self) {}
}

/// The USB transmit path.
#[allow(async_fn_in_trait)]
pub trait FrameSink {
    /// Resolves once the transport can take another frame.
    async fn ready(&mut self);

    /// Submit one frame to the IN endpoint.
    async fn submit(&mut self, frame: &[u8]) -> Result<(), TransmitBusy>;
}
