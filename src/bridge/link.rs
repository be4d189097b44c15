//! Link state machine.
//!
//! ```text
//!          on_usb_mount            on_driver_ready
//!   Down ───────────────► Configuring ───────────────► Up
//!    ▲                         │                        │
//!    └─────────────────────────┴────────────────────────┘
//!          on_usb_unmount / on_driver_error / on_host_reset
//! ```
//!
//! The state lives in an atomic so the USB completion context can read it
//! without locking.  Every transition is a compare-and-swap, which keeps
//! LinkUp / LinkDown to exactly one event per edge even when both contexts
//! race.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use super::notifier::{BridgeEvent, EventNotifier};
use crate::error::BridgeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LinkState {
    Down = 0,
    Configuring = 1,
    Up = 2,
}

impl LinkState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LinkState::Configuring,
            2 => LinkState::Up,
            _ => LinkState::Down,
        }
    }
}

pub struct LinkStateMachine<'a, M: RawMutex> {
    state: AtomicU8,
    /// Number of edges into Down; wraps.
    down_edges: AtomicU32,
    changed: Signal<M, ()>,
    notifier: &'a EventNotifier<M>,
}

impl<'a, M: RawMutex> LinkStateMachine<'a, M> {
    pub const fn new(notifier: &'a EventNotifier<M>) -> Self {
        Self {
            state: AtomicU8::new(LinkState::Down as u8),
            down_edges: AtomicU32::new(0),
            changed: Signal::new(),
            notifier,
        }
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_up(&self) -> bool {
        self.state() == LinkState::Up
    }

    /// How many times the link has gone Down.  Anything stamped with an
    /// older value predates the last Down edge.
    pub fn down_edges(&self) -> u32 {
        self.down_edges.load(Ordering::Acquire)
    }

    fn transition(&self, from: LinkState, to: LinkState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!("link: {} -> {}", from, to);
            self.changed.signal(());
        }
        moved
    }

    /// USB device configured by the host.
    ///
    /// Returns `false` if the link was not Down (nothing changes).
    pub fn on_usb_mount(&self) -> bool {
        self.transition(LinkState::Down, LinkState::Configuring)
    }

    /// Network driver attached and addressing applied.
    pub fn on_driver_ready(&self) -> Result<(), BridgeError> {
        if self.transition(LinkState::Configuring, LinkState::Up) {
            info!("link up");
            self.notifier.publish(BridgeEvent::LinkUp);
            Ok(())
        } else {
            warn!("driver ready while link {}", self.state());
            Err(BridgeError::LinkNotReady)
        }
    }

    /// USB device unmounted or deconfigured.
    pub fn on_usb_unmount(&self) -> bool {
        self.go_down()
    }

    /// Network driver failed during setup or operation.
    pub fn on_driver_error(&self) -> bool {
        self.go_down()
    }

    /// Host reset the interface: tear the link down and start configuring
    /// again.  A link that is already Down stays Down until mounted.
    pub fn on_host_reset(&self) -> bool {
        if self.go_down() {
            self.on_usb_mount()
        } else {
            false
        }
    }

    fn go_down(&self) -> bool {
        let prev = LinkState::from_u8(self.state.swap(LinkState::Down as u8, Ordering::AcqRel));
        if prev == LinkState::Down {
            return false;
        }
        self.down_edges.fetch_add(1, Ordering::AcqRel);
        info!("link down (was {})", prev);
        self.changed.signal(());
        self.notifier.publish(BridgeEvent::LinkDown);
        true
    }

    /// Wait for the next transition.  May return spuriously; callers
    /// re-check [`Self::state`].
    ///
    /// `changed` is a single-waiter signal owned by the bridge pump.  A
    /// second waiter would steal its wakeups, so this stays crate-private;
    /// other tasks follow the link through [`BridgeEvent`]s.
    pub(crate) async fn wait_change(&self) {
        self.changed.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn drain(sub: &mut crate::bridge::EventSubscriber<'_, NoopRawMutex>) -> heapless::Vec<BridgeEvent, 8> {
        core::iter::from_fn(|| sub.try_next_message_pure()).collect()
    }

    #[test]
    fn starts_down() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let link = LinkStateMachine::new(&notifier);
        assert_eq!(link.state(), LinkState::Down);
        assert!(!link.is_up());
    }

    #[test]
    fn mount_then_ready_reaches_up_once() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let mut sub = notifier.subscribe().unwrap();
        let link = LinkStateMachine::new(&notifier);

        assert!(link.on_usb_mount());
        assert_eq!(link.state(), LinkState::Configuring);
        assert!(link.on_driver_ready().is_ok());
        assert!(link.is_up());
        assert_eq!(link.on_driver_ready(), Err(BridgeError::LinkNotReady));

        assert_eq!(drain(&mut sub).as_slice(), &[BridgeEvent::LinkUp]);
    }

    #[test]
    fn ready_before_mount_is_rejected() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let link = LinkStateMachine::new(&notifier);
        assert_eq!(link.on_driver_ready(), Err(BridgeError::LinkNotReady));
        assert_eq!(link.state(), LinkState::Down);
    }

    #[test]
    fn second_mount_is_ignored() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let link = LinkStateMachine::new(&notifier);
        assert!(link.on_usb_mount());
        assert!(!link.on_usb_mount());
        assert_eq!(link.state(), LinkState::Configuring);
    }

    #[test]
    fn unmount_emits_link_down_once() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let mut sub = notifier.subscribe().unwrap();
        let link = LinkStateMachine::new(&notifier);

        link.on_usb_mount();
        link.on_driver_ready().unwrap();
        assert!(link.on_usb_unmount());
        assert!(!link.on_usb_unmount());
        assert!(!link.on_driver_error());

        assert_eq!(
            drain(&mut sub).as_slice(),
            &[BridgeEvent::LinkUp, BridgeEvent::LinkDown]
        );
    }

    #[test]
    fn setup_failure_returns_to_down() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let mut sub = notifier.subscribe().unwrap();
        let link = LinkStateMachine::new(&notifier);

        link.on_usb_mount();
        assert!(link.on_driver_error());
        assert_eq!(link.state(), LinkState::Down);
        assert_eq!(drain(&mut sub).as_slice(), &[BridgeEvent::LinkDown]);
    }

    #[test]
    fn host_reset_restarts_configuration() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let mut sub = notifier.subscribe().unwrap();
        let link = LinkStateMachine::new(&notifier);

        assert!(!link.on_host_reset());
        assert_eq!(link.state(), LinkState::Down);

        link.on_usb_mount();
        link.on_driver_ready().unwrap();
        assert!(link.on_host_reset());
        assert_eq!(link.state(), LinkState::Configuring);
        assert_eq!(
            drain(&mut sub).as_slice(),
            &[BridgeEvent::LinkUp, BridgeEvent::LinkDown]
        );
    }

    #[test]
    fn down_edges_count_each_edge_once() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let link = LinkStateMachine::new(&notifier);
        assert_eq!(link.down_edges(), 0);

        link.on_usb_unmount();
        assert_eq!(link.down_edges(), 0);

        link.on_usb_mount();
        link.on_driver_ready().unwrap();
        link.on_host_reset();
        assert_eq!(link.down_edges(), 1);
        link.on_driver_error();
        link.on_usb_unmount();
        assert_eq!(link.down_edges(), 2);
    }
}
