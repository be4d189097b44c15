//! Event notifier - fans bridge events out to any number of observers.
//!
//! Publishing is fire-and-forget: a subscriber that falls behind loses the
//! oldest events instead of stalling the publisher.  Events from a single
//! publisher arrive in order; there is no ordering across publishers.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pubsub::{Error as PubSubError, PubSubChannel, Subscriber};

use super::registry::InterfaceAddressing;
use crate::config::{EVENT_QUEUE_DEPTH, EVENT_SUBSCRIBERS};

/// Events published by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeEvent {
    /// Link reached Up; frames flow.
    LinkUp,
    /// Link went Down; queued frames are discarded.
    LinkDown,
    /// Addressing was applied to the IP stack.
    AddressAcquired(InterfaceAddressing),
    /// A frame was dropped because a queue was full.
    Congested,
    /// The IP stack rejected a received frame.
    MalformedFrame,
}

/// Subscription handle returned by [`EventNotifier::subscribe`].
pub type EventSubscriber<'a, M> =
    Subscriber<'a, M, BridgeEvent, EVENT_QUEUE_DEPTH, EVENT_SUBSCRIBERS, 0>;

pub struct EventNotifier<M: RawMutex> {
    channel: PubSubChannel<M, BridgeEvent, EVENT_QUEUE_DEPTH, EVENT_SUBSCRIBERS, 0>,
}

impl<M: RawMutex> EventNotifier<M> {
    pub const fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    /// Publish without waiting for subscribers.
    pub fn publish(&self, event: BridgeEvent) {
        trace!("bridge event: {}", event);
        self.channel.immediate_publisher().publish_immediate(event);
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Result<EventSubscriber<'_, M>, PubSubError> {
        self.channel.subscriber()
    }
}

impl<M: RawMutex> Default for EventNotifier<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn every_subscriber_sees_every_event_in_order() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let mut a = notifier.subscribe().unwrap();
        let mut b = notifier.subscribe().unwrap();

        notifier.publish(BridgeEvent::LinkUp);
        notifier.publish(BridgeEvent::Congested);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.try_next_message_pure(), Some(BridgeEvent::LinkUp));
            assert_eq!(sub.try_next_message_pure(), Some(BridgeEvent::Congested));
            assert_eq!(sub.try_next_message_pure(), None);
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_block() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        for _ in 0..(EVENT_QUEUE_DEPTH * 3) {
            notifier.publish(BridgeEvent::MalformedFrame);
        }
    }

    #[test]
    fn lagging_subscriber_keeps_newest_events() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let mut sub = notifier.subscribe().unwrap();

        notifier.publish(BridgeEvent::LinkUp);
        for _ in 0..EVENT_QUEUE_DEPTH {
            notifier.publish(BridgeEvent::Congested);
        }
        notifier.publish(BridgeEvent::LinkDown);

        let mut last = None;
        while let Some(event) = sub.try_next_message_pure() {
            assert_ne!(event, BridgeEvent::LinkUp);
            last = Some(event);
        }
        assert_eq!(last, Some(BridgeEvent::LinkDown));
    }

    #[test]
    fn subscriber_limit_is_enforced() {
        let notifier = EventNotifier::<NoopRawMutex>::new();
        let _subs: heapless::Vec<_, EVENT_SUBSCRIBERS> = (0..EVENT_SUBSCRIBERS)
            .map(|_| notifier.subscribe().unwrap())
            .collect();
        assert!(notifier.subscribe().is_err());
    }
}
