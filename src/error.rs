//! Unified error type for the network bridge.
//!
//! We avoid `alloc` - every variant is a fieldless tag so the enum stays
//! `Copy` and can be returned from the USB completion context for free.
//! Implements `defmt::Format` for efficient on-target logging.

use core::fmt;

/// Top-level error type used across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeError {
    // Per-frame conditions (counted, never escalated)
    /// The target frame queue is full; the frame was dropped.
    Congested,

    /// A frame was offered while the link is not Up; the frame was dropped.
    LinkNotReady,

    /// The IP stack rejected the frame as malformed.
    MalformedFrame,

    /// The payload exceeds the maximum transfer unit.
    FrameTooLarge,

    /// The USB transmit path could not take the frame right now.
    TransmitBusy,

    // Configuration-time errors (fatal to interface construction)
    /// Hardware address or IPv4 addressing is malformed.
    InvalidAddress,

    /// Addressing or start requested in a state that does not allow it.
    NotConfigurable,

    /// A driver is already bound to this interface.
    AlreadyAttached,

    /// The handle does not name a registered interface.
    UnknownInterface,

    /// Every registry slot is taken.
    RegistryFull,
}

impl BridgeError {
    /// Per-frame conditions are absorbed locally; everything else is a
    /// programming error that must stop the interface from reaching Up.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            BridgeError::Congested
                | BridgeError::LinkNotReady
                | BridgeError::MalformedFrame
                | BridgeError::FrameTooLarge
                | BridgeError::TransmitBusy
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BridgeError::Congested => "frame queue full",
            BridgeError::LinkNotReady => "link not ready",
            BridgeError::MalformedFrame => "malformed frame",
            BridgeError::FrameTooLarge => "frame exceeds MTU",
            BridgeError::TransmitBusy => "transmit path busy",
            BridgeError::InvalidAddress => "invalid address",
            BridgeError::NotConfigurable => "interface not configurable in current state",
            BridgeError::AlreadyAttached => "driver already attached",
            BridgeError::UnknownInterface => "unknown interface handle",
            BridgeError::RegistryFull => "interface registry full",
        };
        f.write_str(msg)
    }
}

/// Rejection returned by [`crate::bridge::IpStack::input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Malformed;

/// Rejection returned by [`crate::bridge::FrameSink::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransmitBusy;

// Convenience conversions

impl From<Malformed> for BridgeError {
    fn from(_: Malformed) -> Self {
        BridgeError::MalformedFrame
    }
}

impl From<TransmitBusy> for BridgeError {
    fn from(_: TransmitBusy) -> Self {
        BridgeError::TransmitBusy
    }
}
