//! Application-wide constants and start-up configuration.
//!
//! All USB identifiers, buffer sizes and default network parameters live
//! here so they can be tuned in one place.  Which USB functions the device
//! exposes is decided at start-up from [`UsbFunctions`] rather than by
//! conditional compilation.

use core::net::Ipv4Addr;

use crate::bridge::{InterfaceAddressing, InterfaceIdentity, MacAddress};
use crate::error::BridgeError;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "usbnet";
pub const USB_PRODUCT: &str = "USB Network Bridge";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// Max packet size for the CDC-ACM and CDC-NCM bulk endpoints
/// (full-speed device).
pub const USB_BULK_PACKET_SIZE: u16 = 64;

/// CDC-ACM receive buffer (one bulk packet).
pub const SERIAL_RX_BUF_SIZE: usize = USB_BULK_PACKET_SIZE as usize;

// Network

/// Maximum transfer unit: one Ethernet frame without FCS.
pub const MTU: usize = 1514;

/// Compile-time storage of each frame queue (frames).
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Maximum number of interfaces the registry can hold.
pub const MAX_INTERFACES: usize = 2;

/// Event notifier sizing.
pub const EVENT_QUEUE_DEPTH: usize = 8;
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Hardware address given to the host side of the NCM link.
///
/// Locally administered (bit 1 of the first octet set).
pub const HOST_MAC: [u8; 6] = [0x02, 0x02, 0x84, 0x6A, 0x96, 0x00];

/// Hardware address of the device-side (IP stack) interface.
pub const DEVICE_MAC: [u8; 6] = [0x02, 0x02, 0x84, 0x6A, 0x96, 0x01];

/// Static addressing of the device-side interface.
pub const DEVICE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 7, 1);
pub const DEVICE_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const DEVICE_GATEWAY: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Interface key / description / route priority.
pub const INTERFACE_KEY: &str = "usb_ncm";
pub const INTERFACE_DESCRIPTION: &str = "USB CDC-NCM network bridge";
pub const INTERFACE_ROUTE_PRIORITY: i32 = 10;

// Status page

/// TCP port of the status page on the device address.
pub const STATUS_PORT: u16 = 80;

/// Receive buffer of the status socket; a request head fits easily.
pub const STATUS_SOCKET_RX_LEN: usize = 512;

// Diagnostics

/// Period of the statistics log line (seconds).
pub const STATS_LOG_PERIOD_SECS: u64 = 30;

/// USB functions exposed by the composite device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsbFunctions {
    /// CDC-ACM serial echo console.
    pub serial: bool,
    /// CDC-NCM network interface.
    pub network: bool,
}

impl UsbFunctions {
    /// Number of USB interfaces the enabled functions claim
    /// (each CDC function uses a communication and a data interface).
    pub fn interface_count(&self) -> usize {
        2 * (usize::from(self.serial) + usize::from(self.network))
    }

    /// More than one function needs interface association descriptors.
    pub fn is_composite(&self) -> bool {
        self.serial && self.network
    }
}

impl Default for UsbFunctions {
    fn default() -> Self {
        Self {
            serial: true,
            network: true,
        }
    }
}

/// Everything needed to bring the device up: enabled functions plus the
/// network interface parameters.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub functions: UsbFunctions,
    pub host_mac: MacAddress,
    pub device_mac: MacAddress,
    pub addressing: InterfaceAddressing,
    pub rx_queue_capacity: usize,
    pub tx_queue_capacity: usize,
}

impl DeviceConfig {
    /// Build the immutable identity of the network interface.
    pub fn identity(&self) -> Result<InterfaceIdentity, BridgeError> {
        InterfaceIdentity::new(
            INTERFACE_KEY,
            INTERFACE_DESCRIPTION,
            self.device_mac,
            INTERFACE_ROUTE_PRIORITY,
        )
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            functions: UsbFunctions::default(),
            host_mac: MacAddress::new(HOST_MAC),
            device_mac: MacAddress::new(DEVICE_MAC),
            addressing: InterfaceAddressing::new(DEVICE_IP, DEVICE_NETMASK, DEVICE_GATEWAY),
            rx_queue_capacity: FRAME_QUEUE_DEPTH,
            tx_queue_capacity: FRAME_QUEUE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_functions_are_composite() {
        let functions = UsbFunctions::default();
        assert!(functions.is_composite());
        assert_eq!(functions.interface_count(), 4);
    }

    #[test]
    fn network_only_claims_two_interfaces() {
        let functions = UsbFunctions {
            serial: false,
            network: true,
        };
        assert!(!functions.is_composite());
        assert_eq!(functions.interface_count(), 2);
    }

    #[test]
    fn default_identity_is_valid() {
        let config = DeviceConfig::default();
        let identity = config.identity().unwrap();
        assert_eq!(identity.key(), INTERFACE_KEY);
        assert_eq!(identity.mac(), MacAddress::new(DEVICE_MAC));
        assert!(config.addressing.validate().is_ok());
    }

    #[test]
    fn host_and_device_macs_differ() {
        assert_ne!(HOST_MAC, DEVICE_MAC);
        assert!(MacAddress::new(HOST_MAC).is_locally_administered());
    }
}
