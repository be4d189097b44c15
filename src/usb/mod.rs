//! USB Device subsystem - presents a composite network device to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb`.  Which functions the device exposes is decided at
//! start-up from [`usbnet::config::UsbFunctions`]:
//!
//! - CDC-NCM: Ethernet frames to and from the bridge
//! - CDC-ACM: serial echo console
//!
//! Both share the device and the log; only the NCM function talks to the
//! bridge.

pub mod device;
pub mod network;
pub mod serial;
