//! Network frames and hardware addresses.
//!
//! Frame layout (Ethernet II, no FCS):
//! ```text
//! Byte 0-5:   Destination MAC
//! Byte 6-11:  Source MAC
//! Byte 12-13: EtherType (big-endian)
//! Byte 14-:   Payload
//! ```

use core::fmt;

use heapless::Vec;

use crate::config::MTU;
use crate::error::BridgeError;

/// Ethernet II header length in bytes.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Smallest EtherType value; anything below is an 802.3 length field.
const ETHERTYPE_MIN: u16 = 0x0600;

/// One owned Ethernet frame, at most [`MTU`] bytes.
///
/// Deliberately not `Clone`: a frame moves from producer to consumer
/// exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct NetworkFrame {
    data: Vec<u8, MTU>,
}

impl NetworkFrame {
    /// Copy `bytes` into a new frame.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, BridgeError> {
        let data = Vec::from_slice(bytes).map_err(|_| BridgeError::FrameTooLarge)?;
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Parse the Ethernet II header, if the frame carries one.
    pub fn ethernet_header(&self) -> Option<EthernetHeader> {
        EthernetHeader::parse(&self.data)
    }
}

impl AsRef<[u8]> for NetworkFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Decoded Ethernet II header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Returns `None` for runt frames and 802.3 length-field frames.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        let ethertype = u16::from_be_bytes([data[12], data[13]]);
        if ethertype < ETHERTYPE_MIN {
            return None;
        }
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&data[0..6]);
        source.copy_from_slice(&data[6..12]);
        Some(Self {
            destination: MacAddress(destination),
            source: MacAddress(source),
            ethertype,
        })
    }
}

/// 48-bit hardware address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Group bit (bit 0 of the first octet).
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// U/L bit (bit 1 of the first octet): not assigned by a registry.
    pub const fn is_locally_administered(&self) -> bool {
        self.0[0] & 0x02 != 0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MacAddress {
    fn format(&self, f: defmt::Formatter) {
        let [a, b, c, d, e, g] = self.0;
        defmt::write!(
            f,
            "{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}",
            a,
            b,
            c,
            d,
            e,
            g
        )
    }
}
