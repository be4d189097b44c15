//! Interface registry - identity and addressing of each logical network
//! interface.
//!
//! The registry is the only writer of [`InterfaceAddressing`].  It lives
//! in the network task; everyone else sees addressing through
//! [`InterfaceSnapshot`]s or `AddressAcquired` events, never through a
//! live reference.
//!
//! Canonical bring-up order:
//! `create` → `attach_driver` → (`set_ip_info`) → `start`.

use core::fmt;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{String, Vec};

use super::frame::MacAddress;
use super::link::{LinkState, LinkStateMachine};
use super::notifier::{BridgeEvent, EventNotifier};
use super::IpStack;
use crate::error::BridgeError;

/// Maximum length of an interface key.
pub const KEY_LEN: usize = 16;

/// Maximum length of an interface description.
pub const DESCRIPTION_LEN: usize = 32;

/// Immutable identity of a network interface.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceIdentity {
    key: String<KEY_LEN>,
    description: String<DESCRIPTION_LEN>,
    mac: MacAddress,
    route_priority: i32,
}

fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl InterfaceIdentity {
    /// Key and description are truncated to fit.
    ///
    /// The hardware address must be a unicast, locally administered
    /// address so it can never collide with a vendor-assigned one.
    pub fn new(
        key: &str,
        description: &str,
        mac: MacAddress,
        route_priority: i32,
    ) -> Result<Self, BridgeError> {
        if mac.is_zero() || mac.is_multicast() || !mac.is_locally_administered() {
            return Err(BridgeError::InvalidAddress);
        }
        Ok(Self {
            key: truncated(key),
            description: truncated(description),
            mac,
            route_priority,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn route_priority(&self) -> i32 {
        self.route_priority
    }
}

/// IPv4 configuration of an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceAddressing {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl InterfaceAddressing {
    /// No address yet; waiting for acquisition.
    pub const UNSPECIFIED: InterfaceAddressing = InterfaceAddressing {
        ip: Ipv4Addr::UNSPECIFIED,
        netmask: Ipv4Addr::UNSPECIFIED,
        gateway: Ipv4Addr::UNSPECIFIED,
    };

    pub const fn new(ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask,
            gateway,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    /// Prefix length of the netmask, if it is contiguous.
    pub fn prefix_len(&self) -> Option<u8> {
        let mask = u32::from(self.netmask);
        if mask.leading_ones() + mask.trailing_zeros() == 32 {
            Some(mask.leading_ones() as u8)
        } else {
            None
        }
    }

    fn same_subnet(&self, other: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(self.ip) & mask == u32::from(other) & mask
    }

    /// Reject netmasks that are not a prefix, unusable host addresses, and
    /// gateways outside the subnet.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.is_unspecified() {
            return Ok(());
        }

        let prefix = match self.prefix_len() {
            Some(p) if p > 0 => p,
            _ => return Err(BridgeError::InvalidAddress),
        };

        let ip = self.ip;
        if ip.is_unspecified() || ip.is_multicast() || ip.is_broadcast() {
            return Err(BridgeError::InvalidAddress);
        }

        // /31 and /32 have no network or broadcast address.
        if prefix < 31 {
            let host_mask = !u32::from(self.netmask);
            let host = u32::from(ip) & host_mask;
            if host == 0 || host == host_mask {
                return Err(BridgeError::InvalidAddress);
            }
        }

        let gw = self.gateway;
        if !gw.is_unspecified() && (gw == ip || !self.same_subnet(gw)) {
            return Err(BridgeError::InvalidAddress);
        }

        Ok(())
    }
}

impl fmt::Display for InterfaceAddressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} gw {}", self.ip, self.prefix_len().unwrap_or(0), self.gateway)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InterfaceAddressing {
    fn format(&self, f: defmt::Formatter) {
        let [a, b, c, d] = self.ip.octets();
        let [g0, g1, g2, g3] = self.gateway.octets();
        defmt::write!(
            f,
            "{}.{}.{}.{}/{} gw {}.{}.{}.{}",
            a,
            b,
            c,
            d,
            self.prefix_len().unwrap_or(0),
            g0,
            g1,
            g2,
            g3
        )
    }
}

/// Opaque reference to a registered interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceHandle(u8);

/// Read-only view of an interface.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceSnapshot {
    pub identity: InterfaceIdentity,
    pub addressing: InterfaceAddressing,
    pub attached: bool,
}

struct Entry<D> {
    identity: InterfaceIdentity,
    addressing: InterfaceAddressing,
    applied: bool,
    driver: Option<D>,
}

/// Holds up to `N` interfaces and the IP-stack driver bound to each.
pub struct InterfaceRegistry<'a, M: RawMutex, D, const N: usize> {
    entries: Vec<Entry<D>, N>,
    notifier: &'a EventNotifier<M>,
}

impl<'a, M: RawMutex, D: IpStack, const N: usize> InterfaceRegistry<'a, M, D, N> {
    pub fn new(notifier: &'a EventNotifier<M>) -> Self {
        Self {
            entries: Vec::new(),
            notifier,
        }
    }

    fn entry(&self, handle: InterfaceHandle) -> Result<&Entry<D>, BridgeError> {
        self.entries
            .get(usize::from(handle.0))
            .ok_or(BridgeError::UnknownInterface)
    }

    fn entry_mut(&mut self, handle: InterfaceHandle) -> Result<&mut Entry<D>, BridgeError> {
        self.entries
            .get_mut(usize::from(handle.0))
            .ok_or(BridgeError::UnknownInterface)
    }

    /// Register a new interface.
    ///
    /// The hardware address was already checked when `identity` was built.
    pub fn create(
        &mut self,
        identity: InterfaceIdentity,
        addressing: InterfaceAddressing,
    ) -> Result<InterfaceHandle, BridgeError> {
        addressing.validate()?;

        let index = u8::try_from(self.entries.len()).map_err(|_| BridgeError::RegistryFull)?;
        self.entries
            .push(Entry {
                identity,
                addressing,
                applied: false,
                driver: None,
            })
            .map_err(|_| BridgeError::RegistryFull)?;

        info!("registry: created interface {}", index);
        Ok(InterfaceHandle(index))
    }

    /// Find an interface by key.
    pub fn lookup(&self, key: &str) -> Option<InterfaceHandle> {
        self.entries
            .iter()
            .position(|e| e.identity.key() == key)
            .and_then(|i| u8::try_from(i).ok())
            .map(InterfaceHandle)
    }

    /// Bind the IP-stack driver and hand it the hardware address.
    ///
    /// Binding is one-shot; a second call fails with `AlreadyAttached` and
    /// leaves the existing binding untouched.
    pub fn attach_driver(&mut self, handle: InterfaceHandle, mut driver: D) -> Result<(), BridgeError> {
        let entry = self.entry_mut(handle)?;
        if entry.driver.is_some() {
            warn!("registry: driver already attached to {}", handle);
            return Err(BridgeError::AlreadyAttached);
        }
        driver.set_mac(entry.identity.mac());
        entry.driver = Some(driver);
        Ok(())
    }

    /// Replace the addressing of an interface.
    ///
    /// Allowed only while the link is Configuring or Up.  When a driver is
    /// attached the addressing is applied immediately and an
    /// `AddressAcquired` event is published.
    pub fn set_ip_info(
        &mut self,
        handle: InterfaceHandle,
        addressing: InterfaceAddressing,
        link: &LinkStateMachine<'_, M>,
    ) -> Result<(), BridgeError> {
        self.entry(handle)?;
        if link.state() == LinkState::Down {
            return Err(BridgeError::NotConfigurable);
        }
        addressing.validate()?;

        let notifier = self.notifier;
        let entry = self.entry_mut(handle)?;
        entry.addressing = addressing;
        entry.applied = false;
        apply_addressing(entry, notifier);
        Ok(())
    }

    /// Finish bring-up: apply pending addressing and move the link Up.
    pub fn start(
        &mut self,
        handle: InterfaceHandle,
        link: &LinkStateMachine<'_, M>,
    ) -> Result<(), BridgeError> {
        let notifier = self.notifier;
        let entry = self.entry_mut(handle)?;
        if entry.driver.is_none() || link.state() != LinkState::Configuring {
            return Err(BridgeError::NotConfigurable);
        }
        apply_addressing(entry, notifier);
        link.on_driver_ready()
    }

    pub fn snapshot(&self, handle: InterfaceHandle) -> Result<InterfaceSnapshot, BridgeError> {
        let entry = self.entry(handle)?;
        Ok(InterfaceSnapshot {
            identity: entry.identity.clone(),
            addressing: entry.addressing,
            attached: entry.driver.is_some(),
        })
    }

    /// The bound driver, for the pump running in the same task.
    pub fn driver_mut(&mut self, handle: InterfaceHandle) -> Result<&mut D, BridgeError> {
        self.entry_mut(handle)?
            .driver
            .as_mut()
            .ok_or(BridgeError::NotConfigurable)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn apply_addressing<D: IpStack, M: RawMutex>(entry: &mut Entry<D>, notifier: &EventNotifier<M>) {
    if entry.applied {
        return;
    }
    let Some(driver) = entry.driver.as_mut() else {
        return;
    };
    driver.set_ip_info(&entry.addressing);
    entry.applied = true;
    if !entry.addressing.is_unspecified() {
        info!("registry: address {}", entry.addressing);
        notifier.publish(BridgeEvent::AddressAcquired(entry.addressing));
    }
}
