//! Local IP stack - smoltcp behind the bridge's [`IpStack`] trait.
//!
//! Received frames are parked in a one-slot [`QueueDevice`] and the
//! interface is polled straight away, so ARP, ICMP echo and the status
//! page are answered in the pump's own hand-off.  Everything smoltcp emits
//! goes back through
//! [`TransportAdapter::submit_transmit`](usbnet::bridge::TransportAdapter::submit_transmit).

use defmt::{debug, trace, warn};
use heapless::String;
use smoltcp::iface::{Config, Interface, SocketHandle, SocketSet, SocketStorage};
use smoltcp::phy::{self, Device, DeviceCapabilities, Medium};
use smoltcp::socket::tcp;
use smoltcp::time::Instant;
use smoltcp::wire::{EthernetAddress, HardwareAddress, IpAddress, IpCidr, Ipv4Address};
use static_cell::StaticCell;

use usbnet::bridge::{InterfaceAddressing, IpStack, MacAddress, NetworkFrame};
use usbnet::config::{MTU, STATUS_PORT, STATUS_SOCKET_RX_LEN};
use usbnet::error::Malformed;
use usbnet::status::{self, RequestBuffer, StatusReport, RESPONSE_LEN};

use crate::Adapter;

fn now() -> Instant {
    Instant::from_millis(embassy_time::Instant::now().as_millis() as i64)
}

fn ethernet_address(mac: MacAddress) -> HardwareAddress {
    HardwareAddress::Ethernet(EthernetAddress(mac.octets()))
}

/// smoltcp device backed by the bridge's queue pair.
pub struct QueueDevice {
    adapter: &'static Adapter,
    pending: Option<NetworkFrame>,
}

impl Device for QueueDevice {
    type RxToken<'a> = FrameRxToken where Self: 'a;
    type TxToken<'a> = AdapterTxToken where Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let frame = self.pending.take()?;
        Some((
            FrameRxToken { frame },
            AdapterTxToken {
                adapter: self.adapter,
            },
        ))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        self.adapter.link().is_up().then_some(AdapterTxToken {
            adapter: self.adapter,
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = MTU;
        caps.max_burst_size = Some(1);
        caps.medium = Medium::Ethernet;
        caps
    }
}

pub struct FrameRxToken {
    frame: NetworkFrame,
}

impl phy::RxToken for FrameRxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(self.frame.as_mut_slice())
    }
}

pub struct AdapterTxToken {
    adapter: &'static Adapter,
}

impl phy::TxToken for AdapterTxToken {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buf = [0u8; MTU];
        let len = len.min(MTU);
        let result = f(&mut buf[..len]);
        if let Err(e) = self.adapter.submit_transmit(&buf[..len]) {
            trace!("stack: tx dropped ({})", e);
        }
        result
    }
}

/// Listening socket of the status page and the request read so far.
struct StatusService {
    handle: SocketHandle,
    request: RequestBuffer,
}

/// smoltcp interface, its device and the status page socket.
pub struct SmolStack {
    iface: Interface,
    device: QueueDevice,
    sockets: SocketSet<'static>,
    status: StatusService,
    mac: MacAddress,
    addressing: InterfaceAddressing,
}

impl SmolStack {
    /// `mac` is provisional; the registry hands over the real one on attach.
    ///
    /// Socket storage is static, so this may only be called once.
    pub fn new(adapter: &'static Adapter, mac: MacAddress) -> Self {
        let mut device = QueueDevice {
            adapter,
            pending: None,
        };
        let iface = Interface::new(Config::new(ethernet_address(mac)), &mut device, now());

        let storage = {
            static CELL: StaticCell<[SocketStorage<'static>; 1]> = StaticCell::new();
            CELL.init([SocketStorage::EMPTY; 1])
        };
        let rx_buf = {
            static CELL: StaticCell<[u8; STATUS_SOCKET_RX_LEN]> = StaticCell::new();
            CELL.init([0; STATUS_SOCKET_RX_LEN])
        };
        let tx_buf = {
            static CELL: StaticCell<[u8; RESPONSE_LEN]> = StaticCell::new();
            CELL.init([0; RESPONSE_LEN])
        };

        let mut sockets = SocketSet::new(&mut storage[..]);
        let socket = tcp::Socket::new(
            tcp::SocketBuffer::new(&mut rx_buf[..]),
            tcp::SocketBuffer::new(&mut tx_buf[..]),
        );
        let handle = sockets.add(socket);

        Self {
            iface,
            device,
            sockets,
            status: StatusService {
                handle,
                request: RequestBuffer::new(),
            },
            mac,
            addressing: InterfaceAddressing::UNSPECIFIED,
        }
    }

    fn service(&mut self) {
        self.iface.poll(now(), &mut self.device, &mut self.sockets);
        if self.serve_status() {
            // Push the response out in this hand-off.
            self.iface.poll(now(), &mut self.device, &mut self.sockets);
        }
    }

    /// Keep the status socket listening and answer a complete request.
    /// Returns `true` when a response was queued.
    fn serve_status(&mut self) -> bool {
        let socket = self.sockets.get_mut::<tcp::Socket>(self.status.handle);
        if !socket.is_open() {
            self.status.request.clear();
            if socket.listen(STATUS_PORT).is_err() {
                warn!("status: cannot listen on port {}", STATUS_PORT);
            }
            return false;
        }
        if !socket.can_recv() {
            if socket.state() == tcp::State::CloseWait {
                // Peer hung up before finishing its request.
                socket.close();
                self.status.request.clear();
            }
            return false;
        }

        let mut chunk = [0u8; 64];
        let route = match socket.recv_slice(&mut chunk) {
            Ok(n) => self.status.request.push(&chunk[..n]),
            Err(_) => {
                debug!("status: connection reset");
                socket.abort();
                return false;
            }
        };
        let Some(route) = route else {
            return false;
        };

        let report = StatusReport {
            link: self.device.adapter.link().state(),
            mac: self.mac,
            addressing: self.addressing,
            stats: self.device.adapter.stats(),
        };
        let mut response: String<RESPONSE_LEN> = String::new();
        if status::render(route, &report, &mut response).is_err() {
            warn!("status: response truncated");
        }
        debug!("status: {}", route);

        match socket.send_slice(response.as_bytes()) {
            Ok(n) if n < response.len() => warn!("status: sent {} of {} bytes", n, response.len()),
            Ok(_) => {}
            Err(_) => debug!("status: peer closed before the response"),
        }
        socket.close();
        self.status.request.clear();
        true
    }
}

impl IpStack for SmolStack {
    fn input(&mut self, frame: NetworkFrame) -> Result<(), Malformed> {
        let header = frame.ethernet_header().ok_or(Malformed)?;
        if header.source.is_multicast() {
            return Err(Malformed);
        }
        self.device.pending = Some(frame);
        self.service();
        Ok(())
    }

    fn set_mac(&mut self, mac: MacAddress) {
        debug!("stack: hardware address {}", mac);
        self.mac = mac;
        self.iface.set_hardware_addr(ethernet_address(mac));
    }

    fn set_ip_info(&mut self, addressing: &InterfaceAddressing) {
        self.addressing = *addressing;
        let cidr = addressing.prefix_len().filter(|_| !addressing.is_unspecified()).map(|prefix| {
            IpCidr::new(
                IpAddress::Ipv4(Ipv4Address::from_bytes(&addressing.ip.octets())),
                prefix,
            )
        });
        self.iface.update_ip_addrs(|addrs| {
            addrs.clear();
            if let Some(cidr) = cidr {
                if addrs.push(cidr).is_err() {
                    warn!("stack: no room for address");
                }
            }
        });

        let routes = self.iface.routes_mut();
        if addressing.gateway.is_unspecified() {
            routes.remove_default_ipv4_route();
        } else {
            let gateway = Ipv4Address::from_bytes(&addressing.gateway.octets());
            if routes.add_default_ipv4_route(gateway).is_err() {
                warn!("stack: route table full");
            }
        }
    }

    fn poll(&mut self) {
        self.service();
    }
}
