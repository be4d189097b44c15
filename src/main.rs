//! usbnet firmware - USB-to-IP network bridge on the nRF52840.
//!
//! Tasks:
//! - `usb_task`: runs the USB device (enumeration, control requests, link
//!   mount/unmount callbacks)
//! - `ncm_rx_task`: USB OUT datagrams into the bridge
//! - `ncm_tx_task`: frames from the pump out of the USB IN endpoint
//! - `net_task`: owns the interface registry and the IP stack, runs the
//!   bridge pump and the status page
//! - `serial_task`: CDC-ACM echo
//! - `diagnostics_task`: event and statistics log

#![no_std]
#![no_main]

mod diagnostics;
mod stack;
mod usb;

use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_usb::UsbDevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use usbnet::bridge::{
    BridgePump, EventNotifier, InterfaceHandle, InterfaceRegistry, LinkStateMachine,
    TransportAdapter,
};
use usbnet::config::{DeviceConfig, FRAME_QUEUE_DEPTH, MAX_INTERFACES};

use crate::stack::SmolStack;
use crate::usb::device::UsbDriver;
use crate::usb::network::{NcmReceiver, NcmSender, NcmSink, TxSlot};
use crate::usb::serial::SerialClass;

pub type Notifier = EventNotifier<CriticalSectionRawMutex>;
pub type Link = LinkStateMachine<'static, CriticalSectionRawMutex>;
pub type Adapter = TransportAdapter<'static, CriticalSectionRawMutex, FRAME_QUEUE_DEPTH>;
type Registry = InterfaceRegistry<'static, CriticalSectionRawMutex, SmolStack, MAX_INTERFACES>;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // USB needs the external crystal.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.hfclk_source = embassy_nrf::config::HfclkSource::ExternalXtal;
    let p = embassy_nrf::init(nrf_config);
    info!("usbnet starting");

    let device_config = DeviceConfig::default();

    let notifier: &'static Notifier = {
        static CELL: StaticCell<Notifier> = StaticCell::new();
        CELL.init(Notifier::new())
    };
    let link: &'static Link = {
        static CELL: StaticCell<Link> = StaticCell::new();
        CELL.init(Link::new(notifier))
    };
    let adapter: &'static Adapter = {
        static CELL: StaticCell<Adapter> = StaticCell::new();
        CELL.init(Adapter::new(
            link,
            notifier,
            device_config.rx_queue_capacity,
            device_config.tx_queue_capacity,
        ))
    };

    // Subscribe before anything can publish.
    let events = unwrap!(notifier.subscribe());
    unwrap!(spawner.spawn(diagnostics_task(events, adapter)));

    let usb = usb::device::init(p.USBD, &device_config, link);

    if let Some(ncm) = usb.network {
        let (sender, receiver) = ncm.split();

        let mut registry = Registry::new(notifier);
        let identity = unwrap!(device_config.identity());
        let handle = unwrap!(registry.create(identity, device_config.addressing));
        let stack = SmolStack::new(adapter, device_config.device_mac);
        unwrap!(registry.attach_driver(handle, stack));

        let tx_slot: &'static TxSlot = {
            static CELL: StaticCell<TxSlot> = StaticCell::new();
            CELL.init(TxSlot::new())
        };

        unwrap!(spawner.spawn(ncm_rx_task(receiver, adapter)));
        unwrap!(spawner.spawn(ncm_tx_task(sender, tx_slot)));
        unwrap!(spawner.spawn(net_task(
            registry,
            handle,
            NcmSink::new(tx_slot),
            adapter,
            notifier
        )));
    }

    if let Some(serial) = usb.serial {
        unwrap!(spawner.spawn(serial_task(serial)));
    }

    unwrap!(spawner.spawn(usb_task(usb.device)));
}

#[embassy_executor::task]
async fn usb_task(device: UsbDevice<'static, UsbDriver>) -> ! {
    usb::device::run_usb_device(device).await
}

#[embassy_executor::task]
async fn ncm_rx_task(receiver: NcmReceiver, adapter: &'static Adapter) -> ! {
    usb::network::receive_loop(receiver, adapter).await
}

#[embassy_executor::task]
async fn ncm_tx_task(sender: NcmSender, slot: &'static TxSlot) -> ! {
    usb::network::transmit_loop(sender, slot).await
}

#[embassy_executor::task]
async fn net_task(
    mut registry: Registry,
    handle: InterfaceHandle,
    mut sink: NcmSink,
    adapter: &'static Adapter,
    notifier: &'static Notifier,
) {
    let mut pump = BridgePump::new(adapter, notifier);
    match pump.run(&mut registry, handle, &mut sink).await {
        Ok(never) => match never {},
        Err(e) => error!("network task stopped: {}", e),
    }
}

#[embassy_executor::task]
async fn serial_task(class: SerialClass) -> ! {
    usb::serial::echo_loop(class).await
}

#[embassy_executor::task]
async fn diagnostics_task(events: diagnostics::Events, adapter: &'static Adapter) -> ! {
    diagnostics::run(events, adapter).await
}
