//! USB composite device - CDC-NCM network + CDC-ACM serial.
//!
//! Initialises the Embassy USB stack on the nRF52840 hardware USB
//! peripheral and adds one class per enabled [`UsbFunctions`] entry.  The
//! device-level [`embassy_usb::Handler`] turns configuration changes into
//! link mount/unmount calls.

use defmt::{debug, info};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{self, CdcAcmClass};
use embassy_usb::class::cdc_ncm::{self, CdcNcmClass};
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

use usbnet::config::{self, DeviceConfig, UsbFunctions};

use crate::Link;

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;

static NCM_STATE: StaticCell<cdc_ncm::State> = StaticCell::new();
static ACM_STATE: StaticCell<cdc_acm::State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static USB_LINK_HANDLER: StaticCell<LinkHandler> = StaticCell::new();

/// Maps device configuration changes onto the network link.
///
/// Runs in the USB device task; every call here is non-blocking.
struct LinkHandler {
    link: &'static Link,
}

impl embassy_usb::Handler for LinkHandler {
    fn enabled(&mut self, enabled: bool) {
        if !enabled && self.link.on_usb_unmount() {
            info!("usb: disabled");
        }
    }

    fn reset(&mut self) {
        // A bus reset drops the configuration.
        if self.link.on_usb_unmount() {
            info!("usb: bus reset");
        }
    }

    fn configured(&mut self, configured: bool) {
        if configured {
            if self.link.on_usb_mount() {
                info!("usb: configured");
            }
        } else if self.link.on_usb_unmount() {
            info!("usb: deconfigured");
        }
    }

    fn suspended(&mut self, suspended: bool) {
        debug!("usb: suspended = {}", suspended);
    }
}

/// Build result: the device runner plus one class per enabled function.
pub struct UsbNetDevice {
    pub device: UsbDevice<'static, UsbDriver>,
    pub network: Option<CdcNcmClass<'static, UsbDriver>>,
    pub serial: Option<CdcAcmClass<'static, UsbDriver>>,
}

/// Device class triple: IAD composite when more than one function is
/// enabled, otherwise defined per interface.
fn apply_device_class(usb_config: &mut Config<'static>, functions: &UsbFunctions) {
    if functions.is_composite() {
        usb_config.device_class = 0xEF;
        usb_config.device_sub_class = 0x02;
        usb_config.device_protocol = 0x01;
        usb_config.composite_with_iads = true;
    } else {
        usb_config.device_class = 0x00;
        usb_config.device_sub_class = 0x00;
        usb_config.device_protocol = 0x00;
        usb_config.composite_with_iads = false;
    }
}

/// Initialise the USB stack and create the enabled functions.
///
/// Must be called exactly once.  All static buffers are consumed here.
pub fn init(usbd: peripherals::USBD, device_config: &DeviceConfig, link: &'static Link) -> UsbNetDevice {
    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;
    apply_device_class(&mut usb_config, &device_config.functions);

    let config_desc = USB_CONFIG_DESC.init([0u8; 256]);
    let bos_desc = USB_BOS_DESC.init([0u8; 256]);
    let msos_desc = USB_MSOS_DESC.init([0u8; 256]);
    let ctrl_buf = USB_CTRL_BUF.init([0u8; 128]);

    let mut builder = Builder::new(
        driver,
        usb_config,
        config_desc,
        bos_desc,
        msos_desc,
        ctrl_buf,
    );

    builder.handler(USB_LINK_HANDLER.init(LinkHandler { link }));

    let functions = device_config.functions;

    let network = functions.network.then(|| {
        let state = NCM_STATE.init(cdc_ncm::State::new());
        CdcNcmClass::new(
            &mut builder,
            state,
            device_config.host_mac.octets(),
            config::USB_BULK_PACKET_SIZE,
        )
    });

    let serial = functions.serial.then(|| {
        let state = ACM_STATE.init(cdc_acm::State::new());
        CdcAcmClass::new(&mut builder, state, config::USB_BULK_PACKET_SIZE)
    });

    let device = builder.build();

    info!(
        "USB device initialised ({} interfaces, network {}, serial {})",
        functions.interface_count(),
        functions.network,
        functions.serial
    );

    UsbNetDevice {
        device,
        network,
        serial,
    }
}

/// Run the USB device stack - must be spawned as a dedicated Embassy task.
///
/// Handles enumeration, suspend/resume and control requests; the
/// [`LinkHandler`] callbacks fire from here.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    device.run().await
}
