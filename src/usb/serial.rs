//! CDC-ACM serial console - echoes everything back to the host.

use defmt::{debug, info};
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::EndpointError;

use usbnet::config::SERIAL_RX_BUF_SIZE;

use super::device::UsbDriver;

pub type SerialClass = CdcAcmClass<'static, UsbDriver>;

pub async fn echo_loop(mut class: SerialClass) -> ! {
    let mut buf = [0u8; SERIAL_RX_BUF_SIZE];
    loop {
        class.wait_connection().await;
        info!("serial: connected (dtr {}, rts {})", class.dtr(), class.rts());
        if let Err(e) = echo(&mut class, &mut buf).await {
            debug!("serial: endpoint error {}", e);
        }
        info!("serial: disconnected");
    }
}

async fn echo(class: &mut SerialClass, buf: &mut [u8]) -> Result<(), EndpointError> {
    loop {
        let n = class.read_packet(buf).await?;
        debug!("serial: got {} bytes: {=[u8]:a}", n, &buf[..n]);
        class.write_packet(&buf[..n]).await?;
    }
}
