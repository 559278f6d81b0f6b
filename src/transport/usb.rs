/// `rusb`-backed transport talking to a Garmin/Dynastream ANT+ USB stick.
use std::thread;
use std::time::Duration;

pub use rusb::{Context, UsbContext};
use rusb::{DeviceHandle, Error as UsbError};

use super::{Result, Transport, READ_TIMEOUT, RESET_DWELL, WRITE_TIMEOUT};
use crate::error::TransportError;
use crate::frame::Frame;
use crate::message;

const VENDOR_ID: u16 = 0x0FCF;
const USB_ANT_INTERFACE: u8 = 0;
const USB_ANT_EP_IN: u8 = 0x81;
const USB_ANT_EP_OUT: u8 = 0x01;

pub struct UsbTransport<T: UsbContext> {
    handle: Option<DeviceHandle<T>>,
}

impl<T: UsbContext> UsbTransport<T> {
    /// Finds the first device matching the ANT+ USB vendor id and claims its interface.
    pub fn open_context(ctx: &mut T) -> Result<Self> {
        for device in ctx.devices().map_err(TransportError::IoFailed)?.iter() {
            let descriptor = device.device_descriptor().map_err(TransportError::IoFailed)?;
            if descriptor.vendor_id() != VENDOR_ID {
                continue;
            }
            let mut handle = device.open().map_err(TransportError::IoFailed)?;
            match handle.reset() {
                Ok(_) => handle
                    .claim_interface(USB_ANT_INTERFACE)
                    .map_err(TransportError::IoFailed)?,
                Err(UsbError::NotFound) => {
                    let mut handle = device.open().map_err(TransportError::IoFailed)?;
                    handle
                        .claim_interface(USB_ANT_INTERFACE)
                        .map_err(TransportError::IoFailed)?;
                    return Ok(UsbTransport {
                        handle: Some(handle),
                    });
                }
                Err(e) => return Err(TransportError::IoFailed(e)),
            }
            return Ok(UsbTransport {
                handle: Some(handle),
            });
        }
        Err(TransportError::NotFound)
    }

    fn handle(&mut self) -> Result<&mut DeviceHandle<T>> {
        self.handle.as_mut().ok_or(TransportError::Closed)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.handle()?
            .write_bulk(USB_ANT_EP_OUT, buf, WRITE_TIMEOUT)
            .map_err(TransportError::IoFailed)?;
        Ok(())
    }

    /// Reads one bulk packet. A transfer timeout with no data is not an error: the
    /// core treats it as "no frames this tick" so shutdown stays responsive.
    fn read(&mut self) -> Result<Vec<u8>> {
        let mut buf = [0u8; 64];
        match self.handle()?.read_bulk(USB_ANT_EP_IN, &mut buf, READ_TIMEOUT) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(UsbError::Timeout) => Ok(Vec::new()),
            Err(e) => Err(TransportError::IoFailed(e)),
        }
    }
}

impl<T: UsbContext> Transport for UsbTransport<T> {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.send_frame(&message::reset())?;
        thread::sleep(RESET_DWELL);
        // Drain whatever the dongle emits while it re-initializes.
        let _ = self.read();
        Ok(())
    }

    fn set_network_key(&mut self, net: u8, key: [u8; 8]) -> Result<()> {
        self.send_frame(&message::set_network_key(net, &key))
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write(&frame.encode())
    }

    fn read_frames(&mut self) -> Result<Vec<Frame>> {
        let buf = self.read()?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        Ok(super::decode_buffer(&buf))
    }
}
