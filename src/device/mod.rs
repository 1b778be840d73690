pub mod test_device;

use crate::CoreError;

/// Status word bits, in Ridge numbering (bit 0 is the MSB).
pub const STATUS_OK: u32 = 0;
/// Bit 0: device not ready.
pub const STATUS_NOT_READY: u32 = 1 << 31;
/// Bit 1: device timed out.
pub const STATUS_TIMEOUT: u32 = 1 << 30;

/// Bits a status word may legally carry. Anything else coming back from a
/// bus implementation is a host error, not an architectural one.
pub const STATUS_MASK: u32 = STATUS_NOT_READY | STATUS_TIMEOUT;

/// A single controller on the programmed-I/O bus.
pub trait IoDevice {
    /// Bus address, bits 0..7 of the I/O address word.
    fn device_id(&self) -> u8;

    /// READ operation; `device_data` is bits 8..31 of the address word.
    /// Returns (status, data).
    fn io_read(&mut self, device_data: u32) -> (u32, u32);

    /// WRITE operation. Returns the status word.
    fn io_write(&mut self, device_data: u32, data: u32) -> u32;

    /// Whether the device is currently asserting its interrupt line.
    fn interrupt_pending(&self) -> bool;

    /// Acknowledge and clear the pending interrupt, returning the IOIR
    /// identifying the device and its last-interrupting unit.
    fn ack_interrupt(&mut self) -> u32;
}

/// The processor's view of the bus: two programmed-I/O operations plus the
/// interrupt poll/acknowledge pair.
pub trait IoBus {
    fn read(&mut self, device: u8, device_data: u32) -> (u32, u32);
    fn write(&mut self, device: u8, device_data: u32, data: u32) -> u32;

    /// Highest-priority device currently requesting an interrupt, if any.
    /// Priority is registration order.
    fn interrupt_requested(&mut self) -> Option<u8>;

    fn ack_interrupt(&mut self, device: u8) -> u32;
}

/// Owns the attached devices and resolves bus operations by device id.
pub struct DeviceSet {
    devices: Vec<Box<dyn IoDevice>>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Attach a device. Ids must be unique on the bus; a duplicate is a
    /// configuration error, not something the emulated kernel can see.
    pub fn attach(&mut self, device: Box<dyn IoDevice>) -> Result<(), CoreError> {
        let id = device.device_id();
        if self.devices.iter().any(|d| d.device_id() == id) {
            return Err(CoreError::DuplicateDevice { id });
        }
        self.devices.push(device);
        Ok(())
    }

    fn find(&mut self, id: u8) -> Option<&mut Box<dyn IoDevice>> {
        self.devices.iter_mut().find(|d| d.device_id() == id)
    }
}

impl Default for DeviceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBus for DeviceSet {
    fn read(&mut self, device: u8, device_data: u32) -> (u32, u32) {
        match self.find(device) {
            Some(dev) => dev.io_read(device_data),
            // nothing answers this address
            None => (STATUS_TIMEOUT, 0),
        }
    }

    fn write(&mut self, device: u8, device_data: u32, data: u32) -> u32 {
        match self.find(device) {
            Some(dev) => dev.io_write(device_data, data),
            None => STATUS_TIMEOUT,
        }
    }

    fn interrupt_requested(&mut self) -> Option<u8> {
        self.devices
            .iter()
            .find(|d| d.interrupt_pending())
            .map(|d| d.device_id())
    }

    fn ack_interrupt(&mut self, device: u8) -> u32 {
        match self.find(device) {
            Some(dev) => dev.ack_interrupt(),
            None => {
                log::warn!("interrupt acknowledge for unattached device {:#x}", device);
                0
            }
        }
    }
}

/// Bus with nothing attached; every transfer times out.
pub struct NullBus;

impl IoBus for NullBus {
    fn read(&mut self, _device: u8, _device_data: u32) -> (u32, u32) {
        (STATUS_TIMEOUT, 0)
    }

    fn write(&mut self, _device: u8, _device_data: u32, _data: u32) -> u32 {
        STATUS_TIMEOUT
    }

    fn interrupt_requested(&mut self) -> Option<u8> {
        None
    }

    fn ack_interrupt(&mut self, _device: u8) -> u32 {
        0
    }
}
