#![no_std]
//! Driver for the PCF8574 8-bit quasi-bidirectional I/O expander.
//!
//! Pins are addressed by virtual pin number starting at `first_pin`. Writes
//! are queued on the shared [`I2cManager`] without blocking; reads wait for
//! the bus.

mod fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use i2c_manager::{
    Clock, Hardware, I2cManager, Request, SevenBitAddress, Status,
    STANDARD_MODE_HZ,
};

/// Number of I/O lines on the device.
pub const PIN_COUNT: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Virtual pin not handled by this device.
    InvalidPin(u16),
    /// The request could not be queued.
    Request(i2c_manager::Error),
    /// The bus transaction did not complete.
    Bus(Status),
}

impl From<i2c_manager::Error> for Error {
    fn from(e: i2c_manager::Error) -> Self {
        Error::Request(e)
    }
}

/// One PCF8574 on a shared bus, owning a run of virtual pins.
pub struct Pcf8574<'a, M: RawMutex, H: Hardware, C: Clock> {
    manager: &'a I2cManager<'a, M, H, C>,
    address: SevenBitAddress,
    first_pin: u16,
    pin_count: u16,
    port_state: u8,
    write_request: &'a Request<'a>,
    read_request: &'a Request<'a>,
}

impl<'a, M: RawMutex, H: Hardware, C: Clock> Pcf8574<'a, M, H, C> {
    /// `pin_count` is clamped to the device's eight lines. Pins past
    /// `u16::MAX` are never owned.
    pub fn new(
        manager: &'a I2cManager<'a, M, H, C>,
        address: SevenBitAddress,
        first_pin: u16,
        pin_count: u16,
        write_request: &'a Request<'a>,
        read_request: &'a Request<'a>,
    ) -> Self {
        Self {
            manager,
            address,
            first_pin,
            pin_count: pin_count.min(PIN_COUNT),
            port_state: 0,
            write_request,
            read_request,
        }
    }

    /// Select the 100 kHz clock; the device only supports standard mode.
    /// The manager itself must already be initialised.
    pub fn begin(&self) {
        self.manager.set_clock(STANDARD_MODE_HZ);
    }

    /// `true` if `vpin` is one of this device's pins.
    pub fn owns(&self, vpin: u16) -> bool {
        vpin.checked_sub(self.first_pin)
            .is_some_and(|offset| offset < self.pin_count)
    }

    fn mask(&self, vpin: u16) -> Result<u8, Error> {
        if !self.owns(vpin) {
            return Err(Error::InvalidPin(vpin));
        }
        Ok(1 << (vpin - self.first_pin))
    }

    /// Drive a pin and queue the new port byte. Returns once the write is
    /// queued, not once it reaches the device.
    pub fn write_pin(&mut self, vpin: u16, value: bool) -> Result<(), Error> {
        let mask = self.mask(vpin)?;
        debug!(
            "pcf8574 {=u8:#x}: write pin {} = {}",
            self.address,
            vpin,
            value
        );
        if value {
            self.port_state |= mask;
        } else {
            self.port_state &= !mask;
        }
        self.manager.write(self.address, &[self.port_state], self.write_request)?;
        Ok(())
    }

    /// Read a pin.
    ///
    /// The pin is released high first so the connected equipment can pull
    /// it down; the port byte is written ahead of the read.
    pub fn read_pin(&mut self, vpin: u16) -> Result<bool, Error> {
        let mask = self.mask(vpin)?;
        self.port_state |= mask;
        self.manager.read(
            self.address,
            1,
            &[self.port_state],
            self.read_request,
        )?;
        let status = self.read_request.wait(self.manager);
        status.into_result().map_err(Error::Bus)?;

        let mut input = [0u8; 1];
        self.read_request.read_into(&mut input)?;
        Ok(input[0] & mask != 0)
    }

    /// Last port byte written to the device.
    pub fn port_state(&self) -> u8 {
        self.port_state
    }

    /// Log the device address and its pin range.
    pub fn display(&self) {
        info!(
            "pcf8574 addr {=u8:#x} vpins {}-{}",
            self.address,
            self.first_pin,
            self.first_pin
                .saturating_add(self.pin_count)
                .saturating_sub(1)
        );
    }
}
