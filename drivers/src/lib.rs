#![cfg_attr(not(test), no_std)]
//! Sensor hub and touch controller drivers for the LilyGo AMOLED boards.
//!
//! - [`bhi260ap`]: BHI260AP smart sensor hub. Handles reset, firmware upload
//!   and boot, then drains the hub FIFOs and routes decoded frames to
//!   registered callbacks.
//! - [`touch`]: capacitive touch controllers of the CST8xx / CST2xx / CST3xx
//!   family, plus [`touch::TouchDrvCstxxx`] which probes the known variants at
//!   runtime and forwards to whichever one answered.

#[macro_use]
mod fmt;

/// BHI260AP sensor hub runtime.
pub mod bhi260ap;

/// Capacitive touch controllers and the auto-detecting touch façade.
pub mod touch;

extern crate alloc;

use embedded_hal::i2c::I2c;

/// Register access for I2C devices using 8 or 16 bit register addresses.
#[derive(Debug)]
pub(crate) struct BlockingRegisterDevice<I2C> {
    i2c: I2C,
    adr: u8,
}

impl<I2C> BlockingRegisterDevice<I2C>
where
    I2C: I2c,
{
    pub(crate) fn new(i2c: I2C, adr: u8) -> Self {
        Self { i2c, adr }
    }

    pub(crate) fn address(&self) -> u8 {
        self.adr
    }

    pub(crate) fn set_address(&mut self, adr: u8) {
        self.adr = adr;
    }

    pub(crate) fn release(self) -> I2C {
        self.i2c
    }

    pub(crate) fn read_register(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut buffer = [0u8];
        self.i2c.write_read(self.adr, &[register], &mut buffer)?;
        Ok(buffer[0])
    }

    pub(crate) fn read_register_buffer(
        &mut self,
        register: u8,
        buffer: &mut [u8],
    ) -> Result<(), I2C::Error> {
        self.i2c.write_read(self.adr, &[register], buffer)
    }

    /// Reads from a 16 bit register address, sent big endian.
    pub(crate) fn read_register16_buffer(
        &mut self,
        register: u16,
        buffer: &mut [u8],
    ) -> Result<(), I2C::Error> {
        self.i2c
            .write_read(self.adr, &register.to_be_bytes(), buffer)
    }

    /// Writes register address and payload in one transaction.
    pub(crate) fn write_register(&mut self, register_and_data: &[u8]) -> Result<(), I2C::Error> {
        self.i2c.write(self.adr, register_and_data)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Hand-written bus doubles shared by the unit tests.

    use alloc::collections::VecDeque;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embedded_hal::delay::DelayNs;
    use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
    use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation};

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct BusFault;

    impl i2c::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Scripted I2C bus. Reads are answered from a per address queue of
    /// `(register bytes, response)` pairs; anything unscripted NAKs.
    #[derive(Clone, Default, Debug)]
    pub struct FakeI2c {
        pub responses: Rc<RefCell<VecDeque<(u8, Vec<u8>, Vec<u8>)>>>,
        pub writes: Rc<RefCell<Vec<(u8, Vec<u8>)>>>,
    }

    impl FakeI2c {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, address: u8, register: &[u8], data: &[u8]) {
            self.responses
                .borrow_mut()
                .push_back((address, register.to_vec(), data.to_vec()));
        }

        pub fn written(&self) -> Vec<(u8, Vec<u8>)> {
            self.writes.borrow().clone()
        }
    }

    impl ErrorType for FakeI2c {
        type Error = BusFault;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut register = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        register = bytes.to_vec();
                        self.writes.borrow_mut().push((address, bytes.to_vec()));
                    }
                    Operation::Read(buffer) => {
                        let mut queue = self.responses.borrow_mut();
                        let position = queue
                            .iter()
                            .position(|(a, r, _)| *a == address && *r == register)
                            .ok_or(BusFault)?;
                        let (_, _, data) = queue.remove(position).ok_or(BusFault)?;
                        for (dst, src) in buffer.iter_mut().zip(data.iter()) {
                            *dst = *src;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    /// Input pin whose level is shared with the test body.
    #[derive(Clone, Default, Debug)]
    pub struct FakePin {
        pub low: Rc<Cell<bool>>,
        pub toggles: Rc<RefCell<Vec<bool>>>,
    }

    impl PinErrorType for FakePin {
        type Error = Infallible;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.low.get())
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(self.low.get())
        }
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.low.set(true);
            self.toggles.borrow_mut().push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.low.set(false);
            self.toggles.borrow_mut().push(true);
            Ok(())
        }
    }

    #[derive(Clone, Default, Debug)]
    pub struct FakeDelay {
        pub elapsed_ns: Rc<Cell<u64>>,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.elapsed_ns.set(self.elapsed_ns.get() + u64::from(ns));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::FakeI2c;
    use crate::BlockingRegisterDevice;

    #[test]
    fn test_register_device_reads_single_register() {
        let i2c = FakeI2c::new();
        i2c.respond(0x15, &[0xA7], &[0xB5]);
        let mut dev = BlockingRegisterDevice::new(i2c.clone(), 0x15);
        assert_eq!(dev.read_register(0xA7).unwrap(), 0xB5);
    }

    #[test]
    fn test_register_device_sends_wide_register_big_endian() {
        let i2c = FakeI2c::new();
        i2c.respond(0x1A, &[0xD1, 0xFC], &[1, 2, 3, 4]);
        let mut dev = BlockingRegisterDevice::new(i2c.clone(), 0x1A);
        let mut buf = [0u8; 4];
        dev.read_register16_buffer(0xD1FC, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(i2c.written()[0], (0x1A, alloc::vec![0xD1, 0xFC]));
    }

    #[test]
    fn test_register_device_unanswered_read_is_an_error() {
        let i2c = FakeI2c::new();
        let mut dev = BlockingRegisterDevice::new(i2c, 0x15);
        assert!(dev.read_register(0xA7).is_err());
    }
}
