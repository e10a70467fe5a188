//! Bus access for the sensor hub.
//!
//! The hub speaks the same register protocol over I2C and SPI. The runtime
//! only needs to read and write register ranges, so the transport is hidden
//! behind [`HubInterface`].

use embedded_hal::i2c::I2c;
use embedded_hal::spi::{Operation, SpiDevice};

use super::HubError;
use crate::BlockingRegisterDevice;

/// Low-level register access required by the sensor hub runtime.
pub trait HubInterface {
    /// Reads `buf.len()` bytes starting at `register`.
    fn read(&mut self, register: u8, buf: &mut [u8]) -> Result<(), HubError>;

    /// Writes `data` starting at `register`.
    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), HubError>;
}

/// Largest register write the I2C path sends in one transaction.
const I2C_MAX_WRITE: usize = 64;

#[derive(Debug)]
pub struct I2cInterface<I2C> {
    dev: BlockingRegisterDevice<I2C>,
}

impl<I2C> I2cInterface<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            dev: BlockingRegisterDevice::new(i2c, address),
        }
    }

    pub fn release(self) -> I2C {
        self.dev.release()
    }
}

impl<I2C> HubInterface for I2cInterface<I2C>
where
    I2C: I2c,
{
    fn read(&mut self, register: u8, buf: &mut [u8]) -> Result<(), HubError> {
        self.dev.read_register_buffer(register, buf)?;
        Ok(())
    }

    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), HubError> {
        let mut frame = [0u8; I2C_MAX_WRITE + 1];
        // Channel registers do not auto-increment, every chunk targets the
        // same register.
        for chunk in data.chunks(I2C_MAX_WRITE) {
            frame[0] = register;
            frame[1..=chunk.len()].copy_from_slice(chunk);
            self.dev.write_register(&frame[..=chunk.len()])?;
        }
        Ok(())
    }
}

/// SPI transport. Bit 7 of the register byte selects a read.
#[derive(Debug)]
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI> SpiInterface<SPI>
where
    SPI: SpiDevice,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> HubInterface for SpiInterface<SPI>
where
    SPI: SpiDevice,
{
    fn read(&mut self, register: u8, buf: &mut [u8]) -> Result<(), HubError> {
        self.spi
            .transaction(&mut [Operation::Write(&[register | 0x80]), Operation::Read(buf)])
            .map_err(|_| HubError::Transport)
    }

    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), HubError> {
        self.spi
            .transaction(&mut [Operation::Write(&[register & 0x7F]), Operation::Write(data)])
            .map_err(|_| HubError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::FakeI2c;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::convert::Infallible;
    use embedded_hal::spi::ErrorType;

    /// Records each transaction as a list of write payloads and answers
    /// reads with an incrementing byte pattern.
    #[derive(Default)]
    struct FakeSpi {
        transactions: Vec<Vec<Vec<u8>>>,
        reads: Vec<usize>,
    }

    impl ErrorType for FakeSpi {
        type Error = Infallible;
    }

    impl SpiDevice for FakeSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            let mut writes = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => writes.push(data.to_vec()),
                    Operation::Read(buf) => {
                        self.reads.push(buf.len());
                        for (i, b) in buf.iter_mut().enumerate() {
                            *b = i as u8 + 1;
                        }
                    }
                    _ => {}
                }
            }
            self.transactions.push(writes);
            Ok(())
        }
    }

    #[test]
    fn test_i2c_interface_splits_long_writes_per_register() {
        let i2c = FakeI2c::new();
        let mut iface = I2cInterface::new(i2c.clone(), 0x28);
        let data = vec![0xAAu8; 100];
        iface.write(0x00, &data).unwrap();
        let writes = i2c.written();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1.len(), 65);
        assert_eq!(writes[0].1[0], 0x00);
        assert_eq!(writes[1].1.len(), 37);
        assert_eq!(writes[1].1[0], 0x00);
    }

    #[test]
    fn test_i2c_interface_read_maps_bus_error() {
        let i2c = FakeI2c::new();
        let mut iface = I2cInterface::new(i2c, 0x28);
        let mut buf = [0u8; 1];
        assert_eq!(iface.read(0x1C, &mut buf), Err(HubError::Transport));
    }

    #[test]
    fn test_spi_read_sets_read_bit_on_register() {
        let mut iface = SpiInterface::new(FakeSpi::default());
        let mut buf = [0u8; 3];
        iface.read(0x1C, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);

        let spi = iface.release();
        assert_eq!(spi.transactions, vec![vec![vec![0x9C]]]);
        assert_eq!(spi.reads, vec![3]);
    }

    #[test]
    fn test_spi_write_clears_read_bit_and_sends_payload() {
        let mut iface = SpiInterface::new(FakeSpi::default());
        iface.write(0x94, &[0x01, 0x02]).unwrap();

        let spi = iface.release();
        assert_eq!(spi.transactions, vec![vec![vec![0x14], vec![0x01, 0x02]]]);
        assert!(spi.reads.is_empty());
    }
}
