//! Capacitive touch controllers.
//!
//! Each chip driver owns a [`TouchBus`] and validates the chip in `probe`,
//! handing the bus back when the chip does not answer as expected. The
//! [`TouchDrvCstxxx`] façade uses that to try the known variants in order.

use core::fmt::{self, Display, Formatter};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{Error, I2c};

use crate::BlockingRegisterDevice;

pub mod cst226;
pub mod cst328;
pub mod cst816;
pub mod cstxxx;

pub use cst226::{ChipInfo, Cst226};
pub use cst328::Cst328;
pub use cst816::{Cst816, Cst816Chip, IrqControl, MotionMask};
pub use cstxxx::TouchDrvCstxxx;

/// Debounce interval applied by [`TouchDrvCstxxx::is_pressed`].
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// A single contact in raw or transformed panel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchPoint {
    pub id: u8,
    pub x: u16,
    pub y: u16,
    pub pressure: u8,
}

impl TouchPoint {
    pub const fn new(x: u16, y: u16) -> Self {
        Self {
            id: 0,
            x,
            y,
            pressure: 0,
        }
    }
}

/// Outcome of one touch report read from a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchReport {
    /// Number of points written to the output slice.
    Points(usize),
    /// The frame was the home button; no points were written.
    HomeButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchModel {
    Cst816,
    Cst226,
    Cst328,
}

impl TouchModel {
    pub const fn default_address(self) -> u8 {
        match self {
            TouchModel::Cst816 => cst816::CST816_ADDRESS,
            TouchModel::Cst226 => cst226::CST226_ADDRESS,
            TouchModel::Cst328 => cst328::CST328_ADDRESS,
        }
    }
}

impl Display for TouchModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TouchModel::Cst816 => write!(f, "CST816"),
            TouchModel::Cst226 => write!(f, "CST226"),
            TouchModel::Cst328 => write!(f, "CST328"),
        }
    }
}

/// Errors that can occur when talking to a touch controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchError {
    /// I2C transaction failed
    Bus,
    /// Reset or interrupt pin could not be driven or read
    Pin,
    /// Chip answered with an id or check code of a different part
    IdentityMismatch(u32),
    /// Chip is in bootloader mode without firmware
    NoFirmware,
}

impl Display for TouchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TouchError::Bus => write!(f, "I2C transaction failed"),
            TouchError::Pin => write!(f, "GPIO error"),
            TouchError::IdentityMismatch(id) => write!(f, "Unexpected chip id {:#x}", id),
            TouchError::NoFirmware => write!(f, "Touch controller has no firmware"),
        }
    }
}

impl<E> From<E> for TouchError
where
    E: Error,
{
    fn from(_: E) -> Self {
        TouchError::Bus
    }
}

/// I2C device, optional reset line and delay shared by every chip driver.
#[derive(Debug)]
pub struct TouchBus<I2C, RST, DELAY> {
    pub(crate) dev: BlockingRegisterDevice<I2C>,
    pub(crate) rst: Option<RST>,
    pub(crate) delay: DELAY,
}

impl<I2C, RST, DELAY> TouchBus<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// The address is filled in by the driver that probes the bus.
    pub fn new(i2c: I2C, rst: Option<RST>, delay: DELAY) -> Self {
        Self {
            dev: BlockingRegisterDevice::new(i2c, 0),
            rst,
            delay,
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.dev.set_address(address);
        self
    }

    pub fn address(&self) -> u8 {
        self.dev.address()
    }

    pub(crate) fn set_address(&mut self, address: u8) {
        self.dev.set_address(address);
    }

    /// Pulses the reset line low. No-op without a reset pin.
    pub(crate) fn reset(&mut self, low_ms: u32, settle_ms: u32) -> Result<(), TouchError> {
        if let Some(rst) = &mut self.rst {
            rst.set_low().map_err(|_| TouchError::Pin)?;
            self.delay.delay_ms(low_ms);
            rst.set_high().map_err(|_| TouchError::Pin)?;
            self.delay.delay_ms(settle_ms);
        }
        Ok(())
    }

    pub fn release(self) -> (I2C, Option<RST>, DELAY) {
        (self.dev.release(), self.rst, self.delay)
    }
}

/// Maps raw chip coordinates onto the display orientation.
///
/// Axes are swapped first, mirroring is then applied against the maximum
/// coordinate of the resulting axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transform {
    pub swap_xy: bool,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub max_x: u16,
    pub max_y: u16,
}

impl Transform {
    pub fn apply(&self, point: &mut TouchPoint) {
        if self.swap_xy {
            core::mem::swap(&mut point.x, &mut point.y);
        }
        if self.mirror_x {
            point.x = self.max_x.saturating_sub(point.x);
        }
        if self.mirror_y {
            point.y = self.max_y.saturating_sub(point.y);
        }
    }
}

/// Millisecond time source for the press debounce.
pub trait MonotonicClock {
    fn now_ms(&mut self) -> u64;
}

impl<F> MonotonicClock for F
where
    F: FnMut() -> u64,
{
    fn now_ms(&mut self) -> u64 {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchConfig {
    /// Bus address; `None` uses each variant's default address.
    pub address: Option<u8>,
    /// Probe only this variant instead of auto detecting.
    pub model: Option<TouchModel>,
    pub debounce_ms: u64,
    pub transform: Transform,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            address: None,
            model: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            transform: Transform::default(),
        }
    }
}

impl TouchConfig {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_model(mut self, model: TouchModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_max_coordinates(mut self, max_x: u16, max_y: u16) -> Self {
        self.transform.max_x = max_x;
        self.transform.max_y = max_y;
        self
    }

    pub fn with_swap_xy(mut self, swap: bool) -> Self {
        self.transform.swap_xy = swap;
        self
    }

    pub fn with_mirror_xy(mut self, mirror_x: bool, mirror_y: bool) -> Self {
        self.transform.mirror_x = mirror_x;
        self.transform.mirror_y = mirror_y;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeDelay, FakeI2c, FakePin};

    #[test]
    fn test_transform_swaps_before_mirroring() {
        let transform = Transform {
            swap_xy: true,
            mirror_x: true,
            mirror_y: false,
            max_x: 535,
            max_y: 239,
        };
        let mut point = TouchPoint::new(10, 200);
        transform.apply(&mut point);
        assert_eq!((point.x, point.y), (335, 10));
    }

    #[test]
    fn test_transform_mirror_saturates_out_of_range_input() {
        let transform = Transform {
            mirror_y: true,
            max_y: 100,
            ..Transform::default()
        };
        let mut point = TouchPoint::new(5, 150);
        transform.apply(&mut point);
        assert_eq!((point.x, point.y), (5, 0));
    }

    #[test]
    fn test_default_transform_is_identity() {
        let mut point = TouchPoint::new(12, 34);
        Transform::default().apply(&mut point);
        assert_eq!(point, TouchPoint::new(12, 34));
    }

    #[test]
    fn test_bus_reset_pulses_low_then_high() {
        let rst = FakePin::default();
        let delay = FakeDelay::default();
        let mut bus = TouchBus::new(FakeI2c::new(), Some(rst.clone()), delay.clone());
        bus.reset(30, 50).unwrap();
        assert_eq!(*rst.toggles.borrow(), [false, true]);
        assert_eq!(delay.elapsed_ns.get(), 80_000_000);
    }

    #[test]
    fn test_bus_reset_without_pin_is_noop() {
        let delay = FakeDelay::default();
        let mut bus: TouchBus<_, FakePin, _> = TouchBus::new(FakeI2c::new(), None, delay.clone());
        bus.reset(30, 50).unwrap();
        assert_eq!(delay.elapsed_ns.get(), 0);
    }

    #[test]
    fn test_closure_is_a_clock() {
        let mut ticks = 0u64;
        let mut clock = move || {
            ticks += 5;
            ticks
        };
        assert_eq!(MonotonicClock::now_ms(&mut clock), 5);
        assert_eq!(MonotonicClock::now_ms(&mut clock), 10);
    }

    #[test]
    fn test_config_builder() {
        let config = TouchConfig::default()
            .with_address(0x5A)
            .with_model(TouchModel::Cst226)
            .with_max_coordinates(240, 536)
            .with_mirror_xy(true, false);
        assert_eq!(config.address, Some(0x5A));
        assert_eq!(config.model, Some(TouchModel::Cst226));
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(config.transform.mirror_x);
        assert_eq!(config.transform.max_y, 536);
    }
}
