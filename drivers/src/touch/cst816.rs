// https://github.com/fbiego/CST816S
use core::fmt::{self, Display, Formatter};

use bitflags::bitflags;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{TouchBus, TouchError, TouchPoint, TouchReport};

pub(crate) const CST816_ADDRESS: u8 = 0x15;

const REG_STATUS: u8 = 0x00;
const REG_CHIP_ID: u8 = 0xA7;
const REG_FW_VERSION: u8 = 0xA9;
const REG_SLEEP: u8 = 0xE5;
const REG_MOTION_MASK: u8 = 0xEC;
const REG_AUTO_SLEEP_TIME: u8 = 0xF9;
const REG_IRQ_CTL: u8 = 0xFA;
const REG_DIS_AUTO_SLEEP: u8 = 0xFE;

const STATUS_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cst816Chip {
    CST816S = 0xB4,
    CST816T = 0xB5,
    CST716 = 0x20,
}

impl Cst816Chip {
    pub const fn name(self) -> &'static str {
        match self {
            Cst816Chip::CST816S => "CST816S",
            Cst816Chip::CST816T => "CST816T",
            Cst816Chip::CST716 => "CST716",
        }
    }
}

impl Display for Cst816Chip {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqControl: u8 {
        /// Bit 7: EnTest (Enable test, periodically sends low pulses)
        const EN_TEST   = 1 << 7;
        /// Bit 6: EnTouch (Sends low pulse on touch detection)
        const EN_TOUCH  = 1 << 6;
        /// Bit 5: EnChange (Sends low pulse on touch state change)
        const EN_CHANGE = 1 << 5;
        /// Bit 4: EnMotion (Sends low pulse on gesture detection)
        const EN_MOTION = 1 << 4;
        /// Bit 0: OnceWLP (Sends one low pulse on long press)
        const ONCE_WLP  = 1 << 0;
    }
}

impl Default for IrqControl {
    fn default() -> Self {
        IrqControl::EN_TOUCH | IrqControl::EN_CHANGE | IrqControl::EN_MOTION
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MotionMask: u8 {
        /// Enable double-click detection
        const DOUBLE_CLICK = 1 << 0;
        /// Enable continuous up/down swipe
        const CONTINUOUS_UPDOWN = 1 << 1;
        /// Enable continuous left/right swipe
        const CONTINUOUS_LEFTRIGHT = 1 << 2;
    }
}

impl Default for MotionMask {
    fn default() -> Self {
        MotionMask::DOUBLE_CLICK
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MotionMask {
    fn format(&self, f: defmt::Formatter) {
        self.iter_names().for_each(|(name, _)| {
            defmt::write!(f, "{} ", name);
        });
    }
}

/// Single point controller of the CST816 family (CST816S, CST816T, CST716).
#[derive(Debug)]
pub struct Cst816<I2C, RST, DELAY> {
    bus: TouchBus<I2C, RST, DELAY>,
    chip: Cst816Chip,
    version: u8,
}

impl<I2C, RST, DELAY> Cst816<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Resets the chip and checks its chip id. On failure the bus is handed
    /// back untouched apart from the reset pulse.
    #[allow(clippy::result_large_err)]
    pub fn probe(
        mut bus: TouchBus<I2C, RST, DELAY>,
    ) -> Result<Self, (TouchBus<I2C, RST, DELAY>, TouchError)> {
        match Self::identify(&mut bus) {
            Ok((chip, version)) => Ok(Self { bus, chip, version }),
            Err(err) => Err((bus, err)),
        }
    }

    fn identify(bus: &mut TouchBus<I2C, RST, DELAY>) -> Result<(Cst816Chip, u8), TouchError> {
        bus.reset(30, 50)?;
        let id = bus.dev.read_register(REG_CHIP_ID)?;
        let version = bus.dev.read_register(REG_FW_VERSION)?;
        info!("CST816 chip id {:#x}, firmware {:#x}", id, version);

        match Cst816Chip::try_from(id).ok() {
            // 0x20 is also what a CST226SE answers on this register
            Some(Cst816Chip::CST716) if version == 0 => Err(TouchError::IdentityMismatch(id.into())),
            Some(chip) => Ok((chip, version)),
            None => Err(TouchError::IdentityMismatch(id.into())),
        }
    }

    pub fn chip(&self) -> Cst816Chip {
        self.chip
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn model_name(&self) -> &'static str {
        self.chip.name()
    }

    pub fn support_touch_point(&self) -> u8 {
        1
    }

    /// Reads the status block. `home` is the raw coordinate of the home
    /// button; a touch exactly there is reported as [`TouchReport::HomeButton`].
    pub fn read_points(
        &mut self,
        points: &mut [TouchPoint],
        home: Option<(u16, u16)>,
    ) -> Result<TouchReport, TouchError> {
        let mut buffer = [0u8; STATUS_LEN];
        self.bus.dev.read_register_buffer(REG_STATUS, &mut buffer)?;

        let count = buffer[2] & 0x0F;
        if buffer[2] == 0 || count == 0 || points.is_empty() {
            return Ok(TouchReport::Points(0));
        }

        let x = (u16::from(buffer[3] & 0x0F) << 8) | u16::from(buffer[4]);
        let y = (u16::from(buffer[5] & 0x0F) << 8) | u16::from(buffer[6]);
        trace!("CST816 raw x {} y {} points {}", x, y, count);

        if home == Some((x, y)) {
            return Ok(TouchReport::HomeButton);
        }

        points[0] = TouchPoint::new(x, y);
        Ok(TouchReport::Points(1))
    }

    pub fn sleep(&mut self) -> Result<(), TouchError> {
        self.bus.dev.write_register(&[REG_SLEEP, 0x03])?;
        Ok(())
    }

    pub fn wakeup(&mut self) -> Result<(), TouchError> {
        self.bus.reset(30, 50)
    }

    /// Only the CST816S and CST816T support this; a no-op on the CST716.
    pub fn disable_auto_sleep(&mut self) -> Result<(), TouchError> {
        match self.chip {
            Cst816Chip::CST816S | Cst816Chip::CST816T => {
                self.bus.reset(30, 50)?;
                self.bus.delay.delay_ms(50);
                self.bus.dev.write_register(&[REG_DIS_AUTO_SLEEP, 0x01])?;
            }
            Cst816Chip::CST716 => {}
        }
        Ok(())
    }

    pub fn enable_auto_sleep(&mut self) -> Result<(), TouchError> {
        self.bus.dev.write_register(&[REG_DIS_AUTO_SLEEP, 0x00])?;
        Ok(())
    }

    /// Seconds of inactivity before standby, clamped to 1..=255.
    pub fn set_auto_sleep_time(&mut self, seconds: u16) -> Result<(), TouchError> {
        let seconds = seconds.clamp(1, 255) as u8;
        self.bus.dev.write_register(&[REG_AUTO_SLEEP_TIME, seconds])?;
        Ok(())
    }

    pub fn irq_control(&mut self) -> Result<IrqControl, TouchError> {
        let value = self.bus.dev.read_register(REG_IRQ_CTL)?;
        Ok(IrqControl::from_bits_truncate(value))
    }

    pub fn set_irq_control(&mut self, control: IrqControl) -> Result<(), TouchError> {
        self.bus.dev.write_register(&[REG_IRQ_CTL, control.bits()])?;
        Ok(())
    }

    pub fn motion_mask(&mut self) -> Result<MotionMask, TouchError> {
        let value = self.bus.dev.read_register(REG_MOTION_MASK)?;
        Ok(MotionMask::from_bits_truncate(value))
    }

    pub fn set_motion_mask(&mut self, mask: MotionMask) -> Result<(), TouchError> {
        self.bus.dev.write_register(&[REG_MOTION_MASK, mask.bits()])?;
        Ok(())
    }

    pub fn release(self) -> TouchBus<I2C, RST, DELAY> {
        self.bus
    }
}
