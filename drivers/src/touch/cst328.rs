// https://github.com/kovmarci86/t-deck-async-drivers-rs
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use super::cst226::{decode_points, read_chip_info, ChipInfo};
use super::{TouchBus, TouchError, TouchPoint, TouchReport};

pub(crate) const CST328_ADDRESS: u8 = 0x1A;

const REG_TOUCH_DATA: u16 = 0xD000;
const REG_DEBUG_INFO_MODE: u16 = 0xD101;
const REG_NORMAL_MODE: u16 = 0xD109;
const REG_DEEP_SLEEP: u16 = 0xD105;

const FRAME_LEN: usize = 27;
const MAX_POINTS: usize = 5;
const FRAME_TAG: u8 = 0xAB;

/// Five point controller CST328. Registers are 16 bit wide.
#[derive(Debug)]
pub struct Cst328<I2C, RST, DELAY> {
    bus: TouchBus<I2C, RST, DELAY>,
    info: ChipInfo,
}

impl<I2C, RST, DELAY> Cst328<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    #[allow(clippy::result_large_err)]
    pub fn probe(
        mut bus: TouchBus<I2C, RST, DELAY>,
    ) -> Result<Self, (TouchBus<I2C, RST, DELAY>, TouchError)> {
        match Self::identify(&mut bus) {
            Ok(info) => Ok(Self { bus, info }),
            Err(err) => Err((bus, err)),
        }
    }

    fn identify(bus: &mut TouchBus<I2C, RST, DELAY>) -> Result<ChipInfo, TouchError> {
        bus.reset(10, 300)?;
        bus.dev.write_register(&REG_DEBUG_INFO_MODE.to_be_bytes())?;
        bus.delay.delay_ms(10);
        let info = read_chip_info(bus)?;
        bus.dev.write_register(&REG_NORMAL_MODE.to_be_bytes())?;
        bus.delay.delay_ms(10);
        Ok(info)
    }

    pub fn info(&self) -> &ChipInfo {
        &self.info
    }

    pub fn resolution(&self) -> (u16, u16) {
        self.info.resolution
    }

    pub fn model_name(&self) -> &'static str {
        "CST328"
    }

    pub fn support_touch_point(&self) -> u8 {
        MAX_POINTS as u8
    }

    /// Reads one report and clears it. Only records in the pressed state
    /// are returned.
    pub fn read_points(&mut self, points: &mut [TouchPoint]) -> Result<TouchReport, TouchError> {
        let mut frame = [0u8; FRAME_LEN];
        self.bus
            .dev
            .read_register16_buffer(REG_TOUCH_DATA, &mut frame)?;

        let count = usize::from(frame[5] & 0x0F);
        let written = if frame[6] == FRAME_TAG && count <= MAX_POINTS {
            let mut decoded = [TouchPoint::default(); MAX_POINTS];
            let total = decode_points(&frame, count, &mut decoded);
            let mut written = 0;
            for (point, raw) in decoded[..total].iter().zip(Self::records(&frame)) {
                if raw & 0x0F != 0x06 {
                    continue;
                }
                match points.get_mut(written) {
                    Some(slot) => *slot = *point,
                    None => break,
                }
                written += 1;
            }
            written
        } else {
            0
        };

        let [hi, lo] = REG_TOUCH_DATA.to_be_bytes();
        self.bus.dev.write_register(&[hi, lo, FRAME_TAG])?;
        Ok(TouchReport::Points(written))
    }

    /// Status byte of each record, in record order.
    fn records(frame: &[u8]) -> impl Iterator<Item = u8> + '_ {
        [0usize, 7, 12, 17, 22].into_iter().map(move |i| frame[i])
    }

    pub fn sleep(&mut self) -> Result<(), TouchError> {
        self.bus.dev.write_register(&REG_DEEP_SLEEP.to_be_bytes())?;
        Ok(())
    }

    pub fn wakeup(&mut self) -> Result<(), TouchError> {
        self.bus.reset(10, 300)
    }

    pub fn release(self) -> TouchBus<I2C, RST, DELAY> {
        self.bus
    }
}
