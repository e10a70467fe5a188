use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use super::{TouchBus, TouchError, TouchPoint, TouchReport};

pub(crate) const CST226_ADDRESS: u8 = 0x5A;

const REG_STATUS: u8 = 0x00;
const REG_CHECKCODE: u16 = 0xD1FC;
const REG_RESOLUTION: u16 = 0xD1F8;
const REG_CHIP_TYPE: u16 = 0xD204;
const REG_FW_VERSION: u16 = 0xD208;

const CMD_MODE_ENTER: [u8; 2] = [0xD1, 0x01];
const CMD_MODE_EXIT: [u8; 2] = [0xD1, 0x09];
const CMD_SLEEP: [u8; 2] = [0xD1, 0x05];

const FRAME_LEN: usize = 28;
const MAX_POINTS: usize = 5;
const FRAME_TAG: u8 = 0xAB;

pub(crate) const CHECKCODE_MASK: u32 = 0xFFFF_0000;
pub(crate) const CHECKCODE_EXPECTED: u32 = 0xCACA_0000;
pub(crate) const NO_FIRMWARE: u32 = 0xA5A5_A5A5;

/// Identity block read in command mode, shared by the CST2xx and CST3xx
/// parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInfo {
    pub checkcode: u32,
    pub resolution: (u16, u16),
    pub chip_type: u16,
    pub project_id: u16,
    pub firmware: u32,
    pub checksum: u32,
}

pub(crate) fn read_chip_info<I2C, RST, DELAY>(
    bus: &mut TouchBus<I2C, RST, DELAY>,
) -> Result<ChipInfo, TouchError>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    let mut word = [0u8; 4];
    bus.dev.read_register16_buffer(REG_CHECKCODE, &mut word)?;
    let checkcode = u32::from_le_bytes(word);

    bus.dev.read_register16_buffer(REG_RESOLUTION, &mut word)?;
    let resolution = (
        u16::from_le_bytes([word[0], word[1]]),
        u16::from_le_bytes([word[2], word[3]]),
    );

    bus.dev.read_register16_buffer(REG_CHIP_TYPE, &mut word)?;
    let project_id = u16::from_le_bytes([word[0], word[1]]);
    let chip_type = u16::from_le_bytes([word[2], word[3]]);

    let mut version = [0u8; 8];
    bus.dev.read_register16_buffer(REG_FW_VERSION, &mut version)?;
    let firmware = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
    let checksum = u32::from_le_bytes([version[4], version[5], version[6], version[7]]);

    info!(
        "checkcode {:#x}, resolution {}x{}, chip type {:#x}, project {:#x}, firmware {:#x}",
        checkcode,
        resolution.0,
        resolution.1,
        chip_type,
        project_id,
        firmware
    );

    let info = ChipInfo {
        checkcode,
        resolution,
        chip_type,
        project_id,
        firmware,
        checksum,
    };
    if info.firmware == NO_FIRMWARE {
        return Err(TouchError::NoFirmware);
    }
    if info.checkcode & CHECKCODE_MASK != CHECKCODE_EXPECTED {
        return Err(TouchError::IdentityMismatch(info.checkcode));
    }
    Ok(info)
}

/// Decodes up to five contacts from a CST2xx/CST3xx report. The first record
/// is followed by two status bytes, so it is seven bytes long and the rest
/// are five.
pub(crate) fn decode_points(frame: &[u8], count: usize, points: &mut [TouchPoint]) -> usize {
    let mut index = 0;
    let mut written = 0;
    for slot in points.iter_mut().take(count) {
        let Some(record) = frame.get(index..index + 5) else {
            break;
        };
        *slot = TouchPoint {
            id: record[0] >> 4,
            x: (u16::from(record[1]) << 4) | u16::from(record[3] >> 4),
            y: (u16::from(record[2]) << 4) | u16::from(record[3] & 0x0F),
            pressure: record[4],
        };
        written += 1;
        index += if written == 1 { 7 } else { 5 };
    }
    written
}

/// Five point controller CST226SE.
#[derive(Debug)]
pub struct Cst226<I2C, RST, DELAY> {
    bus: TouchBus<I2C, RST, DELAY>,
    info: ChipInfo,
}

impl<I2C, RST, DELAY> Cst226<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Resets the chip, reads its identity in command mode and validates the
    /// check code. On failure the bus is handed back.
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
        bus.reset(30, 50)?;
        bus.dev.write_register(&CMD_MODE_ENTER)?;
        bus.delay.delay_ms(10);
        let info = read_chip_info(bus)?;
        bus.dev.write_register(&CMD_MODE_EXIT)?;
        Ok(info)
    }

    pub fn info(&self) -> &ChipInfo {
        &self.info
    }

    pub fn resolution(&self) -> (u16, u16) {
        self.info.resolution
    }

    pub fn model_name(&self) -> &'static str {
        "CST226SE"
    }

    pub fn support_touch_point(&self) -> u8 {
        MAX_POINTS as u8
    }

    pub fn read_points(&mut self, points: &mut [TouchPoint]) -> Result<TouchReport, TouchError> {
        let mut frame = [0u8; FRAME_LEN];
        self.bus.dev.read_register_buffer(REG_STATUS, &mut frame)?;

        if frame[0] == 0x83 && frame[1] == 0x17 && frame[5] == 0x80 {
            return Ok(TouchReport::HomeButton);
        }
        if frame[6] != FRAME_TAG || frame[0] == FRAME_TAG || frame[5] == 0x80 {
            return Ok(TouchReport::Points(0));
        }

        let count = usize::from(frame[5] & 0x7F);
        if count == 0 || count > MAX_POINTS {
            // acknowledge the report so the chip releases the line
            self.bus.dev.write_register(&[REG_STATUS, FRAME_TAG])?;
            return Ok(TouchReport::Points(0));
        }

        Ok(TouchReport::Points(decode_points(&frame, count, points)))
    }

    pub fn sleep(&mut self) -> Result<(), TouchError> {
        self.bus.dev.write_register(&CMD_SLEEP)?;
        Ok(())
    }

    pub fn wakeup(&mut self) -> Result<(), TouchError> {
        self.bus.reset(30, 50)
    }

    pub fn release(self) -> TouchBus<I2C, RST, DELAY> {
        self.bus
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mock::{FakeDelay, FakeI2c, FakePin};
    use alloc::vec;

    /// Scripts the command-mode identity block at `address`.
    pub(crate) fn script_identity(i2c: &FakeI2c, address: u8, checkcode: u32, firmware: u32) {
        i2c.respond(address, &[0xD1, 0xFC], &checkcode.to_le_bytes());
        i2c.respond(address, &[0xD1, 0xF8], &[0xF0, 0x00, 0x18, 0x02]);
        i2c.respond(address, &[0xD2, 0x04], &[0x34, 0x12, 0x26, 0xA2]);
        let mut version = [0u8; 8];
        version[..4].copy_from_slice(&firmware.to_le_bytes());
        version[4..].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        i2c.respond(address, &[0xD2, 0x08], &version);
    }

    fn probed(i2c: &FakeI2c) -> Cst226<FakeI2c, FakePin, FakeDelay> {
        script_identity(i2c, CST226_ADDRESS, 0xCACA_0102, 0x0000_0105);
        let bus = TouchBus::new(i2c.clone(), Some(FakePin::default()), FakeDelay::default())
            .with_address(CST226_ADDRESS);
        Cst226::probe(bus).unwrap()
    }

    fn frame(records: &[(u16, u16)]) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        let mut index = 0;
        for (i, (x, y)) in records.iter().enumerate() {
            frame[index] = ((i as u8) << 4) | 0x06;
            frame[index + 1] = (x >> 4) as u8;
            frame[index + 2] = (y >> 4) as u8;
            frame[index + 3] = (((x & 0x0F) as u8) << 4) | (y & 0x0F) as u8;
            frame[index + 4] = 0x20;
            index += if i == 0 { 7 } else { 5 };
        }
        frame[5] = records.len() as u8;
        frame[6] = FRAME_TAG;
        frame
    }

    #[test]
    fn test_probe_reads_identity_in_command_mode() {
        let i2c = FakeI2c::new();
        let touch = probed(&i2c);
        assert_eq!(touch.resolution(), (240, 536));
        assert_eq!(touch.info().chip_type, 0xA226);
        assert_eq!(touch.info().project_id, 0x1234);
        assert_eq!(touch.info().checksum, 0xDEAD_BEEF);

        let commands: alloc::vec::Vec<_> = i2c
            .written()
            .into_iter()
            .map(|(_, bytes)| bytes)
            .filter(|bytes| bytes.len() == 2 && bytes[0] == 0xD1 && bytes[1] < 0x10)
            .collect();
        assert_eq!(commands, vec![vec![0xD1, 0x01], vec![0xD1, 0x09]]);
    }

    #[test]
    fn test_probe_without_firmware() {
        let i2c = FakeI2c::new();
        script_identity(&i2c, CST226_ADDRESS, 0xCACA_0000, NO_FIRMWARE);
        let bus: TouchBus<_, FakePin, _> =
            TouchBus::new(i2c, None, FakeDelay::default()).with_address(CST226_ADDRESS);
        let (_, err) = Cst226::probe(bus).unwrap_err();
        assert_eq!(err, TouchError::NoFirmware);
    }

    #[test]
    fn test_probe_rejects_bad_checkcode() {
        let i2c = FakeI2c::new();
        script_identity(&i2c, CST226_ADDRESS, 0x1234_0000, 1);
        let bus: TouchBus<_, FakePin, _> =
            TouchBus::new(i2c, None, FakeDelay::default()).with_address(CST226_ADDRESS);
        let (_, err) = Cst226::probe(bus).unwrap_err();
        assert_eq!(err, TouchError::IdentityMismatch(0x1234_0000));
    }

    #[test]
    fn test_read_points_decodes_records_with_gap_after_first() {
        let i2c = FakeI2c::new();
        let mut touch = probed(&i2c);
        i2c.respond(
            CST226_ADDRESS,
            &[REG_STATUS],
            &frame(&[(100, 200), (0x123, 0x456), (7, 9)]),
        );

        let mut points = [TouchPoint::default(); 5];
        assert_eq!(touch.read_points(&mut points).unwrap(), TouchReport::Points(3));
        assert_eq!((points[0].x, points[0].y), (100, 200));
        assert_eq!((points[1].x, points[1].y, points[1].id), (0x123, 0x456, 1));
        assert_eq!((points[2].x, points[2].y), (7, 9));
        assert_eq!(points[2].pressure, 0x20);
    }

    #[test]
    fn test_read_points_truncates_to_output_slice() {
        let i2c = FakeI2c::new();
        let mut touch = probed(&i2c);
        i2c.respond(CST226_ADDRESS, &[REG_STATUS], &frame(&[(1, 2), (3, 4)]));
        let mut points = [TouchPoint::default(); 1];
        assert_eq!(touch.read_points(&mut points).unwrap(), TouchReport::Points(1));
    }

    #[test]
    fn test_home_button_signature() {
        let i2c = FakeI2c::new();
        let mut touch = probed(&i2c);
        let mut raw = [0u8; FRAME_LEN];
        raw[0] = 0x83;
        raw[1] = 0x17;
        raw[5] = 0x80;
        i2c.respond(CST226_ADDRESS, &[REG_STATUS], &raw);

        let mut points = [TouchPoint::default(); 5];
        assert_eq!(touch.read_points(&mut points).unwrap(), TouchReport::HomeButton);
    }

    #[test]
    fn test_invalid_count_is_acknowledged() {
        let i2c = FakeI2c::new();
        let mut touch = probed(&i2c);
        let mut raw = [0u8; FRAME_LEN];
        raw[5] = 6;
        raw[6] = FRAME_TAG;
        i2c.respond(CST226_ADDRESS, &[REG_STATUS], &raw);

        let mut points = [TouchPoint::default(); 5];
        assert_eq!(touch.read_points(&mut points).unwrap(), TouchReport::Points(0));
        assert_eq!(i2c.written().last().unwrap().1, vec![0x00, 0xAB]);
    }

    #[test]
    fn test_untagged_frame_is_ignored() {
        let i2c = FakeI2c::new();
        let mut touch = probed(&i2c);
        let mut raw = frame(&[(1, 2)]);
        raw[6] = 0;
        i2c.respond(CST226_ADDRESS, &[REG_STATUS], &raw);

        let mut points = [TouchPoint::default(); 5];
        assert_eq!(touch.read_points(&mut points).unwrap(), TouchReport::Points(0));
    }

    #[test]
    fn test_sleep_command() {
        let i2c = FakeI2c::new();
        let mut touch = probed(&i2c);
        touch.sleep().unwrap();
        assert_eq!(i2c.written().last().unwrap().1, vec![0xD1, 0x05]);
    }
}
