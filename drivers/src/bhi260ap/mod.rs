//! BHI260AP smart sensor hub.
//!
//! The hub boots a firmware image uploaded by the host, then exposes its
//! virtual sensors through two FIFOs (wake-up and non-wake-up) and a status
//! channel. [`blocking::BHI260AP`] owns the device lifecycle and the process
//! buffer used to drain those FIFOs; [`parse`] decodes the drained bytes and
//! [`registry`] routes every decoded frame to the interested callbacks.

use core::fmt::{self, Display, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod blocking;
pub mod interface;
pub mod parse;
pub mod registry;
pub mod sensor;

pub use blocking::{EventCallback, ResultCallback, BHI260AP};
pub use interface::{HubInterface, I2cInterface, SpiInterface};
pub use registry::{CallbackId, Registry, Subscriptions};
pub use sensor::{default_scaling, sensor_name, SensorId, SENSOR_ID_MAX};

/// Default I2C address (HSDO low).
pub const BHI260AP_ADDRESS: u8 = 0x28;
/// Alternate I2C address (HSDO high).
pub const BHI260AP_ADDRESS_ALT: u8 = 0x29;

pub(crate) const PRODUCT_ID: u8 = 0x89;

// Host interface channels
pub(crate) const CHAN_CMD: u8 = 0x00;
pub(crate) const CHAN_FIFO_WAKE: u8 = 0x01;
pub(crate) const CHAN_FIFO_NON_WAKE: u8 = 0x02;
pub(crate) const CHAN_STATUS: u8 = 0x03;

// Registers
pub(crate) const REG_HOST_INTERRUPT_CTRL: u8 = 0x07;
pub(crate) const REG_RESET_REQ: u8 = 0x14;
pub(crate) const REG_PRODUCT_ID: u8 = 0x1C;
pub(crate) const REG_KERNEL_VERSION: u8 = 0x20;
pub(crate) const REG_BOOT_STATUS: u8 = 0x25;
pub(crate) const REG_INT_STATUS: u8 = 0x2D;
pub(crate) const REG_ERROR_VALUE: u8 = 0x2E;

// Commands, written to channel 0
pub(crate) const CMD_UPLOAD_TO_PROGRAM_RAM: u16 = 0x0002;
pub(crate) const CMD_BOOT_PROGRAM_RAM: u16 = 0x0003;
pub(crate) const CMD_ERASE_FLASH: u16 = 0x0004;
pub(crate) const CMD_WRITE_FLASH: u16 = 0x0005;
pub(crate) const CMD_BOOT_FLASH: u16 = 0x0006;
pub(crate) const CMD_CONFIG_SENSOR: u16 = 0x000D;
pub(crate) const CMD_PARAM_READ: u16 = 0x1000;

// Parameters
pub(crate) const PARAM_VIRT_SENSOR_PRESENT: u16 = 0x011F;
pub(crate) const PARAM_SENSOR_INFO_BASE: u16 = 0x0300;
pub(crate) const SENSOR_INFO_LEN: usize = 28;
pub(crate) const SENSOR_INFO_EVENT_SIZE: usize = 20;

// Status channel response codes
pub(crate) const STATUS_FLASH_ERASE_COMPLETE: u16 = 0x000A;
pub(crate) const STATUS_FLASH_WRITE_COMPLETE: u16 = 0x000B;
pub(crate) const STATUS_DEBUG_EVENT: u16 = 0x0006;
pub(crate) const STATUS_COMMAND_ERROR: u16 = 0x000F;

/// First flash address available for the firmware image.
pub(crate) const FLASH_SECTOR_START_ADDR: u32 = 0x1F84;

/// Largest single write pushed through the command channel.
pub(crate) const MAX_WRITE_LEN: usize = 256;

/// Default size of the buffer used to drain the FIFOs.
pub const DEFAULT_PROCESS_BUFFER_SIZE: usize = 512;
/// Smallest process buffer accepted, enough for a few of the largest frames.
pub const MIN_PROCESS_BUFFER_SIZE: usize = 64;

bitflags! {
    /// Boot status register (0x25).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootStatus: u8 {
        const FLASH_DETECTED = 1 << 0;
        const FLASH_VERIFY_DONE = 1 << 1;
        const FLASH_VERIFY_ERROR = 1 << 2;
        const NO_FLASH = 1 << 3;
        const HOST_INTERFACE_READY = 1 << 4;
        const HOST_FW_VERIFY_DONE = 1 << 5;
        const HOST_FW_VERIFY_ERROR = 1 << 6;
        const HOST_FW_IDLE = 1 << 7;
    }
}

bitflags! {
    /// Interrupt status register (0x2D).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptStatus: u8 {
        const HOST_INTERRUPT = 1 << 0;
        const WAKE_FIFO = 0b11 << 1;
        const NON_WAKE_FIFO = 0b11 << 3;
        const STATUS = 1 << 5;
        const DEBUG = 1 << 6;
        const RESET_OR_FAULT = 1 << 7;
    }
}

bitflags! {
    /// Host interrupt control register (0x07).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostInterruptCtrl: u8 {
        const DISABLE_FIFO_WAKE = 1 << 0;
        const DISABLE_FIFO_NON_WAKE = 1 << 1;
        const DISABLE_STATUS_FIFO = 1 << 2;
        const DISABLE_DEBUG = 1 << 3;
        const DISABLE_FAULT = 1 << 4;
        const ACTIVE_LOW = 1 << 5;
        const EDGE = 1 << 6;
        const OPEN_DRAIN = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HostInterruptCtrl {
    fn format(&self, f: defmt::Formatter) {
        self.iter_names().for_each(|(name, _)| {
            defmt::write!(f, "{} ", name);
        });
    }
}

/// Meta event types reported on the meta event channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MetaEventType {
    FlushComplete = 1,
    SampleRateChanged = 2,
    PowerModeChanged = 3,
    AlgorithmEvents = 5,
    SensorStatus = 6,
    BsxDoStepsMain = 7,
    BsxDoStepsCalib = 8,
    BsxGetOutputSignal = 9,
    SensorError = 11,
    FifoOverflow = 12,
    DynamicRangeChanged = 13,
    FifoWatermark = 14,
    Initialized = 16,
    TransferCause = 17,
    SensorFramework = 18,
    Reset = 19,
    Spacer = 20,
}

impl Display for MetaEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            MetaEventType::FlushComplete => "Flush complete",
            MetaEventType::SampleRateChanged => "Sample rate changed",
            MetaEventType::PowerModeChanged => "Power mode changed",
            MetaEventType::AlgorithmEvents => "Algorithm event",
            MetaEventType::SensorStatus => "Sensor status",
            MetaEventType::BsxDoStepsMain => "BSX event (do steps main)",
            MetaEventType::BsxDoStepsCalib => "BSX event (do steps calib)",
            MetaEventType::BsxGetOutputSignal => "BSX event (get output signal)",
            MetaEventType::SensorError => "Sensor error",
            MetaEventType::FifoOverflow => "FIFO overflow",
            MetaEventType::DynamicRangeChanged => "Dynamic range changed",
            MetaEventType::FifoWatermark => "FIFO watermark reached",
            MetaEventType::Initialized => "Firmware initialized",
            MetaEventType::TransferCause => "Transfer cause",
            MetaEventType::SensorFramework => "Sensor framework event",
            MetaEventType::Reset => "Reset event",
            MetaEventType::Spacer => "Spacer",
        };
        write!(f, "{}", text)
    }
}

/// A decoded meta event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MetaEvent {
    /// Raw type tag, byte 0 of the frame payload.
    pub event_type: u8,
    pub byte1: u8,
    pub byte2: u8,
    /// Frame came from the wake-up FIFO.
    pub wake_up: bool,
}

impl MetaEvent {
    pub fn kind(&self) -> Option<MetaEventType> {
        MetaEventType::try_from(self.event_type).ok()
    }
}

/// Payload of one sensor data frame, handed to result callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorData<'a> {
    pub sensor_id: u8,
    /// Raw payload, frame size minus the id byte. Layout depends on the sensor.
    pub data: &'a [u8],
    /// Hub timestamp in nanoseconds.
    pub timestamp_ns: u64,
}

/// Where an uploaded firmware image is stored and booted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirmwareTarget {
    #[default]
    Ram,
    Flash,
}

impl Display for FirmwareTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareTarget::Ram => write!(f, "RAM"),
            FirmwareTarget::Flash => write!(f, "FLASH"),
        }
    }
}

/// Which sensor ids get the generic data handler installed at `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationScope {
    /// Every id in `1..SENSOR_ID_MAX`, whether or not the firmware has it.
    All,
    /// Only ids the hub reports in its present-sensor bitmap.
    #[default]
    PresentOnly,
}

/// Bounded polling used while waiting for boot and command completion.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollingConfig {
    pub max_attempts: u16,
    pub delay_ms: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            delay_ms: 10,
        }
    }
}

/// Reset pulse timing, high → low → high.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetTiming {
    pub high_ms: u32,
    pub low_ms: u32,
    pub settle_ms: u32,
}

impl Default for ResetTiming {
    fn default() -> Self {
        Self {
            high_ms: 5,
            low_ms: 10,
            settle_ms: 5,
        }
    }
}

/// Sensor hub configuration, applied at `init`.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub process_buffer_size: usize,
    pub firmware: Option<&'static [u8]>,
    pub firmware_target: FirmwareTarget,
    pub registration_scope: RegistrationScope,
    pub polling: PollingConfig,
    pub reset_timing: ResetTiming,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            process_buffer_size: DEFAULT_PROCESS_BUFFER_SIZE,
            firmware: None,
            firmware_target: FirmwareTarget::Ram,
            registration_scope: RegistrationScope::PresentOnly,
            polling: PollingConfig::default(),
            reset_timing: ResetTiming::default(),
        }
    }
}

impl HubConfig {
    pub fn with_firmware(mut self, image: &'static [u8], target: FirmwareTarget) -> Self {
        self.firmware = Some(image);
        self.firmware_target = target;
        self
    }

    pub fn with_process_buffer_size(mut self, size: usize) -> Self {
        self.process_buffer_size = size;
        self
    }

    pub fn with_registration_scope(mut self, scope: RegistrationScope) -> Self {
        self.registration_scope = scope;
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }
}

/// Data available flag shared with the host's GPIO interrupt handler.
///
/// The interrupt handler calls [`DataReady::signal`]; the poll loop consumes
/// the flag in `update()`. Nothing else crosses the interrupt boundary.
#[derive(Debug)]
pub struct DataReady(AtomicBool);

impl DataReady {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Interrupt context entry point.
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for DataReady {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when interacting with the BHI260AP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HubError {
    /// Bus transaction failed
    Transport,
    /// Product id register did not read 0x89
    IdentityMismatch(u8),
    /// Flash upload requested but the hub has no external flash
    FlashNotDetected,
    /// Hub reported a non-zero sensor error after boot
    BootFailed(u8),
    /// Host interface never became ready
    BootTimeout,
    /// Sensor id was not discovered at init
    SensorNotPresent(u8),
    /// Process buffer could not be allocated
    BufferAllocationFailed,
    /// Hub needs firmware and none was configured
    FirmwareNotSet,
    /// Firmware length is not a multiple of four
    InvalidFirmware(usize),
    /// Operation requires a successful `init`
    NotInitialized,
    /// Hub rejected a command or answered with an unexpected status code
    CommandFailed(u16),
    /// FIFO contained a frame id whose size is unknown
    InvalidFrame(u8),
}

impl Display for HubError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Transport => write!(f, "Bus transaction failed"),
            HubError::IdentityMismatch(id) => {
                write!(f, "Product ID read {:#04x}, expected {:#04x}", id, PRODUCT_ID)
            }
            HubError::FlashNotDetected => write!(f, "Flash not detected"),
            HubError::BootFailed(code) => {
                write!(f, "Boot failed: {}", sensor_error_text(*code))
            }
            HubError::BootTimeout => write!(f, "Timed out waiting for host interface"),
            HubError::SensorNotPresent(id) => write!(f, "Sensor {} not present", id),
            HubError::BufferAllocationFailed => write!(f, "Process buffer allocation failed"),
            HubError::FirmwareNotSet => write!(f, "No firmware image configured"),
            HubError::InvalidFirmware(len) => {
                write!(f, "Firmware length {} is not a multiple of 4", len)
            }
            HubError::NotInitialized => write!(f, "Sensor hub not initialized"),
            HubError::CommandFailed(code) => write!(f, "Command failed, status {:#06x}", code),
            HubError::InvalidFrame(id) => write!(f, "Unknown FIFO frame id {}", id),
        }
    }
}

impl<E> From<E> for HubError
where
    E: embedded_hal::i2c::Error,
{
    fn from(_: E) -> Self {
        HubError::Transport
    }
}

/// Text for the hub's error value register (0x2E).
pub fn sensor_error_text(code: u8) -> &'static str {
    match code {
        0x00 => "No error",
        0x10 => "Bootloader reports: Firmware Expected Version Mismatch",
        0x11 => "Bootloader reports: Firmware Upload Failed: Bad Header CRC",
        0x12 => "Bootloader reports: Firmware Upload Failed: SHA Hash Mismatch",
        0x13 => "Bootloader reports: Firmware Upload Failed: Bad Image CRC",
        0x14 => "Bootloader reports: Firmware Upload Failed: ECDSA Signature Verification Failed",
        0x15 => "Bootloader reports: Firmware Upload Failed: Bad Public Key CRC",
        0x16 => "Bootloader reports: Firmware Upload Failed: Signed Firmware Required",
        0x17 => "Bootloader reports: Firmware Upload Failed: FW Header Missing",
        0x19 => "Bootloader reports: Unexpected Watchdog Reset",
        0x1A => "ROM Version Mismatch",
        0x1B => "Bootloader reports: Fatal Firmware Error",
        0x1C => "Chained Firmware Error: Next Payload Not Found",
        0x1D => "Chained Firmware Error: Payload Not Valid",
        0x1E => "Chained Firmware Error: Payload Entries Invalid",
        0x1F => "Bootloader reports: Bootloader Error: OTP CRC Invalid",
        0x20 => "Firmware Init Failed",
        0x21 => "Sensor Init Failed: Unexpected Device ID",
        0x22 => "Sensor Init Failed: No Response from Device",
        0x23 => "Sensor Init Failed: Unknown",
        0x24 => "Sensor Error: No Valid Data",
        0x25 => "Slow Sample Rate",
        0x26 => "Data Overflow (saturated sensor data)",
        0x27 => "Stack Overflow",
        0x28 => "Insufficient Free RAM",
        0x29 => "Sensor Init Failed: Driver Parsing Error",
        0x2A => "Too Many RAM Banks Required",
        0x2B => "Invalid Event Specified",
        0x2C => "More than 32 On Change",
        0x2D => "Firmware Too Large",
        0x2F => "Invalid RAM Banks",
        0x30 => "Math Error",
        0x40 => "Memory Error",
        0x41 => "SWI3 Error",
        0x42 => "SWI4 Error",
        0x43 => "Illegal Instruction Error",
        0x44 => "Bootloader reports: Unhandled Interrupt Error / Exception / Postmortem Available",
        0x45 => "Invalid Memory Access",
        0x50 => "Algorithm Error: BSX Init",
        0x51 => "Algorithm Error: BSX Do Step",
        0x52 => "Algorithm Error: Update Sub",
        0x53 => "Algorithm Error: Get Sub",
        0x54 => "Algorithm Error: Get Phys",
        0x55 => "Algorithm Error: Unsupported Phys Rate",
        0x56 => "Algorithm Error: Cannot find BSX Driver",
        0x60 => "Sensor Self-Test Failure",
        0x61 => "Sensor Self-Test X Axis Failure",
        0x62 => "Sensor Self-Test Y Axis Failure",
        0x64 => "Sensor Self-Test Z Axis Failure",
        0x65 => "FOC Failure",
        0x66 => "Sensor Busy",
        0x6F => "Self-Test or FOC Test Unsupported",
        0x72 => "No Host Interrupt Set",
        0x73 => "Event ID Passed to Host Interface Has No Known Size",
        0x75 => "Host Download Channel Underflow (Host Read Too Fast)",
        0x76 => "Host Upload Channel Overflow (Host Wrote Too Fast)",
        0x77 => "Host Download Channel Empty",
        0x78 => "DMA Error",
        0x79 => "Corrupted Input Block Chain",
        0x7A => "Corrupted Output Block Chain",
        0x7B => "Buffer Block Manager Error",
        0x7C => "Input Channel Not Word Aligned",
        0x7D => "Too Many Flush Events",
        0x7E => "Unknown Host Channel Error",
        0x81 => "Decimation Too Large",
        0x90 => "Master SPI/I2C Queue Overflow",
        0x91 => "SPI/I2C Callback Error",
        0xA0 => "Timer Scheduling Error",
        0xB0 => "Invalid GPIO for Host IRQ",
        0xB1 => "Error Sending Initialized Meta Events",
        0xC0 => "Bootloader reports: Command Error",
        0xC1 => "Bootloader reports: Command Too Long",
        0xC2 => "Bootloader reports: Command Buffer Overflow",
        0xD0 => "User Mode Error: Sys Call Invalid",
        0xD1 => "User Mode Error: Trap Invalid",
        0xE1 => "Firmware Upload Failed: Firmware header corrupt",
        0xE2 => "Sensor Data Injection: Invalid input stream",
        _ => "Unknown error code",
    }
}
