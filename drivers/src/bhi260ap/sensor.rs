//! Virtual sensor catalogue.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Virtual sensor ids are below this value; everything from 245 up is a
/// system frame id.
pub const SENSOR_ID_MAX: u8 = 200;

// System frame ids
pub(crate) const SYS_ID_PADDING: u8 = 0;
pub(crate) const SYS_ID_TS_SMALL_DELTA_WU: u8 = 245;
pub(crate) const SYS_ID_TS_LARGE_DELTA_WU: u8 = 246;
pub(crate) const SYS_ID_TS_FULL_WU: u8 = 247;
pub(crate) const SYS_ID_META_EVENT_WU: u8 = 248;
pub(crate) const SYS_ID_DEBUG_MSG: u8 = 250;
pub(crate) const SYS_ID_TS_SMALL_DELTA: u8 = 251;
pub(crate) const SYS_ID_TS_LARGE_DELTA: u8 = 252;
pub(crate) const SYS_ID_TS_FULL: u8 = 253;
pub(crate) const SYS_ID_META_EVENT: u8 = 254;
pub(crate) const SYS_ID_FILLER: u8 = 255;

/// Commonly used virtual sensors of the standard BHI260AP firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorId {
    AccPassthrough = 1,
    AccRaw = 3,
    Acc = 4,
    AccBias = 5,
    AccWakeUp = 6,
    AccRawWakeUp = 7,
    GyroPassthrough = 10,
    GyroRaw = 12,
    Gyro = 13,
    GyroBias = 14,
    GyroWakeUp = 15,
    GyroRawWakeUp = 16,
    MagPassthrough = 19,
    MagRaw = 21,
    Mag = 22,
    MagBias = 23,
    MagWakeUp = 24,
    MagRawWakeUp = 25,
    Gravity = 28,
    GravityWakeUp = 29,
    LinearAcc = 31,
    LinearAccWakeUp = 32,
    RotationVector = 34,
    RotationVectorWakeUp = 35,
    GameRotationVector = 37,
    GameRotationVectorWakeUp = 38,
    GeoMagRotationVector = 40,
    GeoMagRotationVectorWakeUp = 41,
    Orientation = 43,
    OrientationWakeUp = 44,
    TiltDetector = 48,
    StepDetector = 50,
    StepCounter = 52,
    StepCounterWakeUp = 53,
    SignificantMotion = 55,
    WakeGesture = 57,
    GlanceGesture = 59,
    PickupGesture = 61,
    ActivityRecognition = 63,
    WristTiltGesture = 67,
    DeviceOrientation = 69,
    DeviceOrientationWakeUp = 70,
    StationaryDetect = 75,
    MotionDetect = 77,
    AccBiasWakeUp = 91,
    GyroBiasWakeUp = 92,
    MagBiasWakeUp = 93,
    StepDetectorWakeUp = 94,
    Temperature = 128,
    Barometer = 129,
    Humidity = 130,
    Gas = 131,
    TemperatureWakeUp = 132,
    BarometerWakeUp = 133,
    HumidityWakeUp = 134,
    GasWakeUp = 135,
    StepCounterLowPower = 136,
    StepDetectorLowPower = 137,
    SignificantMotionLowPower = 138,
    StepCounterLowPowerWakeUp = 139,
    StepDetectorLowPowerWakeUp = 140,
    SignificantMotionLowPowerWakeUp = 141,
    AnyMotionLowPower = 142,
    AnyMotionLowPowerWakeUp = 143,
    ExtCustomPressure = 150,
}

impl SensorId {
    pub fn name(self) -> &'static str {
        sensor_name(self.into())
    }
}

/// Human readable name of a sensor id.
pub fn sensor_name(id: u8) -> &'static str {
    let Ok(sensor) = SensorId::try_from(id) else {
        return match id {
            160..=191 => "Custom sensor",
            _ => "Undefined sensor ID",
        };
    };
    match sensor {
        SensorId::AccPassthrough => "Accelerometer passthrough",
        SensorId::AccRaw => "Accelerometer uncalibrated",
        SensorId::Acc => "Accelerometer corrected",
        SensorId::AccBias => "Accelerometer offset",
        SensorId::AccWakeUp => "Accelerometer corrected wake up",
        SensorId::AccRawWakeUp => "Accelerometer uncalibrated wake up",
        SensorId::GyroPassthrough => "Gyroscope passthrough",
        SensorId::GyroRaw => "Gyroscope uncalibrated",
        SensorId::Gyro => "Gyroscope corrected",
        SensorId::GyroBias => "Gyroscope offset",
        SensorId::GyroWakeUp => "Gyroscope wake up",
        SensorId::GyroRawWakeUp => "Gyroscope uncalibrated wake up",
        SensorId::MagPassthrough => "Magnetometer passthrough",
        SensorId::MagRaw => "Magnetometer uncalibrated",
        SensorId::Mag => "Magnetometer corrected",
        SensorId::MagBias => "Magnetometer offset",
        SensorId::MagWakeUp => "Magnetometer wake up",
        SensorId::MagRawWakeUp => "Magnetometer uncalibrated wake up",
        SensorId::Gravity => "Gravity vector",
        SensorId::GravityWakeUp => "Gravity vector wake up",
        SensorId::LinearAcc => "Linear acceleration",
        SensorId::LinearAccWakeUp => "Linear acceleration wake up",
        SensorId::RotationVector => "Rotation vector",
        SensorId::RotationVectorWakeUp => "Rotation vector wake up",
        SensorId::GameRotationVector => "Game rotation vector",
        SensorId::GameRotationVectorWakeUp => "Game rotation vector wake up",
        SensorId::GeoMagRotationVector => "Geo-magnetic rotation vector",
        SensorId::GeoMagRotationVectorWakeUp => "Geo-magnetic rotation vector wake up",
        SensorId::Orientation => "Orientation",
        SensorId::OrientationWakeUp => "Orientation wake up",
        SensorId::TiltDetector => "Tilt detector",
        SensorId::StepDetector => "Step detector",
        SensorId::StepCounter => "Step counter",
        SensorId::StepCounterWakeUp => "Step counter wake up",
        SensorId::SignificantMotion => "Significant motion",
        SensorId::WakeGesture => "Wake gesture",
        SensorId::GlanceGesture => "Glance gesture",
        SensorId::PickupGesture => "Pickup gesture",
        SensorId::ActivityRecognition => "Activity recognition",
        SensorId::WristTiltGesture => "Wrist tilt gesture",
        SensorId::DeviceOrientation => "Device orientation",
        SensorId::DeviceOrientationWakeUp => "Device orientation wake up",
        SensorId::StationaryDetect => "Stationary detect",
        SensorId::MotionDetect => "Motion detect",
        SensorId::AccBiasWakeUp => "Accelerometer offset wake up",
        SensorId::GyroBiasWakeUp => "Gyroscope offset wake up",
        SensorId::MagBiasWakeUp => "Magnetometer offset wake up",
        SensorId::StepDetectorWakeUp => "Step detector wake up",
        SensorId::Temperature => "Temperature",
        SensorId::Barometer => "Barometer",
        SensorId::Humidity => "Humidity",
        SensorId::Gas => "Gas",
        SensorId::TemperatureWakeUp => "Temperature wake up",
        SensorId::BarometerWakeUp => "Barometer wake up",
        SensorId::HumidityWakeUp => "Humidity wake up",
        SensorId::GasWakeUp => "Gas wake up",
        SensorId::StepCounterLowPower => "Step counter (low power)",
        SensorId::StepDetectorLowPower => "Step detector (low power)",
        SensorId::SignificantMotionLowPower => "Significant motion (low power)",
        SensorId::StepCounterLowPowerWakeUp => "Step counter (low power) wake up",
        SensorId::StepDetectorLowPowerWakeUp => "Step detector (low power) wake up",
        SensorId::SignificantMotionLowPowerWakeUp => "Significant motion (low power) wake up",
        SensorId::AnyMotionLowPower => "Any motion (low power)",
        SensorId::AnyMotionLowPowerWakeUp => "Any motion (low power) wake up",
        SensorId::ExtCustomPressure => "External pressure",
    }
}

/// Default scale factor turning raw sensor counts into physical units, for
/// the default sensor ranges.
pub fn default_scaling(id: u8) -> f32 {
    let Ok(sensor) = SensorId::try_from(id) else {
        return 1.0;
    };
    match sensor {
        SensorId::AccPassthrough
        | SensorId::AccRaw
        | SensorId::Acc
        | SensorId::AccBias
        | SensorId::AccWakeUp
        | SensorId::AccRawWakeUp
        | SensorId::AccBiasWakeUp
        | SensorId::Gravity
        | SensorId::GravityWakeUp
        | SensorId::LinearAcc
        | SensorId::LinearAccWakeUp => 1.0 / 4096.0,
        SensorId::GyroPassthrough
        | SensorId::GyroRaw
        | SensorId::Gyro
        | SensorId::GyroBias
        | SensorId::GyroWakeUp
        | SensorId::GyroRawWakeUp
        | SensorId::GyroBiasWakeUp => 2000.0 / 32768.0,
        SensorId::MagPassthrough
        | SensorId::MagRaw
        | SensorId::Mag
        | SensorId::MagBias
        | SensorId::MagWakeUp
        | SensorId::MagRawWakeUp
        | SensorId::MagBiasWakeUp => 2500.0 / 32768.0,
        SensorId::RotationVector
        | SensorId::RotationVectorWakeUp
        | SensorId::GameRotationVector
        | SensorId::GameRotationVectorWakeUp
        | SensorId::GeoMagRotationVector
        | SensorId::GeoMagRotationVectorWakeUp => 1.0 / 16384.0,
        SensorId::Orientation | SensorId::OrientationWakeUp => 360.0 / 32768.0,
        SensorId::Temperature | SensorId::TemperatureWakeUp => 1.0 / 100.0,
        SensorId::Barometer | SensorId::BarometerWakeUp => 1.0 / 128.0,
        SensorId::Humidity | SensorId::HumidityWakeUp => 1.0,
        _ => 1.0,
    }
}

/// Size in bytes (id byte included) of each frame id that can appear in a
/// FIFO. Virtual sensor sizes are learned from the hub at init; system frame
/// sizes are fixed.
#[derive(Debug, Clone)]
pub struct EventSizes {
    sizes: [u8; 256],
}

impl EventSizes {
    pub fn new() -> Self {
        let mut sizes = [0u8; 256];
        sizes[SYS_ID_PADDING as usize] = 1;
        sizes[SYS_ID_FILLER as usize] = 1;
        sizes[SYS_ID_TS_SMALL_DELTA as usize] = 2;
        sizes[SYS_ID_TS_SMALL_DELTA_WU as usize] = 2;
        sizes[SYS_ID_TS_LARGE_DELTA as usize] = 3;
        sizes[SYS_ID_TS_LARGE_DELTA_WU as usize] = 3;
        sizes[SYS_ID_TS_FULL as usize] = 6;
        sizes[SYS_ID_TS_FULL_WU as usize] = 6;
        sizes[SYS_ID_META_EVENT as usize] = 4;
        sizes[SYS_ID_META_EVENT_WU as usize] = 4;
        sizes[SYS_ID_DEBUG_MSG as usize] = 18;
        Self { sizes }
    }

    /// Records the frame size of a virtual sensor. Ids outside the virtual
    /// sensor range are ignored.
    pub fn set(&mut self, sensor_id: u8, size: u8) {
        if sensor_id != SYS_ID_PADDING && sensor_id < SENSOR_ID_MAX {
            self.sizes[sensor_id as usize] = size;
        }
    }

    pub fn get(&self, id: u8) -> Option<usize> {
        match self.sizes[id as usize] {
            0 => None,
            size => Some(size as usize),
        }
    }

    /// Forgets every virtual sensor size, keeping the system frames.
    pub fn clear_sensors(&mut self) {
        *self = Self::new();
    }
}

impl Default for EventSizes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_name_lookup() {
        assert_eq!(sensor_name(34), "Rotation vector");
        assert_eq!(SensorId::StepCounter.name(), "Step counter");
        assert_eq!(sensor_name(170), "Custom sensor");
        assert_eq!(sensor_name(2), "Undefined sensor ID");
    }

    #[test]
    fn test_default_scaling() {
        assert_eq!(default_scaling(SensorId::Acc.into()), 1.0 / 4096.0);
        assert_eq!(default_scaling(SensorId::GameRotationVector.into()), 1.0 / 16384.0);
        assert_eq!(default_scaling(199), 1.0);
    }

    #[test]
    fn test_event_sizes_system_frames_are_fixed() {
        let mut sizes = EventSizes::new();
        assert_eq!(sizes.get(SYS_ID_META_EVENT), Some(4));
        assert_eq!(sizes.get(SYS_ID_DEBUG_MSG), Some(18));
        assert_eq!(sizes.get(SensorId::Acc.into()), None);

        sizes.set(SensorId::Acc.into(), 7);
        sizes.set(SYS_ID_META_EVENT, 9);
        assert_eq!(sizes.get(SensorId::Acc.into()), Some(7));
        assert_eq!(sizes.get(SYS_ID_META_EVENT), Some(4));

        sizes.clear_sensors();
        assert_eq!(sizes.get(SensorId::Acc.into()), None);
        assert_eq!(sizes.get(SYS_ID_TS_FULL), Some(6));
    }
}
