//! Auto-detecting touch driver.
//!
//! [`TouchDrvCstxxx`] starts out unbound. [`TouchDrvCstxxx::begin`] probes the
//! known controllers in a fixed order (CST816, CST226, CST328) and keeps the
//! first one whose identity check passes for the rest of its life. When a
//! model is pre-selected in [`TouchConfig`] only that model is probed. If no
//! chip answers the driver stays unbound and every call is a harmless no-op.

use alloc::boxed::Box;
use core::slice;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;

use super::{
    Cst226, Cst328, Cst816, MonotonicClock, TouchBus, TouchConfig, TouchError, TouchModel,
    TouchPoint, TouchReport,
};

const PROBE_ORDER: [TouchModel; 3] = [TouchModel::Cst816, TouchModel::Cst226, TouchModel::Cst328];

enum Driver<I2C, RST, DELAY> {
    Unknown(TouchBus<I2C, RST, DELAY>),
    Cst816(Cst816<I2C, RST, DELAY>),
    Cst226(Cst226<I2C, RST, DELAY>),
    Cst328(Cst328<I2C, RST, DELAY>),
}

impl<I2C, RST, DELAY> Driver<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    fn model(&self) -> Option<TouchModel> {
        match self {
            Driver::Unknown(_) => None,
            Driver::Cst816(_) => Some(TouchModel::Cst816),
            Driver::Cst226(_) => Some(TouchModel::Cst226),
            Driver::Cst328(_) => Some(TouchModel::Cst328),
        }
    }

    fn into_bus(self) -> TouchBus<I2C, RST, DELAY> {
        match self {
            Driver::Unknown(bus) => bus,
            Driver::Cst816(touch) => touch.release(),
            Driver::Cst226(touch) => touch.release(),
            Driver::Cst328(touch) => touch.release(),
        }
    }
}

/// Tries each model in `order` on `bus`. Returns the first driver that
/// probed successfully, or the bus with the last probe error.
fn probe_in_order<I2C, RST, DELAY>(
    mut bus: TouchBus<I2C, RST, DELAY>,
    order: &[TouchModel],
    address: Option<u8>,
) -> (Driver<I2C, RST, DELAY>, Result<(), TouchError>)
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    let mut outcome = Err(TouchError::Bus);
    for &model in order {
        let target = address.unwrap_or(model.default_address());
        bus.set_address(target);
        let attempt = match model {
            TouchModel::Cst816 => Cst816::probe(bus).map(Driver::Cst816),
            TouchModel::Cst226 => Cst226::probe(bus).map(Driver::Cst226),
            TouchModel::Cst328 => Cst328::probe(bus).map(Driver::Cst328),
        };
        match attempt {
            Ok(driver) => {
                info!("Touch controller {} found at {:#x}", model, target);
                return (driver, Ok(()));
            }
            Err((returned, err)) => {
                debug!("No {} on the bus: {}", model, err);
                bus = returned;
                outcome = Err(err);
            }
        }
    }
    warn!("No touch controller detected");
    (Driver::Unknown(bus), outcome)
}

pub struct TouchDrvCstxxx<I2C, IRQ, RST, DELAY, CLK> {
    // `None` only while `begin` swaps the variant.
    driver: Option<Driver<I2C, RST, DELAY>>,
    irq: Option<IRQ>,
    clock: CLK,
    config: TouchConfig,
    center: (u16, u16),
    home_button: Option<Box<dyn FnMut()>>,
    last_pulse: Option<u64>,
}

impl<I2C, IRQ, RST, DELAY, CLK> TouchDrvCstxxx<I2C, IRQ, RST, DELAY, CLK>
where
    I2C: I2c,
    IRQ: InputPin,
    RST: OutputPin,
    DELAY: DelayNs,
    CLK: MonotonicClock,
{
    /// Creates an unbound driver. Nothing is sent on the bus until `begin`.
    pub fn new(
        i2c: I2C,
        irq: Option<IRQ>,
        rst: Option<RST>,
        delay: DELAY,
        clock: CLK,
        config: TouchConfig,
    ) -> Self {
        Self {
            driver: Some(Driver::Unknown(TouchBus::new(i2c, rst, delay))),
            irq,
            clock,
            config,
            center: (0, 0),
            home_button: None,
            last_pulse: None,
        }
    }

    /// Binds to a controller. Does nothing once a controller is bound.
    pub fn begin(&mut self) -> Result<(), TouchError> {
        let bus = match self.driver.take() {
            Some(Driver::Unknown(bus)) => bus,
            bound => {
                self.driver = bound;
                return Ok(());
            }
        };
        let order = match &self.config.model {
            Some(model) => slice::from_ref(model),
            None => &PROBE_ORDER[..],
        };
        let (driver, outcome) = probe_in_order(bus, order, self.config.address);
        self.driver = Some(driver);
        outcome
    }

    pub fn is_bound(&self) -> bool {
        self.model().is_some()
    }

    pub fn model(&self) -> Option<TouchModel> {
        self.driver.as_ref().and_then(Driver::model)
    }

    pub fn model_name(&self) -> &'static str {
        match &self.driver {
            Some(Driver::Cst816(touch)) => touch.model_name(),
            Some(Driver::Cst226(touch)) => touch.model_name(),
            Some(Driver::Cst328(touch)) => touch.model_name(),
            Some(Driver::Unknown(_)) | None => "UNKNOWN",
        }
    }

    pub fn support_touch_point(&self) -> u8 {
        match &self.driver {
            Some(Driver::Cst816(touch)) => touch.support_touch_point(),
            Some(Driver::Cst226(touch)) => touch.support_touch_point(),
            Some(Driver::Cst328(touch)) => touch.support_touch_point(),
            Some(Driver::Unknown(_)) | None => 0,
        }
    }

    /// Panel resolution reported by the chip. The CST816 family does not
    /// report one.
    pub fn resolution(&self) -> Option<(u16, u16)> {
        match &self.driver {
            Some(Driver::Cst226(touch)) => Some(touch.resolution()),
            Some(Driver::Cst328(touch)) => Some(touch.resolution()),
            _ => None,
        }
    }

    /// Fills `points` with the current contacts in display coordinates and
    /// returns how many were written. A home button press invokes the home
    /// button callback and reports no points.
    pub fn get_point(&mut self, points: &mut [TouchPoint]) -> Result<usize, TouchError> {
        if points.is_empty() {
            return Ok(0);
        }
        let center = self.home_button.as_ref().map(|_| self.center);
        let report = match &mut self.driver {
            Some(Driver::Cst816(touch)) => touch.read_points(points, center)?,
            Some(Driver::Cst226(touch)) => touch.read_points(points)?,
            Some(Driver::Cst328(touch)) => touch.read_points(points)?,
            Some(Driver::Unknown(_)) | None => return Ok(0),
        };

        match report {
            TouchReport::HomeButton => {
                if let Some(callback) = self.home_button.as_mut() {
                    callback();
                }
                Ok(0)
            }
            TouchReport::Points(count) => {
                for point in &mut points[..count] {
                    self.config.transform.apply(point);
                }
                Ok(count)
            }
        }
    }

    /// With an interrupt pin, reports a low level at most once per debounce
    /// interval. Without one, reads the chip for at least one contact.
    pub fn is_pressed(&mut self) -> bool {
        if !self.is_bound() {
            return false;
        }
        if self.irq.is_none() {
            let mut point = [TouchPoint::default()];
            return matches!(self.get_point(&mut point), Ok(count) if count > 0);
        }
        let Some(irq) = self.irq.as_mut() else {
            return false;
        };

        match irq.is_low() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(_) => {
                warn!("Touch interrupt pin read failed");
                return false;
            }
        }

        let now = self.clock.now_ms();
        match self.last_pulse {
            Some(last) if now.wrapping_sub(last) < self.config.debounce_ms => false,
            _ => {
                self.last_pulse = Some(now);
                true
            }
        }
    }

    pub fn sleep(&mut self) -> Result<(), TouchError> {
        match &mut self.driver {
            Some(Driver::Cst816(touch)) => touch.sleep(),
            Some(Driver::Cst226(touch)) => touch.sleep(),
            Some(Driver::Cst328(touch)) => touch.sleep(),
            Some(Driver::Unknown(_)) | None => Ok(()),
        }
    }

    pub fn wakeup(&mut self) -> Result<(), TouchError> {
        match &mut self.driver {
            Some(Driver::Cst816(touch)) => touch.wakeup(),
            Some(Driver::Cst226(touch)) => touch.wakeup(),
            Some(Driver::Cst328(touch)) => touch.wakeup(),
            Some(Driver::Unknown(_)) | None => Ok(()),
        }
    }

    /// Direct access to the CST816 driver for its chip specific settings.
    pub fn cst816(&mut self) -> Option<&mut Cst816<I2C, RST, DELAY>> {
        match &mut self.driver {
            Some(Driver::Cst816(touch)) => Some(touch),
            _ => None,
        }
    }

    pub fn set_home_button_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + 'static,
    {
        self.home_button = Some(Box::new(callback));
    }

    pub fn clear_home_button_callback(&mut self) {
        self.home_button = None;
    }

    /// Raw coordinate the CST816 firmware reports for the home button.
    pub fn set_center_button_coordinate(&mut self, x: u16, y: u16) {
        self.center = (x, y);
    }

    pub fn set_swap_xy(&mut self, swap: bool) {
        self.config.transform.swap_xy = swap;
    }

    pub fn set_mirror_xy(&mut self, mirror_x: bool, mirror_y: bool) {
        self.config.transform.mirror_x = mirror_x;
        self.config.transform.mirror_y = mirror_y;
    }

    pub fn set_max_coordinates(&mut self, max_x: u16, max_y: u16) {
        self.config.transform.max_x = max_x;
        self.config.transform.max_y = max_y;
    }

    /// Returns the bus parts and the interrupt pin.
    pub fn release(self) -> Option<(I2C, Option<IRQ>, Option<RST>, DELAY)> {
        let (i2c, rst, delay) = self.driver?.into_bus().release();
        Some((i2c, self.irq, rst, delay))
    }
}
