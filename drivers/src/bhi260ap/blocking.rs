use super::parse::{self, Timestamp};
use super::sensor::{default_scaling, sensor_name, EventSizes, SENSOR_ID_MAX};
use super::*;
use alloc::boxed::Box;
use alloc::vec::Vec;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;

/// Callback for sensor data frames.
pub struct ResultCallback(Box<dyn FnMut(&SensorData<'_>, &mut Subscriptions<ResultCallback>)>);

impl ResultCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&SensorData<'_>, &mut Subscriptions<ResultCallback>) + 'static,
    {
        Self(Box::new(callback))
    }
}

/// Callback for one meta event type.
pub struct EventCallback(Box<dyn FnMut(&MetaEvent, &mut Subscriptions<EventCallback>)>);

impl EventCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&MetaEvent, &mut Subscriptions<EventCallback>) + 'static,
    {
        Self(Box::new(callback))
    }
}

pub struct BHI260AP<IFACE, RST, DELAY> {
    iface: IFACE,
    rst: Option<RST>,
    delay: DELAY,
    config: HubConfig,
    data_ready: Option<&'static DataReady>,
    buffer: Option<Vec<u8>>,
    sizes: EventSizes,
    present: [u8; 32],
    // wake FIFO, non-wake FIFO, status channel
    timestamps: [Timestamp; 3],
    accuracy: u8,
    last_error: Option<HubError>,
    results: Registry<ResultCallback>,
    events: Registry<EventCallback>,
    event_callback: Option<Box<dyn FnMut(&MetaEvent)>>,
    debug_callback: Option<Box<dyn FnMut(&str)>>,
}

impl<I2C, RST, DELAY> BHI260AP<I2cInterface<I2C>, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    pub fn new_i2c(i2c: I2C, address: u8, rst: Option<RST>, delay: DELAY, config: HubConfig) -> Self {
        Self::new(I2cInterface::new(i2c, address), rst, delay, config)
    }
}

impl<SPI, RST, DELAY> BHI260AP<SpiInterface<SPI>, RST, DELAY>
where
    SPI: SpiDevice,
    RST: OutputPin,
    DELAY: DelayNs,
{
    pub fn new_spi(spi: SPI, rst: Option<RST>, delay: DELAY, config: HubConfig) -> Self {
        Self::new(SpiInterface::new(spi), rst, delay, config)
    }
}

impl<IFACE, RST, DELAY> BHI260AP<IFACE, RST, DELAY>
where
    IFACE: HubInterface,
    RST: OutputPin,
    DELAY: DelayNs,
{
    pub fn new(iface: IFACE, rst: Option<RST>, delay: DELAY, config: HubConfig) -> Self {
        Self {
            iface,
            rst,
            delay,
            config,
            data_ready: None,
            buffer: None,
            sizes: EventSizes::new(),
            present: [0; 32],
            timestamps: [Timestamp::new(); 3],
            accuracy: 0,
            last_error: None,
            results: Registry::new(),
            events: Registry::new(),
            event_callback: None,
            debug_callback: None,
        }
    }

    /// Switches `update()` to interrupt mode. The host's interrupt handler for
    /// the hub's IRQ line (rising edge) must call [`DataReady::signal`].
    pub fn set_interrupt(&mut self, data_ready: &'static DataReady) {
        self.data_ready = Some(data_ready);
    }

    pub fn release(self) -> (IFACE, Option<RST>, DELAY) {
        (self.iface, self.rst, self.delay)
    }

    /// Resets and identifies the hub, boots firmware if none is running,
    /// discovers the virtual sensors and allocates the process buffer.
    ///
    /// On failure the process buffer stays unallocated; `init` may simply be
    /// called again.
    pub fn init(&mut self) -> Result<(), HubError> {
        let result = self.init_inner();
        if result.is_err() {
            self.buffer = None;
        }
        self.record(result)
    }

    fn init_inner(&mut self) -> Result<(), HubError> {
        self.buffer = None;
        self.reset()?;
        self.soft_reset()?;

        let product_id = self.read_u8(REG_PRODUCT_ID)?;
        if product_id != PRODUCT_ID {
            error!(
                "Product ID read {:#x}. Expected {:#x}",
                product_id, PRODUCT_ID
            );
            return Err(HubError::IdentityMismatch(product_id));
        }
        info!("BHI260/BHA260 found. Product ID read {:#x}", product_id);

        if self.kernel_version()? == 0 {
            let image = self.config.firmware.ok_or(HubError::FirmwareNotSet)?;
            let target = self.config.firmware_target;
            self.flash_and_boot(image, target)?;
        }
        let version = self.kernel_version()?;
        if version == 0 {
            return Err(HubError::BootTimeout);
        }
        info!("Kernel version {}", version);

        self.discover_sensors()?;
        self.allocate_buffer()?;
        self.timestamps = [Timestamp::new(); 3];
        if let Some(flag) = self.data_ready {
            flag.clear();
        }

        // flush whatever the hub queued while booting
        self.process_fifos()?;
        Ok(())
    }

    /// Frees the process buffer and detaches the interrupt flag.
    pub fn deinit(&mut self) {
        self.buffer = None;
        if let Some(flag) = self.data_ready.take() {
            flag.clear();
        }
    }

    /// Pulses the reset line high, low, high. No-op without a reset pin.
    pub fn reset(&mut self) -> Result<(), HubError> {
        let timing = self.config.reset_timing;
        if let Some(rst) = &mut self.rst {
            rst.set_high().map_err(|_| HubError::Transport)?;
            self.delay.delay_ms(timing.high_ms);
            rst.set_low().map_err(|_| HubError::Transport)?;
            self.delay.delay_ms(timing.low_ms);
            rst.set_high().map_err(|_| HubError::Transport)?;
            self.delay.delay_ms(timing.settle_ms);
        }
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<(), HubError> {
        self.iface.write(REG_RESET_REQ, &[0x01])?;
        self.delay.delay_ms(self.config.reset_timing.settle_ms);
        self.poll(|hub| {
            let ready = hub.boot_status()?.contains(BootStatus::HOST_INTERFACE_READY);
            Ok(ready.then_some(()))
        })?
        .ok_or(HubError::BootTimeout)
    }

    /// Drains the FIFOs and dispatches every decoded frame. Returns the
    /// number of frames handed to the parser.
    ///
    /// In interrupt mode this returns `Ok(0)` without touching the bus unless
    /// the interrupt handler signalled new data since the last call.
    pub fn update(&mut self) -> Result<usize, HubError> {
        if self.buffer.is_none() {
            return Err(HubError::NotInitialized);
        }
        if let Some(flag) = self.data_ready {
            if !flag.take() {
                return Ok(0);
            }
        }
        let result = self.process_fifos();
        if result.is_err() {
            // The IRQ line stays asserted while data is pending, so no new
            // edge will arrive. Keep the flag set for the next call.
            if let Some(flag) = self.data_ready {
                flag.signal();
            }
        }
        self.record(result)
    }

    /// Enables `sensor_id` at `sample_rate` Hz. `report_latency_ms` lets the
    /// hub batch samples before raising the interrupt.
    pub fn configure(
        &mut self,
        sensor_id: u8,
        sample_rate: f32,
        report_latency_ms: u32,
    ) -> Result<(), HubError> {
        let result = self.configure_inner(sensor_id, sample_rate, report_latency_ms);
        self.record(result)
    }

    fn configure_inner(
        &mut self,
        sensor_id: u8,
        sample_rate: f32,
        report_latency_ms: u32,
    ) -> Result<(), HubError> {
        if self.buffer.is_none() {
            return Err(HubError::NotInitialized);
        }
        if !self.is_present(sensor_id) {
            error!("{} not present", sensor_name(sensor_id));
            return Err(HubError::SensorNotPresent(sensor_id));
        }
        let latency = report_latency_ms.min(0x00FF_FFFF).to_le_bytes();
        let mut payload = [0u8; 8];
        payload[0] = sensor_id;
        payload[1..5].copy_from_slice(&sample_rate.to_le_bytes());
        payload[5..].copy_from_slice(&latency[..3]);
        self.send_command(CMD_CONFIG_SENSOR, payload.len() as u16, &payload)?;
        info!("Enable {} at {}Hz", sensor_name(sensor_id), sample_rate);
        Ok(())
    }

    /// Uploads `image` and boots it. The hub restarts: sensor configuration
    /// is lost and has to be applied again. The sensor table is rebuilt when
    /// the hub was initialized.
    pub fn upload_firmware(&mut self, image: &[u8], target: FirmwareTarget) -> Result<(), HubError> {
        self.sizes.clear_sensors();
        self.present = [0; 32];
        let mut result = self.flash_and_boot(image, target);
        if result.is_ok() && self.buffer.is_some() {
            result = self.discover_sensors();
        }
        self.record(result)
    }

    /// Firmware used by `init` when the hub has none running.
    pub fn set_firmware(&mut self, image: &'static [u8], target: FirmwareTarget) {
        self.config.firmware = Some(image);
        self.config.firmware_target = target;
    }

    /// Reallocates the process buffer right away when initialized, otherwise
    /// the size applies at the next `init`.
    pub fn set_process_buffer_size(&mut self, size: usize) -> Result<(), HubError> {
        self.config.process_buffer_size = size;
        if self.buffer.is_none() {
            return Ok(());
        }
        let result = self.allocate_buffer();
        self.record(result)
    }

    pub fn is_ready(&mut self) -> Result<bool, HubError> {
        Ok(self.boot_status()?.contains(BootStatus::HOST_INTERFACE_READY))
    }

    pub fn is_initialized(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn boot_status(&mut self) -> Result<BootStatus, HubError> {
        Ok(BootStatus::from_bits_retain(self.read_u8(REG_BOOT_STATUS)?))
    }

    /// Zero while no firmware is running.
    pub fn kernel_version(&mut self) -> Result<u16, HubError> {
        let mut buf = [0u8; 2];
        self.iface.read(REG_KERNEL_VERSION, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn set_interrupt_ctrl(&mut self, ctrl: HostInterruptCtrl) -> Result<(), HubError> {
        self.iface.write(REG_HOST_INTERRUPT_CTRL, &[ctrl.bits()])
    }

    pub fn interrupt_ctrl(&mut self) -> Result<HostInterruptCtrl, HubError> {
        Ok(HostInterruptCtrl::from_bits_retain(
            self.read_u8(REG_HOST_INTERRUPT_CTRL)?,
        ))
    }

    /// Sensor ids the firmware reported at the last discovery.
    pub fn present_sensors(&self) -> impl Iterator<Item = u8> + '_ {
        (1..SENSOR_ID_MAX).filter(move |id| self.is_present(*id))
    }

    pub fn is_present(&self, sensor_id: u8) -> bool {
        self.present[(sensor_id / 8) as usize] & (1 << (sensor_id % 8)) != 0
    }

    pub fn scaling(&self, sensor_id: u8) -> f32 {
        default_scaling(sensor_id)
    }

    /// Accuracy reported by the last sensor status meta event.
    pub fn accuracy(&self) -> u8 {
        self.accuracy
    }

    pub fn last_error(&self) -> Option<HubError> {
        self.last_error
    }

    pub fn on_result_event<F>(&mut self, sensor_id: u8, callback: F) -> CallbackId
    where
        F: FnMut(&SensorData<'_>, &mut Subscriptions<ResultCallback>) + 'static,
    {
        self.results.register(sensor_id, ResultCallback::new(callback))
    }

    pub fn remove_result_event(&mut self, sensor_id: u8, id: CallbackId) -> bool {
        self.results.unregister(sensor_id, id)
    }

    pub fn on_event<F>(&mut self, event: MetaEventType, callback: F) -> CallbackId
    where
        F: FnMut(&MetaEvent, &mut Subscriptions<EventCallback>) + 'static,
    {
        self.events.register(event.into(), EventCallback::new(callback))
    }

    pub fn remove_event(&mut self, event: MetaEventType, id: CallbackId) -> bool {
        self.events.unregister(event.into(), id)
    }

    /// Called for every meta event except spacers, before the per type
    /// callbacks.
    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&MetaEvent) + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    pub fn set_debug_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&str) + 'static,
    {
        self.debug_callback = Some(Box::new(callback));
    }

    fn record<T>(&mut self, result: Result<T, HubError>) -> Result<T, HubError> {
        if let Err(e) = &result {
            self.last_error = Some(*e);
        }
        result
    }

    fn read_u8(&mut self, register: u8) -> Result<u8, HubError> {
        let mut buf = [0u8];
        self.iface.read(register, &mut buf)?;
        Ok(buf[0])
    }

    fn poll<T, F>(&mut self, mut check: F) -> Result<Option<T>, HubError>
    where
        F: FnMut(&mut Self) -> Result<Option<T>, HubError>,
    {
        let polling = self.config.polling;
        for _ in 0..polling.max_attempts {
            if let Some(value) = check(self)? {
                return Ok(Some(value));
            }
            self.delay.delay_ms(polling.delay_ms);
        }
        Ok(None)
    }

    fn allocate_buffer(&mut self) -> Result<(), HubError> {
        let mut size = self.config.process_buffer_size;
        if size < MIN_PROCESS_BUFFER_SIZE {
            warn!(
                "Process buffer size {} raised to {}",
                size, MIN_PROCESS_BUFFER_SIZE
            );
            size = MIN_PROCESS_BUFFER_SIZE;
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| HubError::BufferAllocationFailed)?;
        buffer.resize(size, 0);
        self.buffer = Some(buffer);
        Ok(())
    }

    fn send_command(&mut self, command: u16, length: u16, payload: &[u8]) -> Result<(), HubError> {
        let mut header = [0u8; 4];
        header[..2].copy_from_slice(&command.to_le_bytes());
        header[2..].copy_from_slice(&length.to_le_bytes());
        self.iface.write(CHAN_CMD, &header)?;
        for chunk in payload.chunks(MAX_WRITE_LEN) {
            self.iface.write(CHAN_CMD, chunk)?;
        }
        Ok(())
    }

    /// Reads one status packet into `payload`. Returns `None` while the
    /// status channel is empty.
    fn read_status(&mut self, payload: &mut [u8]) -> Result<Option<(u16, usize)>, HubError> {
        let mut header = [0u8; 4];
        self.iface.read(CHAN_STATUS, &mut header)?;
        let code = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;
        if code == 0 {
            return Ok(None);
        }

        let kept = len.min(payload.len());
        if kept > 0 {
            self.iface.read(CHAN_STATUS, &mut payload[..kept])?;
        }
        let mut rest = len - kept;
        let mut scratch = [0u8; 16];
        while rest > 0 {
            let n = rest.min(scratch.len());
            self.iface.read(CHAN_STATUS, &mut scratch[..n])?;
            rest -= n;
        }
        Ok(Some((code, kept)))
    }

    fn wait_status(&mut self, expected: u16) -> Result<(), HubError> {
        let status = self.poll(|hub| hub.read_status(&mut []))?;
        match status {
            Some((code, _)) if code == expected => Ok(()),
            Some((code, _)) => Err(HubError::CommandFailed(code)),
            None => Err(HubError::CommandFailed(expected)),
        }
    }

    fn read_parameter(&mut self, param: u16, out: &mut [u8]) -> Result<usize, HubError> {
        self.send_command(CMD_PARAM_READ | param, 0, &[])?;
        // Packets queued ahead of the response (debug output, late flash
        // acknowledgements) are skipped until the parameter itself arrives.
        let status = self.poll(|hub| match hub.read_status(out)? {
            Some((code, len)) if code == param => Ok(Some(Ok(len))),
            Some((STATUS_COMMAND_ERROR, _)) => {
                warn!("Parameter {:#x} read rejected", param);
                Ok(Some(Err(HubError::CommandFailed(STATUS_COMMAND_ERROR))))
            }
            Some((code, len)) => {
                debug!("Skipping status {:#x} ({} bytes) while reading {:#x}", code, len, param);
                Ok(None)
            }
            None => Ok(None),
        })?;
        match status {
            Some(result) => result,
            None => Err(HubError::CommandFailed(CMD_PARAM_READ | param)),
        }
    }

    fn check_sensor_error(&mut self) -> Result<(), HubError> {
        let code = self.read_u8(REG_ERROR_VALUE)?;
        if code != 0 {
            error!("{}", sensor_error_text(code));
            return Err(HubError::BootFailed(code));
        }
        Ok(())
    }

    fn flash_and_boot(&mut self, image: &[u8], target: FirmwareTarget) -> Result<(), HubError> {
        if image.is_empty() || image.len() % 4 != 0 {
            return Err(HubError::InvalidFirmware(image.len()));
        }
        let boot_status = self.boot_status()?;

        let boot_command = match target {
            FirmwareTarget::Flash => {
                if !boot_status.contains(BootStatus::FLASH_DETECTED) {
                    error!("Flash not detected");
                    return Err(HubError::FlashNotDetected);
                }
                self.upload_to_flash(image)?;
                CMD_BOOT_FLASH
            }
            FirmwareTarget::Ram => {
                self.upload_to_ram(image)?;
                CMD_BOOT_PROGRAM_RAM
            }
        };
        self.check_sensor_error()?;

        info!("Booting from {}", target);
        self.send_command(boot_command, 0, &[])?;
        let version = self
            .poll(|hub| Ok(Some(hub.kernel_version()?).filter(|v| *v != 0)))?
            .ok_or(HubError::BootTimeout)?;
        self.check_sensor_error()?;
        info!("Boot successful. Kernel version {}", version);
        Ok(())
    }

    fn upload_to_ram(&mut self, image: &[u8]) -> Result<(), HubError> {
        let words =
            u16::try_from(image.len() / 4).map_err(|_| HubError::InvalidFirmware(image.len()))?;
        info!("Loading firmware into RAM, {} bytes", image.len());
        self.send_command(CMD_UPLOAD_TO_PROGRAM_RAM, words, image)
    }

    fn upload_to_flash(&mut self, image: &[u8]) -> Result<(), HubError> {
        let start = FLASH_SECTOR_START_ADDR;
        let end = u32::try_from(image.len())
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or(HubError::InvalidFirmware(image.len()))?;

        info!("Flash detected. Erasing flash to upload firmware");
        let mut erase = [0u8; 8];
        erase[..4].copy_from_slice(&start.to_le_bytes());
        erase[4..].copy_from_slice(&end.to_le_bytes());
        self.send_command(CMD_ERASE_FLASH, erase.len() as u16, &erase)?;
        self.wait_status(STATUS_FLASH_ERASE_COMPLETE)?;

        info!("Loading firmware into FLASH, {} bytes", image.len());
        let mut packet = [0u8; 4 + MAX_WRITE_LEN];
        let mut address = start;
        for chunk in image.chunks(MAX_WRITE_LEN) {
            let len = 4 + chunk.len();
            packet[..4].copy_from_slice(&address.to_le_bytes());
            packet[4..len].copy_from_slice(chunk);
            self.send_command(CMD_WRITE_FLASH, (len / 4) as u16, &packet[..len])?;
            self.wait_status(STATUS_FLASH_WRITE_COMPLETE)?;
            address += chunk.len() as u32;
        }
        Ok(())
    }

    /// Reads the present-sensor bitmap and the frame size of every sensor
    /// that gets a data route.
    fn discover_sensors(&mut self) -> Result<(), HubError> {
        self.sizes.clear_sensors();
        let mut bitmap = [0u8; 32];
        self.read_parameter(PARAM_VIRT_SENSOR_PRESENT, &mut bitmap)?;
        self.present = bitmap;

        let scope = self.config.registration_scope;
        let mut info = [0u8; SENSOR_INFO_LEN];
        for id in 1..SENSOR_ID_MAX {
            if scope == RegistrationScope::PresentOnly && !self.is_present(id) {
                continue;
            }
            let len = self.read_parameter(PARAM_SENSOR_INFO_BASE + u16::from(id), &mut info)?;
            if len > SENSOR_INFO_EVENT_SIZE && info[SENSOR_INFO_EVENT_SIZE] != 0 {
                self.sizes.set(id, info[SENSOR_INFO_EVENT_SIZE]);
            }
        }

        for id in self.present_sensors() {
            debug!("Present sensor {}: {}", id, sensor_name(id));
        }
        Ok(())
    }

    fn process_fifos(&mut self) -> Result<usize, HubError> {
        let mut buffer = self.buffer.take().ok_or(HubError::NotInitialized)?;
        let result = self.process_fifos_with(&mut buffer);
        self.buffer = Some(buffer);
        result
    }

    fn process_fifos_with(&mut self, buffer: &mut [u8]) -> Result<usize, HubError> {
        let status = InterruptStatus::from_bits_retain(self.read_u8(REG_INT_STATUS)?);
        if status.contains(InterruptStatus::RESET_OR_FAULT) {
            warn!("Hub reported reset or fault");
        }

        let mut frames = 0;
        if status.intersects(InterruptStatus::WAKE_FIFO) {
            frames += self.drain_fifo(CHAN_FIFO_WAKE, buffer)?;
        }
        if status.intersects(InterruptStatus::NON_WAKE_FIFO) {
            frames += self.drain_fifo(CHAN_FIFO_NON_WAKE, buffer)?;
        }
        if status.intersects(InterruptStatus::STATUS | InterruptStatus::DEBUG) {
            frames += self.drain_status(buffer)?;
        }
        Ok(frames)
    }

    /// Reads one FIFO to the end, at most `buffer.len()` bytes at a time.
    /// A frame split between two reads is moved to the front of the buffer
    /// and completed by the next read.
    fn drain_fifo(&mut self, channel: u8, buffer: &mut [u8]) -> Result<usize, HubError> {
        let mut count = [0u8; 2];
        self.iface.read(channel, &mut count)?;
        let mut remaining = u16::from_le_bytes(count) as usize;

        let mut frames = 0;
        let mut carry = 0;
        let mut parse_error = None;
        while remaining > 0 {
            let n = remaining.min(buffer.len() - carry);
            self.iface.read(channel, &mut buffer[carry..carry + n])?;
            remaining -= n;
            let filled = carry + n;
            if parse_error.is_some() {
                // keep reading so the FIFO is empty afterwards
                continue;
            }
            match self.dispatch_frames(channel, &buffer[..filled]) {
                Ok((used, dispatched)) => {
                    frames += dispatched;
                    buffer.copy_within(used..filled, 0);
                    carry = filled - used;
                    if carry == buffer.len() {
                        parse_error = Some(HubError::InvalidFrame(buffer[0]));
                        carry = 0;
                    }
                }
                Err(e) => {
                    warn!("Dropping rest of FIFO {}: {}", channel, e);
                    parse_error = Some(e);
                    carry = 0;
                }
            }
        }
        if carry > 0 {
            warn!("FIFO {} ended inside a frame, {} bytes dropped", channel, carry);
        }

        match parse_error {
            Some(e) => Err(e),
            None => Ok(frames),
        }
    }

    fn drain_status(&mut self, buffer: &mut [u8]) -> Result<usize, HubError> {
        let Some((code, len)) = self.read_status(buffer)? else {
            return Ok(0);
        };
        if code != STATUS_DEBUG_EVENT {
            debug!("Status {:#x}, {} bytes", code, len);
            return Ok(0);
        }
        let (_, frames) = self.dispatch_frames(CHAN_STATUS, &buffer[..len])?;
        Ok(frames)
    }

    fn dispatch_frames(&mut self, channel: u8, data: &[u8]) -> Result<(usize, usize), HubError> {
        let slot = match channel {
            CHAN_FIFO_WAKE => 0,
            CHAN_FIFO_NON_WAKE => 1,
            _ => 2,
        };
        let Self {
            sizes,
            timestamps,
            accuracy,
            results,
            events,
            event_callback,
            debug_callback,
            ..
        } = self;

        let mut frames = 0;
        let used = parse::parse_fifo(data, sizes, &mut timestamps[slot], |frame| {
            frames += 1;
            if frame.is_meta_event() {
                if let Some(event) = parse::parse_meta_event(frame, accuracy) {
                    if let Some(callback) = event_callback.as_mut() {
                        callback(&event);
                    }
                    events.dispatch(event.event_type, |cb, subs| (cb.0)(&event, subs));
                }
            } else if frame.is_debug_message() {
                if let Some(message) = parse::parse_debug_message(frame) {
                    if let Some(callback) = debug_callback.as_mut() {
                        callback(message.as_str());
                    }
                }
            } else {
                let data = frame.sensor_data();
                trace!(
                    "Sensor {} ({}) {} bytes",
                    data.sensor_id,
                    sensor_name(data.sensor_id),
                    data.data.len()
                );
                results.dispatch(data.sensor_id, |cb, subs| (cb.0)(&data, subs));
            }
        })?;
        Ok((used, frames))
    }
}
