//! Simulated SDK for testing without hardware.
//!
//! [`MockSdk`] models a single unit that answers as a camera, filter wheel
//! or focuser depending on the domain a handle was opened with. Exposure
//! timing runs on a virtual clock by default so tests can step time with
//! [`MockSdk::advance`] instead of sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::status::DeviceStatus;
use crate::traits::{
    BackgroundFlush, BitDepth, CameraError, DebugLevel, DeviceClass, DeviceHandle, DeviceSdk,
    Domain, FanSpeed, FrameType, ImageArea, ReadoutDimensions, Result, Shutter,
    TemperatureChannel,
};
use crate::transfer::ReadoutGeometry;
use crate::validation::ramp_sample;

const EAGAIN: i64 = -11;
const EBUSY: i64 = -16;
const ENODEV: i64 = -19;
const EINVAL: i64 = -22;

const AMBIENT_CELSIUS: f64 = 20.0;
const MAX_COOLING_DELTA: f64 = 40.0;
const MAX_BIN: i32 = 16;

/// How the simulated camera fills its status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusReporting {
    /// Exposure state bits plus DATA_READY once the frame can be read.
    #[default]
    DataReadyFlag,
    /// Always the UNKNOWN sentinel; readiness comes from the countdown.
    AlwaysUnknown,
}

/// Clock driving exposure countdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timebase {
    /// Time only moves through [`MockSdk::advance`].
    #[default]
    Virtual,
    /// Wall-clock time, plus anything added with [`MockSdk::advance`].
    Wall,
}

/// Content of light frames. Dark frames are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestPattern {
    /// Sample at (x, y) is `x + y`, wrapped to the bit depth.
    #[default]
    Ramp,
    /// Every sample has the same value.
    Solid(u16),
}

/// A call made against the mock, in order of arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// Library diagnostics level.
    SetDebugLevel(DebugLevel),
    /// Device enumeration.
    List,
    /// Open by file name.
    Open(String),
    /// Close.
    Close,
    /// Image area.
    SetImageArea(ImageArea),
    /// Horizontal binning.
    SetHBin(i32),
    /// Vertical binning.
    SetVBin(i32),
    /// Frame type.
    SetFrameType(FrameType),
    /// Exposure time in milliseconds.
    SetExposureTime(i32),
    /// TDI rate.
    SetTdi(i32),
    /// Bit depth.
    SetBitDepth(BitDepth),
    /// Exposure start.
    ExposeFrame,
    /// Software trigger.
    TriggerExposure,
    /// Exposure abort.
    CancelExposure,
    /// Exposure end.
    EndExposure,
    /// Row transfer.
    GrabRow {
        /// Requested width in pixels.
        width: usize,
        /// Row buffer length in bytes.
        len: usize,
    },
    /// Frame transfer.
    GrabFrame {
        /// Frame buffer length in bytes.
        len: usize,
    },
    /// Video mode start.
    StartVideo,
    /// Video frame transfer.
    GrabVideoFrame {
        /// Frame buffer length in bytes.
        len: usize,
    },
    /// Video mode stop.
    StopVideo,
    /// Cooler setpoint.
    SetTemperature(f64),
    /// Shutter command.
    ControlShutter(Shutter),
    /// Device lock.
    Lock,
    /// Device unlock.
    Unlock,
    /// Filter slot move.
    SetFilterPos(i32),
    /// Stepper move.
    StepMotor {
        /// Relative steps.
        steps: i32,
        /// Whether the call waits for the move.
        blocking: bool,
    },
    /// Focuser or wheel homing.
    Home,
    /// Any other setter.
    Control(&'static str),
    /// Any read-only query.
    Query(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed,
    Exposing { started: Duration },
    Readout { rows_read: usize },
    Video,
}

#[derive(Debug)]
struct MockState {
    entries: Vec<String>,
    open: HashMap<i64, DeviceClass>,
    next_handle: i64,
    model: String,

    array_area: ImageArea,
    area: ImageArea,
    hbin: i32,
    vbin: i32,
    frame_type: FrameType,
    exposure_ms: i32,
    bit_depth: BitDepth,
    external_trigger: bool,
    pattern: TestPattern,

    reporting: StatusReporting,
    timebase: Timebase,
    origin: Instant,
    clock: Duration,
    phase: Phase,

    status_script: VecDeque<DeviceStatus>,
    remaining_script: VecDeque<i32>,
    faults: HashMap<&'static str, i64>,
    short_by: usize,

    setpoint: f64,
    locked: bool,

    filters: Vec<String>,
    filter_pos: i32,
    active_wheel: i32,

    focuser_extent: i32,
    position: i32,
    pending_steps: i32,

    camera_modes: Vec<String>,
    camera_mode: i32,

    calls: Vec<MockCall>,
}

impl Default for MockState {
    fn default() -> Self {
        let array_area = ImageArea::new(0, 0, 640, 480);
        Self {
            entries: vec!["usb:0;FLI Simulated Camera".to_owned()],
            open: HashMap::new(),
            next_handle: 1,
            model: "FLI Simulated Camera".to_owned(),
            array_area,
            area: array_area,
            hbin: 1,
            vbin: 1,
            frame_type: FrameType::Normal,
            exposure_ms: 0,
            bit_depth: BitDepth::Sixteen,
            external_trigger: false,
            pattern: TestPattern::Ramp,
            reporting: StatusReporting::DataReadyFlag,
            timebase: Timebase::Virtual,
            origin: Instant::now(),
            clock: Duration::ZERO,
            phase: Phase::Idle,
            status_script: VecDeque::new(),
            remaining_script: VecDeque::new(),
            faults: HashMap::new(),
            short_by: 0,
            setpoint: AMBIENT_CELSIUS,
            locked: false,
            filters: Vec::new(),
            filter_pos: 0,
            active_wheel: 0,
            focuser_extent: 10_000,
            position: 0,
            pending_steps: 0,
            camera_modes: vec!["Default".to_owned()],
            camera_mode: 0,
            calls: Vec::new(),
        }
    }
}

const fn native_error(operation: &'static str, code: i64) -> CameraError {
    CameraError::Status { operation, code }
}

impl MockState {
    fn now(&self) -> Duration {
        match self.timebase {
            Timebase::Virtual => self.clock,
            Timebase::Wall => self.clock + self.origin.elapsed(),
        }
    }

    fn exposure(&self) -> Duration {
        Duration::from_millis(u64::from(self.exposure_ms.max(0).unsigned_abs()))
    }

    fn refresh(&mut self) {
        if let Phase::Exposing { started } = self.phase {
            if self.now().saturating_sub(started) >= self.exposure() {
                self.phase = Phase::Readout { rows_read: 0 };
            }
        }
    }

    /// Record a call, fire any injected fault and validate the handle.
    fn call(
        &mut self,
        operation: &'static str,
        handle: DeviceHandle,
        call: MockCall,
    ) -> Result<DeviceClass> {
        self.calls.push(call);
        if let Some(code) = self.faults.remove(operation) {
            return Err(native_error(operation, code));
        }
        self.refresh();
        self.open
            .get(&handle.raw())
            .copied()
            .ok_or(native_error(operation, ENODEV))
    }

    fn query(&mut self, operation: &'static str, handle: DeviceHandle) -> Result<DeviceClass> {
        self.call(operation, handle, MockCall::Query(operation))
    }

    fn geometry(&self) -> ReadoutGeometry {
        ReadoutGeometry::from_area(&self.area, self.bit_depth)
    }

    fn remaining_ms(&self) -> i32 {
        match self.phase {
            Phase::Exposing { started } => {
                let left = self
                    .exposure()
                    .saturating_sub(self.now().saturating_sub(started));
                i32::try_from(left.as_nanos().div_ceil(1_000_000)).unwrap_or(i32::MAX)
            }
            Phase::Armed => self.exposure_ms,
            Phase::Idle | Phase::Readout { .. } | Phase::Video => 0,
        }
    }

    fn camera_status(&self) -> DeviceStatus {
        if self.reporting == StatusReporting::AlwaysUnknown {
            return DeviceStatus::UNKNOWN;
        }
        DeviceStatus(match self.phase {
            Phase::Idle => 0x0000_0000,
            Phase::Armed => 0x0000_0001,
            Phase::Exposing { .. } | Phase::Video => 0x0000_0002,
            Phase::Readout { .. } => DeviceStatus::DATA_READY | 0x0000_0003,
        })
    }

    fn focuser_status(&self) -> DeviceStatus {
        let mut word = 0;
        if self.pending_steps < 0 {
            word |= 0x01;
        } else if self.pending_steps > 0 {
            word |= 0x02;
        }
        if self.pending_steps == 0 && self.position == 0 {
            word |= 0x80;
        }
        if self.position == self.focuser_extent {
            word |= 0x40;
        }
        DeviceStatus(word)
    }

    fn wheel_status(&self) -> DeviceStatus {
        DeviceStatus(if self.filter_pos == 0 { 0x88 } else { 0x08 })
    }

    fn sample(&self, x: usize, y: usize) -> u16 {
        match (self.frame_type, self.pattern) {
            (FrameType::Dark, _) => 0,
            (_, TestPattern::Ramp) => ramp_sample(x, y, self.bit_depth),
            (_, TestPattern::Solid(value)) => value,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn fill_row(&self, row: &mut [u8], y: usize) {
        let bpp = self.bit_depth.bytes_per_pixel();
        for (x, sample) in row.chunks_exact_mut(bpp).enumerate() {
            let value = self.sample(x, y);
            match self.bit_depth {
                BitDepth::Eight => sample.copy_from_slice(&[value as u8]),
                BitDepth::Sixteen => sample.copy_from_slice(&value.to_ne_bytes()),
            }
        }
    }

    /// Fill `buffer` with the current frame and return the bytes reported.
    fn fill_frame(&mut self, buffer: &mut [u8]) -> usize {
        let geometry = self.geometry();
        let row_bytes = geometry.row_bytes();
        if row_bytes > 0 {
            for (y, row) in buffer
                .chunks_exact_mut(row_bytes)
                .take(geometry.rows)
                .enumerate()
            {
                self.fill_row(row, y);
            }
        }
        buffer
            .len()
            .min(geometry.frame_bytes())
            .saturating_sub(std::mem::take(&mut self.short_by))
    }

    fn clamp_position(&self, position: i32) -> i32 {
        position.clamp(0, self.focuser_extent.max(0))
    }
}

/// Simulated device SDK.
#[derive(Debug, Default)]
pub struct MockSdk {
    state: Mutex<MockState>,
}

impl MockSdk {
    /// Create a mock with one camera at `usb:0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure<F: FnOnce(&mut MockState)>(mut self, f: F) -> Self {
        f(self.state.get_mut().unwrap_or_else(PoisonError::into_inner));
        self
    }

    /// Replace the enumeration entries (`file;model` strings).
    #[must_use]
    pub fn with_entries<I, T>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.configure(|s| s.entries = entries.into_iter().map(Into::into).collect())
    }

    /// Set the model string.
    #[must_use]
    pub fn with_model(self, model: &str) -> Self {
        self.configure(|s| s.model = model.to_owned())
    }

    /// Set the sensor array, which also becomes the initial image area.
    #[must_use]
    pub fn with_array_area(self, area: ImageArea) -> Self {
        self.configure(|s| {
            s.array_area = area;
            s.area = area;
        })
    }

    /// Choose how the status word is reported.
    #[must_use]
    pub fn with_reporting(self, reporting: StatusReporting) -> Self {
        self.configure(|s| s.reporting = reporting)
    }

    /// Choose the exposure clock.
    #[must_use]
    pub fn with_timebase(self, timebase: Timebase) -> Self {
        self.configure(|s| {
            s.timebase = timebase;
            s.origin = Instant::now();
        })
    }

    /// Choose the light frame pattern.
    #[must_use]
    pub fn with_pattern(self, pattern: TestPattern) -> Self {
        self.configure(|s| s.pattern = pattern)
    }

    /// Install filter names, one per slot.
    #[must_use]
    pub fn with_filters<I, T>(self, filters: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.configure(|s| s.filters = filters.into_iter().map(Into::into).collect())
    }

    /// Set the focuser travel.
    #[must_use]
    pub fn with_focuser_extent(self, extent: i32) -> Self {
        self.configure(|s| s.focuser_extent = extent)
    }

    /// Install camera mode descriptions.
    #[must_use]
    pub fn with_camera_modes<I, T>(self, modes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.configure(|s| s.camera_modes = modes.into_iter().map(Into::into).collect())
    }

    /// Move the exposure clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state();
        state.clock += by;
        state.refresh();
    }

    /// Queue status words returned ahead of the simulated ones.
    pub fn script_status<I: IntoIterator<Item = DeviceStatus>>(&self, words: I) {
        self.state().status_script.extend(words);
    }

    /// Queue countdown values returned ahead of the simulated ones.
    pub fn script_remaining<I: IntoIterator<Item = i32>>(&self, values: I) {
        self.state().remaining_script.extend(values);
    }

    /// Make the next call to `operation` fail with `code`.
    pub fn fail_next(&self, operation: &'static str, code: i64) {
        self.state().faults.insert(operation, code);
    }

    /// Make the next frame transfer report `bytes` fewer than it should.
    pub fn short_transfer(&self, bytes: usize) {
        self.state().short_by = bytes;
    }

    /// Complete any asynchronous stepper move.
    pub fn settle_motion(&self) {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.pending_steps);
        state.position += pending;
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls<P: Fn(&MockCall) -> bool>(&self, predicate: P) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Handles opened and not yet closed.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.state().open.len()
    }
}

impl DeviceSdk for MockSdk {
    fn lib_version(&self) -> Result<String> {
        Ok("Simulated libfli 1.104".to_owned())
    }

    fn set_debug_level(&self, _host: Option<&str>, level: DebugLevel) -> Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::SetDebugLevel(level));
        if let Some(code) = state.faults.remove("set_debug_level") {
            return Err(native_error("set_debug_level", code));
        }
        Ok(())
    }

    fn list(&self, _domain: Domain) -> Result<Vec<String>> {
        let mut state = self.state();
        state.calls.push(MockCall::List);
        if let Some(code) = state.faults.remove("list") {
            return Err(native_error("list", code));
        }
        Ok(state.entries.clone())
    }

    fn open(&self, name: &str, domain: Domain) -> Result<DeviceHandle> {
        let mut state = self.state();
        state.calls.push(MockCall::Open(name.to_owned()));
        if let Some(code) = state.faults.remove("open") {
            return Err(native_error("open", code));
        }
        let known = state
            .entries
            .iter()
            .any(|entry| entry.split(';').next() == Some(name));
        if !known {
            return Err(native_error("open", ENODEV));
        }
        let raw = state.next_handle;
        state.next_handle += 1;
        state.open.insert(raw, domain.class);
        Ok(DeviceHandle::from_raw(raw))
    }

    fn close(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("close", handle, MockCall::Close)?;
        state.open.remove(&handle.raw());
        if state.open.is_empty() {
            state.locked = false;
        }
        Ok(())
    }

    fn model(&self, handle: DeviceHandle) -> Result<String> {
        let mut state = self.state();
        state.query("model", handle)?;
        Ok(state.model.clone())
    }

    fn serial_string(&self, handle: DeviceHandle) -> Result<String> {
        self.state().query("serial_string", handle)?;
        Ok("SIM-0001".to_owned())
    }

    fn hw_revision(&self, handle: DeviceHandle) -> Result<i32> {
        self.state().query("hw_revision", handle)?;
        Ok(0x0100)
    }

    fn fw_revision(&self, handle: DeviceHandle) -> Result<i32> {
        self.state().query("fw_revision", handle)?;
        Ok(0x0200)
    }

    fn pixel_size(&self, handle: DeviceHandle) -> Result<(f64, f64)> {
        self.state().query("pixel_size", handle)?;
        Ok((9.0e-6, 9.0e-6))
    }

    fn array_area(&self, handle: DeviceHandle) -> Result<ImageArea> {
        let mut state = self.state();
        state.query("array_area", handle)?;
        Ok(state.array_area)
    }

    fn visible_area(&self, handle: DeviceHandle) -> Result<ImageArea> {
        let mut state = self.state();
        state.query("visible_area", handle)?;
        Ok(state.array_area)
    }

    fn readout_dimensions(&self, handle: DeviceHandle) -> Result<ReadoutDimensions> {
        let mut state = self.state();
        state.query("readout_dimensions", handle)?;
        let area = state.area;
        Ok(ReadoutDimensions {
            width: area.lr_x - area.ul_x,
            hoffset: area.ul_x,
            hbin: state.hbin,
            height: area.lr_y - area.ul_y,
            voffset: area.ul_y,
            vbin: state.vbin,
        })
    }

    fn set_image_area(&self, handle: DeviceHandle, area: ImageArea) -> Result<()> {
        let mut state = self.state();
        state.call("set_image_area", handle, MockCall::SetImageArea(area))?;
        let array = state.array_area;
        let inside = area.ul_x >= array.ul_x
            && area.ul_y >= array.ul_y
            && area.lr_x <= array.lr_x
            && area.lr_y <= array.lr_y;
        if !inside || area.width() == 0 || area.height() == 0 {
            return Err(native_error("set_image_area", EINVAL));
        }
        state.area = area;
        Ok(())
    }

    fn set_hbin(&self, handle: DeviceHandle, hbin: i32) -> Result<()> {
        let mut state = self.state();
        state.call("set_hbin", handle, MockCall::SetHBin(hbin))?;
        if !(1..=MAX_BIN).contains(&hbin) {
            return Err(native_error("set_hbin", EINVAL));
        }
        state.hbin = hbin;
        Ok(())
    }

    fn set_vbin(&self, handle: DeviceHandle, vbin: i32) -> Result<()> {
        let mut state = self.state();
        state.call("set_vbin", handle, MockCall::SetVBin(vbin))?;
        if !(1..=MAX_BIN).contains(&vbin) {
            return Err(native_error("set_vbin", EINVAL));
        }
        state.vbin = vbin;
        Ok(())
    }

    fn set_frame_type(&self, handle: DeviceHandle, frame_type: FrameType) -> Result<()> {
        let mut state = self.state();
        state.call("set_frame_type", handle, MockCall::SetFrameType(frame_type))?;
        state.frame_type = frame_type;
        Ok(())
    }

    fn set_exposure_time(&self, handle: DeviceHandle, millis: i32) -> Result<()> {
        let mut state = self.state();
        state.call("set_exposure_time", handle, MockCall::SetExposureTime(millis))?;
        if millis < 0 {
            return Err(native_error("set_exposure_time", EINVAL));
        }
        state.exposure_ms = millis;
        Ok(())
    }

    fn set_tdi(&self, handle: DeviceHandle, rate: i32, _flags: i32) -> Result<()> {
        self.state().call("set_tdi", handle, MockCall::SetTdi(rate))?;
        Ok(())
    }

    fn set_bit_depth(&self, handle: DeviceHandle, depth: BitDepth) -> Result<()> {
        let mut state = self.state();
        state.call("set_bit_depth", handle, MockCall::SetBitDepth(depth))?;
        state.bit_depth = depth;
        Ok(())
    }

    fn expose_frame(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("expose_frame", handle, MockCall::ExposeFrame)?;
        if matches!(
            state.phase,
            Phase::Armed | Phase::Exposing { .. } | Phase::Video
        ) {
            return Err(native_error("expose_frame", EBUSY));
        }
        state.phase = if state.external_trigger {
            Phase::Armed
        } else {
            Phase::Exposing {
                started: state.now(),
            }
        };
        state.refresh();
        Ok(())
    }

    fn trigger_exposure(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("trigger_exposure", handle, MockCall::TriggerExposure)?;
        if state.phase != Phase::Armed {
            return Err(native_error("trigger_exposure", EINVAL));
        }
        state.phase = Phase::Exposing {
            started: state.now(),
        };
        state.refresh();
        Ok(())
    }

    fn cancel_exposure(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("cancel_exposure", handle, MockCall::CancelExposure)?;
        state.phase = Phase::Idle;
        Ok(())
    }

    fn end_exposure(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("end_exposure", handle, MockCall::EndExposure)?;
        state.phase = Phase::Idle;
        Ok(())
    }

    fn exposure_status(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("exposure_status", handle)?;
        if let Some(remaining) = state.remaining_script.pop_front() {
            return Ok(remaining);
        }
        Ok(state.remaining_ms())
    }

    fn device_status(&self, handle: DeviceHandle) -> Result<DeviceStatus> {
        let mut state = self.state();
        let class = state.query("device_status", handle)?;
        if let Some(word) = state.status_script.pop_front() {
            return Ok(word);
        }
        Ok(match class {
            DeviceClass::Camera => state.camera_status(),
            DeviceClass::Focuser => state.focuser_status(),
            DeviceClass::FilterWheel | DeviceClass::HsFilterWheel => state.wheel_status(),
            DeviceClass::Raw => DeviceStatus(0),
        })
    }

    fn grab_row(
        &self,
        handle: DeviceHandle,
        row: &mut [u8],
        width: usize,
        depth: BitDepth,
    ) -> Result<()> {
        let mut state = self.state();
        state.call(
            "grab_row",
            handle,
            MockCall::GrabRow {
                width,
                len: row.len(),
            },
        )?;
        let geometry = state.geometry();
        if width != geometry.width
            || depth != geometry.bit_depth
            || row.len() != geometry.row_bytes()
        {
            return Err(native_error("grab_row", EINVAL));
        }
        let Phase::Readout { rows_read } = state.phase else {
            return Err(native_error("grab_row", EAGAIN));
        };
        state.fill_row(row, rows_read);
        state.phase = if rows_read + 1 >= geometry.rows {
            Phase::Idle
        } else {
            Phase::Readout {
                rows_read: rows_read + 1,
            }
        };
        Ok(())
    }

    fn grab_frame(&self, handle: DeviceHandle, buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        state.call("grab_frame", handle, MockCall::GrabFrame { len: buffer.len() })?;
        if !matches!(state.phase, Phase::Readout { .. }) {
            return Err(native_error("grab_frame", EAGAIN));
        }
        let transferred = state.fill_frame(buffer);
        state.phase = Phase::Idle;
        Ok(transferred)
    }

    fn set_temperature(&self, handle: DeviceHandle, celsius: f64) -> Result<()> {
        let mut state = self.state();
        state.call("set_temperature", handle, MockCall::SetTemperature(celsius))?;
        state.setpoint = celsius;
        Ok(())
    }

    fn temperature(&self, handle: DeviceHandle) -> Result<f64> {
        self.read_temperature(handle, TemperatureChannel::CCD)
    }

    fn read_temperature(&self, handle: DeviceHandle, channel: TemperatureChannel) -> Result<f64> {
        let mut state = self.state();
        state.query("read_temperature", handle)?;
        Ok(match channel {
            TemperatureChannel::Internal => state
                .setpoint
                .clamp(AMBIENT_CELSIUS - MAX_COOLING_DELTA, AMBIENT_CELSIUS),
            TemperatureChannel::External => AMBIENT_CELSIUS,
        })
    }

    fn cooler_power(&self, handle: DeviceHandle) -> Result<f64> {
        let mut state = self.state();
        state.query("cooler_power", handle)?;
        let delta = (AMBIENT_CELSIUS - state.setpoint).clamp(0.0, MAX_COOLING_DELTA);
        Ok(delta / MAX_COOLING_DELTA * 100.0)
    }

    fn control_shutter(&self, handle: DeviceHandle, shutter: Shutter) -> Result<()> {
        let mut state = self.state();
        state.call("control_shutter", handle, MockCall::ControlShutter(shutter))?;
        state.external_trigger = matches!(
            shutter,
            Shutter::ExternalTriggerLow | Shutter::ExternalTriggerHigh
        );
        Ok(())
    }

    fn lock_device(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("lock_device", handle, MockCall::Lock)?;
        if state.locked {
            return Err(native_error("lock_device", EBUSY));
        }
        state.locked = true;
        Ok(())
    }

    fn unlock_device(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("unlock_device", handle, MockCall::Unlock)?;
        if !state.locked {
            return Err(native_error("unlock_device", EINVAL));
        }
        state.locked = false;
        Ok(())
    }

    fn set_filter_pos(&self, handle: DeviceHandle, slot: i32) -> Result<()> {
        let mut state = self.state();
        state.call("set_filter_pos", handle, MockCall::SetFilterPos(slot))?;
        let count = i32::try_from(state.filters.len()).unwrap_or(i32::MAX);
        if !(0..count).contains(&slot) {
            return Err(native_error("set_filter_pos", EINVAL));
        }
        state.filter_pos = slot;
        Ok(())
    }

    fn filter_pos(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("filter_pos", handle)?;
        Ok(state.filter_pos)
    }

    fn filter_count(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("filter_count", handle)?;
        Ok(i32::try_from(state.filters.len()).unwrap_or(i32::MAX))
    }

    fn step_motor(&self, handle: DeviceHandle, steps: i32) -> Result<()> {
        let mut state = self.state();
        state.call(
            "step_motor",
            handle,
            MockCall::StepMotor {
                steps,
                blocking: true,
            },
        )?;
        if state.pending_steps != 0 {
            return Err(native_error("step_motor", EBUSY));
        }
        state.position = state.clamp_position(state.position.saturating_add(steps));
        Ok(())
    }

    fn step_motor_async(&self, handle: DeviceHandle, steps: i32) -> Result<()> {
        let mut state = self.state();
        state.call(
            "step_motor_async",
            handle,
            MockCall::StepMotor {
                steps,
                blocking: false,
            },
        )?;
        if state.pending_steps != 0 {
            return Err(native_error("step_motor_async", EBUSY));
        }
        let target = state.clamp_position(state.position.saturating_add(steps));
        state.pending_steps = target - state.position;
        Ok(())
    }

    fn stepper_position(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("stepper_position", handle)?;
        Ok(state.position)
    }

    fn steps_remaining(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("steps_remaining", handle)?;
        Ok(state.pending_steps.abs())
    }

    fn home_focuser(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("home_focuser", handle, MockCall::Home)?;
        state.position = 0;
        state.pending_steps = 0;
        Ok(())
    }

    fn focuser_extent(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("focuser_extent", handle)?;
        Ok(state.focuser_extent)
    }

    fn filter_name(&self, handle: DeviceHandle, slot: i32) -> Result<String> {
        let mut state = self.state();
        state.query("filter_name", handle)?;
        usize::try_from(slot)
            .ok()
            .and_then(|slot| state.filters.get(slot).cloned())
            .ok_or(native_error("filter_name", EINVAL))
    }

    fn set_active_wheel(&self, handle: DeviceHandle, wheel: i32) -> Result<()> {
        let mut state = self.state();
        state.call("set_active_wheel", handle, MockCall::Control("set_active_wheel"))?;
        if !(0..2).contains(&wheel) {
            return Err(native_error("set_active_wheel", EINVAL));
        }
        state.active_wheel = wheel;
        Ok(())
    }

    fn active_wheel(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("active_wheel", handle)?;
        Ok(state.active_wheel)
    }

    fn home_device(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        let class = state.call("home_device", handle, MockCall::Home)?;
        match class {
            DeviceClass::Focuser => {
                state.position = 0;
                state.pending_steps = 0;
            }
            DeviceClass::FilterWheel | DeviceClass::HsFilterWheel => state.filter_pos = 0,
            DeviceClass::Camera | DeviceClass::Raw => {
                return Err(native_error("home_device", EINVAL));
            }
        }
        Ok(())
    }

    fn set_nflushes(&self, handle: DeviceHandle, count: i32) -> Result<()> {
        self.state()
            .call("set_nflushes", handle, MockCall::Control("set_nflushes"))?;
        if !(0..=16).contains(&count) {
            return Err(native_error("set_nflushes", EINVAL));
        }
        Ok(())
    }

    fn flush_row(&self, handle: DeviceHandle, rows: i32, repeat: i32) -> Result<()> {
        self.state()
            .call("flush_row", handle, MockCall::Control("flush_row"))?;
        if rows < 0 || repeat < 0 {
            return Err(native_error("flush_row", EINVAL));
        }
        Ok(())
    }

    fn control_background_flush(&self, handle: DeviceHandle, _flush: BackgroundFlush) -> Result<()> {
        self.state().call(
            "control_background_flush",
            handle,
            MockCall::Control("control_background_flush"),
        )?;
        Ok(())
    }

    fn set_fan_speed(&self, handle: DeviceHandle, _speed: FanSpeed) -> Result<()> {
        self.state()
            .call("set_fan_speed", handle, MockCall::Control("set_fan_speed"))?;
        Ok(())
    }

    fn camera_mode(&self, handle: DeviceHandle) -> Result<i32> {
        let mut state = self.state();
        state.query("camera_mode", handle)?;
        Ok(state.camera_mode)
    }

    fn set_camera_mode(&self, handle: DeviceHandle, mode: i32) -> Result<()> {
        let mut state = self.state();
        state.call("set_camera_mode", handle, MockCall::Control("set_camera_mode"))?;
        let count = i32::try_from(state.camera_modes.len()).unwrap_or(i32::MAX);
        if !(0..count).contains(&mode) {
            return Err(native_error("set_camera_mode", EINVAL));
        }
        state.camera_mode = mode;
        Ok(())
    }

    fn camera_mode_string(&self, handle: DeviceHandle, mode: i32) -> Result<String> {
        let mut state = self.state();
        state.query("camera_mode_string", handle)?;
        usize::try_from(mode)
            .ok()
            .and_then(|mode| state.camera_modes.get(mode).cloned())
            .ok_or(native_error("camera_mode_string", EINVAL))
    }

    fn start_video_mode(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("start_video_mode", handle, MockCall::StartVideo)?;
        if state.phase != Phase::Idle {
            return Err(native_error("start_video_mode", EBUSY));
        }
        state.phase = Phase::Video;
        Ok(())
    }

    fn grab_video_frame(&self, handle: DeviceHandle, buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        state.call(
            "grab_video_frame",
            handle,
            MockCall::GrabVideoFrame { len: buffer.len() },
        )?;
        if state.phase != Phase::Video {
            return Err(native_error("grab_video_frame", EAGAIN));
        }
        Ok(state.fill_frame(buffer))
    }

    fn stop_video_mode(&self, handle: DeviceHandle) -> Result<()> {
        let mut state = self.state();
        state.call("stop_video_mode", handle, MockCall::StopVideo)?;
        if state.phase != Phase::Video {
            return Err(native_error("stop_video_mode", EINVAL));
        }
        state.phase = Phase::Idle;
        Ok(())
    }
}
