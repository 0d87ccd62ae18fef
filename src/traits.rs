//! Core traits and types for FLI device abstraction.

use std::ops::BitOr;
use std::time::Duration;

use crate::status::DeviceStatus;

/// Maximum length of any string returned by the native library.
pub const MAX_STRING_LEN: usize = 256;

/// Setpoint that effectively turns the CCD cooler off.
pub const COOLER_OFF_TEMPERATURE: f64 = 45.0;

/// Opaque identifier for an open device session.
///
/// Handles only compare for equality. The raw value is reachable through
/// [`DeviceHandle::raw`] so that SDK backends can hand it back to the
/// native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(i64);

impl DeviceHandle {
    /// Sentinel for a closed or never-opened device.
    pub const INVALID: Self = Self(-1);

    /// Wrap a handle value produced by a native `open` call.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Native handle value, for SDK backends only.
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whether this handle names an open device.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

/// Physical interface a device is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Parallel port.
    ParallelPort,
    /// USB.
    Usb,
    /// Serial port at the default rate.
    Serial,
    /// Network.
    Inet,
    /// Serial port at 19200 baud.
    Serial19200,
    /// Serial port at 1200 baud.
    Serial1200,
}

impl Transport {
    const fn bits(self) -> i64 {
        match self {
            Self::ParallelPort => 0x01,
            Self::Usb => 0x02,
            Self::Serial => 0x03,
            Self::Inet => 0x04,
            Self::Serial19200 => 0x05,
            Self::Serial1200 => 0x06,
        }
    }

    const fn from_bits(bits: i64) -> Option<Self> {
        match bits & 0xff {
            0x01 => Some(Self::ParallelPort),
            0x02 => Some(Self::Usb),
            0x03 => Some(Self::Serial),
            0x04 => Some(Self::Inet),
            0x05 => Some(Self::Serial19200),
            0x06 => Some(Self::Serial1200),
            _ => None,
        }
    }
}

/// Kind of device behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// CCD camera.
    Camera,
    /// Filter wheel.
    FilterWheel,
    /// Focuser.
    Focuser,
    /// High-speed filter wheel.
    HsFilterWheel,
    /// Raw device access.
    Raw,
}

impl DeviceClass {
    const fn bits(self) -> i64 {
        match self {
            Self::Camera => 0x100,
            Self::FilterWheel => 0x200,
            Self::Focuser => 0x300,
            Self::HsFilterWheel => 0x0f00,
            Self::Raw => 0x500,
        }
    }

    const fn from_bits(bits: i64) -> Option<Self> {
        match bits & 0x0f00 {
            0x100 => Some(Self::Camera),
            0x200 => Some(Self::FilterWheel),
            0x300 => Some(Self::Focuser),
            0x0f00 => Some(Self::HsFilterWheel),
            0x500 => Some(Self::Raw),
            _ => None,
        }
    }
}

/// Transport and device class combined, as required by enumeration and open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain {
    /// Interface method.
    pub transport: Transport,
    /// Device type.
    pub class: DeviceClass,
    /// Enumerate devices by connection rather than by name.
    pub by_connection: bool,
}

impl Domain {
    const ENUMERATE_BY_CONNECTION: i64 = 0x8000;

    /// Combine a transport and a device class.
    #[must_use]
    pub const fn new(transport: Transport, class: DeviceClass) -> Self {
        Self {
            transport,
            class,
            by_connection: false,
        }
    }

    /// Request enumeration by connection.
    #[must_use]
    pub const fn by_connection(mut self) -> Self {
        self.by_connection = true;
        self
    }

    /// Native bitmask for this domain.
    #[must_use]
    pub const fn bits(self) -> i64 {
        let mut bits = self.transport.bits() | self.class.bits();
        if self.by_connection {
            bits |= Self::ENUMERATE_BY_CONNECTION;
        }
        bits
    }

    /// Decode a native bitmask, if both halves are recognised.
    #[must_use]
    pub const fn from_bits(bits: i64) -> Option<Self> {
        let (Some(transport), Some(class)) =
            (Transport::from_bits(bits), DeviceClass::from_bits(bits))
        else {
            return None;
        };
        Some(Self {
            transport,
            class,
            by_connection: bits & Self::ENUMERATE_BY_CONNECTION != 0,
        })
    }
}

impl BitOr<DeviceClass> for Transport {
    type Output = Domain;

    fn bitor(self, class: DeviceClass) -> Domain {
        Domain::new(self, class)
    }
}

impl BitOr<Transport> for DeviceClass {
    type Output = Domain;

    fn bitor(self, transport: Transport) -> Domain {
        Domain::new(transport, self)
    }
}

/// Frame type for a camera exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    /// Shutter opens for the exposure.
    #[default]
    Normal,
    /// Shutter stays closed.
    Dark,
    /// Flood the sensor.
    Flood,
    /// RBI flush frame (dark and flood).
    RbiFlush,
}

impl FrameType {
    /// Native value.
    #[must_use]
    pub const fn bits(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Dark => 1,
            Self::Flood => 2,
            Self::RbiFlush => 3,
        }
    }
}

/// Pixel sample width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    /// One byte per pixel.
    Eight,
    /// Two bytes per pixel.
    #[default]
    Sixteen,
}

impl BitDepth {
    /// Native value.
    #[must_use]
    pub const fn bits(self) -> i64 {
        match self {
            Self::Eight => 0,
            Self::Sixteen => 1,
        }
    }

    /// Bytes occupied by a single pixel sample.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Eight => 1,
            Self::Sixteen => 2,
        }
    }
}

/// Shutter control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutter {
    /// Close the shutter.
    Close,
    /// Open the shutter.
    Open,
    /// Wait for an external trigger on a low level.
    ExternalTriggerLow,
    /// Wait for an external trigger on a high level.
    ExternalTriggerHigh,
    /// External exposure control.
    ExposureControl,
}

impl Shutter {
    /// Alias kept for the plain external-trigger command.
    pub const EXTERNAL_TRIGGER: Self = Self::ExternalTriggerLow;

    /// Native value.
    #[must_use]
    pub const fn bits(self) -> i64 {
        match self {
            Self::Close => 0x0000,
            Self::Open => 0x0001,
            Self::ExternalTriggerLow => 0x0002,
            Self::ExternalTriggerHigh => 0x0004,
            Self::ExposureControl => 0x0008,
        }
    }
}

/// Background flush control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFlush {
    /// Stop flushing.
    Stop,
    /// Start flushing.
    Start,
}

impl BackgroundFlush {
    /// Native value.
    #[must_use]
    pub const fn bits(self) -> i64 {
        match self {
            Self::Stop => 0,
            Self::Start => 1,
        }
    }
}

/// Temperature sensor selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureChannel {
    /// Internal (CCD) sensor.
    Internal,
    /// External (base) sensor.
    External,
}

impl TemperatureChannel {
    /// CCD sensor.
    pub const CCD: Self = Self::Internal;
    /// Camera base sensor.
    pub const BASE: Self = Self::External;

    /// Native value.
    #[must_use]
    pub const fn bits(self) -> i64 {
        match self {
            Self::Internal => 0,
            Self::External => 1,
        }
    }
}

/// Cooling fan setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    /// Fan off.
    Off,
    /// Fan on.
    On,
}

impl FanSpeed {
    /// Native value.
    #[must_use]
    pub const fn bits(self) -> i64 {
        match self {
            Self::Off => 0,
            Self::On => 0xffff_ffff,
        }
    }
}

/// Native library diagnostic categories, combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DebugLevel(u32);

impl DebugLevel {
    /// No diagnostics.
    pub const NONE: Self = Self(0x00);
    /// Informational messages.
    pub const INFO: Self = Self(0x01);
    /// Warnings.
    pub const WARN: Self = Self(0x02);
    /// Failures.
    pub const FAIL: Self = Self(0x04);
    /// Transport I/O traces.
    pub const IO: Self = Self(0x08);
    /// Info, warnings and failures.
    pub const ALL: Self = Self(0x07);

    /// Native value.
    #[must_use]
    pub fn bits(self) -> i64 {
        i64::from(self.0)
    }

    /// Whether every category in `other` is enabled.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugLevel {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Rectangle in sensor pixel coordinates, lower-right exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageArea {
    /// Upper-left x.
    pub ul_x: i32,
    /// Upper-left y.
    pub ul_y: i32,
    /// Lower-right x.
    pub lr_x: i32,
    /// Lower-right y.
    pub lr_y: i32,
}

impl ImageArea {
    /// Create an area from its corners.
    #[must_use]
    pub const fn new(ul_x: i32, ul_y: i32, lr_x: i32, lr_y: i32) -> Self {
        Self {
            ul_x,
            ul_y,
            lr_x,
            lr_y,
        }
    }

    /// Horizontal extent in pixels (zero when inverted).
    #[must_use]
    pub fn width(&self) -> u32 {
        self.lr_x.saturating_sub(self.ul_x).max(0).unsigned_abs()
    }

    /// Vertical extent in pixels (zero when inverted).
    #[must_use]
    pub fn height(&self) -> u32 {
        self.lr_y.saturating_sub(self.ul_y).max(0).unsigned_abs()
    }

    /// Area covering the same sensor region at the given binning.
    ///
    /// The upper-left corner stays in sensor pixels while the lower-right
    /// corner is expressed in binned pixels, which is what the native
    /// library expects after binning is set.
    #[must_use]
    pub fn binned(self, hbin: i32, vbin: i32) -> Self {
        let width = self.lr_x.saturating_sub(self.ul_x) / hbin.max(1);
        let height = self.lr_y.saturating_sub(self.ul_y) / vbin.max(1);
        Self::new(
            self.ul_x,
            self.ul_y,
            self.ul_x.saturating_add(width),
            self.ul_y.saturating_add(height),
        )
    }
}

/// Readout geometry as reported by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadoutDimensions {
    /// Pixels per row after binning.
    pub width: i32,
    /// Horizontal offset.
    pub hoffset: i32,
    /// Horizontal binning factor.
    pub hbin: i32,
    /// Rows after binning.
    pub height: i32,
    /// Vertical offset.
    pub voffset: i32,
    /// Vertical binning factor.
    pub vbin: i32,
}

/// One entry from device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName {
    /// Name passed to open (e.g. `usb:0` or `flipro0`).
    pub file_name: String,
    /// Model description, when the library reported one.
    pub model_name: Option<String>,
}

impl DeviceName {
    /// Parse a `file;model` enumeration entry.
    ///
    /// Only the first `;` separates the two halves. An entry without a
    /// delimiter is all file name.
    #[must_use]
    pub fn parse(entry: &str) -> Self {
        match entry.split_once(';') {
            Some((file, model)) => Self {
                file_name: file.to_owned(),
                model_name: Some(model.to_owned()),
            },
            None => Self {
                file_name: entry.to_owned(),
                model_name: None,
            },
        }
    }
}

/// Error type for device operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// A native call returned a non-zero status.
    #[error("{operation} failed with status {code}")]
    Status {
        /// Native entry point that failed.
        operation: &'static str,
        /// Raw status code (negative errno).
        code: i64,
    },
    /// A frame transfer succeeded but moved the wrong number of bytes.
    #[error("transfer size mismatch: expected {expected} bytes, got {actual}")]
    TransferSizeMismatch {
        /// Bytes implied by the readout geometry.
        expected: usize,
        /// Bytes the native call reported.
        actual: usize,
    },
    /// The device handle is closed or was never opened.
    #[error("device handle is not open")]
    InvalidHandle,
    /// The readiness wait exceeded its deadline.
    #[error("device not ready after {0:?}")]
    Timeout(Duration),
    /// The readiness wait was cancelled by the caller.
    #[error("wait for device cancelled")]
    Cancelled,
    /// The backend has no implementation for this operation.
    #[error("{0} is not supported by this backend")]
    NotSupported(&'static str),
    /// An argument cannot be passed to the native library.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Frame content did not match the expected pattern.
    #[error("frame validation failed: {0}")]
    Validation(String),
    /// The native library or one of its symbols could not be loaded.
    #[error("failed to load {what}: {source}")]
    Library {
        /// Library path or symbol name.
        what: String,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },
    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Native status code carried by this error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// The native SDK surface, as an injectable capability set.
///
/// Every method maps onto exactly one native entry point. Implementations
/// translate non-zero native returns into [`CameraError::Status`] and
/// never retry. Methods take `&self`; callers serialize access per handle.
pub trait DeviceSdk {
    /// Library version string.
    fn lib_version(&self) -> Result<String>;

    /// Select the library's diagnostic output, optionally for one host.
    fn set_debug_level(&self, _host: Option<&str>, _level: DebugLevel) -> Result<()> {
        Err(CameraError::NotSupported("set_debug_level"))
    }

    /// Raw `file;model` enumeration entries for a domain.
    fn list(&self, domain: Domain) -> Result<Vec<String>>;

    /// Open a device by file name.
    fn open(&self, name: &str, domain: Domain) -> Result<DeviceHandle>;

    /// Close a device.
    fn close(&self, handle: DeviceHandle) -> Result<()>;

    /// Device model string.
    fn model(&self, handle: DeviceHandle) -> Result<String>;

    /// Device serial number.
    fn serial_string(&self, handle: DeviceHandle) -> Result<String>;

    /// Hardware revision.
    fn hw_revision(&self, handle: DeviceHandle) -> Result<i32>;

    /// Firmware revision.
    fn fw_revision(&self, handle: DeviceHandle) -> Result<i32>;

    /// Pixel dimensions in meters (x, y).
    fn pixel_size(&self, handle: DeviceHandle) -> Result<(f64, f64)>;

    /// Full sensor array area, including overscan.
    fn array_area(&self, handle: DeviceHandle) -> Result<ImageArea>;

    /// Visible (imaging) area.
    fn visible_area(&self, handle: DeviceHandle) -> Result<ImageArea>;

    /// Current readout geometry.
    fn readout_dimensions(&self, handle: DeviceHandle) -> Result<ReadoutDimensions>;

    /// Set the image area to read out.
    fn set_image_area(&self, handle: DeviceHandle, area: ImageArea) -> Result<()>;

    /// Set the horizontal binning factor.
    fn set_hbin(&self, handle: DeviceHandle, hbin: i32) -> Result<()>;

    /// Set the vertical binning factor.
    fn set_vbin(&self, handle: DeviceHandle, vbin: i32) -> Result<()>;

    /// Set the frame type.
    fn set_frame_type(&self, handle: DeviceHandle, frame_type: FrameType) -> Result<()>;

    /// Set the exposure duration in milliseconds.
    fn set_exposure_time(&self, handle: DeviceHandle, millis: i32) -> Result<()>;

    /// Set the time-delay-integration rate. Zero disables TDI.
    fn set_tdi(&self, handle: DeviceHandle, rate: i32, flags: i32) -> Result<()>;

    /// Set the gray-scale bit depth.
    fn set_bit_depth(&self, handle: DeviceHandle, depth: BitDepth) -> Result<()>;

    /// Start an exposure.
    fn expose_frame(&self, handle: DeviceHandle) -> Result<()>;

    /// Software trigger for an exposure waiting on an external trigger.
    fn trigger_exposure(&self, handle: DeviceHandle) -> Result<()>;

    /// Abort the current exposure.
    fn cancel_exposure(&self, handle: DeviceHandle) -> Result<()>;

    /// Finalize exposure bookkeeping after readout.
    fn end_exposure(&self, handle: DeviceHandle) -> Result<()>;

    /// Milliseconds left in the current exposure.
    fn exposure_status(&self, handle: DeviceHandle) -> Result<i32>;

    /// Raw device status word.
    fn device_status(&self, handle: DeviceHandle) -> Result<DeviceStatus>;

    /// Transfer one row of `width` pixels into `row`.
    ///
    /// `row` must hold exactly `width * depth.bytes_per_pixel()` bytes.
    fn grab_row(
        &self,
        handle: DeviceHandle,
        row: &mut [u8],
        width: usize,
        depth: BitDepth,
    ) -> Result<()>;

    /// Transfer the whole frame into `buffer`, returning the bytes written.
    fn grab_frame(&self, handle: DeviceHandle, buffer: &mut [u8]) -> Result<usize>;

    /// Set the cooler setpoint in degrees Celsius.
    fn set_temperature(&self, handle: DeviceHandle, celsius: f64) -> Result<()>;

    /// CCD temperature in degrees Celsius.
    fn temperature(&self, handle: DeviceHandle) -> Result<f64>;

    /// Temperature of a specific sensor channel.
    fn read_temperature(&self, handle: DeviceHandle, channel: TemperatureChannel) -> Result<f64>;

    /// Cooler power in percent.
    fn cooler_power(&self, handle: DeviceHandle) -> Result<f64>;

    /// Operate the shutter.
    fn control_shutter(&self, handle: DeviceHandle, shutter: Shutter) -> Result<()>;

    /// Take the cross-process device lock.
    fn lock_device(&self, handle: DeviceHandle) -> Result<()>;

    /// Release the cross-process device lock.
    fn unlock_device(&self, handle: DeviceHandle) -> Result<()>;

    /// Move the filter wheel to a slot.
    fn set_filter_pos(&self, handle: DeviceHandle, slot: i32) -> Result<()>;

    /// Current filter slot.
    fn filter_pos(&self, handle: DeviceHandle) -> Result<i32>;

    /// Number of filter slots.
    fn filter_count(&self, handle: DeviceHandle) -> Result<i32>;

    /// Step the motor and block until the move completes.
    fn step_motor(&self, handle: DeviceHandle, steps: i32) -> Result<()>;

    /// Step the motor without waiting.
    fn step_motor_async(&self, handle: DeviceHandle, steps: i32) -> Result<()>;

    /// Absolute stepper position.
    fn stepper_position(&self, handle: DeviceHandle) -> Result<i32>;

    /// Steps left in the current move.
    fn steps_remaining(&self, handle: DeviceHandle) -> Result<i32>;

    /// Home the focuser.
    fn home_focuser(&self, handle: DeviceHandle) -> Result<()>;

    /// Maximum focuser position.
    fn focuser_extent(&self, handle: DeviceHandle) -> Result<i32>;

    /// Name of the filter in a slot.
    fn filter_name(&self, _handle: DeviceHandle, _slot: i32) -> Result<String> {
        Err(CameraError::NotSupported("filter_name"))
    }

    /// Select the active wheel on multi-wheel units.
    fn set_active_wheel(&self, _handle: DeviceHandle, _wheel: i32) -> Result<()> {
        Err(CameraError::NotSupported("set_active_wheel"))
    }

    /// Active wheel on multi-wheel units.
    fn active_wheel(&self, _handle: DeviceHandle) -> Result<i32> {
        Err(CameraError::NotSupported("active_wheel"))
    }

    /// Home any motorized device.
    fn home_device(&self, _handle: DeviceHandle) -> Result<()> {
        Err(CameraError::NotSupported("home_device"))
    }

    /// Set the number of flushes before each exposure.
    fn set_nflushes(&self, _handle: DeviceHandle, _count: i32) -> Result<()> {
        Err(CameraError::NotSupported("set_nflushes"))
    }

    /// Flush rows from the sensor.
    fn flush_row(&self, _handle: DeviceHandle, _rows: i32, _repeat: i32) -> Result<()> {
        Err(CameraError::NotSupported("flush_row"))
    }

    /// Start or stop background flushing.
    fn control_background_flush(
        &self,
        _handle: DeviceHandle,
        _flush: BackgroundFlush,
    ) -> Result<()> {
        Err(CameraError::NotSupported("control_background_flush"))
    }

    /// Switch the cooling fan.
    fn set_fan_speed(&self, _handle: DeviceHandle, _speed: FanSpeed) -> Result<()> {
        Err(CameraError::NotSupported("set_fan_speed"))
    }

    /// Index of the current camera mode.
    fn camera_mode(&self, _handle: DeviceHandle) -> Result<i32> {
        Err(CameraError::NotSupported("camera_mode"))
    }

    /// Select a camera mode.
    fn set_camera_mode(&self, _handle: DeviceHandle, _mode: i32) -> Result<()> {
        Err(CameraError::NotSupported("set_camera_mode"))
    }

    /// Description of a camera mode.
    fn camera_mode_string(&self, _handle: DeviceHandle, _mode: i32) -> Result<String> {
        Err(CameraError::NotSupported("camera_mode_string"))
    }

    /// Start continuous video readout with the current configuration.
    fn start_video_mode(&self, _handle: DeviceHandle) -> Result<()> {
        Err(CameraError::NotSupported("start_video_mode"))
    }

    /// Transfer the next video frame into `buffer`, returning the bytes written.
    fn grab_video_frame(&self, _handle: DeviceHandle, _buffer: &mut [u8]) -> Result<usize> {
        Err(CameraError::NotSupported("grab_video_frame"))
    }

    /// Leave video mode.
    fn stop_video_mode(&self, _handle: DeviceHandle) -> Result<()> {
        Err(CameraError::NotSupported("stop_video_mode"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_bits() {
        let domain = Transport::Usb | DeviceClass::Camera;
        assert_eq!(domain.bits(), 0x102);
        assert_eq!(
            DeviceClass::Focuser | Transport::Serial,
            Domain::new(Transport::Serial, DeviceClass::Focuser)
        );
        assert_eq!(domain.by_connection().bits(), 0x8102);
    }

    #[test]
    fn test_domain_from_bits() {
        let domain = Domain::from_bits(0x8202).expect("domain should decode");
        assert_eq!(domain.transport, Transport::Usb);
        assert_eq!(domain.class, DeviceClass::FilterWheel);
        assert!(domain.by_connection);

        assert!(Domain::from_bits(0x0100).is_none());
        assert!(Domain::from_bits(0x0002).is_none());
    }

    #[test]
    fn test_device_name_with_model() {
        let name = DeviceName::parse("usb:0;ModelX");
        assert_eq!(name.file_name, "usb:0");
        assert_eq!(name.model_name.as_deref(), Some("ModelX"));
    }

    #[test]
    fn test_device_name_without_delimiter() {
        let name = DeviceName::parse("flipro0");
        assert_eq!(name.file_name, "flipro0");
        assert_eq!(name.model_name, None);
    }

    #[test]
    fn test_device_name_splits_on_first_delimiter() {
        let name = DeviceName::parse("usb:1;Model;Rev B");
        assert_eq!(name.file_name, "usb:1");
        assert_eq!(name.model_name.as_deref(), Some("Model;Rev B"));
    }

    #[test]
    fn test_handle_sentinel() {
        assert!(!DeviceHandle::INVALID.is_valid());
        assert!(DeviceHandle::from_raw(0).is_valid());
        assert_eq!(DeviceHandle::from_raw(7).raw(), 7);
    }

    #[test]
    fn test_image_area_extent() {
        let area = ImageArea::new(10, 20, 110, 70);
        assert_eq!(area.width(), 100);
        assert_eq!(area.height(), 50);
        assert_eq!(ImageArea::new(5, 5, 1, 1).width(), 0);
    }

    #[test]
    fn test_image_area_binned() {
        let area = ImageArea::new(4, 2, 3076, 3074);
        assert_eq!(area.binned(1, 1), area);
        assert_eq!(area.binned(2, 4), ImageArea::new(4, 2, 1540, 770));
        assert_eq!(area.binned(0, 0), area);
    }

    #[test]
    fn test_bit_depth_sizes() {
        assert_eq!(BitDepth::Eight.bytes_per_pixel(), 1);
        assert_eq!(BitDepth::Sixteen.bytes_per_pixel(), 2);
        assert_eq!(BitDepth::default(), BitDepth::Sixteen);
    }

    #[test]
    fn test_debug_level_combines() {
        let level = DebugLevel::WARN | DebugLevel::FAIL;
        assert_eq!(level.bits(), 0x06);
        assert!(DebugLevel::ALL.contains(level));
        assert!(!level.contains(DebugLevel::IO));
        assert_eq!(DebugLevel::default(), DebugLevel::NONE);
    }

    #[test]
    fn test_error_code() {
        let err = CameraError::Status {
            operation: "FLIExposeFrame",
            code: -19,
        };
        assert_eq!(err.code(), Some(-19));
        assert_eq!(err.to_string(), "FLIExposeFrame failed with status -19");
        assert_eq!(CameraError::InvalidHandle.code(), None);
    }
}
