//! Scoped device sessions.
//!
//! A [`Device`] owns one open handle and closes it exactly once, either via
//! [`Device::close`] or when dropped.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::status::DeviceStatus;
use crate::traits::{
    BackgroundFlush, BitDepth, CameraError, DebugLevel, DeviceHandle, DeviceName, DeviceSdk, Domain,
    FanSpeed, FrameType, ImageArea, ReadoutDimensions, Result, Shutter, TemperatureChannel,
    COOLER_OFF_TEMPERATURE,
};

/// Enumerate devices in a domain.
pub fn list_devices<S: DeviceSdk + ?Sized>(sdk: &S, domain: Domain) -> Result<Vec<DeviceName>> {
    let entries = sdk.list(domain)?;
    debug!(domain = domain.bits(), count = entries.len(), "enumerated devices");
    Ok(entries.iter().map(|entry| DeviceName::parse(entry)).collect())
}

/// Select libfli's diagnostic output, for every host or only `host`.
pub fn set_debug_level<S: DeviceSdk + ?Sized>(
    sdk: &S,
    host: Option<&str>,
    level: DebugLevel,
) -> Result<()> {
    sdk.set_debug_level(host, level)?;
    debug!(host, level = level.bits(), "library debug level set");
    Ok(())
}

/// An open device session.
pub struct Device<'s, S: DeviceSdk + ?Sized> {
    sdk: &'s S,
    handle: DeviceHandle,
    name: String,
    domain: Domain,
    bit_depth: Option<BitDepth>,
}

impl<S: DeviceSdk + ?Sized> std::fmt::Debug for Device<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<'s, S: DeviceSdk + ?Sized> Device<'s, S> {
    /// Open a device by file name (e.g. from [`list_devices`]).
    pub fn open(sdk: &'s S, name: &str, domain: Domain) -> Result<Self> {
        let handle = sdk.open(name, domain)?;
        if !handle.is_valid() {
            return Err(CameraError::InvalidHandle);
        }
        info!(name, domain = domain.bits(), "opened device");
        Ok(Self {
            sdk,
            handle,
            name: name.to_owned(),
            domain,
            bit_depth: None,
        })
    }

    /// Close the device.
    ///
    /// The handle is retired even when the native close fails, so the
    /// session is never closed twice. Closing an already closed session
    /// returns [`CameraError::InvalidHandle`].
    pub fn close(&mut self) -> Result<()> {
        let handle = self.handle()?;
        self.handle = DeviceHandle::INVALID;
        self.sdk.close(handle)?;
        info!(name = %self.name, "closed device");
        Ok(())
    }

    /// Whether the session still holds an open handle.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.handle.is_valid()
    }

    /// The open handle, or [`CameraError::InvalidHandle`] after close.
    pub fn handle(&self) -> Result<DeviceHandle> {
        if self.handle.is_valid() {
            Ok(self.handle)
        } else {
            Err(CameraError::InvalidHandle)
        }
    }

    /// SDK backing this session.
    #[must_use]
    pub const fn sdk(&self) -> &'s S {
        self.sdk
    }

    /// File name the device was opened with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Domain the device was opened in.
    #[must_use]
    pub const fn domain(&self) -> Domain {
        self.domain
    }

    /// Bit depth most recently applied through this session.
    ///
    /// The native library cannot report it, so this reflects the last
    /// successful [`Device::set_bit_depth`]. `None` until then; the camera
    /// may still hold a depth set by an earlier session.
    #[must_use]
    pub const fn bit_depth(&self) -> Option<BitDepth> {
        self.bit_depth
    }

    /// Model string.
    pub fn model(&self) -> Result<String> {
        self.sdk.model(self.handle()?)
    }

    /// Serial number.
    pub fn serial_string(&self) -> Result<String> {
        self.sdk.serial_string(self.handle()?)
    }

    /// Hardware revision.
    pub fn hw_revision(&self) -> Result<i32> {
        self.sdk.hw_revision(self.handle()?)
    }

    /// Firmware revision.
    pub fn fw_revision(&self) -> Result<i32> {
        self.sdk.fw_revision(self.handle()?)
    }

    /// Pixel size in meters (x, y).
    pub fn pixel_size(&self) -> Result<(f64, f64)> {
        self.sdk.pixel_size(self.handle()?)
    }

    /// Full array area.
    pub fn array_area(&self) -> Result<ImageArea> {
        self.sdk.array_area(self.handle()?)
    }

    /// Visible area.
    pub fn visible_area(&self) -> Result<ImageArea> {
        self.sdk.visible_area(self.handle()?)
    }

    /// Readout geometry as the camera currently reports it.
    pub fn readout_dimensions(&self) -> Result<ReadoutDimensions> {
        self.sdk.readout_dimensions(self.handle()?)
    }

    /// Raw status word.
    pub fn device_status(&self) -> Result<DeviceStatus> {
        self.sdk.device_status(self.handle()?)
    }

    /// Milliseconds left in the current exposure.
    pub fn exposure_status(&self) -> Result<i32> {
        self.sdk.exposure_status(self.handle()?)
    }

    /// Set the image area.
    pub fn set_image_area(&mut self, area: ImageArea) -> Result<()> {
        self.sdk.set_image_area(self.handle()?, area)
    }

    /// Set horizontal and vertical binning.
    pub fn set_binning(&mut self, hbin: i32, vbin: i32) -> Result<()> {
        let handle = self.handle()?;
        self.sdk.set_hbin(handle, hbin)?;
        self.sdk.set_vbin(handle, vbin)
    }

    /// Set the frame type.
    pub fn set_frame_type(&mut self, frame_type: FrameType) -> Result<()> {
        self.sdk.set_frame_type(self.handle()?, frame_type)
    }

    /// Set the exposure duration, at millisecond resolution.
    pub fn set_exposure_time(&mut self, exposure: Duration) -> Result<()> {
        let millis = i32::try_from(exposure.as_millis()).map_err(|_| {
            CameraError::InvalidArgument(format!("exposure {exposure:?} exceeds native range"))
        })?;
        self.sdk.set_exposure_time(self.handle()?, millis)
    }

    /// Set the TDI rate. Zero disables TDI.
    pub fn set_tdi(&mut self, rate: i32) -> Result<()> {
        self.sdk.set_tdi(self.handle()?, rate, 0)
    }

    /// Set the bit depth and remember it for buffer sizing.
    pub fn set_bit_depth(&mut self, depth: BitDepth) -> Result<()> {
        self.sdk.set_bit_depth(self.handle()?, depth)?;
        self.bit_depth = Some(depth);
        Ok(())
    }

    /// Set the cooler setpoint in degrees Celsius.
    pub fn set_temperature(&mut self, celsius: f64) -> Result<()> {
        self.sdk.set_temperature(self.handle()?, celsius)
    }

    /// Raise the setpoint far enough that the cooler stops working.
    pub fn cooler_off(&mut self) -> Result<()> {
        self.set_temperature(COOLER_OFF_TEMPERATURE)
    }

    /// CCD temperature in degrees Celsius.
    pub fn temperature(&self) -> Result<f64> {
        self.sdk.temperature(self.handle()?)
    }

    /// Temperature of one sensor channel.
    pub fn read_temperature(&self, channel: TemperatureChannel) -> Result<f64> {
        self.sdk.read_temperature(self.handle()?, channel)
    }

    /// Cooler power in percent.
    pub fn cooler_power(&self) -> Result<f64> {
        self.sdk.cooler_power(self.handle()?)
    }

    /// Switch the fan.
    pub fn set_fan_speed(&mut self, speed: FanSpeed) -> Result<()> {
        self.sdk.set_fan_speed(self.handle()?, speed)
    }

    /// Operate the shutter.
    pub fn control_shutter(&mut self, shutter: Shutter) -> Result<()> {
        self.sdk.control_shutter(self.handle()?, shutter)
    }

    /// Start or stop background flushing.
    pub fn control_background_flush(&mut self, flush: BackgroundFlush) -> Result<()> {
        self.sdk.control_background_flush(self.handle()?, flush)
    }

    /// Number of flushes before each exposure.
    pub fn set_nflushes(&mut self, count: i32) -> Result<()> {
        self.sdk.set_nflushes(self.handle()?, count)
    }

    /// Flush rows from the sensor.
    pub fn flush_row(&mut self, rows: i32, repeat: i32) -> Result<()> {
        self.sdk.flush_row(self.handle()?, rows, repeat)
    }

    /// Current camera mode index.
    pub fn camera_mode(&self) -> Result<i32> {
        self.sdk.camera_mode(self.handle()?)
    }

    /// Select a camera mode.
    pub fn set_camera_mode(&mut self, mode: i32) -> Result<()> {
        self.sdk.set_camera_mode(self.handle()?, mode)
    }

    /// Describe every camera mode, stopping at the first index the camera
    /// rejects.
    pub fn camera_modes(&self) -> Result<Vec<String>> {
        let handle = self.handle()?;
        let mut modes = Vec::new();
        for index in 0.. {
            match self.sdk.camera_mode_string(handle, index) {
                Ok(mode) => modes.push(mode),
                Err(CameraError::Status { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(modes)
    }

    /// Take the device lock until the guard is released or dropped.
    ///
    /// The lock is not reentrant; locking twice fails in the native layer.
    pub fn lock(&mut self) -> Result<DeviceLock<'_, 's, S>> {
        self.sdk.lock_device(self.handle()?)?;
        debug!(name = %self.name, "locked device");
        Ok(DeviceLock {
            device: self,
            held: true,
        })
    }
}

impl<S: DeviceSdk + ?Sized> Drop for Device<'_, S> {
    fn drop(&mut self) {
        if !self.handle.is_valid() {
            return;
        }
        if let Err(err) = self.close() {
            warn!(name = %self.name, error = %err, "failed to close device");
        }
    }
}

/// Guard for the device lock. Derefs to the locked [`Device`].
pub struct DeviceLock<'d, 's, S: DeviceSdk + ?Sized> {
    device: &'d mut Device<'s, S>,
    held: bool,
}

impl<S: DeviceSdk + ?Sized> DeviceLock<'_, '_, S> {
    /// Release the lock, reporting any native failure.
    pub fn unlock(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        self.device.sdk.unlock_device(self.device.handle()?)?;
        debug!(name = %self.device.name, "unlocked device");
        Ok(())
    }
}

impl<'s, S: DeviceSdk + ?Sized> Deref for DeviceLock<'_, 's, S> {
    type Target = Device<'s, S>;

    fn deref(&self) -> &Self::Target {
        self.device
    }
}

impl<S: DeviceSdk + ?Sized> DerefMut for DeviceLock<'_, '_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.device
    }
}

impl<S: DeviceSdk + ?Sized> Drop for DeviceLock<'_, '_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "failed to unlock device");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockSdk};
    use crate::traits::{DeviceClass, Transport};

    const CAMERA: Domain = Domain::new(Transport::Usb, DeviceClass::Camera);

    #[test]
    fn test_list_devices_parses_entries() {
        let sdk = MockSdk::new().with_entries(["usb:0;ModelX", "usb:1"]);
        let names = list_devices(&sdk, CAMERA).expect("list should succeed");
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].file_name, "usb:0");
        assert_eq!(names[0].model_name.as_deref(), Some("ModelX"));
        assert_eq!(names[1].file_name, "usb:1");
        assert_eq!(names[1].model_name, None);
    }

    #[test]
    fn test_set_debug_level_needs_no_device() {
        let sdk = MockSdk::new();
        set_debug_level(&sdk, None, DebugLevel::ALL).expect("debug level should apply");
        assert_eq!(sdk.calls(), vec![MockCall::SetDebugLevel(DebugLevel::ALL)]);
        assert_eq!(sdk.open_handles(), 0);
    }

    #[test]
    fn test_close_twice_is_an_error() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        device.close().expect("first close should succeed");
        assert!(matches!(device.close(), Err(CameraError::InvalidHandle)));
        assert_eq!(sdk.count_calls(|c| matches!(c, MockCall::Close)), 1);
    }

    #[test]
    fn test_operations_after_close_fail_fast() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        device.close().expect("close should succeed");
        let before = sdk.calls().len();

        assert!(matches!(device.model(), Err(CameraError::InvalidHandle)));
        assert!(matches!(device.device_status(), Err(CameraError::InvalidHandle)));
        assert!(matches!(
            device.set_frame_type(FrameType::Dark),
            Err(CameraError::InvalidHandle)
        ));
        assert_eq!(sdk.calls().len(), before, "no native call after close");
    }

    #[test]
    fn test_drop_closes_once() {
        let sdk = MockSdk::new();
        {
            let _device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        }
        assert_eq!(sdk.count_calls(|c| matches!(c, MockCall::Close)), 1);
        assert_eq!(sdk.open_handles(), 0);
    }

    #[test]
    fn test_failed_close_retires_handle() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        sdk.fail_next("close", -5);
        assert!(matches!(device.close(), Err(CameraError::Status { code: -5, .. })));
        assert!(!device.is_open());
        drop(device);
        assert_eq!(sdk.count_calls(|c| matches!(c, MockCall::Close)), 1);
    }

    #[test]
    fn test_open_unknown_device_fails() {
        let sdk = MockSdk::new().with_entries(["usb:0;ModelX"]);
        let err = Device::open(&sdk, "usb:9", CAMERA).expect_err("unknown device should fail");
        assert!(err.code().is_some());
    }

    #[test]
    fn test_bit_depth_recorded_only_on_success() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        assert_eq!(device.bit_depth(), None, "depth is unknown until applied");
        device.set_bit_depth(BitDepth::Eight).expect("set should succeed");
        assert_eq!(device.bit_depth(), Some(BitDepth::Eight));

        sdk.fail_next("set_bit_depth", -22);
        assert!(device.set_bit_depth(BitDepth::Sixteen).is_err());
        assert_eq!(device.bit_depth(), Some(BitDepth::Eight));
    }

    #[test]
    fn test_exposure_time_out_of_range() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        let err = device
            .set_exposure_time(Duration::from_secs(u64::MAX / 2))
            .expect_err("huge exposure should fail");
        assert!(matches!(err, CameraError::InvalidArgument(_)));
    }

    #[test]
    fn test_lock_is_not_reentrant() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        let mut guard = device.lock().expect("lock should succeed");
        assert!(guard.sdk().lock_device(guard.handle().expect("open")).is_err());
        guard.set_frame_type(FrameType::Dark).expect("locked device stays usable");
        guard.unlock().expect("unlock should succeed");

        let guard = device.lock().expect("relock after unlock should succeed");
        drop(guard);
        assert_eq!(sdk.count_calls(|c| matches!(c, MockCall::Unlock)), 2);
    }

    #[test]
    fn test_cooler_off_sets_high_setpoint() {
        let sdk = MockSdk::new();
        let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        device.set_temperature(-20.0).expect("set should succeed");
        device.cooler_off().expect("cooler off should succeed");
        assert!(sdk
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::SetTemperature(t) if (*t - 45.0).abs() < f64::EPSILON)));
    }

    #[test]
    fn test_camera_modes_stop_at_first_rejected_index() {
        let sdk = MockSdk::new().with_camera_modes(["2.0 MHz", "8.0 MHz"]);
        let device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
        let modes = device.camera_modes().expect("modes should list");
        assert_eq!(modes, vec!["2.0 MHz".to_owned(), "8.0 MHz".to_owned()]);
    }
}
