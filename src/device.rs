//! Native libfli backend loaded at runtime with libloading.

#![allow(unsafe_code)]

use std::ffi::{c_char, c_double, c_long, c_void, CStr, CString, OsStr};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use libloading::Library;
use tracing::{debug, info, warn};

use crate::status::DeviceStatus;
use crate::traits::{
    BackgroundFlush, BitDepth, CameraError, DebugLevel, DeviceHandle, DeviceSdk, Domain, FanSpeed,
    FrameType, ImageArea, ReadoutDimensions, Result, Shutter, TemperatureChannel, MAX_STRING_LEN,
};

type FliDev = c_long;

type DevFn = unsafe extern "C" fn(FliDev) -> c_long;
type DevLongFn = unsafe extern "C" fn(FliDev, c_long) -> c_long;
type DevLong2Fn = unsafe extern "C" fn(FliDev, c_long, c_long) -> c_long;
type DevLongOutFn = unsafe extern "C" fn(FliDev, *mut c_long) -> c_long;
type DevDoubleFn = unsafe extern "C" fn(FliDev, c_double) -> c_long;
type DevDoubleOutFn = unsafe extern "C" fn(FliDev, *mut c_double) -> c_long;
type DevStringFn = unsafe extern "C" fn(FliDev, *mut c_char, usize) -> c_long;
type DevIndexStringFn = unsafe extern "C" fn(FliDev, c_long, *mut c_char, usize) -> c_long;
type AreaFn = unsafe extern "C" fn(FliDev, c_long, c_long, c_long, c_long) -> c_long;
type AreaOutFn =
    unsafe extern "C" fn(FliDev, *mut c_long, *mut c_long, *mut c_long, *mut c_long) -> c_long;
type PixelSizeFn = unsafe extern "C" fn(FliDev, *mut c_double, *mut c_double) -> c_long;
type ReadTemperatureFn = unsafe extern "C" fn(FliDev, c_long, *mut c_double) -> c_long;
type ReadoutDimensionsFn = unsafe extern "C" fn(
    FliDev,
    *mut c_long,
    *mut c_long,
    *mut c_long,
    *mut c_long,
    *mut c_long,
    *mut c_long,
) -> c_long;
type GrabRowFn = unsafe extern "C" fn(FliDev, *mut c_void, usize) -> c_long;
type GrabVideoFrameFn = unsafe extern "C" fn(FliDev, *mut c_void, usize) -> c_long;
type GrabFrameFn = unsafe extern "C" fn(FliDev, *mut c_void, usize, *mut usize) -> c_long;
type LibVersionFn = unsafe extern "C" fn(*mut c_char, usize) -> c_long;
type DebugLevelFn = unsafe extern "C" fn(*const c_char, c_long) -> c_long;
type ListFn = unsafe extern "C" fn(c_long, *mut *mut *mut c_char) -> c_long;
type FreeListFn = unsafe extern "C" fn(*mut *mut c_char) -> c_long;
type OpenFn = unsafe extern "C" fn(*mut FliDev, *const c_char, c_long) -> c_long;

/// Resolved entry points. Only valid while the owning [`Library`] is loaded.
struct Api {
    get_lib_version: LibVersionFn,
    set_debug_level: DebugLevelFn,
    list: ListFn,
    free_list: FreeListFn,
    open: OpenFn,
    close: DevFn,
    get_model: DevStringFn,
    get_serial_string: DevStringFn,
    get_hw_revision: DevLongOutFn,
    get_fw_revision: DevLongOutFn,
    get_pixel_size: PixelSizeFn,
    get_array_area: AreaOutFn,
    get_visible_area: AreaOutFn,
    get_readout_dimensions: ReadoutDimensionsFn,
    set_image_area: AreaFn,
    set_hbin: DevLongFn,
    set_vbin: DevLongFn,
    set_frame_type: DevLongFn,
    set_exposure_time: DevLongFn,
    set_tdi: DevLong2Fn,
    set_bit_depth: DevLongFn,
    expose_frame: DevFn,
    trigger_exposure: DevFn,
    cancel_exposure: DevFn,
    end_exposure: DevFn,
    get_exposure_status: DevLongOutFn,
    get_device_status: DevLongOutFn,
    grab_row: GrabRowFn,
    grab_frame: GrabFrameFn,
    set_temperature: DevDoubleFn,
    get_temperature: DevDoubleOutFn,
    read_temperature: ReadTemperatureFn,
    get_cooler_power: DevDoubleOutFn,
    control_shutter: DevLongFn,
    lock_device: DevFn,
    unlock_device: DevFn,
    set_filter_pos: DevLongFn,
    get_filter_pos: DevLongOutFn,
    get_filter_count: DevLongOutFn,
    get_filter_name: DevIndexStringFn,
    set_active_wheel: DevLongFn,
    get_active_wheel: DevLongOutFn,
    step_motor: DevLongFn,
    step_motor_async: DevLongFn,
    get_stepper_position: DevLongOutFn,
    get_steps_remaining: DevLongOutFn,
    home_focuser: DevFn,
    home_device: DevFn,
    get_focuser_extent: DevLongOutFn,
    set_nflushes: DevLongFn,
    flush_row: DevLong2Fn,
    control_background_flush: DevLongFn,
    set_fan_speed: DevLongFn,
    get_camera_mode: DevLongOutFn,
    set_camera_mode: DevLongFn,
    get_camera_mode_string: DevIndexStringFn,
    start_video_mode: DevFn,
    grab_video_frame: GrabVideoFrameFn,
    stop_video_mode: DevFn,
}

/// Copy a function pointer out of the library.
///
/// # Safety
///
/// `T` must match the native signature of `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T> {
    library
        .get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|source| CameraError::Library {
            what: name.to_owned(),
            source,
        })
}

impl Api {
    /// # Safety
    ///
    /// Every type alias must match the libfli header.
    unsafe fn resolve(library: &Library) -> Result<Self> {
        Ok(Self {
            get_lib_version: symbol(library, "FLIGetLibVersion")?,
            set_debug_level: symbol(library, "FLISetDebugLevel")?,
            list: symbol(library, "FLIList")?,
            free_list: symbol(library, "FLIFreeList")?,
            open: symbol(library, "FLIOpen")?,
            close: symbol(library, "FLIClose")?,
            get_model: symbol(library, "FLIGetModel")?,
            get_serial_string: symbol(library, "FLIGetSerialString")?,
            get_hw_revision: symbol(library, "FLIGetHWRevision")?,
            get_fw_revision: symbol(library, "FLIGetFWRevision")?,
            get_pixel_size: symbol(library, "FLIGetPixelSize")?,
            get_array_area: symbol(library, "FLIGetArrayArea")?,
            get_visible_area: symbol(library, "FLIGetVisibleArea")?,
            get_readout_dimensions: symbol(library, "FLIGetReadoutDimensions")?,
            set_image_area: symbol(library, "FLISetImageArea")?,
            set_hbin: symbol(library, "FLISetHBin")?,
            set_vbin: symbol(library, "FLISetVBin")?,
            set_frame_type: symbol(library, "FLISetFrameType")?,
            set_exposure_time: symbol(library, "FLISetExposureTime")?,
            set_tdi: symbol(library, "FLISetTDI")?,
            set_bit_depth: symbol(library, "FLISetBitDepth")?,
            expose_frame: symbol(library, "FLIExposeFrame")?,
            trigger_exposure: symbol(library, "FLITriggerExposure")?,
            cancel_exposure: symbol(library, "FLICancelExposure")?,
            end_exposure: symbol(library, "FLIEndExposure")?,
            get_exposure_status: symbol(library, "FLIGetExposureStatus")?,
            get_device_status: symbol(library, "FLIGetDeviceStatus")?,
            grab_row: symbol(library, "FLIGrabRow")?,
            grab_frame: symbol(library, "FLIGrabFrame")?,
            set_temperature: symbol(library, "FLISetTemperature")?,
            get_temperature: symbol(library, "FLIGetTemperature")?,
            read_temperature: symbol(library, "FLIReadTemperature")?,
            get_cooler_power: symbol(library, "FLIGetCoolerPower")?,
            control_shutter: symbol(library, "FLIControlShutter")?,
            lock_device: symbol(library, "FLILockDevice")?,
            unlock_device: symbol(library, "FLIUnlockDevice")?,
            set_filter_pos: symbol(library, "FLISetFilterPos")?,
            get_filter_pos: symbol(library, "FLIGetFilterPos")?,
            get_filter_count: symbol(library, "FLIGetFilterCount")?,
            get_filter_name: symbol(library, "FLIGetFilterName")?,
            set_active_wheel: symbol(library, "FLISetActiveWheel")?,
            get_active_wheel: symbol(library, "FLIGetActiveWheel")?,
            step_motor: symbol(library, "FLIStepMotor")?,
            step_motor_async: symbol(library, "FLIStepMotorAsync")?,
            get_stepper_position: symbol(library, "FLIGetStepperPosition")?,
            get_steps_remaining: symbol(library, "FLIGetStepsRemaining")?,
            home_focuser: symbol(library, "FLIHomeFocuser")?,
            home_device: symbol(library, "FLIHomeDevice")?,
            get_focuser_extent: symbol(library, "FLIGetFocuserExtent")?,
            set_nflushes: symbol(library, "FLISetNFlushes")?,
            flush_row: symbol(library, "FLIFlushRow")?,
            control_background_flush: symbol(library, "FLIControlBackgroundFlush")?,
            set_fan_speed: symbol(library, "FLISetFanSpeed")?,
            get_camera_mode: symbol(library, "FLIGetCameraMode")?,
            set_camera_mode: symbol(library, "FLISetCameraMode")?,
            get_camera_mode_string: symbol(library, "FLIGetCameraModeString")?,
            start_video_mode: symbol(library, "FLIStartVideoMode")?,
            grab_video_frame: symbol(library, "FLIGrabVideoFrame")?,
            stop_video_mode: symbol(library, "FLIStopVideoMode")?,
        })
    }
}

/// libfli loaded from disk.
///
/// libfli is not thread safe, so every call holds an internal lock.
pub struct FliLibrary {
    api: Api,
    calls: Mutex<()>,
    _library: Library,
}

impl std::fmt::Debug for FliLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FliLibrary").finish_non_exhaustive()
    }
}

/// Platform file name of the library.
pub const DEFAULT_LIBRARY: &str = if cfg!(target_os = "windows") {
    "libfli.dll"
} else if cfg!(target_os = "macos") {
    "libfli.dylib"
} else {
    "libfli.so"
};

impl FliLibrary {
    /// Load libfli from the platform's library search path.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_LIBRARY)
    }

    /// Load libfli from an explicit path.
    pub fn load_from<P: AsRef<OsStr>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: libfli has no initialisation routines with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|source| CameraError::Library {
            what: path.to_string_lossy().into_owned(),
            source,
        })?;
        // SAFETY: the aliases above mirror libfli.h.
        let api = unsafe { Api::resolve(&library)? };
        info!(path = %path.to_string_lossy(), "loaded libfli");
        Ok(Self {
            api,
            calls: Mutex::new(()),
            _library: library,
        })
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check(operation: &'static str, rc: c_long) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        debug!(operation, code = rc, "native call failed");
        Err(CameraError::Status {
            operation,
            code: i64::from(rc),
        })
    }
}

fn dev(handle: DeviceHandle) -> Result<FliDev> {
    FliDev::try_from(handle.raw()).map_err(|_| CameraError::InvalidHandle)
}

/// Native flag values are defined by their low 32 bits where `long` is narrow.
#[allow(clippy::cast_possible_truncation)]
const fn flag(bits: i64) -> c_long {
    bits as c_long
}

fn narrow(operation: &'static str, value: c_long) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        CameraError::InvalidArgument(format!("{operation} returned out-of-range value {value}"))
    })
}

fn string_from(buffer: &[u8]) -> String {
    CStr::from_bytes_until_nul(buffer).map_or_else(
        |_| String::from_utf8_lossy(buffer).into_owned(),
        |s| s.to_string_lossy().into_owned(),
    )
}

impl FliLibrary {
    fn call<F: FnOnce() -> c_long>(&self, operation: &'static str, f: F) -> Result<()> {
        let _guard = self.serialize();
        check(operation, f())
    }

    fn read_long(&self, operation: &'static str, f: DevLongOutFn, dev: FliDev) -> Result<i32> {
        let mut value: c_long = 0;
        // SAFETY: `value` outlives the call.
        self.call(operation, || unsafe { f(dev, &mut value) })?;
        narrow(operation, value)
    }

    fn read_double(&self, operation: &'static str, f: DevDoubleOutFn, dev: FliDev) -> Result<f64> {
        let mut value: c_double = 0.0;
        // SAFETY: `value` outlives the call.
        self.call(operation, || unsafe { f(dev, &mut value) })?;
        Ok(value)
    }

    fn read_string<F>(&self, operation: &'static str, f: F) -> Result<String>
    where
        F: FnOnce(*mut c_char, usize) -> c_long,
    {
        let mut buffer = [0u8; MAX_STRING_LEN];
        self.call(operation, || f(buffer.as_mut_ptr().cast(), buffer.len()))?;
        Ok(string_from(&buffer))
    }

    fn read_area(&self, operation: &'static str, f: AreaOutFn, dev: FliDev) -> Result<ImageArea> {
        let (mut ul_x, mut ul_y, mut lr_x, mut lr_y): (c_long, c_long, c_long, c_long) =
            (0, 0, 0, 0);
        // SAFETY: all four out-pointers outlive the call.
        self.call(operation, || unsafe {
            f(dev, &mut ul_x, &mut ul_y, &mut lr_x, &mut lr_y)
        })?;
        Ok(ImageArea::new(
            narrow(operation, ul_x)?,
            narrow(operation, ul_y)?,
            narrow(operation, lr_x)?,
            narrow(operation, lr_y)?,
        ))
    }

    fn simple(&self, operation: &'static str, f: DevFn, handle: DeviceHandle) -> Result<()> {
        let dev = dev(handle)?;
        // SAFETY: value arguments only.
        self.call(operation, || unsafe { f(dev) })
    }

    fn set_long(
        &self,
        operation: &'static str,
        f: DevLongFn,
        handle: DeviceHandle,
        value: c_long,
    ) -> Result<()> {
        let dev = dev(handle)?;
        // SAFETY: value arguments only.
        self.call(operation, || unsafe { f(dev, value) })
    }
}

impl DeviceSdk for FliLibrary {
    fn lib_version(&self) -> Result<String> {
        let f = self.api.get_lib_version;
        // SAFETY: the buffer pointer and length come from one live array.
        self.read_string("FLIGetLibVersion", |buf, len| unsafe { f(buf, len) })
    }

    fn set_debug_level(&self, host: Option<&str>, level: DebugLevel) -> Result<()> {
        let host_c = host
            .map(CString::new)
            .transpose()
            .map_err(|_| CameraError::InvalidArgument(format!("host {host:?} has NUL")))?;
        let host_ptr = host_c.as_ref().map_or(ptr::null(), |host| host.as_ptr());
        // SAFETY: `host_c` outlives the call; NULL selects every host.
        self.call("FLISetDebugLevel", || unsafe {
            (self.api.set_debug_level)(host_ptr, flag(level.bits()))
        })
    }

    fn list(&self, domain: Domain) -> Result<Vec<String>> {
        let _guard = self.serialize();
        let mut names: *mut *mut c_char = ptr::null_mut();
        // SAFETY: `names` outlives the call.
        check("FLIList", unsafe {
            (self.api.list)(flag(domain.bits()), &mut names)
        })?;
        let mut entries = Vec::new();
        if names.is_null() {
            return Ok(entries);
        }
        // SAFETY: FLIList hands back a NULL-terminated array of C strings,
        // owned by the library until FLIFreeList.
        let rc = unsafe {
            let mut cursor = names;
            while !(*cursor).is_null() {
                entries.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
                cursor = cursor.add(1);
            }
            (self.api.free_list)(names)
        };
        if rc != 0 {
            warn!(code = rc, "FLIFreeList failed");
        }
        Ok(entries)
    }

    fn open(&self, name: &str, domain: Domain) -> Result<DeviceHandle> {
        let name_c = CString::new(name)
            .map_err(|_| CameraError::InvalidArgument(format!("device name {name:?} has NUL")))?;
        let mut dev: FliDev = -1;
        // SAFETY: `name_c` and `dev` outlive the call.
        self.call("FLIOpen", || unsafe {
            (self.api.open)(&mut dev, name_c.as_ptr(), flag(domain.bits()))
        })?;
        Ok(DeviceHandle::from_raw(i64::from(dev)))
    }

    fn close(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIClose", self.api.close, handle)
    }

    fn model(&self, handle: DeviceHandle) -> Result<String> {
        let dev = dev(handle)?;
        let f = self.api.get_model;
        // SAFETY: the buffer pointer and length come from one live array.
        self.read_string("FLIGetModel", |buf, len| unsafe { f(dev, buf, len) })
    }

    fn serial_string(&self, handle: DeviceHandle) -> Result<String> {
        let dev = dev(handle)?;
        let f = self.api.get_serial_string;
        // SAFETY: the buffer pointer and length come from one live array.
        self.read_string("FLIGetSerialString", |buf, len| unsafe {
            f(dev, buf, len)
        })
    }

    fn hw_revision(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long("FLIGetHWRevision", self.api.get_hw_revision, dev(handle)?)
    }

    fn fw_revision(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long("FLIGetFWRevision", self.api.get_fw_revision, dev(handle)?)
    }

    fn pixel_size(&self, handle: DeviceHandle) -> Result<(f64, f64)> {
        let dev = dev(handle)?;
        let (mut x, mut y): (c_double, c_double) = (0.0, 0.0);
        // SAFETY: both out-pointers outlive the call.
        self.call("FLIGetPixelSize", || unsafe {
            (self.api.get_pixel_size)(dev, &mut x, &mut y)
        })?;
        Ok((x, y))
    }

    fn array_area(&self, handle: DeviceHandle) -> Result<ImageArea> {
        self.read_area("FLIGetArrayArea", self.api.get_array_area, dev(handle)?)
    }

    fn visible_area(&self, handle: DeviceHandle) -> Result<ImageArea> {
        self.read_area("FLIGetVisibleArea", self.api.get_visible_area, dev(handle)?)
    }

    fn readout_dimensions(&self, handle: DeviceHandle) -> Result<ReadoutDimensions> {
        const OP: &str = "FLIGetReadoutDimensions";
        let dev = dev(handle)?;
        let mut v: [c_long; 6] = [0; 6];
        let [width, hoffset, hbin, height, voffset, vbin] = &mut v;
        // SAFETY: all six out-pointers outlive the call.
        self.call(OP, || unsafe {
            (self.api.get_readout_dimensions)(dev, width, hoffset, hbin, height, voffset, vbin)
        })?;
        let [width, hoffset, hbin, height, voffset, vbin] = v;
        Ok(ReadoutDimensions {
            width: narrow(OP, width)?,
            hoffset: narrow(OP, hoffset)?,
            hbin: narrow(OP, hbin)?,
            height: narrow(OP, height)?,
            voffset: narrow(OP, voffset)?,
            vbin: narrow(OP, vbin)?,
        })
    }

    fn set_image_area(&self, handle: DeviceHandle, area: ImageArea) -> Result<()> {
        let dev = dev(handle)?;
        // SAFETY: value arguments only.
        self.call("FLISetImageArea", || unsafe {
            (self.api.set_image_area)(
                dev,
                c_long::from(area.ul_x),
                c_long::from(area.ul_y),
                c_long::from(area.lr_x),
                c_long::from(area.lr_y),
            )
        })
    }

    fn set_hbin(&self, handle: DeviceHandle, hbin: i32) -> Result<()> {
        self.set_long("FLISetHBin", self.api.set_hbin, handle, c_long::from(hbin))
    }

    fn set_vbin(&self, handle: DeviceHandle, vbin: i32) -> Result<()> {
        self.set_long("FLISetVBin", self.api.set_vbin, handle, c_long::from(vbin))
    }

    fn set_frame_type(&self, handle: DeviceHandle, frame_type: FrameType) -> Result<()> {
        self.set_long(
            "FLISetFrameType",
            self.api.set_frame_type,
            handle,
            flag(frame_type.bits()),
        )
    }

    fn set_exposure_time(&self, handle: DeviceHandle, millis: i32) -> Result<()> {
        self.set_long(
            "FLISetExposureTime",
            self.api.set_exposure_time,
            handle,
            c_long::from(millis),
        )
    }

    fn set_tdi(&self, handle: DeviceHandle, rate: i32, flags: i32) -> Result<()> {
        let dev = dev(handle)?;
        // SAFETY: value arguments only.
        self.call("FLISetTDI", || unsafe {
            (self.api.set_tdi)(dev, c_long::from(rate), c_long::from(flags))
        })
    }

    fn set_bit_depth(&self, handle: DeviceHandle, depth: BitDepth) -> Result<()> {
        self.set_long(
            "FLISetBitDepth",
            self.api.set_bit_depth,
            handle,
            flag(depth.bits()),
        )
    }

    fn expose_frame(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIExposeFrame", self.api.expose_frame, handle)
    }

    fn trigger_exposure(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLITriggerExposure", self.api.trigger_exposure, handle)
    }

    fn cancel_exposure(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLICancelExposure", self.api.cancel_exposure, handle)
    }

    fn end_exposure(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIEndExposure", self.api.end_exposure, handle)
    }

    fn exposure_status(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long(
            "FLIGetExposureStatus",
            self.api.get_exposure_status,
            dev(handle)?,
        )
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn device_status(&self, handle: DeviceHandle) -> Result<DeviceStatus> {
        let dev = dev(handle)?;
        let mut status: c_long = 0;
        // SAFETY: `status` outlives the call.
        self.call("FLIGetDeviceStatus", || unsafe {
            (self.api.get_device_status)(dev, &mut status)
        })?;
        // The status word occupies the low 32 bits.
        Ok(DeviceStatus(status as u32))
    }

    fn grab_row(
        &self,
        handle: DeviceHandle,
        row: &mut [u8],
        width: usize,
        depth: BitDepth,
    ) -> Result<()> {
        let dev = dev(handle)?;
        let needed = width.saturating_mul(depth.bytes_per_pixel());
        if row.len() != needed {
            return Err(CameraError::InvalidArgument(format!(
                "row buffer holds {} bytes, {width} pixels need {needed}",
                row.len()
            )));
        }
        // SAFETY: `row` holds exactly `width` samples at the configured depth.
        self.call("FLIGrabRow", || unsafe {
            (self.api.grab_row)(dev, row.as_mut_ptr().cast(), width)
        })
    }

    fn grab_frame(&self, handle: DeviceHandle, buffer: &mut [u8]) -> Result<usize> {
        let dev = dev(handle)?;
        let mut grabbed: usize = 0;
        // SAFETY: the library writes at most `buffer.len()` bytes.
        self.call("FLIGrabFrame", || unsafe {
            (self.api.grab_frame)(dev, buffer.as_mut_ptr().cast(), buffer.len(), &mut grabbed)
        })?;
        Ok(grabbed)
    }

    fn set_temperature(&self, handle: DeviceHandle, celsius: f64) -> Result<()> {
        let dev = dev(handle)?;
        // SAFETY: value arguments only.
        self.call("FLISetTemperature", || unsafe {
            (self.api.set_temperature)(dev, celsius)
        })
    }

    fn temperature(&self, handle: DeviceHandle) -> Result<f64> {
        self.read_double("FLIGetTemperature", self.api.get_temperature, dev(handle)?)
    }

    fn read_temperature(&self, handle: DeviceHandle, channel: TemperatureChannel) -> Result<f64> {
        let dev = dev(handle)?;
        let mut value: c_double = 0.0;
        // SAFETY: `value` outlives the call.
        self.call("FLIReadTemperature", || unsafe {
            (self.api.read_temperature)(dev, flag(channel.bits()), &mut value)
        })?;
        Ok(value)
    }

    fn cooler_power(&self, handle: DeviceHandle) -> Result<f64> {
        self.read_double("FLIGetCoolerPower", self.api.get_cooler_power, dev(handle)?)
    }

    fn control_shutter(&self, handle: DeviceHandle, shutter: Shutter) -> Result<()> {
        self.set_long(
            "FLIControlShutter",
            self.api.control_shutter,
            handle,
            flag(shutter.bits()),
        )
    }

    fn lock_device(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLILockDevice", self.api.lock_device, handle)
    }

    fn unlock_device(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIUnlockDevice", self.api.unlock_device, handle)
    }

    fn set_filter_pos(&self, handle: DeviceHandle, slot: i32) -> Result<()> {
        self.set_long(
            "FLISetFilterPos",
            self.api.set_filter_pos,
            handle,
            c_long::from(slot),
        )
    }

    fn filter_pos(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long("FLIGetFilterPos", self.api.get_filter_pos, dev(handle)?)
    }

    fn filter_count(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long("FLIGetFilterCount", self.api.get_filter_count, dev(handle)?)
    }

    fn step_motor(&self, handle: DeviceHandle, steps: i32) -> Result<()> {
        self.set_long(
            "FLIStepMotor",
            self.api.step_motor,
            handle,
            c_long::from(steps),
        )
    }

    fn step_motor_async(&self, handle: DeviceHandle, steps: i32) -> Result<()> {
        self.set_long(
            "FLIStepMotorAsync",
            self.api.step_motor_async,
            handle,
            c_long::from(steps),
        )
    }

    fn stepper_position(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long(
            "FLIGetStepperPosition",
            self.api.get_stepper_position,
            dev(handle)?,
        )
    }

    fn steps_remaining(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long(
            "FLIGetStepsRemaining",
            self.api.get_steps_remaining,
            dev(handle)?,
        )
    }

    fn home_focuser(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIHomeFocuser", self.api.home_focuser, handle)
    }

    fn focuser_extent(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long(
            "FLIGetFocuserExtent",
            self.api.get_focuser_extent,
            dev(handle)?,
        )
    }

    fn filter_name(&self, handle: DeviceHandle, slot: i32) -> Result<String> {
        let dev = dev(handle)?;
        let f = self.api.get_filter_name;
        // SAFETY: the buffer pointer and length come from one live array.
        self.read_string("FLIGetFilterName", |buf, len| unsafe {
            f(dev, c_long::from(slot), buf, len)
        })
    }

    fn set_active_wheel(&self, handle: DeviceHandle, wheel: i32) -> Result<()> {
        self.set_long(
            "FLISetActiveWheel",
            self.api.set_active_wheel,
            handle,
            c_long::from(wheel),
        )
    }

    fn active_wheel(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long("FLIGetActiveWheel", self.api.get_active_wheel, dev(handle)?)
    }

    fn home_device(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIHomeDevice", self.api.home_device, handle)
    }

    fn set_nflushes(&self, handle: DeviceHandle, count: i32) -> Result<()> {
        self.set_long(
            "FLISetNFlushes",
            self.api.set_nflushes,
            handle,
            c_long::from(count),
        )
    }

    fn flush_row(&self, handle: DeviceHandle, rows: i32, repeat: i32) -> Result<()> {
        let dev = dev(handle)?;
        // SAFETY: value arguments only.
        self.call("FLIFlushRow", || unsafe {
            (self.api.flush_row)(dev, c_long::from(rows), c_long::from(repeat))
        })
    }

    fn control_background_flush(&self, handle: DeviceHandle, flush: BackgroundFlush) -> Result<()> {
        self.set_long(
            "FLIControlBackgroundFlush",
            self.api.control_background_flush,
            handle,
            flag(flush.bits()),
        )
    }

    fn set_fan_speed(&self, handle: DeviceHandle, speed: FanSpeed) -> Result<()> {
        self.set_long(
            "FLISetFanSpeed",
            self.api.set_fan_speed,
            handle,
            flag(speed.bits()),
        )
    }

    fn camera_mode(&self, handle: DeviceHandle) -> Result<i32> {
        self.read_long("FLIGetCameraMode", self.api.get_camera_mode, dev(handle)?)
    }

    fn set_camera_mode(&self, handle: DeviceHandle, mode: i32) -> Result<()> {
        self.set_long(
            "FLISetCameraMode",
            self.api.set_camera_mode,
            handle,
            c_long::from(mode),
        )
    }

    fn camera_mode_string(&self, handle: DeviceHandle, mode: i32) -> Result<String> {
        let dev = dev(handle)?;
        let f = self.api.get_camera_mode_string;
        // SAFETY: the buffer pointer and length come from one live array.
        self.read_string("FLIGetCameraModeString", |buf, len| unsafe {
            f(dev, c_long::from(mode), buf, len)
        })
    }

    fn start_video_mode(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIStartVideoMode", self.api.start_video_mode, handle)
    }

    fn grab_video_frame(&self, handle: DeviceHandle, buffer: &mut [u8]) -> Result<usize> {
        let dev = dev(handle)?;
        // SAFETY: the library fills at most `buffer.len()` bytes.
        self.call("FLIGrabVideoFrame", || unsafe {
            (self.api.grab_video_frame)(dev, buffer.as_mut_ptr().cast(), buffer.len())
        })?;
        // The native call has no size out-parameter; success means a full buffer.
        Ok(buffer.len())
    }

    fn stop_video_mode(&self, handle: DeviceHandle) -> Result<()> {
        self.simple("FLIStopVideoMode", self.api.stop_video_mode, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_maps_nonzero_status() {
        assert!(check("FLIClose", 0).is_ok());
        let err = check("FLIClose", -19).expect_err("non-zero should fail");
        assert_eq!(err.code(), Some(-19));
        assert_eq!(err.to_string(), "FLIClose failed with status -19");
    }

    #[test]
    fn test_string_from_stops_at_nul() {
        let mut buffer = [0u8; 16];
        buffer[..5].copy_from_slice(b"ML-16");
        buffer[6] = b'x';
        assert_eq!(string_from(&buffer), "ML-16");
        assert_eq!(string_from(b"no terminator"), "no terminator");
    }

    #[test]
    fn test_flag_keeps_low_bits() {
        assert_eq!(i64::from(flag(FanSpeed::Off.bits())), 0);
        assert_eq!(flag(FanSpeed::On.bits()) as u32, 0xffff_ffff);
    }

    #[test]
    fn test_missing_library_is_reported() {
        let err = FliLibrary::load_from("/nonexistent/libfli-missing.so")
            .expect_err("missing library should fail");
        assert!(matches!(err, CameraError::Library { .. }));
    }
}
