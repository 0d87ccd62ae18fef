//! fli-capture: control Finger Lakes Instrumentation cameras, filter wheels
//! and focusers through libfli.
//!
//! The native library is reached through the [`DeviceSdk`] trait, so the
//! same session and acquisition code runs against the real [`FliLibrary`]
//! or the in-memory [`MockSdk`].

pub mod acquisition;
pub mod config;
pub mod device;
pub mod mock;
pub mod motion;
pub mod session;
pub mod status;
pub mod traits;
pub mod transfer;
pub mod validation;

pub use acquisition::{
    AcquisitionController, CancelToken, ExposureConfig, Readiness, RowReader, WaitOptions,
};
pub use config::CaptureConfig;
pub use device::FliLibrary;
pub use mock::MockSdk;
pub use session::{list_devices, set_debug_level, Device, DeviceLock};
pub use status::{download_ready, CameraState, DeviceStatus};
pub use traits::{
    BitDepth, CameraError, DebugLevel, DeviceClass, DeviceHandle, DeviceName, DeviceSdk, Domain,
    FrameType, ImageArea, ReadoutDimensions, Result, Shutter, TemperatureChannel, Transport,
};
pub use transfer::{ImageBuffer, ReadoutGeometry};
