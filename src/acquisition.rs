//! Exposure sequencing: configure, trigger, poll until ready, drain.
//!
//! The controller borrows an open [`Device`] mutably, so only one operation
//! is ever in flight per handle. It never caches derived geometry; buffer
//! sizes are recomputed from the camera's readout dimensions on each call.

use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::session::Device;
use crate::status::{download_ready, DeviceStatus};
use crate::traits::{BitDepth, CameraError, DeviceSdk, FrameType, ImageArea, Result};
use crate::transfer::{check_transfer, ImageBuffer, ReadoutGeometry};

/// Parameters applied before each exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureConfig {
    /// Area to read out, in binned pixel coordinates.
    pub area: ImageArea,
    /// Horizontal binning factor.
    pub hbin: i32,
    /// Vertical binning factor.
    pub vbin: i32,
    /// Frame type.
    pub frame_type: FrameType,
    /// Exposure duration (millisecond resolution).
    pub exposure: Duration,
    /// Sample width.
    pub bit_depth: BitDepth,
    /// TDI rate, when scanning in time-delay-integration mode.
    pub tdi_rate: Option<i32>,
}

impl ExposureConfig {
    /// Unbinned normal 16-bit exposure of `area`.
    #[must_use]
    pub const fn new(area: ImageArea, exposure: Duration) -> Self {
        Self {
            area,
            hbin: 1,
            vbin: 1,
            frame_type: FrameType::Normal,
            exposure,
            bit_depth: BitDepth::Sixteen,
            tdi_rate: None,
        }
    }

    /// Set binning factors.
    #[must_use]
    pub const fn with_binning(mut self, hbin: i32, vbin: i32) -> Self {
        self.hbin = hbin;
        self.vbin = vbin;
        self
    }

    /// Set the frame type.
    #[must_use]
    pub const fn with_frame_type(mut self, frame_type: FrameType) -> Self {
        self.frame_type = frame_type;
        self
    }

    /// Set the bit depth.
    #[must_use]
    pub const fn with_bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Enable TDI at the given rate. Without this, configuring turns TDI off.
    #[must_use]
    pub const fn with_tdi(mut self, rate: i32) -> Self {
        self.tdi_rate = Some(rate);
        self
    }
}

/// Outcome of one readiness query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Image data can be transferred.
    pub ready: bool,
    /// Status word that was read.
    pub status: DeviceStatus,
    /// Exposure countdown in milliseconds.
    pub remaining_ms: i32,
}

/// Shared flag for abandoning a readiness wait from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Polling behaviour for [`AcquisitionController::wait_until_ready`].
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Longest sleep between polls.
    pub poll_ceiling: Duration,
    /// Sleep used when the countdown is already at zero but data is not ready.
    pub min_poll: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Abandon the wait when triggered.
    pub cancel: Option<CancelToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_ceiling: Duration::from_millis(200),
            min_poll: Duration::from_millis(10),
            timeout: None,
            cancel: None,
        }
    }
}

impl WaitOptions {
    /// Set a timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sleep before the next poll given the reported countdown.
    ///
    /// The interval shrinks with the countdown so the final poll lands close
    /// to the end of the exposure.
    #[must_use]
    pub fn poll_interval(&self, remaining_ms: i32) -> Duration {
        let remaining = Duration::from_millis(u64::from(remaining_ms.max(0).unsigned_abs()));
        let pause = remaining.min(self.poll_ceiling);
        if pause.is_zero() {
            self.min_poll
        } else {
            pause
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Drives one camera through configure, trigger, wait and readout.
pub struct AcquisitionController<'a, 's, S: DeviceSdk + ?Sized> {
    device: &'a mut Device<'s, S>,
}

impl<'a, 's, S: DeviceSdk + ?Sized> AcquisitionController<'a, 's, S> {
    /// Borrow an open camera.
    pub fn new(device: &'a mut Device<'s, S>) -> Self {
        Self { device }
    }

    /// The camera being driven.
    #[must_use]
    pub fn device(&self) -> &Device<'s, S> {
        self.device
    }

    /// Apply every exposure parameter in order.
    ///
    /// TDI is always written; a config without a rate sends zero, which
    /// turns it off.
    ///
    /// Calls are not atomic: when one fails, earlier settings have already
    /// reached the camera and the error is returned as-is.
    pub fn configure(&mut self, config: &ExposureConfig) -> Result<()> {
        debug!(?config, "configuring exposure");
        self.device.set_image_area(config.area)?;
        self.device.set_binning(config.hbin, config.vbin)?;
        self.device.set_frame_type(config.frame_type)?;
        self.device.set_bit_depth(config.bit_depth)?;
        self.device.set_exposure_time(config.exposure)?;
        self.device.set_tdi(config.tdi_rate.unwrap_or(0))?;
        Ok(())
    }

    /// Current readout geometry, queried from the camera.
    ///
    /// The sample width is the one applied through this session. Before
    /// any bit depth has been applied the camera's depth is unknown, and
    /// this fails with [`CameraError::InvalidArgument`].
    pub fn geometry(&self) -> Result<ReadoutGeometry> {
        let bit_depth = self.device.bit_depth().ok_or_else(|| {
            CameraError::InvalidArgument(
                "bit depth not applied in this session; configure first".to_owned(),
            )
        })?;
        let dims = self.device.readout_dimensions()?;
        Ok(ReadoutGeometry::from_dimensions(&dims, bit_depth))
    }

    /// Start the configured exposure.
    pub fn trigger(&mut self) -> Result<()> {
        debug!(device = self.device.name(), "starting exposure");
        let handle = self.device.handle()?;
        self.device.sdk().expose_frame(handle)
    }

    /// Fire a software trigger for an exposure armed on an external trigger.
    pub fn trigger_external(&mut self) -> Result<()> {
        let handle = self.device.handle()?;
        self.device.sdk().trigger_exposure(handle)
    }

    /// Query status and countdown once and decide readiness.
    pub fn is_ready(&self) -> Result<Readiness> {
        let status = self.device.device_status()?;
        let remaining_ms = self.device.exposure_status()?;
        Ok(Readiness {
            ready: download_ready(status, remaining_ms),
            status,
            remaining_ms,
        })
    }

    /// Block the calling thread until data is ready.
    pub fn wait_until_ready(&self, options: &WaitOptions) -> Result<Readiness> {
        self.wait_until_ready_with(options, thread::sleep)
    }

    /// Like [`Self::wait_until_ready`], with a caller-supplied sleep.
    ///
    /// Query failures end the wait immediately. The timeout counts the
    /// larger of wall time and requested sleep time.
    pub fn wait_until_ready_with<F>(&self, options: &WaitOptions, mut sleep: F) -> Result<Readiness>
    where
        F: FnMut(Duration),
    {
        let started = Instant::now();
        let mut slept = Duration::ZERO;
        loop {
            if options.is_cancelled() {
                return Err(CameraError::Cancelled);
            }
            let readiness = self.is_ready()?;
            if readiness.ready {
                debug!(polls_slept = ?slept, "exposure data ready");
                return Ok(readiness);
            }
            let mut pause = options.poll_interval(readiness.remaining_ms);
            if let Some(timeout) = options.timeout {
                let waited = started.elapsed().max(slept);
                if waited >= timeout {
                    return Err(CameraError::Timeout(timeout));
                }
                pause = pause.min(timeout - waited);
            }
            trace!(
                status = readiness.status.0,
                remaining_ms = readiness.remaining_ms,
                ?pause,
                "waiting for exposure"
            );
            sleep(pause);
            slept += pause;
        }
    }

    /// Read the frame row by row using the camera's current geometry.
    pub fn drain_rows(&mut self) -> Result<RowReader<'_, 's, S>> {
        let geometry = self.geometry()?;
        Ok(self.drain_rows_with(geometry))
    }

    /// Read `geometry.rows` rows of `geometry.width` pixels each.
    pub fn drain_rows_with(&mut self, geometry: ReadoutGeometry) -> RowReader<'_, 's, S> {
        debug!(?geometry, "draining rows");
        RowReader {
            device: self.device,
            geometry,
            next: 0,
            failed: false,
        }
    }

    /// Transfer the whole frame into `buffer` in one call.
    ///
    /// Returns the bytes transferred. A native success that moved a
    /// different number of bytes than the geometry implies is reported as
    /// [`CameraError::TransferSizeMismatch`].
    pub fn grab_frame(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let expected = self.geometry()?.frame_bytes();
        let handle = self.device.handle()?;
        let transferred = self.device.sdk().grab_frame(handle, buffer)?;
        check_transfer(expected, transferred)?;
        Ok(transferred)
    }

    /// Allocate a buffer for the current geometry and grab into it.
    pub fn grab_image(&mut self) -> Result<ImageBuffer> {
        let mut image = ImageBuffer::for_geometry(self.geometry()?);
        self.grab_frame(image.as_bytes_mut())?;
        Ok(image)
    }

    /// Finalize the exposure after readout.
    pub fn end_exposure(&mut self) -> Result<()> {
        let handle = self.device.handle()?;
        self.device.sdk().end_exposure(handle)
    }

    /// Abort the exposure, discarding any pending readout.
    pub fn cancel_exposure(&mut self) -> Result<()> {
        debug!(device = self.device.name(), "cancelling exposure");
        let handle = self.device.handle()?;
        self.device.sdk().cancel_exposure(handle)
    }

    /// Configure, trigger and wait until the frame can be read.
    ///
    /// When the wait fails (timeout, cancellation or a query error) the
    /// exposure is cancelled before the error is returned.
    pub fn expose(&mut self, config: &ExposureConfig, options: &WaitOptions) -> Result<Readiness> {
        self.expose_with(config, options, thread::sleep)
    }

    /// Like [`Self::expose`], with a caller-supplied sleep.
    pub fn expose_with<F>(
        &mut self,
        config: &ExposureConfig,
        options: &WaitOptions,
        sleep: F,
    ) -> Result<Readiness>
    where
        F: FnMut(Duration),
    {
        self.configure(config)?;
        self.trigger()?;
        match self.wait_until_ready_with(options, sleep) {
            Ok(readiness) => Ok(readiness),
            Err(err) => {
                if let Err(cancel_err) = self.cancel_exposure() {
                    warn!(error = %cancel_err, "failed to cancel exposure");
                }
                Err(err)
            }
        }
    }

    /// Configure, expose, wait, grab the frame and end the exposure.
    pub fn capture(&mut self, config: &ExposureConfig, options: &WaitOptions) -> Result<ImageBuffer> {
        self.capture_with(config, options, thread::sleep)
    }

    /// Like [`Self::capture`], with a caller-supplied sleep.
    pub fn capture_with<F>(
        &mut self,
        config: &ExposureConfig,
        options: &WaitOptions,
        sleep: F,
    ) -> Result<ImageBuffer>
    where
        F: FnMut(Duration),
    {
        self.expose_with(config, options, sleep)?;
        let image = self.grab_image()?;
        self.end_exposure()?;
        Ok(image)
    }

    /// Switch the camera to continuous readout with the current configuration.
    pub fn start_video(&mut self) -> Result<()> {
        debug!(device = self.device.name(), "starting video mode");
        let handle = self.device.handle()?;
        self.device.sdk().start_video_mode(handle)
    }

    /// Transfer the next video frame into `buffer`.
    ///
    /// `buffer` must hold exactly one frame of the current geometry.
    pub fn grab_video_frame(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let expected = self.geometry()?.frame_bytes();
        if buffer.len() != expected {
            return Err(CameraError::InvalidArgument(format!(
                "frame buffer holds {} bytes, frame needs {expected}",
                buffer.len()
            )));
        }
        let handle = self.device.handle()?;
        let transferred = self.device.sdk().grab_video_frame(handle, buffer)?;
        check_transfer(expected, transferred)?;
        trace!(bytes = transferred, "video frame transferred");
        Ok(transferred)
    }

    /// Allocate a buffer for the current geometry and grab a video frame into it.
    pub fn grab_video_image(&mut self) -> Result<ImageBuffer> {
        let mut image = ImageBuffer::for_geometry(self.geometry()?);
        self.grab_video_frame(image.as_bytes_mut())?;
        Ok(image)
    }

    /// Leave video mode.
    pub fn stop_video(&mut self) -> Result<()> {
        debug!(device = self.device.name(), "stopping video mode");
        let handle = self.device.handle()?;
        self.device.sdk().stop_video_mode(handle)
    }
}

/// Lazy, single-pass reader over the rows of one exposure.
///
/// Each row is transferred when requested. After an error the reader is
/// exhausted; rows can never be requested again.
pub struct RowReader<'r, 's, S: DeviceSdk + ?Sized> {
    device: &'r mut Device<'s, S>,
    geometry: ReadoutGeometry,
    next: usize,
    failed: bool,
}

impl<S: DeviceSdk + ?Sized> RowReader<'_, '_, S> {
    /// Geometry rows are read with.
    #[must_use]
    pub const fn geometry(&self) -> &ReadoutGeometry {
        &self.geometry
    }

    /// Rows not yet transferred.
    #[must_use]
    pub const fn rows_remaining(&self) -> usize {
        if self.failed {
            0
        } else {
            self.geometry.rows - self.next
        }
    }

    /// Transfer the next row into `row`, which must be exactly one row long.
    ///
    /// Returns the row index, or `None` once every row has been read.
    pub fn read_row_into(&mut self, row: &mut [u8]) -> Result<Option<usize>> {
        if self.rows_remaining() == 0 {
            return Ok(None);
        }
        let expected = self.geometry.row_bytes();
        if row.len() != expected {
            return Err(CameraError::InvalidArgument(format!(
                "row buffer holds {} bytes, row needs {expected}",
                row.len()
            )));
        }
        let index = self.next;
        let result = self.device.handle().and_then(|handle| {
            self.device
                .sdk()
                .grab_row(handle, row, self.geometry.width, self.geometry.bit_depth)
        });
        if let Err(err) = result {
            self.failed = true;
            return Err(err);
        }
        self.next += 1;
        trace!(row = index, "row transferred");
        Ok(Some(index))
    }
}

impl<S: DeviceSdk + ?Sized> Iterator for RowReader<'_, '_, S> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rows_remaining() == 0 {
            return None;
        }
        let mut row = vec![0; self.geometry.row_bytes()];
        match self.read_row_into(&mut row) {
            Ok(Some(_)) => Some(Ok(row)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.rows_remaining()))
    }
}

impl<S: DeviceSdk + ?Sized> FusedIterator for RowReader<'_, '_, S> {}
