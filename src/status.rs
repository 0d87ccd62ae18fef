//! Device status word interpretation.
//!
//! The native library reports status as a bit field read on demand. Cameras,
//! focusers and filter wheels share the word but assign different meanings to
//! its bits.

/// Raw status word read from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceStatus(pub u32);

/// Exposure state of a camera, from the low two status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// Not exposing.
    Idle,
    /// Armed and waiting for an external trigger.
    WaitingForTrigger,
    /// Exposing.
    Exposing,
    /// Clocking data out of the CCD.
    ReadingCcd,
}

impl DeviceStatus {
    /// Status could not be determined.
    pub const UNKNOWN: Self = Self(0xffff_ffff);
    /// Image data is available for transfer.
    pub const DATA_READY: u32 = 0x8000_0000;

    const CAMERA_STATE_MASK: u32 = 0x0000_0003;

    /// Whether this is the indeterminate sentinel.
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }

    /// Whether the DATA_READY flag is set.
    #[must_use]
    pub const fn data_ready(self) -> bool {
        self.0 & Self::DATA_READY != 0
    }

    /// Camera exposure state, or `None` for the UNKNOWN sentinel.
    #[must_use]
    pub const fn camera_state(self) -> Option<CameraState> {
        if self.is_unknown() {
            return None;
        }
        Some(match self.0 & Self::CAMERA_STATE_MASK {
            0x00 => CameraState::Idle,
            0x01 => CameraState::WaitingForTrigger,
            0x02 => CameraState::Exposing,
            _ => CameraState::ReadingCcd,
        })
    }

    /// Interpret the word as focuser status.
    #[must_use]
    pub const fn focuser(self) -> FocuserStatus {
        FocuserStatus(self.0)
    }

    /// Interpret the word as filter wheel status.
    #[must_use]
    pub const fn filter_wheel(self) -> FilterWheelStatus {
        FilterWheelStatus(self.0)
    }
}

/// Focuser view of a status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocuserStatus(u32);

impl FocuserStatus {
    const MOVING_IN: u32 = 0x0000_0001;
    const MOVING_OUT: u32 = 0x0000_0002;
    const HOMING: u32 = 0x0000_0004;
    const LIMIT: u32 = 0x0000_0040;
    const HOME: u32 = 0x0000_0080;
    const LEGACY: u32 = 0x1000_0000;

    const fn has(self, bit: u32) -> bool {
        self.0 != DeviceStatus::UNKNOWN.0 && self.0 & bit != 0
    }

    /// Moving toward the motor.
    #[must_use]
    pub const fn moving_in(self) -> bool {
        self.has(Self::MOVING_IN)
    }

    /// Moving away from the motor.
    #[must_use]
    pub const fn moving_out(self) -> bool {
        self.has(Self::MOVING_OUT)
    }

    /// Any motion, including homing.
    #[must_use]
    pub const fn moving(self) -> bool {
        self.has(Self::MOVING_IN | Self::MOVING_OUT | Self::HOMING)
    }

    /// Homing in progress.
    #[must_use]
    pub const fn homing(self) -> bool {
        self.has(Self::HOMING)
    }

    /// At a travel limit.
    #[must_use]
    pub const fn at_limit(self) -> bool {
        self.has(Self::LIMIT)
    }

    /// Home switch engaged.
    #[must_use]
    pub const fn at_home(self) -> bool {
        self.has(Self::HOME)
    }

    /// Legacy focuser firmware without status reporting.
    #[must_use]
    pub const fn legacy(self) -> bool {
        self.has(Self::LEGACY)
    }
}

/// Filter wheel view of a status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterWheelStatus(u32);

impl FilterWheelStatus {
    const MOVING_CCW: u32 = 0x01;
    const MOVING_CW: u32 = 0x02;
    const HOMING: u32 = 0x04;
    const HOME_SUCCEEDED: u32 = 0x08;
    const HOME_RIGHT: u32 = 0x40;
    const HOME_LEFT: u32 = 0x80;

    const fn has(self, bit: u32) -> bool {
        self.0 != DeviceStatus::UNKNOWN.0 && self.0 & bit != 0
    }

    /// Rotating counter-clockwise.
    #[must_use]
    pub const fn moving_ccw(self) -> bool {
        self.has(Self::MOVING_CCW)
    }

    /// Rotating clockwise.
    #[must_use]
    pub const fn moving_cw(self) -> bool {
        self.has(Self::MOVING_CW)
    }

    /// Any rotation, including homing.
    #[must_use]
    pub const fn moving(self) -> bool {
        self.has(Self::MOVING_CCW | Self::MOVING_CW | Self::HOMING)
    }

    /// Homing in progress.
    #[must_use]
    pub const fn homing(self) -> bool {
        self.has(Self::HOMING)
    }

    /// The last homing completed.
    #[must_use]
    pub const fn home_succeeded(self) -> bool {
        self.has(Self::HOME_SUCCEEDED)
    }

    /// At home (left wheel on dual-wheel units).
    #[must_use]
    pub const fn at_home(self) -> bool {
        self.has(Self::HOME_LEFT)
    }

    /// Right wheel at home on dual-wheel units.
    #[must_use]
    pub const fn right_at_home(self) -> bool {
        self.has(Self::HOME_RIGHT)
    }
}

/// Decide whether image data can be downloaded.
///
/// Some firmware never sets DATA_READY and reports UNKNOWN until the
/// exposure is over, so an UNKNOWN word defers to the countdown. Any other
/// word is authoritative and the countdown is ignored.
#[must_use]
pub const fn download_ready(status: DeviceStatus, remaining_ms: i32) -> bool {
    if status.is_unknown() {
        remaining_ms == 0
    } else {
        status.data_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_defers_to_countdown() {
        for remaining in [-5, 0, 1, 250, 10_000] {
            assert_eq!(
                download_ready(DeviceStatus::UNKNOWN, remaining),
                remaining == 0,
                "remaining={remaining}"
            );
        }
    }

    #[test]
    fn test_known_status_ignores_countdown() {
        let words = [
            0x0000_0000,
            0x0000_0002,
            0x0000_0003,
            0x8000_0000,
            0x8000_0003,
            0x8000_0040,
            0x0000_00e2,
            0x7fff_ffff,
            0xffff_fffe,
        ];
        for word in words {
            let status = DeviceStatus(word);
            for remaining in [0, 1, 500] {
                assert_eq!(
                    download_ready(status, remaining),
                    word & DeviceStatus::DATA_READY != 0,
                    "status={word:#x} remaining={remaining}"
                );
            }
        }
    }

    #[test]
    fn test_camera_state_decoding() {
        assert_eq!(DeviceStatus(0x00).camera_state(), Some(CameraState::Idle));
        assert_eq!(
            DeviceStatus(0xe1).camera_state(),
            Some(CameraState::WaitingForTrigger)
        );
        assert_eq!(DeviceStatus(0xe2).camera_state(), Some(CameraState::Exposing));
        assert_eq!(
            DeviceStatus(0x8000_0003).camera_state(),
            Some(CameraState::ReadingCcd)
        );
        assert_eq!(DeviceStatus::UNKNOWN.camera_state(), None);
    }

    #[test]
    fn test_observed_exposure_sequence() {
        // Words recorded from a camera across one exposure.
        let idle = DeviceStatus(0x8000_0040);
        let exposing = DeviceStatus(0xe2);
        let reading = DeviceStatus(0x8000_0003);

        assert!(idle.data_ready());
        assert_eq!(idle.camera_state(), Some(CameraState::Idle));
        assert!(!exposing.data_ready());
        assert!(reading.data_ready());
    }

    #[test]
    fn test_focuser_bits() {
        let status = DeviceStatus(0x0000_0081).focuser();
        assert!(status.moving_in());
        assert!(status.at_home());
        assert!(!status.moving_out());
        assert!(status.moving());
        assert!(!DeviceStatus::UNKNOWN.focuser().moving());
        assert!(DeviceStatus(0x1000_0000).focuser().legacy());
    }

    #[test]
    fn test_filter_wheel_bits() {
        let status = DeviceStatus(0x0000_004a).filter_wheel();
        assert!(status.moving_cw());
        assert!(status.home_succeeded());
        assert!(status.right_at_home());
        assert!(!status.at_home());
        assert!(!DeviceStatus(0).filter_wheel().moving());
    }
}
