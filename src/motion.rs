//! Filter wheel and focuser operations on an open [`Device`].

use tracing::debug;

use crate::session::Device;
use crate::status::{FilterWheelStatus, FocuserStatus};
use crate::traits::{DeviceSdk, Result};

impl<S: DeviceSdk + ?Sized> Device<'_, S> {
    /// Move the filter wheel to a slot.
    pub fn set_filter_pos(&mut self, slot: i32) -> Result<()> {
        debug!(slot, "moving filter wheel");
        self.sdk().set_filter_pos(self.handle()?, slot)
    }

    /// Current filter slot.
    pub fn filter_pos(&self) -> Result<i32> {
        self.sdk().filter_pos(self.handle()?)
    }

    /// Number of filter slots.
    pub fn filter_count(&self) -> Result<i32> {
        self.sdk().filter_count(self.handle()?)
    }

    /// Name of the filter in a slot.
    pub fn filter_name(&self, slot: i32) -> Result<String> {
        self.sdk().filter_name(self.handle()?, slot)
    }

    /// Names of every slot, in order.
    pub fn filter_names(&self) -> Result<Vec<String>> {
        (0..self.filter_count()?)
            .map(|slot| self.filter_name(slot))
            .collect()
    }

    /// Select the active wheel on dual-wheel units.
    pub fn set_active_wheel(&mut self, wheel: i32) -> Result<()> {
        self.sdk().set_active_wheel(self.handle()?, wheel)
    }

    /// Active wheel on dual-wheel units.
    pub fn active_wheel(&self) -> Result<i32> {
        self.sdk().active_wheel(self.handle()?)
    }

    /// Filter wheel view of the status word.
    pub fn filter_wheel_status(&self) -> Result<FilterWheelStatus> {
        Ok(self.device_status()?.filter_wheel())
    }

    /// Step the motor and wait for the move to finish.
    pub fn step_motor(&mut self, steps: i32) -> Result<()> {
        self.sdk().step_motor(self.handle()?, steps)
    }

    /// Step the motor and return immediately.
    pub fn step_motor_async(&mut self, steps: i32) -> Result<()> {
        self.sdk().step_motor_async(self.handle()?, steps)
    }

    /// Start a move to an absolute position.
    pub fn move_to(&mut self, position: i32) -> Result<()> {
        let current = self.stepper_position()?;
        let steps = position.saturating_sub(current);
        debug!(current, position, steps, "moving focuser");
        self.step_motor_async(steps)
    }

    /// Absolute stepper position.
    pub fn stepper_position(&self) -> Result<i32> {
        self.sdk().stepper_position(self.handle()?)
    }

    /// Steps left in the current move.
    pub fn steps_remaining(&self) -> Result<i32> {
        self.sdk().steps_remaining(self.handle()?)
    }

    /// Whether a move is still in progress.
    pub fn is_moving(&self) -> Result<bool> {
        Ok(self.steps_remaining()? != 0)
    }

    /// Home the focuser.
    pub fn home_focuser(&mut self) -> Result<()> {
        self.sdk().home_focuser(self.handle()?)
    }

    /// Home any motorized device.
    pub fn home_device(&mut self) -> Result<()> {
        self.sdk().home_device(self.handle()?)
    }

    /// Maximum focuser position.
    pub fn focuser_extent(&self) -> Result<i32> {
        self.sdk().focuser_extent(self.handle()?)
    }

    /// Focuser view of the status word.
    pub fn focuser_status(&self) -> Result<FocuserStatus> {
        Ok(self.device_status()?.focuser())
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::MockSdk;
    use crate::session::Device;
    use crate::traits::{CameraError, DeviceClass, Transport};

    #[test]
    fn test_filter_wheel_positions() {
        let sdk = MockSdk::new().with_filters(["L", "R", "G", "B"]);
        let mut wheel = Device::open(&sdk, "usb:0", Transport::Usb | DeviceClass::FilterWheel)
            .expect("open should succeed");

        assert_eq!(wheel.filter_count().expect("count"), 4);
        wheel.set_filter_pos(2).expect("move should succeed");
        assert_eq!(wheel.filter_pos().expect("position"), 2);
        assert_eq!(
            wheel.filter_names().expect("names"),
            vec!["L".to_owned(), "R".to_owned(), "G".to_owned(), "B".to_owned()]
        );
    }

    #[test]
    fn test_filter_slot_out_of_range() {
        let sdk = MockSdk::new().with_filters(["L", "R"]);
        let mut wheel = Device::open(&sdk, "usb:0", Transport::Usb | DeviceClass::FilterWheel)
            .expect("open should succeed");
        let err = wheel.set_filter_pos(5).expect_err("slot 5 does not exist");
        assert!(matches!(err, CameraError::Status { .. }));
    }

    #[test]
    fn test_focuser_absolute_move() {
        let sdk = MockSdk::new().with_focuser_extent(50_000);
        let mut focuser = Device::open(&sdk, "usb:0", Transport::Usb | DeviceClass::Focuser)
            .expect("open should succeed");

        focuser.step_motor(1_000).expect("step should succeed");
        assert_eq!(focuser.stepper_position().expect("position"), 1_000);

        focuser.move_to(400).expect("move should succeed");
        assert!(focuser.is_moving().expect("moving"));
        assert!(focuser.focuser_status().expect("status").moving_in());

        sdk.settle_motion();
        assert!(!focuser.is_moving().expect("moving"));
        assert_eq!(focuser.stepper_position().expect("position"), 400);
    }

    #[test]
    fn test_focuser_home() {
        let sdk = MockSdk::new().with_focuser_extent(50_000);
        let mut focuser = Device::open(&sdk, "usb:0", Transport::Usb | DeviceClass::Focuser)
            .expect("open should succeed");
        focuser.step_motor(2_500).expect("step should succeed");
        focuser.home_focuser().expect("home should succeed");
        assert_eq!(focuser.stepper_position().expect("position"), 0);
        assert!(focuser.focuser_status().expect("status").at_home());
        assert_eq!(focuser.focuser_extent().expect("extent"), 50_000);
    }
}
