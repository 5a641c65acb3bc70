//! Low-power decisions, kept free of hardware so they can be unit tested.

/// Activity reported by each collaborator during one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Activity {
    pub button: bool,
    pub front_ultrasound: bool,
    pub rear_ultrasound: bool,
    pub front_display: bool,
    pub rear_display: bool,
    pub buzzer: bool,
}

impl Activity {
    /// System-wide activity: any collaborator still busy.
    pub fn any(&self) -> bool {
        self.button
            || self.front_ultrasound
            || self.rear_ultrasound
            || self.front_display
            || self.rear_display
            || self.buzzer
    }
}

/// The controller may request low power once nothing is busy.
pub fn should_sleep(activity: &Activity) -> bool {
    !activity.any()
}

/// Leave a sleep-while-on state when the owned sensor has a fresh distance
/// or a completed press maps to a command.
pub fn should_wake_while_on(new_measurement: bool, actionable_press: bool) -> bool {
    new_measurement || actionable_press
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_system_sleeps() {
        assert!(should_sleep(&Activity::default()));
    }

    #[test]
    fn any_busy_collaborator_keeps_system_awake() {
        let busy = [
            Activity { button: true, ..Default::default() },
            Activity { front_ultrasound: true, ..Default::default() },
            Activity { rear_ultrasound: true, ..Default::default() },
            Activity { front_display: true, ..Default::default() },
            Activity { rear_display: true, ..Default::default() },
            Activity { buzzer: true, ..Default::default() },
        ];
        for activity in busy {
            assert!(activity.any());
            assert!(!should_sleep(&activity));
        }
    }

    #[test]
    fn wake_on_measurement_or_press() {
        assert!(!should_wake_while_on(false, false));
        assert!(should_wake_while_on(true, false));
        assert!(should_wake_while_on(false, true));
    }
}
