//! Composition root: builds every state machine around one board and runs
//! them in a fixed order.
//!
//! One call to [`ParkingSystem::fire`] is one iteration of the control
//! loop. The orchestrator runs last, so it always sees the inputs produced
//! earlier in the same iteration and the outputs it requests are applied
//! on the next one.

use crate::config::{
    UrbaniteConfig, FRONT_PARKING_DISPLAY_ID, FRONT_PARKING_SENSOR_ID, PARKING_BUTTON_ID,
    PARKING_BUZZER_ID, REAR_PARKING_DISPLAY_ID, REAR_PARKING_SENSOR_ID,
};
use crate::error::Error;
use crate::input::{Button, Ultrasound};
use crate::output::{Buzzer, Display};
use crate::port::Platform;
use crate::power_logic::Activity;
use crate::urbanite::Urbanite;

/// The board plus every machine the orchestrator coordinates.
pub struct Devices<P> {
    pub port: P,
    pub button: Button<P>,
    pub front_ultrasound: Ultrasound<P>,
    pub front_display: Display<P>,
    pub rear_ultrasound: Ultrasound<P>,
    pub rear_display: Display<P>,
    pub buzzer: Buzzer<P>,
}

impl<P: Platform> Devices<P> {
    /// Bind one machine to each identifier from [`crate::config`].
    pub fn new(port: P, debounce_ms: u32) -> Self {
        Self {
            port,
            button: Button::new(debounce_ms, PARKING_BUTTON_ID),
            front_ultrasound: Ultrasound::new(FRONT_PARKING_SENSOR_ID),
            front_display: Display::new(FRONT_PARKING_DISPLAY_ID),
            rear_ultrasound: Ultrasound::new(REAR_PARKING_SENSOR_ID),
            rear_display: Display::new(REAR_PARKING_DISPLAY_ID),
            buzzer: Buzzer::new(PARKING_BUZZER_ID),
        }
    }

    /// Dispatch every leaf machine once. Returns `true` if any of them moved.
    pub fn fire(&mut self) -> bool {
        let mut fired = self.button.fire(&mut self.port);
        fired |= self.front_ultrasound.fire(&mut self.port);
        fired |= self.front_display.fire(&mut self.port);
        fired |= self.rear_ultrasound.fire(&mut self.port);
        fired |= self.rear_display.fire(&mut self.port);
        fired |= self.buzzer.fire(&mut self.port);
        fired
    }

    pub fn activity(&self) -> Activity {
        Activity {
            button: self.button.check_activity(),
            front_ultrasound: self.front_ultrasound.check_activity(),
            rear_ultrasound: self.rear_ultrasound.check_activity(),
            front_display: self.front_display.check_activity(),
            rear_display: self.rear_display.check_activity(),
            buzzer: self.buzzer.check_activity(),
        }
    }
}

/// Complete parking controller for board `P`.
pub struct ParkingSystem<P: Platform> {
    devices: Devices<P>,
    urbanite: Urbanite<P>,
}

impl<P: Platform> ParkingSystem<P> {
    pub fn new(port: P, config: UrbaniteConfig) -> Result<Self, Error> {
        config.validate()?;
        info!(
            "System: on/off {} ms, change {} ms, pause {} ms",
            config.on_off_press_ms, config.change_press_ms, config.pause_press_ms
        );
        Ok(Self {
            devices: Devices::new(port, config.debounce_ms),
            urbanite: Urbanite::new(config),
        })
    }

    /// One control-loop iteration. Returns `true` if any machine moved.
    pub fn fire(&mut self) -> bool {
        let leaves = self.devices.fire();
        let top = self.urbanite.fire(&mut self.devices);
        leaves || top
    }

    pub fn devices(&self) -> &Devices<P> {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut Devices<P> {
        &mut self.devices
    }

    pub fn urbanite(&self) -> &Urbanite<P> {
        &self.urbanite
    }

    pub fn port(&self) -> &P {
        &self.devices.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.devices.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Threshold;
    use crate::sim::SimBoard;
    use crate::urbanite::UrbaniteState;

    #[test]
    fn rejects_invalid_config() {
        let config = UrbaniteConfig {
            change_press_ms: 0,
            ..UrbaniteConfig::default()
        };
        let result = ParkingSystem::new(SimBoard::new(), config);
        assert_eq!(result.err(), Some(Error::InvalidThreshold(Threshold::Change)));
    }

    #[test]
    fn devices_use_configured_identifiers() {
        let devices = Devices::new(SimBoard::new(), 100);
        assert_eq!(devices.button.id(), PARKING_BUTTON_ID);
        assert_eq!(devices.front_ultrasound.id(), FRONT_PARKING_SENSOR_ID);
        assert_eq!(devices.rear_ultrasound.id(), REAR_PARKING_SENSOR_ID);
        assert_eq!(devices.front_display.id(), FRONT_PARKING_DISPLAY_ID);
        assert_eq!(devices.rear_display.id(), REAR_PARKING_DISPLAY_ID);
        assert_eq!(devices.buzzer.id(), PARKING_BUZZER_ID);
        assert_eq!(devices.button.debounce_ms(), 100);
    }

    #[test]
    fn idle_system_goes_to_sleep_while_off() {
        let mut system = ParkingSystem::new(SimBoard::new(), UrbaniteConfig::default()).unwrap();
        assert!(system.fire());
        assert_eq!(system.urbanite().state(), UrbaniteState::SleepWhileOff);
        assert_eq!(system.port().sleep_count(), 1);

        system.fire();
        assert_eq!(system.port().sleep_count(), 2);
    }

    #[test]
    fn leaf_activity_is_aggregated() {
        let mut devices = Devices::new(SimBoard::new(), 100);
        assert!(!devices.activity().any());

        devices.rear_display.set_status(true);
        assert!(devices.activity().rear_display);
        devices.fire();
        devices.rear_display.set_distance(30);
        devices.fire();
        assert!(!devices.activity().any());
    }
}
