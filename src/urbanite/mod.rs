//! Parking-assistance orchestrator.
//!
//! Reads completed button presses to switch power, direction and pause,
//! forwards the active direction's distance to its display and to the
//! shared buzzer, and decides when the board may drop into low power.
//!
//! ```text
//!            on/off                       change
//!   OFF ---------------> MEASURE_FRONT <----------> MEASURE_REAR
//!    ^  <---------------   |   ^     on/off -> OFF      |   ^
//!    |       on/off        |   | measurement/press      |   |
//!    v                     v   |                        v   |
//!   SLEEP_WHILE_OFF      SLEEP_WHILE_ON_FRONT      SLEEP_WHILE_ON_REAR
//! ```
//!
//! Guards are evaluated in table order, so on a single completed press the
//! on/off threshold wins over pause, and pause over direction change.

use core::marker::PhantomData;

use crate::config::{UrbaniteConfig, PAUSED_ALERT_CM};
use crate::fsm::{self, Fsm, StateMachine, Transition};
use crate::port::Platform;
use crate::power_logic;
use crate::system::Devices;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UrbaniteState {
    Off,
    MeasureFront,
    MeasureRear,
    SleepWhileOff,
    SleepWhileOnFront,
    SleepWhileOnRear,
}

/// Command carried by a completed button press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Press {
    OnOff,
    Pause,
    ChangeDirection,
}

impl Press {
    /// Map a press length to a command. Zero means "no press".
    pub fn classify(duration_ms: u32, config: &UrbaniteConfig) -> Option<Self> {
        if duration_ms == 0 {
            return None;
        }
        if duration_ms >= config.on_off_press_ms {
            Some(Press::OnOff)
        } else if duration_ms >= config.pause_press_ms && duration_ms < config.change_press_ms {
            Some(Press::Pause)
        } else if duration_ms >= config.change_press_ms {
            Some(Press::ChangeDirection)
        } else {
            None
        }
    }
}

/// Top-level state machine. Its environment is the set of collaborating
/// machines plus the board they share.
pub struct Urbanite<P> {
    fsm: Fsm<UrbaniteState>,
    config: UrbaniteConfig,
    is_paused: bool,
    is_rear: bool,
    _port: PhantomData<fn(&mut P)>,
}

impl<P: Platform> Urbanite<P> {
    pub fn new(config: UrbaniteConfig) -> Self {
        Self {
            fsm: Fsm::from_table(<Self as StateMachine<Devices<P>>>::TRANSITIONS),
            config,
            is_paused: false,
            is_rear: false,
            _port: PhantomData,
        }
    }

    pub fn fire(&mut self, devices: &mut Devices<P>) -> bool {
        fsm::fire(self, devices)
    }

    pub fn state(&self) -> UrbaniteState {
        self.fsm.state()
    }

    pub fn config(&self) -> &UrbaniteConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_rear(&self) -> bool {
        self.is_rear
    }

    fn pending_press(&self, devices: &Devices<P>) -> Option<Press> {
        Press::classify(devices.button.duration(), &self.config)
    }

    fn active_measurement_ready(&self, devices: &Devices<P>) -> bool {
        if self.is_rear {
            devices.rear_ultrasound.new_measurement_ready()
        } else {
            devices.front_ultrasound.new_measurement_ready()
        }
    }

    fn check_on_off(&self, devices: &mut Devices<P>) -> bool {
        self.pending_press(devices) == Some(Press::OnOff)
    }

    fn check_pause(&self, devices: &mut Devices<P>) -> bool {
        self.pending_press(devices) == Some(Press::Pause)
    }

    fn check_change(&self, devices: &mut Devices<P>) -> bool {
        self.pending_press(devices) == Some(Press::ChangeDirection)
    }

    fn check_new_measure(&self, devices: &mut Devices<P>) -> bool {
        self.active_measurement_ready(devices)
    }

    fn check_activity(&self, devices: &mut Devices<P>) -> bool {
        devices.activity().any()
    }

    fn check_no_activity(&self, devices: &mut Devices<P>) -> bool {
        power_logic::should_sleep(&devices.activity())
    }

    fn check_wake_while_on(&self, devices: &mut Devices<P>) -> bool {
        power_logic::should_wake_while_on(
            self.active_measurement_ready(devices),
            self.pending_press(devices).is_some(),
        )
    }

    fn do_start_up(&mut self, devices: &mut Devices<P>) {
        devices.button.reset_duration();
        self.is_rear = false;
        devices.front_ultrasound.start(&mut devices.port);
        devices.front_display.set_status(false);
        devices.buzzer.set_status(false);
        info!("Urbanite: system ON");
    }

    fn do_stop(&mut self, devices: &mut Devices<P>) {
        devices.button.reset_duration();
        devices.front_ultrasound.stop(&mut devices.port);
        devices.front_display.set_status(false);
        devices.rear_ultrasound.stop(&mut devices.port);
        devices.rear_display.set_status(false);
        devices.buzzer.set_status(false);
        self.is_paused = false;
        info!("Urbanite: system OFF");
    }

    fn do_pause(&mut self, devices: &mut Devices<P>) {
        devices.button.reset_duration();
        self.is_paused = !self.is_paused;
        if self.is_rear {
            devices.rear_display.set_status(self.is_paused);
        } else {
            devices.front_display.set_status(self.is_paused);
        }
        devices.buzzer.set_status(self.is_paused);
        if self.is_paused {
            info!("Urbanite: display PAUSE");
        } else {
            info!("Urbanite: display RESUME");
        }
    }

    fn do_change_direction(&mut self, devices: &mut Devices<P>) {
        devices.button.reset_duration();
        let Devices {
            port,
            front_ultrasound,
            front_display,
            rear_ultrasound,
            rear_display,
            ..
        } = devices;
        if self.is_rear {
            rear_ultrasound.stop(port);
            rear_display.set_status(false);
            self.is_rear = false;
            front_ultrasound.start(port);
            front_display.set_status(false);
            info!("Urbanite: change FRONT");
        } else {
            front_ultrasound.stop(port);
            front_display.set_status(false);
            self.is_rear = true;
            rear_ultrasound.start(port);
            rear_display.set_status(false);
            info!("Urbanite: change REAR");
        }
    }

    fn do_distance(&mut self, devices: &mut Devices<P>) {
        let Devices {
            front_ultrasound,
            front_display,
            rear_ultrasound,
            rear_display,
            buzzer,
            ..
        } = devices;
        let (ultrasound, display, other_display) = if self.is_rear {
            (rear_ultrasound, rear_display, front_display)
        } else {
            (front_ultrasound, front_display, rear_display)
        };

        other_display.set_status(false);
        let distance = ultrasound.get_distance();

        if !self.is_paused || distance < PAUSED_ALERT_CM {
            display.set_distance(distance);
            buzzer.set_distance(distance);
            display.set_status(true);
            buzzer.set_status(true);
        } else {
            display.set_status(false);
            buzzer.set_status(false);
        }

        debug!("Urbanite: distance {} cm (rear: {})", distance, self.is_rear);
    }

    fn do_sleep(&mut self, devices: &mut Devices<P>) {
        trace!("Urbanite: low power");
        devices.port.enter_low_power_mode();
    }
}

impl<P: Platform> StateMachine<Devices<P>> for Urbanite<P> {
    type State = UrbaniteState;

    const TRANSITIONS: &'static [Transition<UrbaniteState, Self, Devices<P>>] = {
        use UrbaniteState::*;
        &[
            Transition::with_action(Off, Self::check_on_off, MeasureFront, Self::do_start_up),
            Transition::with_action(Off, Self::check_no_activity, SleepWhileOff, Self::do_sleep),
            Transition::with_action(MeasureFront, Self::check_on_off, Off, Self::do_stop),
            Transition::with_action(MeasureFront, Self::check_pause, MeasureFront, Self::do_pause),
            Transition::with_action(MeasureFront, Self::check_new_measure, MeasureFront, Self::do_distance),
            Transition::with_action(MeasureFront, Self::check_change, MeasureRear, Self::do_change_direction),
            Transition::with_action(MeasureFront, Self::check_no_activity, SleepWhileOnFront, Self::do_sleep),
            Transition::with_action(MeasureRear, Self::check_on_off, Off, Self::do_stop),
            Transition::with_action(MeasureRear, Self::check_pause, MeasureRear, Self::do_pause),
            Transition::with_action(MeasureRear, Self::check_new_measure, MeasureRear, Self::do_distance),
            Transition::with_action(MeasureRear, Self::check_change, MeasureFront, Self::do_change_direction),
            Transition::with_action(MeasureRear, Self::check_no_activity, SleepWhileOnRear, Self::do_sleep),
            Transition::new(SleepWhileOnFront, Self::check_wake_while_on, MeasureFront),
            Transition::with_action(SleepWhileOnFront, Self::check_no_activity, SleepWhileOnFront, Self::do_sleep),
            Transition::new(SleepWhileOnRear, Self::check_wake_while_on, MeasureRear),
            Transition::with_action(SleepWhileOnRear, Self::check_no_activity, SleepWhileOnRear, Self::do_sleep),
            Transition::new(SleepWhileOff, Self::check_activity, Off),
            Transition::with_action(SleepWhileOff, Self::check_no_activity, SleepWhileOff, Self::do_sleep),
        ]
    };

    fn fsm(&self) -> &Fsm<UrbaniteState> {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm<UrbaniteState> {
        &mut self.fsm
    }
}
