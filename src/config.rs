//! Application-wide constants and runtime configuration.
//!
//! Timing parameters, identifiers and the colour/tone policy thresholds
//! live here so they can be tuned in one place.

use crate::error::{Error, Threshold};
use crate::port::{ButtonId, BuzzerId, DisplayId, Rgb, UltrasoundId};

// Identifiers (opaque to the state machines, interpreted by the board)

pub const PARKING_BUTTON_ID: ButtonId = ButtonId(0);
pub const REAR_PARKING_SENSOR_ID: UltrasoundId = UltrasoundId(0);
pub const FRONT_PARKING_SENSOR_ID: UltrasoundId = UltrasoundId(1);
pub const REAR_PARKING_DISPLAY_ID: DisplayId = DisplayId(0);
pub const FRONT_PARKING_DISPLAY_ID: DisplayId = DisplayId(1);
pub const PARKING_BUZZER_ID: BuzzerId = BuzzerId(0);

// Button

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u32 = 100;

/// Press length that toggles the system on/off (ms).
pub const ON_OFF_PRESS_MS: u32 = 3000;

/// Press length that switches between front and rear (ms).
pub const CHANGE_PRESS_MS: u32 = 1000;

/// Press length that pauses/resumes the outputs (ms).
pub const PAUSE_PRESS_MS: u32 = 500;

// Ultrasound

/// Raw samples per median window. Must be odd.
pub const ULTRASOUND_SAMPLES: usize = 5;

/// Echo input-capture counter wraps after this many ticks (16-bit timer).
pub const ECHO_TIMER_WRAP: u32 = 65_536;

/// Echo timer tick period (µs).
pub const ECHO_TICK_US: u32 = 1;

/// Speed of sound (m/s).
pub const SPEED_OF_SOUND_MS: u32 = 343;

/// Converts `ticks * SPEED_OF_SOUND_MS` into centimetres:
/// 1 µs ticks, m/s → cm/µs, round trip halved.
pub const DISTANCE_SCALE: u32 = 20_000;

/// Trigger pulse width (µs).
pub const TRIGGER_PULSE_US: u32 = 10;

/// Period of the re-trigger timer, which is also the echo timeout (ms).
pub const RETRIGGER_PERIOD_MS: u32 = 100;

// Display bands (cm)

pub const HIGH_DANGER_MIN_CM: i32 = 0;
pub const DANGER_MIN_CM: i32 = 5;
pub const WARNING_MIN_CM: i32 = 25;
pub const NO_PROBLEM_MIN_CM: i32 = 50;
pub const INFO_MIN_CM: i32 = 150;
pub const OK_MIN_CM: i32 = 175;
pub const OK_MAX_CM: i32 = 200;

/// While paused, only distances below this are still signalled (cm).
pub const PAUSED_ALERT_CM: u32 = (WARNING_MIN_CM / 2) as u32;

// Display colours

pub const RGB_MAX_VALUE: u8 = 255;

pub const COLOR_OFF: Rgb = Rgb::new(0, 0, 0);
pub const COLOR_RED: Rgb = Rgb::new(RGB_MAX_VALUE, 0, 0);
pub const COLOR_GREEN: Rgb = Rgb::new(0, RGB_MAX_VALUE, 0);
pub const COLOR_BLUE: Rgb = Rgb::new(0, 0, RGB_MAX_VALUE);
pub const COLOR_YELLOW: Rgb = Rgb::new(percent(37), percent(37), 0);
pub const COLOR_TURQUOISE: Rgb = Rgb::new(percent(10), percent(35), percent(32));

const fn percent(p: u32) -> u8 {
    (RGB_MAX_VALUE as u32 * p / 100) as u8
}

// Buzzer

pub const BUZZER_MAX_VALUE: u8 = 255;
pub const BUZZER_MIN_VALUE: u8 = 0;

/// Runtime tunables for the orchestrator and the button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UrbaniteConfig {
    /// Press at least this long to power on/off (ms).
    pub on_off_press_ms: u32,
    /// Press at least this long (and shorter than on/off) to switch direction (ms).
    pub change_press_ms: u32,
    /// Press at least this long (and shorter than change) to pause (ms).
    pub pause_press_ms: u32,
    /// Button debounce interval (ms).
    pub debounce_ms: u32,
}

impl UrbaniteConfig {
    /// Reject values that would make every press match a classification.
    ///
    /// Thresholds are not required to be ordered.
    pub fn validate(&self) -> Result<(), Error> {
        if self.on_off_press_ms == 0 {
            return Err(Error::InvalidThreshold(Threshold::OnOff));
        }
        if self.change_press_ms == 0 {
            return Err(Error::InvalidThreshold(Threshold::Change));
        }
        if self.pause_press_ms == 0 {
            return Err(Error::InvalidThreshold(Threshold::Pause));
        }
        if self.debounce_ms == 0 {
            return Err(Error::InvalidDebounce);
        }
        Ok(())
    }
}

impl Default for UrbaniteConfig {
    fn default() -> Self {
        Self {
            on_off_press_ms: ON_OFF_PRESS_MS,
            change_press_ms: CHANGE_PRESS_MS,
            pause_press_ms: PAUSE_PRESS_MS,
            debounce_ms: BUTTON_DEBOUNCE_MS,
        }
    }
}
