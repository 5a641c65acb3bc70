//! Software board implementing every port trait.
//!
//! Time only moves through [`SimBoard::advance_ms`]. While it moves, the
//! board behaves like the real peripherals: armed re-trigger windows raise
//! the trigger-ready flag every [`RETRIGGER_PERIOD_MS`], a raised trigger
//! pulse elapses within the next millisecond, and a sensor pointed at an
//! obstacle answers a finished trigger with both echo edges. Tests that
//! need exact control can poke each flag directly instead.
//!
//! Outputs are recorded per identifier together with a short history of the
//! most recent writes.

use heapless::HistoryBuffer;

use crate::config::{ECHO_TIMER_WRAP, RETRIGGER_PERIOD_MS};
use crate::port::{
    ButtonId, ButtonPort, BuzzerId, BuzzerPort, Clock, DisplayId, DisplayPort, EchoTicks,
    PowerPort, Rgb, UltrasoundId, UltrasoundPort,
};

/// Identifiers per device class the board accepts.
pub const CHANNELS: usize = 4;

/// Output writes kept in [`SimBoard::outputs`].
pub const OUTPUT_HISTORY: usize = 16;

/// One recorded output write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Output {
    Display(DisplayId, Rgb),
    Buzzer(BuzzerId, u8),
}

#[derive(Clone, Copy, Debug, Default)]
struct SimUltrasound {
    trigger_ready: bool,
    trigger_high: bool,
    pulse_elapsed: bool,
    echo_timer_running: bool,
    retrigger_armed: bool,
    next_window_ms: u32,
    rising: bool,
    falling: bool,
    ticks: EchoTicks,
    obstacle_cm: Option<u32>,
    triggers: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct SimDisplay {
    color: Option<Rgb>,
    renders: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct SimBuzzer {
    level: Option<u8>,
}

pub struct SimBoard {
    now_ms: u32,
    buttons: [bool; CHANNELS],
    ultrasounds: [SimUltrasound; CHANNELS],
    displays: [SimDisplay; CHANNELS],
    buzzers: [SimBuzzer; CHANNELS],
    sleeps: u32,
    outputs: HistoryBuffer<Output, OUTPUT_HISTORY>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Board whose clock starts at `now_ms`, for wrap-around scenarios.
    pub fn starting_at(now_ms: u32) -> Self {
        Self {
            now_ms,
            buttons: [false; CHANNELS],
            ultrasounds: [SimUltrasound::default(); CHANNELS],
            displays: [SimDisplay::default(); CHANNELS],
            buzzers: [SimBuzzer::default(); CHANNELS],
            sleeps: 0,
            outputs: HistoryBuffer::new(),
        }
    }

    /// Echo timing for an obstacle `distance_cm` away, starting at
    /// counter value 0.
    pub fn echo_ticks_for(distance_cm: u32) -> EchoTicks {
        Self::echo_ticks_from(0, distance_cm)
    }

    fn echo_ticks_from(start: u32, distance_cm: u32) -> EchoTicks {
        // Round up so converting back truncates to `distance_cm`.
        let width = (u64::from(distance_cm) * 20_000).div_ceil(343);
        let end = u64::from(start) + width;
        let wrap = u64::from(ECHO_TIMER_WRAP);
        EchoTicks {
            overflows: (end / wrap) as u32,
            start,
            end: (end % wrap) as u32,
        }
    }

    /// Move time forward one millisecond at a time.
    pub fn advance_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.now_ms = self.now_ms.wrapping_add(1);
            let now = self.now_ms;
            for sensor in self.ultrasounds.iter_mut() {
                if sensor.retrigger_armed && now == sensor.next_window_ms {
                    sensor.trigger_ready = true;
                    sensor.next_window_ms = now.wrapping_add(RETRIGGER_PERIOD_MS);
                }
                if sensor.trigger_high {
                    sensor.pulse_elapsed = true;
                } else if sensor.echo_timer_running && !sensor.rising {
                    if let Some(distance) = sensor.obstacle_cm {
                        let start = (now.wrapping_mul(1_000)) % ECHO_TIMER_WRAP;
                        sensor.ticks = Self::echo_ticks_from(start, distance);
                        sensor.rising = true;
                        sensor.falling = true;
                    }
                }
            }
        }
    }

    pub fn press(&mut self, id: ButtonId) {
        if let Some(level) = self.buttons.get_mut(usize::from(id.0)) {
            *level = true;
        }
    }

    pub fn release(&mut self, id: ButtonId) {
        if let Some(level) = self.buttons.get_mut(usize::from(id.0)) {
            *level = false;
        }
    }

    /// Place an obstacle in front of a sensor, or remove it so echoes
    /// never come back.
    pub fn set_obstacle(&mut self, id: UltrasoundId, distance_cm: Option<u32>) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.obstacle_cm = distance_cm;
        }
    }

    pub fn raise_trigger_ready(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.trigger_ready = true;
        }
    }

    pub fn complete_trigger_pulse(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.pulse_elapsed = true;
        }
    }

    pub fn capture_rising(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.rising = true;
        }
    }

    /// Deliver both echo edges with the given timing.
    pub fn capture_echo(&mut self, id: UltrasoundId, ticks: EchoTicks) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.ticks = ticks;
            sensor.rising = true;
            sensor.falling = true;
        }
    }

    pub fn trigger_high(&self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.trigger_high)
    }

    pub fn retrigger_armed(&self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.retrigger_armed)
    }

    pub fn echo_timer_running(&self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.echo_timer_running)
    }

    /// Trigger pulses started since power-up.
    pub fn trigger_count(&self, id: UltrasoundId) -> u32 {
        self.sensor(id).map_or(0, |s| s.triggers)
    }

    /// Last colour rendered, `None` if never written.
    pub fn display(&self, id: DisplayId) -> Option<Rgb> {
        self.displays.get(usize::from(id.0)).and_then(|d| d.color)
    }

    pub fn render_count(&self, id: DisplayId) -> u32 {
        self.displays.get(usize::from(id.0)).map_or(0, |d| d.renders)
    }

    /// Last buzzer level, `None` if never written.
    pub fn buzzer(&self, id: BuzzerId) -> Option<u8> {
        self.buzzers.get(usize::from(id.0)).and_then(|b| b.level)
    }

    /// Low-power requests received.
    pub fn sleep_count(&self) -> u32 {
        self.sleeps
    }

    /// Most recent output writes, oldest first.
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.oldest_ordered()
    }

    fn sensor(&self, id: UltrasoundId) -> Option<&SimUltrasound> {
        self.ultrasounds.get(usize::from(id.0))
    }

    fn sensor_mut(&mut self, id: UltrasoundId) -> Option<&mut SimUltrasound> {
        self.ultrasounds.get_mut(usize::from(id.0))
    }

    fn clear_echo(sensor: &mut SimUltrasound) {
        sensor.rising = false;
        sensor.falling = false;
        sensor.ticks = EchoTicks::default();
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimBoard {
    fn now_ms(&mut self) -> u32 {
        self.now_ms
    }
}

impl ButtonPort for SimBoard {
    fn is_pressed(&mut self, id: ButtonId) -> bool {
        self.buttons.get(usize::from(id.0)).copied().unwrap_or(false)
    }
}

impl UltrasoundPort for SimBoard {
    fn trigger_ready(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.trigger_ready)
    }

    fn mark_trigger_ready(&mut self, id: UltrasoundId) {
        self.raise_trigger_ready(id);
    }

    fn start_trigger(&mut self, id: UltrasoundId) {
        let now = self.now_ms;
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.trigger_ready = false;
            sensor.trigger_high = true;
            sensor.pulse_elapsed = false;
            sensor.echo_timer_running = true;
            sensor.triggers += 1;
            if sensor.retrigger_armed {
                sensor.next_window_ms = now.wrapping_add(RETRIGGER_PERIOD_MS);
            }
        }
    }

    fn trigger_pulse_elapsed(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.pulse_elapsed)
    }

    fn stop_trigger(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.trigger_high = false;
            sensor.pulse_elapsed = false;
        }
    }

    fn echo_rising_captured(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.rising)
    }

    fn echo_falling_captured(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| s.falling)
    }

    fn echo_ticks(&mut self, id: UltrasoundId) -> EchoTicks {
        self.sensor(id).map(|s| s.ticks).unwrap_or_default()
    }

    fn reset_echo_state(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            Self::clear_echo(sensor);
        }
    }

    fn stop_echo_timer(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.echo_timer_running = false;
        }
    }

    fn arm_periodic_retrigger(&mut self, id: UltrasoundId) {
        let now = self.now_ms;
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.retrigger_armed = true;
            sensor.next_window_ms = now.wrapping_add(RETRIGGER_PERIOD_MS);
        }
    }

    fn stop_all_timers(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor_mut(id) {
            sensor.trigger_high = false;
            sensor.pulse_elapsed = false;
            sensor.echo_timer_running = false;
            sensor.retrigger_armed = false;
            Self::clear_echo(sensor);
        }
    }
}

impl DisplayPort for SimBoard {
    fn render(&mut self, id: DisplayId, color: Rgb) {
        if let Some(display) = self.displays.get_mut(usize::from(id.0)) {
            display.color = Some(color);
            display.renders += 1;
            self.outputs.write(Output::Display(id, color));
        }
    }
}

impl BuzzerPort for SimBoard {
    fn sound(&mut self, id: BuzzerId, level: u8) {
        if let Some(buzzer) = self.buzzers.get_mut(usize::from(id.0)) {
            buzzer.level = Some(level);
            self.outputs.write(Output::Buzzer(id, level));
        }
    }
}

impl PowerPort for SimBoard {
    fn enter_low_power_mode(&mut self) {
        self.sleeps += 1;
    }
}
