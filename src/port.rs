//! Hardware capability surface.
//!
//! The state machines never touch registers. Everything they need from the
//! board is expressed here as small traits keyed by opaque identifiers.
//! Identifier allocation and validation belong to the board implementation.

/// Opaque handle for a push-button.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonId(pub u8);

/// Opaque handle for an ultrasonic transceiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UltrasoundId(pub u8);

/// Opaque handle for an RGB indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayId(pub u8);

/// Opaque handle for a buzzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BuzzerId(pub u8);

/// 8-bit-per-channel colour sent to an RGB indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Echo pulse timing captured by the input-capture timer.
///
/// `start` and `end` are counter values; `overflows` counts how many times
/// the counter wrapped between them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EchoTicks {
    pub overflows: u32,
    pub start: u32,
    pub end: u32,
}

impl EchoTicks {
    /// Echo pulse width in timer ticks for a counter wrapping at `wrap`.
    pub const fn elapsed(&self, wrap: u32) -> u32 {
        self.overflows
            .wrapping_mul(wrap)
            .wrapping_add(self.end)
            .wrapping_sub(self.start)
    }
}

/// Monotonic millisecond time source.
pub trait Clock {
    fn now_ms(&mut self) -> u32;
}

/// Raw (undebounced) button level.
pub trait ButtonPort {
    fn is_pressed(&mut self, id: ButtonId) -> bool;
}

/// Trigger/echo timing hardware of one ultrasonic transceiver.
///
/// Flags are raised asynchronously by the board (interrupts, timers); the
/// state machine only polls and acknowledges them.
pub trait UltrasoundPort {
    /// The periodic re-trigger window has elapsed.
    fn trigger_ready(&mut self, id: UltrasoundId) -> bool;
    /// Force the trigger-ready flag, used when a measurement run starts.
    fn mark_trigger_ready(&mut self, id: UltrasoundId);
    /// Raise the trigger line, start the pulse timer and the echo timer.
    /// Clears the trigger-ready flag.
    fn start_trigger(&mut self, id: UltrasoundId);
    /// The trigger pulse has lasted long enough.
    fn trigger_pulse_elapsed(&mut self, id: UltrasoundId) -> bool;
    /// Lower the trigger line, stop the pulse timer, clear the elapsed flag.
    fn stop_trigger(&mut self, id: UltrasoundId);
    /// Rising edge of the echo line has been captured.
    fn echo_rising_captured(&mut self, id: UltrasoundId) -> bool;
    /// Falling edge of the echo line has been captured.
    fn echo_falling_captured(&mut self, id: UltrasoundId) -> bool;
    /// Captured edge ticks. Only meaningful once both edges are captured.
    fn echo_ticks(&mut self, id: UltrasoundId) -> EchoTicks;
    /// Forget captured edges and overflow count.
    fn reset_echo_state(&mut self, id: UltrasoundId);
    /// Stop the echo input-capture timer.
    fn stop_echo_timer(&mut self, id: UltrasoundId);
    /// Start the periodic re-trigger timer.
    fn arm_periodic_retrigger(&mut self, id: UltrasoundId);
    /// Stop trigger, echo and re-trigger timers and clear echo state.
    fn stop_all_timers(&mut self, id: UltrasoundId);
}

/// RGB indicator output.
pub trait DisplayPort {
    fn render(&mut self, id: DisplayId, color: Rgb);
}

/// Buzzer output.
pub trait BuzzerPort {
    fn sound(&mut self, id: BuzzerId, level: u8);
}

/// Low-power entry.
pub trait PowerPort {
    /// Enter the lowest power mode that still wakes on the next timer or
    /// external interrupt.
    fn enter_low_power_mode(&mut self);
}

/// Every capability the parking controller needs from one board.
pub trait Platform:
    Clock + ButtonPort + UltrasoundPort + DisplayPort + BuzzerPort + PowerPort + 'static
{
}

impl<T> Platform for T where
    T: Clock + ButtonPort + UltrasoundPort + DisplayPort + BuzzerPort + PowerPort + 'static
{
}
