//! Debounced push-button with press-duration measurement.
//!
//! ```text
//!   RELEASED --pressed / store tick--> PRESSED_WAIT --debounce elapsed--> PRESSED
//!    ^  ^                                   |                              |
//!    |  +--debounce elapsed, line released--+                              |
//!    +----debounce elapsed-- RELEASED_WAIT <--released / store duration----+
//! ```
//!
//! Contact bounce shorter than the debounce interval never produces a
//! duration: after each accepted edge the machine ignores the line until
//! the interval has passed, and a press that is already gone by then is
//! dropped.
//!
//! The last completed press length is a status flag: zero means "no new
//! press". The consumer must call [`Button::reset_duration`] after reading
//! it, otherwise the same press is seen again on the next poll.

use core::marker::PhantomData;

use crate::fsm::{self, Fsm, StateMachine, Transition};
use crate::port::{ButtonId, ButtonPort, Clock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonState {
    /// Idle, also entered once a release has settled.
    Released,
    /// Debouncing a release.
    ReleasedWait,
    /// Held down.
    Pressed,
    /// Debouncing a press.
    PressedWait,
}

/// Button state machine bound to one hardware button of board `P`.
pub struct Button<P> {
    fsm: Fsm<ButtonState>,
    id: ButtonId,
    debounce_ms: u32,
    next_timeout: u32,
    tick_pressed: u32,
    duration: u32,
    _port: PhantomData<fn(&mut P)>,
}

impl<P: ButtonPort + Clock + 'static> Button<P> {
    pub fn new(debounce_ms: u32, id: ButtonId) -> Self {
        Self {
            fsm: Fsm::from_table(<Self as StateMachine<P>>::TRANSITIONS),
            id,
            debounce_ms,
            next_timeout: 0,
            tick_pressed: 0,
            duration: 0,
            _port: PhantomData,
        }
    }

    /// Run one dispatch step against the board.
    pub fn fire(&mut self, port: &mut P) -> bool {
        fsm::fire(self, port)
    }

    pub fn id(&self) -> ButtonId {
        self.id
    }

    pub fn state(&self) -> ButtonState {
        self.fsm.state()
    }

    /// Length of the last completed press (ms), or 0 if none is pending.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Acknowledge the last press.
    pub fn reset_duration(&mut self) {
        self.duration = 0;
    }

    pub fn debounce_ms(&self) -> u32 {
        self.debounce_ms
    }

    /// `true` while a press or a debounce is in progress.
    pub fn check_activity(&self) -> bool {
        self.fsm.state() != ButtonState::Released
    }

    fn check_pressed(&self, port: &mut P) -> bool {
        port.is_pressed(self.id)
    }

    fn check_released(&self, port: &mut P) -> bool {
        !port.is_pressed(self.id)
    }

    fn check_timeout(&self, port: &mut P) -> bool {
        deadline_passed(port.now_ms(), self.next_timeout)
    }

    fn check_glitch(&self, port: &mut P) -> bool {
        self.check_timeout(port) && !port.is_pressed(self.id)
    }

    fn do_store_tick_pressed(&mut self, port: &mut P) {
        let now = port.now_ms();
        self.tick_pressed = now;
        self.next_timeout = now.wrapping_add(self.debounce_ms);
    }

    fn do_set_duration(&mut self, port: &mut P) {
        let now = port.now_ms();
        self.duration = now.wrapping_sub(self.tick_pressed);
        self.next_timeout = now.wrapping_add(self.debounce_ms);
    }
}

/// `now` is strictly after `deadline`, tolerating counter wrap-around.
fn deadline_passed(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) > 0
}

impl<P: ButtonPort + Clock + 'static> StateMachine<P> for Button<P> {
    type State = ButtonState;

    const TRANSITIONS: &'static [Transition<ButtonState, Self, P>] = &[
        Transition::with_action(
            ButtonState::Released,
            Self::check_pressed,
            ButtonState::PressedWait,
            Self::do_store_tick_pressed,
        ),
        Transition::new(
            ButtonState::PressedWait,
            Self::check_glitch,
            ButtonState::Released,
        ),
        Transition::new(
            ButtonState::PressedWait,
            Self::check_timeout,
            ButtonState::Pressed,
        ),
        Transition::with_action(
            ButtonState::Pressed,
            Self::check_released,
            ButtonState::ReleasedWait,
            Self::do_set_duration,
        ),
        Transition::new(
            ButtonState::ReleasedWait,
            Self::check_timeout,
            ButtonState::Released,
        ),
    ];

    fn fsm(&self) -> &Fsm<ButtonState> {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm<ButtonState> {
        &mut self.fsm
    }
}
