//! RGB distance indicator.
//!
//! The indicator knows nothing about where distances come from. The
//! orchestrator writes a distance and toggles the active flag; the state
//! machine turns that into a colour on the next dispatch.
//!
//! Colour bands (cm):
//!
//! ```text
//!   [0, 5]     red
//!   (5, 25]    red       -> yellow
//!   (25, 50]   yellow    -> green
//!   (50, 150]  green     -> turquoise
//!   (150, 175] turquoise -> blue
//!   (175, 200] blue      -> off
//!   otherwise  off
//! ```

use core::marker::PhantomData;

use crate::config::{
    COLOR_BLUE, COLOR_GREEN, COLOR_OFF, COLOR_RED, COLOR_TURQUOISE, COLOR_YELLOW, DANGER_MIN_CM,
    HIGH_DANGER_MIN_CM, INFO_MIN_CM, NO_PROBLEM_MIN_CM, OK_MAX_CM, OK_MIN_CM, WARNING_MIN_CM,
};
use crate::fsm::{self, Fsm, StateMachine, Transition};
use crate::port::{DisplayId, DisplayPort, Rgb};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayState {
    /// Inactive, LED dark.
    Wait,
    /// Active, showing the last distance.
    Set,
}

/// Interpolate each channel between `low` (at `d_low`) and `high` (at `d_high`).
fn blend(low: Rgb, high: Rgb, d_low: i32, d_high: i32, distance_cm: i32) -> Rgb {
    let span = d_high - d_low;
    let channel = |a: u8, b: u8| -> u8 {
        let value = i32::from(a) * (d_high - distance_cm) / span + i32::from(b) * (distance_cm - d_low) / span;
        value.clamp(0, i32::from(u8::MAX)) as u8
    };
    Rgb::new(
        channel(low.r, high.r),
        channel(low.g, high.g),
        channel(low.b, high.b),
    )
}

/// Colour shown for a distance. Negative distances mean "no reading".
pub fn color_for_distance(distance_cm: i32) -> Rgb {
    match distance_cm {
        d if (HIGH_DANGER_MIN_CM..=DANGER_MIN_CM).contains(&d) => COLOR_RED,
        d if d > DANGER_MIN_CM && d <= WARNING_MIN_CM => {
            blend(COLOR_RED, COLOR_YELLOW, DANGER_MIN_CM, WARNING_MIN_CM, d)
        }
        d if d > WARNING_MIN_CM && d <= NO_PROBLEM_MIN_CM => {
            blend(COLOR_YELLOW, COLOR_GREEN, WARNING_MIN_CM, NO_PROBLEM_MIN_CM, d)
        }
        d if d > NO_PROBLEM_MIN_CM && d <= INFO_MIN_CM => {
            blend(COLOR_GREEN, COLOR_TURQUOISE, NO_PROBLEM_MIN_CM, INFO_MIN_CM, d)
        }
        d if d > INFO_MIN_CM && d <= OK_MIN_CM => {
            blend(COLOR_TURQUOISE, COLOR_BLUE, INFO_MIN_CM, OK_MIN_CM, d)
        }
        d if d > OK_MIN_CM && d <= OK_MAX_CM => blend(COLOR_BLUE, COLOR_OFF, OK_MIN_CM, OK_MAX_CM, d),
        _ => COLOR_OFF,
    }
}

/// Display state machine bound to one RGB indicator of board `P`.
pub struct Display<P> {
    fsm: Fsm<DisplayState>,
    id: DisplayId,
    distance_cm: i32,
    new_color: bool,
    status: bool,
    idle: bool,
    _port: PhantomData<fn(&mut P)>,
}

impl<P: DisplayPort + 'static> Display<P> {
    pub fn new(id: DisplayId) -> Self {
        Self {
            fsm: Fsm::from_table(<Self as StateMachine<P>>::TRANSITIONS),
            id,
            distance_cm: -1,
            new_color: false,
            status: false,
            idle: false,
            _port: PhantomData,
        }
    }

    pub fn fire(&mut self, port: &mut P) -> bool {
        fsm::fire(self, port)
    }

    pub fn id(&self) -> DisplayId {
        self.id
    }

    pub fn state(&self) -> DisplayState {
        self.fsm.state()
    }

    /// Queue a distance to be shown on the next dispatch.
    pub fn set_distance(&mut self, distance_cm: u32) {
        self.distance_cm = i32::try_from(distance_cm).unwrap_or(i32::MAX);
        self.new_color = true;
    }

    /// Last distance written, `-1` before the first one.
    pub fn distance(&self) -> i32 {
        self.distance_cm
    }

    pub fn status(&self) -> bool {
        self.status
    }

    pub fn set_status(&mut self, status: bool) {
        self.status = status;
    }

    /// `true` while active and a colour change has not settled yet.
    pub fn check_activity(&self) -> bool {
        self.status && !self.idle
    }

    fn check_active(&self, _port: &mut P) -> bool {
        self.status
    }

    fn check_set_new_color(&self, _port: &mut P) -> bool {
        self.new_color
    }

    fn check_off(&self, _port: &mut P) -> bool {
        !self.status
    }

    fn do_set_on(&mut self, port: &mut P) {
        port.render(self.id, COLOR_OFF);
    }

    fn do_set_color(&mut self, port: &mut P) {
        port.render(self.id, color_for_distance(self.distance_cm));
        self.new_color = false;
        self.idle = true;
    }

    fn do_set_off(&mut self, port: &mut P) {
        port.render(self.id, COLOR_OFF);
        self.idle = false;
    }
}

impl<P: DisplayPort + 'static> StateMachine<P> for Display<P> {
    type State = DisplayState;

    const TRANSITIONS: &'static [Transition<DisplayState, Self, P>] = &[
        Transition::with_action(DisplayState::Wait, Self::check_active, DisplayState::Set, Self::do_set_on),
        Transition::with_action(DisplayState::Set, Self::check_set_new_color, DisplayState::Set, Self::do_set_color),
        Transition::with_action(DisplayState::Set, Self::check_off, DisplayState::Wait, Self::do_set_off),
    ];

    fn fsm(&self) -> &Fsm<DisplayState> {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm<DisplayState> {
        &mut self.fsm
    }
}
