//! Proximity buzzer.
//!
//! Same shape as the RGB indicator: the orchestrator writes a distance and
//! an active flag, the machine turns the distance into a tone intensity.
//! Closer obstacles sound louder; beyond [`OK_MAX_CM`] the buzzer is silent.

use core::marker::PhantomData;

use crate::config::{BUZZER_MAX_VALUE, BUZZER_MIN_VALUE, HIGH_DANGER_MIN_CM, OK_MAX_CM};
use crate::fsm::{self, Fsm, StateMachine, Transition};
use crate::port::{BuzzerId, BuzzerPort};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuzzerState {
    Wait,
    Set,
}

/// Intensity for a distance: linear from max at 0 cm to min at 200 cm.
pub fn level_for_distance(distance_cm: i32) -> u8 {
    if (HIGH_DANGER_MIN_CM..=OK_MAX_CM).contains(&distance_cm) {
        let level = i32::from(BUZZER_MAX_VALUE) * (OK_MAX_CM - distance_cm) / OK_MAX_CM;
        level.clamp(i32::from(BUZZER_MIN_VALUE), i32::from(BUZZER_MAX_VALUE)) as u8
    } else {
        BUZZER_MIN_VALUE
    }
}

/// Buzzer state machine bound to one buzzer of board `P`.
pub struct Buzzer<P> {
    fsm: Fsm<BuzzerState>,
    id: BuzzerId,
    distance_cm: i32,
    new_sound: bool,
    status: bool,
    idle: bool,
    _port: PhantomData<fn(&mut P)>,
}

impl<P: BuzzerPort + 'static> Buzzer<P> {
    pub fn new(id: BuzzerId) -> Self {
        Self {
            fsm: Fsm::from_table(<Self as StateMachine<P>>::TRANSITIONS),
            id,
            distance_cm: -1,
            new_sound: false,
            status: false,
            idle: false,
            _port: PhantomData,
        }
    }

    pub fn fire(&mut self, port: &mut P) -> bool {
        fsm::fire(self, port)
    }

    pub fn id(&self) -> BuzzerId {
        self.id
    }

    pub fn state(&self) -> BuzzerState {
        self.fsm.state()
    }

    pub fn set_distance(&mut self, distance_cm: u32) {
        self.distance_cm = i32::try_from(distance_cm).unwrap_or(i32::MAX);
        self.new_sound = true;
    }

    pub fn distance(&self) -> i32 {
        self.distance_cm
    }

    pub fn status(&self) -> bool {
        self.status
    }

    pub fn set_status(&mut self, status: bool) {
        self.status = status;
    }

    pub fn check_activity(&self) -> bool {
        self.status && !self.idle
    }

    fn check_active(&self, _port: &mut P) -> bool {
        self.status
    }

    fn check_set_new_sound(&self, _port: &mut P) -> bool {
        self.new_sound
    }

    fn check_off(&self, _port: &mut P) -> bool {
        !self.status
    }

    fn do_set_on(&mut self, port: &mut P) {
        port.sound(self.id, BUZZER_MIN_VALUE);
    }

    fn do_set_sound(&mut self, port: &mut P) {
        port.sound(self.id, level_for_distance(self.distance_cm));
        self.new_sound = false;
        self.idle = true;
    }

    fn do_set_off(&mut self, port: &mut P) {
        port.sound(self.id, BUZZER_MIN_VALUE);
        self.idle = false;
    }
}

impl<P: BuzzerPort + 'static> StateMachine<P> for Buzzer<P> {
    type State = BuzzerState;

    const TRANSITIONS: &'static [Transition<BuzzerState, Self, P>] = &[
        Transition::with_action(BuzzerState::Wait, Self::check_active, BuzzerState::Set, Self::do_set_on),
        Transition::with_action(BuzzerState::Set, Self::check_set_new_sound, BuzzerState::Set, Self::do_set_sound),
        Transition::with_action(BuzzerState::Set, Self::check_off, BuzzerState::Wait, Self::do_set_off),
    ];

    fn fsm(&self) -> &Fsm<BuzzerState> {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm<BuzzerState> {
        &mut self.fsm
    }
}
