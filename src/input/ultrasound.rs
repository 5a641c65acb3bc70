//! Ultrasonic ranging: trigger/echo timing and median-filtered distance.
//!
//! One measurement cycle raises the trigger line for a short pulse, waits
//! for both edges of the echo pulse and converts its width into a
//! distance. Raw samples go into a circular window of
//! [`ULTRASOUND_SAMPLES`] entries; every time the window wraps, the median
//! of the samples becomes the published distance and the "new measurement"
//! flag is raised.
//!
//! In `SetDistance` the re-trigger row is listed before the stop row, so a
//! cycle that is already due runs before a stop request is honoured.
//! The remaining in-flight states give up on a stop request, and start a
//! fresh trigger when the re-trigger window passes without a complete echo.

use core::marker::PhantomData;

use crate::config::{DISTANCE_SCALE, ECHO_TIMER_WRAP, SPEED_OF_SOUND_MS, ULTRASOUND_SAMPLES};
use crate::fsm::{self, Fsm, StateMachine, Transition};
use crate::port::{UltrasoundId, UltrasoundPort};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UltrasoundState {
    /// Idle until started and a trigger window opens.
    WaitStart,
    /// Trigger pulse in progress.
    TriggerStart,
    /// Waiting for the echo rising edge.
    WaitEchoStart,
    /// Waiting for the echo falling edge.
    WaitEchoEnd,
    /// Sample stored, waiting for the next trigger window.
    SetDistance,
}

/// Convert an echo pulse width in timer ticks into centimetres.
pub fn ticks_to_cm(ticks: u32) -> u32 {
    let cm = u64::from(ticks) * u64::from(SPEED_OF_SOUND_MS) / u64::from(DISTANCE_SCALE);
    u32::try_from(cm).unwrap_or(u32::MAX)
}

/// Fixed-size circular sample window reporting its median once full.
#[derive(Clone, Debug)]
pub struct MedianWindow<const N: usize> {
    samples: [u32; N],
    index: usize,
}

impl<const N: usize> MedianWindow<N> {
    const ODD: () = assert!(N % 2 == 1, "median window length must be odd");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::ODD;
        Self {
            samples: [0; N],
            index: 0,
        }
    }

    /// Restart filling from the first slot.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Slot the next sample goes into.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Store a sample. Returns the median when this sample completed the
    /// window.
    pub fn push(&mut self, sample: u32) -> Option<u32> {
        self.samples[self.index] = sample;
        let completed = self.index == N - 1;
        self.index = (self.index + 1) % N;
        completed.then(|| self.median())
    }

    fn median(&self) -> u32 {
        let mut sorted = self.samples;
        sorted.sort_unstable();
        sorted[N / 2]
    }
}

impl<const N: usize> Default for MedianWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ultrasound state machine bound to one transceiver of board `P`.
pub struct Ultrasound<P> {
    fsm: Fsm<UltrasoundState>,
    id: UltrasoundId,
    distance_cm: u32,
    window: MedianWindow<ULTRASOUND_SAMPLES>,
    new_measurement: bool,
    status: bool,
    missed_echoes: u32,
    _port: PhantomData<fn(&mut P)>,
}

impl<P: UltrasoundPort + 'static> Ultrasound<P> {
    pub fn new(id: UltrasoundId) -> Self {
        Self {
            fsm: Fsm::from_table(<Self as StateMachine<P>>::TRANSITIONS),
            id,
            distance_cm: 0,
            window: MedianWindow::new(),
            new_measurement: false,
            status: false,
            missed_echoes: 0,
            _port: PhantomData,
        }
    }

    /// Run one dispatch step against the board.
    pub fn fire(&mut self, port: &mut P) -> bool {
        fsm::fire(self, port)
    }

    pub fn id(&self) -> UltrasoundId {
        self.id
    }

    pub fn state(&self) -> UltrasoundState {
        self.fsm.state()
    }

    /// Begin a measurement run from an empty window.
    pub fn start(&mut self, port: &mut P) {
        self.status = true;
        self.window.reset();
        self.distance_cm = 0;
        self.new_measurement = false;
        port.reset_echo_state(self.id);
        port.mark_trigger_ready(self.id);
        port.arm_periodic_retrigger(self.id);
    }

    /// Stop measuring and cancel every timer of this transceiver.
    pub fn stop(&mut self, port: &mut P) {
        self.status = false;
        self.new_measurement = false;
        port.stop_all_timers(self.id);
    }

    /// Latest median distance (cm). Clears the new-measurement flag.
    pub fn get_distance(&mut self) -> u32 {
        self.new_measurement = false;
        self.distance_cm
    }

    pub fn new_measurement_ready(&self) -> bool {
        self.new_measurement
    }

    pub fn status(&self) -> bool {
        self.status
    }

    pub fn set_status(&mut self, status: bool) {
        self.status = status;
    }

    pub fn is_trigger_ready(&self, port: &mut P) -> bool {
        port.trigger_ready(self.id)
    }

    /// Cycles abandoned because the echo never completed.
    pub fn missed_echoes(&self) -> u32 {
        self.missed_echoes
    }

    /// The sensor never holds the system awake by itself; its consumers'
    /// outputs do.
    pub fn check_activity(&self) -> bool {
        false
    }

    fn check_on(&self, port: &mut P) -> bool {
        port.trigger_ready(self.id) && self.status
    }

    fn check_off(&self, _port: &mut P) -> bool {
        !self.status
    }

    fn check_trigger_end(&self, port: &mut P) -> bool {
        port.trigger_pulse_elapsed(self.id)
    }

    fn check_echo_init(&self, port: &mut P) -> bool {
        port.echo_rising_captured(self.id)
    }

    fn check_echo_received(&self, port: &mut P) -> bool {
        port.echo_falling_captured(self.id)
    }

    fn check_new_measurement(&self, port: &mut P) -> bool {
        port.trigger_ready(self.id)
    }

    fn do_start_measurement(&mut self, port: &mut P) {
        port.start_trigger(self.id);
    }

    fn do_stop_trigger(&mut self, port: &mut P) {
        port.stop_trigger(self.id);
    }

    fn do_set_distance(&mut self, port: &mut P) {
        let ticks = port.echo_ticks(self.id);
        let sample = ticks_to_cm(ticks.elapsed(ECHO_TIMER_WRAP));
        if let Some(median) = self.window.push(sample) {
            self.distance_cm = median;
            self.new_measurement = true;
            trace!("Ultrasound {}: median {} cm", self.id, median);
        }
        port.stop_echo_timer(self.id);
        port.reset_echo_state(self.id);
    }

    fn do_retry_after_timeout(&mut self, port: &mut P) {
        self.missed_echoes = self.missed_echoes.saturating_add(1);
        warn!("Ultrasound {}: echo timeout, re-triggering", self.id);
        port.stop_echo_timer(self.id);
        port.reset_echo_state(self.id);
        port.start_trigger(self.id);
    }

    fn do_stop_measurement(&mut self, port: &mut P) {
        port.stop_trigger(self.id);
        port.stop_all_timers(self.id);
    }
}

impl<P: UltrasoundPort + 'static> StateMachine<P> for Ultrasound<P> {
    type State = UltrasoundState;

    const TRANSITIONS: &'static [Transition<UltrasoundState, Self, P>] = {
        use UltrasoundState::*;
        &[
            Transition::with_action(WaitStart, Self::check_on, TriggerStart, Self::do_start_measurement),
            Transition::with_action(TriggerStart, Self::check_trigger_end, WaitEchoStart, Self::do_stop_trigger),
            Transition::with_action(TriggerStart, Self::check_off, WaitStart, Self::do_stop_measurement),
            Transition::new(WaitEchoStart, Self::check_echo_init, WaitEchoEnd),
            Transition::with_action(WaitEchoStart, Self::check_off, WaitStart, Self::do_stop_measurement),
            Transition::with_action(WaitEchoStart, Self::check_new_measurement, TriggerStart, Self::do_retry_after_timeout),
            Transition::with_action(WaitEchoEnd, Self::check_echo_received, SetDistance, Self::do_set_distance),
            Transition::with_action(WaitEchoEnd, Self::check_off, WaitStart, Self::do_stop_measurement),
            Transition::with_action(WaitEchoEnd, Self::check_new_measurement, TriggerStart, Self::do_retry_after_timeout),
            // Order matters: a due cycle completes before a stop request.
            Transition::with_action(SetDistance, Self::check_new_measurement, TriggerStart, Self::do_start_measurement),
            Transition::with_action(SetDistance, Self::check_off, WaitStart, Self::do_stop_measurement),
        ]
    };

    fn fsm(&self) -> &Fsm<UltrasoundState> {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm<UltrasoundState> {
        &mut self.fsm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::EchoTicks;
    use crate::sim::SimBoard;
    use proptest::prelude::*;

    const ID: UltrasoundId = UltrasoundId(1);

    fn started() -> (SimBoard, Ultrasound<SimBoard>) {
        let mut sim = SimBoard::new();
        let mut sensor = Ultrasound::new(ID);
        sensor.start(&mut sim);
        (sim, sensor)
    }

    /// Drive one full cycle ending in `SetDistance`.
    fn measure(sim: &mut SimBoard, sensor: &mut Ultrasound<SimBoard>, distance_cm: u32) {
        sim.raise_trigger_ready(ID);
        assert!(sensor.fire(sim));
        assert_eq!(sensor.state(), UltrasoundState::TriggerStart);
        sim.complete_trigger_pulse(ID);
        assert!(sensor.fire(sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitEchoStart);
        sim.capture_echo(ID, SimBoard::echo_ticks_for(distance_cm));
        assert!(sensor.fire(sim));
        assert!(sensor.fire(sim));
        assert_eq!(sensor.state(), UltrasoundState::SetDistance);
    }

    #[test]
    fn tick_conversion_uses_speed_of_sound() {
        assert_eq!(ticks_to_cm(0), 0);
        assert_eq!(ticks_to_cm(5831), 100);
        assert_eq!(ticks_to_cm(583), 9);
        assert_eq!(ticks_to_cm(u32::MAX), 73_658_689);
    }

    #[test]
    fn median_of_reference_window() {
        let mut window = MedianWindow::<5>::new();
        assert_eq!(window.push(12), None);
        assert_eq!(window.push(15), None);
        assert_eq!(window.push(11), None);
        assert_eq!(window.push(13), None);
        assert_eq!(window.push(14), Some(13));
        assert_eq!(window.index(), 0);
    }

    #[test]
    fn median_window_keeps_insertion_order() {
        let mut window = MedianWindow::<3>::new();
        window.push(30);
        window.push(10);
        assert_eq!(window.push(20), Some(20));
        // Sorting works on a copy: the next wrap overwrites the oldest slot.
        window.push(1);
        window.push(2);
        assert_eq!(window.push(3), Some(2));
    }

    #[test]
    fn publishes_median_only_when_window_fills() {
        let (mut sim, mut sensor) = started();
        for distance in [12, 15, 11, 13] {
            measure(&mut sim, &mut sensor, distance);
            assert!(!sensor.new_measurement_ready());
        }
        measure(&mut sim, &mut sensor, 14);
        assert!(sensor.new_measurement_ready());
        assert_eq!(sensor.get_distance(), 13);
    }

    #[test]
    fn get_distance_is_read_once() {
        let (mut sim, mut sensor) = started();
        for distance in [40, 41, 42, 43, 44] {
            measure(&mut sim, &mut sensor, distance);
        }
        assert!(sensor.new_measurement_ready());
        assert_eq!(sensor.get_distance(), 42);
        assert!(!sensor.new_measurement_ready());
        assert_eq!(sensor.get_distance(), 42);
        assert!(!sensor.new_measurement_ready());
    }

    #[test]
    fn start_discards_a_partial_window() {
        let (mut sim, mut sensor) = started();
        for distance in [90, 90, 90] {
            measure(&mut sim, &mut sensor, distance);
        }
        sensor.stop(&mut sim);
        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitStart);

        sensor.start(&mut sim);
        for distance in [20, 20] {
            measure(&mut sim, &mut sensor, distance);
        }
        assert!(!sensor.new_measurement_ready());
        for distance in [20, 20, 20] {
            measure(&mut sim, &mut sensor, distance);
        }
        assert_eq!(sensor.get_distance(), 20);
    }

    #[test]
    fn unread_median_does_not_survive_a_restart() {
        let (mut sim, mut sensor) = started();
        for distance in [150; ULTRASOUND_SAMPLES] {
            measure(&mut sim, &mut sensor, distance);
        }
        assert!(sensor.new_measurement_ready());

        sensor.stop(&mut sim);
        assert!(!sensor.new_measurement_ready());
        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitStart);

        sensor.start(&mut sim);
        for distance in [150; ULTRASOUND_SAMPLES - 1] {
            measure(&mut sim, &mut sensor, distance);
            assert!(!sensor.new_measurement_ready());
        }
        measure(&mut sim, &mut sensor, 150);
        assert_eq!(sensor.get_distance(), 150);
    }

    #[test]
    fn restart_while_running_drops_the_pending_median() {
        let (mut sim, mut sensor) = started();
        for distance in [40; ULTRASOUND_SAMPLES] {
            measure(&mut sim, &mut sensor, distance);
        }
        assert!(sensor.new_measurement_ready());

        sensor.start(&mut sim);
        assert!(!sensor.new_measurement_ready());
        assert_eq!(sensor.get_distance(), 0);
    }

    #[test]
    fn first_trigger_waits_for_start() {
        let mut sim = SimBoard::new();
        let mut sensor: Ultrasound<SimBoard> = Ultrasound::new(ID);
        sim.raise_trigger_ready(ID);
        assert!(!sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitStart);

        sensor.start(&mut sim);
        assert!(sim.retrigger_armed(ID));
        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::TriggerStart);
        assert!(sim.trigger_high(ID));
        assert!(!sensor.is_trigger_ready(&mut sim));
    }

    #[test]
    fn retrigger_beats_stop_in_set_distance() {
        let (mut sim, mut sensor) = started();
        measure(&mut sim, &mut sensor, 50);
        sim.raise_trigger_ready(ID);
        sensor.set_status(false);

        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::TriggerStart);
    }

    #[test]
    fn stop_in_set_distance_returns_to_wait_start() {
        let (mut sim, mut sensor) = started();
        measure(&mut sim, &mut sensor, 50);
        sensor.stop(&mut sim);

        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitStart);
        assert!(!sim.retrigger_armed(ID));
        assert!(!sim.echo_timer_running(ID));
    }

    #[test]
    fn stop_while_waiting_for_echo_aborts_cycle() {
        let (mut sim, mut sensor) = started();
        sensor.fire(&mut sim);
        sim.complete_trigger_pulse(ID);
        sensor.fire(&mut sim);
        assert_eq!(sensor.state(), UltrasoundState::WaitEchoStart);

        sensor.stop(&mut sim);
        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitStart);
        assert!(!sim.trigger_high(ID));
    }

    #[test]
    fn missing_echo_restarts_trigger_when_window_elapses() {
        let (mut sim, mut sensor) = started();
        sensor.fire(&mut sim);
        sim.complete_trigger_pulse(ID);
        sensor.fire(&mut sim);
        assert!(!sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::WaitEchoStart);

        sim.raise_trigger_ready(ID);
        assert!(sensor.fire(&mut sim));
        assert_eq!(sensor.state(), UltrasoundState::TriggerStart);
        assert_eq!(sensor.missed_echoes(), 1);
        assert_eq!(sim.trigger_count(ID), 2);
    }

    #[test]
    fn missing_falling_edge_restarts_trigger() {
        let (mut sim, mut sensor) = started();
        sensor.fire(&mut sim);
        sim.complete_trigger_pulse(ID);
        sensor.fire(&mut sim);
        sim.capture_rising(ID);
        sensor.fire(&mut sim);
        assert_eq!(sensor.state(), UltrasoundState::WaitEchoEnd);

        sim.raise_trigger_ready(ID);
        sensor.fire(&mut sim);
        assert_eq!(sensor.state(), UltrasoundState::TriggerStart);
        assert_eq!(sensor.missed_echoes(), 1);
    }

    #[test]
    fn overflowing_echo_is_measured() {
        let (mut sim, mut sensor) = started();
        let long = EchoTicks {
            overflows: 1,
            start: 60_000,
            end: 6_995,
        };
        for _ in 0..ULTRASOUND_SAMPLES {
            sim.raise_trigger_ready(ID);
            sensor.fire(&mut sim);
            sim.complete_trigger_pulse(ID);
            sensor.fire(&mut sim);
            sim.capture_echo(ID, long);
            sensor.fire(&mut sim);
            sensor.fire(&mut sim);
        }
        // 12531 ticks
        assert_eq!(sensor.get_distance(), 214);
    }

    #[test]
    fn sensor_never_reports_activity() {
        let (mut sim, mut sensor) = started();
        assert!(!sensor.check_activity());
        measure(&mut sim, &mut sensor, 10);
        assert!(!sensor.check_activity());
    }

    proptest! {
        #[test]
        fn published_value_is_an_element_of_the_window(
            samples in proptest::collection::vec(0u32..400, 5)
        ) {
            let mut window = MedianWindow::<5>::new();
            let mut published = None;
            for sample in &samples {
                published = window.push(*sample);
            }
            let median = published.expect("full window publishes");
            prop_assert!(samples.contains(&median));
            let below = samples.iter().filter(|s| **s < median).count();
            let above = samples.iter().filter(|s| **s > median).count();
            prop_assert!(below <= 2 && above <= 2);
        }
    }
}
