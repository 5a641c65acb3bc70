//! Parking-assistance firmware for the nRF52840.
//!
//! Wiring (nRF52840-DK):
//!   - Button (active-low, internal pull-up)  P0.11
//!   - Front RGB LED (PWM0)                    P0.13 / P0.14 / P0.15
//!   - Rear RGB LED (PWM1)                     P0.02 / P0.03 / P0.04
//!   - Buzzer (PWM2)                           P0.28
//!   - Rear HC-SR04 trigger / echo             P1.01 / P1.02
//!   - Front HC-SR04 trigger / echo            P1.03 / P1.04
//!
//! The control loop runs in the main task. Edge tasks record button level
//! and echo timestamps and wake the loop when it is parked in low power.

#![no_std]
#![no_main]

use core::cell::Cell;
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_futures::select::select;
use embassy_futures::yield_now;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::peripherals::{PWM0, PWM1, PWM2};
use embassy_nrf::pwm::SimplePwm;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::{OutputPin, PinState};
use embedded_hal_async::digital::Wait;
use urbanite::config::{
    UrbaniteConfig, ECHO_TIMER_WRAP, FRONT_PARKING_DISPLAY_ID, FRONT_PARKING_SENSOR_ID,
    PARKING_BUTTON_ID, REAR_PARKING_DISPLAY_ID, REAR_PARKING_SENSOR_ID, RETRIGGER_PERIOD_MS,
    RGB_MAX_VALUE, TRIGGER_PULSE_US,
};
use urbanite::port::{
    ButtonId, ButtonPort, BuzzerId, BuzzerPort, Clock, DisplayId, DisplayPort, EchoTicks,
    PowerPort, Rgb, UltrasoundId, UltrasoundPort,
};
use urbanite::ParkingSystem;
use {defmt_rtt as _, panic_probe as _};

/// Echo edge timestamps (µs since boot) written by the edge tasks.
#[derive(Clone, Copy, Default)]
struct EchoCapture {
    listening: bool,
    rising_us: Option<u64>,
    falling_us: Option<u64>,
}

type EchoSlot = Mutex<CriticalSectionRawMutex, Cell<EchoCapture>>;

static REAR_ECHO: EchoSlot = Mutex::new(Cell::new(EchoCapture {
    listening: false,
    rising_us: None,
    falling_us: None,
}));
static FRONT_ECHO: EchoSlot = Mutex::new(Cell::new(EchoCapture {
    listening: false,
    rising_us: None,
    falling_us: None,
}));

static BUTTON_PRESSED: AtomicBool = AtomicBool::new(false);

/// Raised by every edge task so a parked control loop re-runs.
static WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

fn update_echo(slot: &EchoSlot, f: impl FnOnce(&mut EchoCapture)) {
    slot.lock(|cell| {
        let mut capture = cell.get();
        f(&mut capture);
        cell.set(capture);
    });
}

/// Trigger line plus the soft timers that replace the hardware ones.
struct Sensor<T> {
    trigger: T,
    echo: &'static EchoSlot,
    ready: bool,
    armed: bool,
    next_window: Instant,
    pulse_started: Option<Instant>,
}

impl<T: OutputPin<Error = Infallible>> Sensor<T> {
    fn new(trigger: T, echo: &'static EchoSlot) -> Self {
        let mut sensor = Self {
            trigger,
            echo,
            ready: false,
            armed: false,
            next_window: Instant::now(),
            pulse_started: None,
        };
        sensor.drive_trigger(PinState::Low);
        sensor
    }

    fn drive_trigger(&mut self, state: PinState) {
        match self.trigger.set_state(state) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    fn poll_window(&mut self) {
        if self.armed && Instant::now() >= self.next_window {
            self.ready = true;
            self.next_window += Duration::from_millis(u64::from(RETRIGGER_PERIOD_MS));
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let pulse_end = self
            .pulse_started
            .map(|t| t + Duration::from_micros(u64::from(TRIGGER_PULSE_US)));
        let window = self.armed.then_some(self.next_window);
        match (pulse_end, window) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

struct Board {
    rear: Sensor<Output<'static>>,
    front: Sensor<Output<'static>>,
    front_led: SimplePwm<'static, PWM0>,
    rear_led: SimplePwm<'static, PWM1>,
    buzzer: SimplePwm<'static, PWM2>,
    sleep_requested: bool,
}

impl Board {
    fn sensor(&mut self, id: UltrasoundId) -> Option<&mut Sensor<Output<'static>>> {
        match id {
            FRONT_PARKING_SENSOR_ID => Some(&mut self.front),
            REAR_PARKING_SENSOR_ID => Some(&mut self.rear),
            _ => None,
        }
    }

    fn take_sleep_request(&mut self) -> bool {
        core::mem::take(&mut self.sleep_requested)
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.front.next_deadline(), self.rear.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

impl Clock for Board {
    fn now_ms(&mut self) -> u32 {
        Instant::now().as_millis() as u32
    }
}

impl ButtonPort for Board {
    fn is_pressed(&mut self, id: ButtonId) -> bool {
        id == PARKING_BUTTON_ID && BUTTON_PRESSED.load(Ordering::Relaxed)
    }
}

impl UltrasoundPort for Board {
    fn trigger_ready(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id).is_some_and(|s| {
            s.poll_window();
            s.ready
        })
    }

    fn mark_trigger_ready(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            sensor.ready = true;
        }
    }

    fn start_trigger(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            let now = Instant::now();
            sensor.ready = false;
            if sensor.armed {
                sensor.next_window = now + Duration::from_millis(u64::from(RETRIGGER_PERIOD_MS));
            }
            update_echo(sensor.echo, |c| *c = EchoCapture { listening: true, ..Default::default() });
            sensor.drive_trigger(PinState::High);
            sensor.pulse_started = Some(now);
        }
    }

    fn trigger_pulse_elapsed(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id)
            .and_then(|s| s.pulse_started)
            .is_some_and(|t| t.elapsed() >= Duration::from_micros(u64::from(TRIGGER_PULSE_US)))
    }

    fn stop_trigger(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            sensor.drive_trigger(PinState::Low);
            sensor.pulse_started = None;
        }
    }

    fn echo_rising_captured(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id)
            .is_some_and(|s| s.echo.lock(|c| c.get().rising_us.is_some()))
    }

    fn echo_falling_captured(&mut self, id: UltrasoundId) -> bool {
        self.sensor(id)
            .is_some_and(|s| s.echo.lock(|c| c.get().falling_us.is_some()))
    }

    fn echo_ticks(&mut self, id: UltrasoundId) -> EchoTicks {
        let Some(sensor) = self.sensor(id) else {
            return EchoTicks::default();
        };
        let capture = sensor.echo.lock(|c| c.get());
        match (capture.rising_us, capture.falling_us) {
            (Some(start), Some(end)) => {
                let wrap = u64::from(ECHO_TIMER_WRAP);
                EchoTicks {
                    overflows: ((end / wrap) - (start / wrap)) as u32,
                    start: (start % wrap) as u32,
                    end: (end % wrap) as u32,
                }
            }
            _ => EchoTicks::default(),
        }
    }

    fn reset_echo_state(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            update_echo(sensor.echo, |c| {
                c.rising_us = None;
                c.falling_us = None;
            });
        }
    }

    fn stop_echo_timer(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            update_echo(sensor.echo, |c| c.listening = false);
        }
    }

    fn arm_periodic_retrigger(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            sensor.armed = true;
            sensor.next_window = Instant::now() + Duration::from_millis(u64::from(RETRIGGER_PERIOD_MS));
        }
    }

    fn stop_all_timers(&mut self, id: UltrasoundId) {
        if let Some(sensor) = self.sensor(id) {
            sensor.drive_trigger(PinState::Low);
            sensor.pulse_started = None;
            sensor.armed = false;
            update_echo(sensor.echo, |c| *c = EchoCapture::default());
        }
    }
}

impl DisplayPort for Board {
    fn render(&mut self, id: DisplayId, color: Rgb) {
        let duties = [color.r, color.g, color.b];
        for (channel, duty) in duties.into_iter().enumerate() {
            match id {
                FRONT_PARKING_DISPLAY_ID => self.front_led.set_duty(channel, u16::from(duty)),
                REAR_PARKING_DISPLAY_ID => self.rear_led.set_duty(channel, u16::from(duty)),
                _ => {}
            }
        }
    }
}

impl BuzzerPort for Board {
    fn sound(&mut self, _id: BuzzerId, level: u8) {
        self.buzzer.set_duty(0, u16::from(level));
    }
}

impl PowerPort for Board {
    fn enter_low_power_mode(&mut self) {
        self.sleep_requested = true;
    }
}

#[embassy_executor::task]
async fn button_task(mut pin: Input<'static>) -> ! {
    loop {
        BUTTON_PRESSED.store(pin.is_low(), Ordering::Relaxed);
        WAKE.signal(());
        pin.wait_for_any_edge().await;
    }
}

async fn capture_echo<W: Wait>(pin: &mut W, slot: &EchoSlot) {
    if pin.wait_for_rising_edge().await.is_err() {
        return;
    }
    let rising = Instant::now().as_micros();
    update_echo(slot, |c| {
        if c.listening && c.rising_us.is_none() {
            c.rising_us = Some(rising);
        }
    });

    if pin.wait_for_falling_edge().await.is_err() {
        return;
    }
    let falling = Instant::now().as_micros();
    update_echo(slot, |c| {
        if c.listening && c.rising_us.is_some() && c.falling_us.is_none() {
            c.falling_us = Some(falling);
        }
    });
    WAKE.signal(());
}

#[embassy_executor::task(pool_size = 2)]
async fn echo_task(mut pin: Input<'static>, slot: &'static EchoSlot) -> ! {
    loop {
        capture_echo(&mut pin, slot).await;
    }
}

fn rgb_pwm<T: embassy_nrf::pwm::Instance>(pwm: &mut SimplePwm<'static, T>) {
    pwm.set_max_duty(u16::from(RGB_MAX_VALUE));
    for channel in 0..3 {
        pwm.set_duty(channel, 0);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());
    info!("Urbanite starting");

    unwrap!(spawner.spawn(button_task(Input::new(p.P0_11, Pull::Up))));
    unwrap!(spawner.spawn(echo_task(Input::new(p.P1_02, Pull::None), &REAR_ECHO)));
    unwrap!(spawner.spawn(echo_task(Input::new(p.P1_04, Pull::None), &FRONT_ECHO)));

    let mut front_led = SimplePwm::new_3ch(p.PWM0, p.P0_13, p.P0_14, p.P0_15);
    let mut rear_led = SimplePwm::new_3ch(p.PWM1, p.P0_02, p.P0_03, p.P0_04);
    rgb_pwm(&mut front_led);
    rgb_pwm(&mut rear_led);
    let mut buzzer = SimplePwm::new_1ch(p.PWM2, p.P0_28);
    buzzer.set_max_duty(u16::from(u8::MAX));
    buzzer.set_duty(0, 0);

    let board = Board {
        rear: Sensor::new(Output::new(p.P1_01, Level::Low, OutputDrive::Standard), &REAR_ECHO),
        front: Sensor::new(Output::new(p.P1_03, Level::Low, OutputDrive::Standard), &FRONT_ECHO),
        front_led,
        rear_led,
        buzzer,
        sleep_requested: false,
    };

    let mut system = match ParkingSystem::new(board, UrbaniteConfig::default()) {
        Ok(system) => system,
        Err(err) => {
            error!("Config: {}", err);
            defmt::panic!("invalid configuration");
        }
    };
    info!("Urbanite ready, hold the button to power on");

    loop {
        system.fire();

        if system.port_mut().take_sleep_request() {
            match system.port().next_deadline() {
                Some(at) => {
                    select(WAKE.wait(), Timer::at(at)).await;
                }
                None => WAKE.wait().await,
            }
        } else {
            yield_now().await;
        }
    }
}
