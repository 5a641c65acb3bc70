//! Sensor-side state machines: the push-button and the ultrasonic rangers.

pub mod button;
pub mod ultrasound;

pub use button::{Button, ButtonState};
pub use ultrasound::{MedianWindow, Ultrasound, UltrasoundState};
