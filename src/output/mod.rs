//! Feedback outputs driven by the orchestrator.

pub mod buzzer;
pub mod display;

pub use buzzer::{level_for_distance, Buzzer, BuzzerState};
pub use display::{color_for_distance, Display, DisplayState};
