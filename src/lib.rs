//! Parking-assistance controller built from guarded-transition state machines.
//!
//! Two ultrasonic rangers (front and rear) measure the distance to the
//! nearest obstacle. An RGB indicator per direction and a shared buzzer
//! report it, and a single push-button switches power, direction and pause.
//!
//! The library is `no_std` and hardware-agnostic. Boards implement the
//! traits in [`port`]; [`sim::SimBoard`] is a software board used by the
//! host tests.
//!
//! Usage: `cargo test` runs everything on the host.
//!
//! Note: The embedded binary uses main.rs with `#![no_std]` and `#![no_main]`
//! and is only built with `--features embedded`.
//!
//! ```
//! use urbanite::config::UrbaniteConfig;
//! use urbanite::sim::SimBoard;
//! use urbanite::system::ParkingSystem;
//!
//! let mut system = ParkingSystem::new(SimBoard::new(), UrbaniteConfig::default()).unwrap();
//! loop {
//!     system.port_mut().advance_ms(1);
//!     system.fire();
//!     # break;
//! }
//! ```

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod fsm;
pub mod input;
pub mod output;
pub mod port;
pub mod power_logic;
pub mod sim;
pub mod system;
pub mod urbanite;

pub use config::UrbaniteConfig;
pub use error::Error;
pub use system::{Devices, ParkingSystem};
pub use urbanite::{Press, Urbanite, UrbaniteState};
