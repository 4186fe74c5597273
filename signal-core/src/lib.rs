#![no_std]

// Phase-sequencing core for the US-120 / Martin / Tech Parkway intersection.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library; hardware, time and logging reach it only through the
// traits in `hal` and `telemetry`.
pub mod console;
pub mod controller;
pub mod coordination;
pub mod flashing;
pub mod hal;
pub mod intersection;
pub mod scheduler;
pub mod sensor;
pub mod signal;
pub mod sim;
pub mod telemetry;
pub mod timing;
pub mod turn;

pub use controller::{Controller, ControllerError, ShutdownCause};
pub use timing::{IntersectionConfig, TimingPlan, TurnLaneConfig};
