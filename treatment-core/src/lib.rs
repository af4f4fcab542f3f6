#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Shared logic for the treatment handpiece controller.
//
// This crate stays portable across embedded targets and host tooling by avoiding the
// Rust standard library. Every timed wait is a stored deadline compared against an
// injected monotonic instant, so hosts decide how time advances.

pub mod channel;
pub mod cycle;
pub mod params;
pub mod session;
pub mod status;
pub mod telemetry;
pub mod trigger;
