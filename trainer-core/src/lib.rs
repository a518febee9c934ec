#![no_std]

// Event sequencing and command handling for the cord-withdrawal trainer.
//
// Everything here runs on the device's single control loop and avoids the
// Rust standard library so the same state machines drive the MCU build and
// the host emulator. Hardware, sockets and clocks come in through the seam
// traits in `actuator`, `channel` and `distance`.

pub mod actuator;
pub mod channel;
pub mod dispatch;
pub mod distance;
pub mod profile;
pub mod sequencer;
pub mod telemetry;
pub mod wire;
