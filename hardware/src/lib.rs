//! Hardware drivers for the observatory camera server.
//!
//! This crate provides the device layer: the imaging camera (a status-code
//! SDK wrapped in a stateful session) and the TCP filter wheel client. A
//! mock filter wheel daemon ships as the `mock_filter_wheel` binary for
//! development without the real device.

pub mod camera;
pub mod filter_wheel;
