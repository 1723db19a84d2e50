//! Acquisition server for the observatory camera.
//!
//! Coordinates exclusive access to the imaging sensor, runs cancellable
//! multi-phase exposures, talks to the filter wheel daemon, and writes each
//! frame to a collision-free FITS path served back over HTTP.

pub mod controller;
pub mod error;
pub mod fits;
pub mod request;
pub mod routes;
pub mod sequencer;
pub mod token;

pub use controller::{AcquisitionController, AcquisitionState, CaptureResult, ControllerConfig};
pub use error::CaptureError;
pub use request::ExposureRequest;
