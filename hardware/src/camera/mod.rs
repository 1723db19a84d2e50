//! Camera driver abstraction.
//!
//! The imaging sensor is driven through a vendor SDK that reports every
//! operation as a numeric status code rather than raising errors. This module
//! models that boundary: [`CameraDriver`] mirrors the SDK's primitive call
//! set, [`DriverStatus`] carries the raw codes, and [`CameraSession`] wraps a
//! driver into a stateful handle that converts non-success codes into typed
//! [`DriverError`]s.
//!
//! Two driver implementations exist: the [`SimulatedCamera`] used for
//! development and tests, and (on deployments with the vendor SDK present)
//! the native driver, which is linked out-of-tree and satisfies the same
//! trait.

use ndarray::Array2;
use thiserror::Error;

pub mod session;
pub mod simulated;

pub use session::{CameraSession, ExposureSettings};
pub use simulated::SimulatedCamera;

/// Status codes returned by the native camera SDK.
///
/// The numeric values are the SDK's own and are preserved so that logs can be
/// cross-referenced against the vendor documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    /// Operation completed (20002).
    Success,
    /// Thermoelectric cooler is off (20034).
    TemperatureOff,
    /// Cooler has stabilized at the target temperature (20036).
    TemperatureStabilized,
    /// An acquisition is in progress (20072).
    Acquiring,
    /// Camera is idle and ready (20073).
    Idle,
    /// The driver has not been initialized (20075).
    NotInitialized,
}

impl DriverStatus {
    /// The raw SDK status code.
    pub fn code(&self) -> u32 {
        match self {
            DriverStatus::Success => 20002,
            DriverStatus::TemperatureOff => 20034,
            DriverStatus::TemperatureStabilized => 20036,
            DriverStatus::Acquiring => 20072,
            DriverStatus::Idle => 20073,
            DriverStatus::NotInitialized => 20075,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DriverStatus::Success)
    }
}

/// Errors produced when a driver call returns a non-success status.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("camera not initialized")]
    NotInitialized,

    #[error("camera is busy acquiring")]
    Acquiring,

    /// Any other non-success SDK status.
    #[error("driver returned status {code} during {operation}")]
    Status { operation: &'static str, code: u32 },
}

/// Result type for camera driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Mechanical shutter position.
///
/// The SDK takes a shutter typ/mode/timing tuple; only fully open and fully
/// closed are used here, with the standard 50 ms transition times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterState {
    Open,
    Closed,
}

/// SDK acquisition modes used by this system.
///
/// Numbering follows the vendor SDK so that traces line up with its manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// One exposure per start command (mode 1).
    Single,
    /// A fixed-length series of exposures (mode 3).
    Kinetics,
    /// Continuous exposures until aborted (mode 5).
    RunTillAbort,
}

impl AcquisitionMode {
    /// The raw SDK mode number.
    pub fn sdk_mode(&self) -> u32 {
        match self {
            AcquisitionMode::Single => 1,
            AcquisitionMode::Kinetics => 3,
            AcquisitionMode::RunTillAbort => 5,
        }
    }
}

/// Primitive operations exposed by the camera SDK.
///
/// Every call returns a [`DriverStatus`]; calls that also produce data return
/// it alongside the status, matching the SDK's convention of never raising.
/// Status interpretation (and the refusal to operate before `initialize`)
/// lives in [`CameraSession`], not in driver implementations.
pub trait CameraDriver: Send {
    fn initialize(&mut self) -> DriverStatus;
    fn shutdown(&mut self) -> DriverStatus;

    /// Detector dimensions as (width, height) in pixels.
    fn get_detector(&self) -> (DriverStatus, (usize, usize));

    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> DriverStatus;
    fn set_exposure_time(&mut self, seconds: f64) -> DriverStatus;
    fn set_kinetic_cycle_time(&mut self, seconds: f64) -> DriverStatus;
    fn set_number_kinetics(&mut self, count: u32) -> DriverStatus;
    fn set_shutter(&mut self, shutter: ShutterState) -> DriverStatus;

    /// Configure binning and the readout window (1-based, inclusive bounds).
    #[allow(clippy::too_many_arguments)]
    fn set_image_region(
        &mut self,
        hbin: u32,
        vbin: u32,
        hstart: u32,
        hend: u32,
        vstart: u32,
        vend: u32,
    ) -> DriverStatus;

    fn start_acquisition(&mut self) -> DriverStatus;
    fn abort_acquisition(&mut self) -> DriverStatus;

    /// Read out the most recent frame.
    ///
    /// Returns an empty array when the status is not [`DriverStatus::Success`].
    fn get_acquired_data(&mut self) -> (DriverStatus, Array2<u16>);

    /// Current driver state: [`DriverStatus::Acquiring`] while an exposure is
    /// integrating, [`DriverStatus::Idle`] otherwise.
    fn get_status(&self) -> DriverStatus;

    /// Sensor temperature in Celsius. Reads -999.0 while acquiring or before
    /// initialization, mirroring the SDK.
    fn get_temperature(&self) -> (DriverStatus, f64);

    fn set_target_temperature(&mut self, celsius: f64) -> DriverStatus;
    fn cooler_on(&mut self) -> DriverStatus;
    fn cooler_off(&mut self) -> DriverStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_sdk() {
        assert_eq!(DriverStatus::Success.code(), 20002);
        assert_eq!(DriverStatus::Acquiring.code(), 20072);
        assert_eq!(DriverStatus::Idle.code(), 20073);
        assert_eq!(DriverStatus::NotInitialized.code(), 20075);
    }

    #[test]
    fn test_acquisition_mode_numbers() {
        assert_eq!(AcquisitionMode::Single.sdk_mode(), 1);
        assert_eq!(AcquisitionMode::Kinetics.sdk_mode(), 3);
        assert_eq!(AcquisitionMode::RunTillAbort.sdk_mode(), 5);
    }
}
