//! Stateful camera handle over a [`CameraDriver`].
//!
//! The raw driver reports numeric statuses and never refuses a call; the
//! session layers the usage protocol on top: initialize once, convert
//! non-success statuses into [`DriverError`]s, and run the standard
//! configure/start/read sequences in the right order.

use ndarray::Array2;
use tracing::info;

use super::{
    AcquisitionMode, CameraDriver, DriverError, DriverResult, DriverStatus, ShutterState,
};

/// Driver-level settings for one exposure.
#[derive(Debug, Clone, Copy)]
pub struct ExposureSettings {
    pub shutter: ShutterState,
    pub mode: AcquisitionMode,
    pub exposure_secs: f64,
    /// Number of frames for [`AcquisitionMode::Kinetics`]; ignored otherwise.
    pub kinetic_count: Option<u32>,
}

/// A camera driver plus the state needed to use it correctly.
pub struct CameraSession<D: CameraDriver> {
    driver: D,
    initialized: bool,
    dimensions: (usize, usize),
}

impl<D: CameraDriver> CameraSession<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            initialized: false,
            dimensions: (0, 0),
        }
    }

    /// Map a driver status to a result, naming the operation for diagnostics.
    fn check(operation: &'static str, status: DriverStatus) -> DriverResult<()> {
        match status {
            DriverStatus::Success => Ok(()),
            DriverStatus::NotInitialized => Err(DriverError::NotInitialized),
            DriverStatus::Acquiring => Err(DriverError::Acquiring),
            other => Err(DriverError::Status {
                operation,
                code: other.code(),
            }),
        }
    }

    fn ensure_initialized(&self) -> DriverResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(DriverError::NotInitialized)
        }
    }

    /// Bring the camera up and apply the standard defaults: single-frame
    /// mode, a short exposure, the full detector region, shutter closed.
    ///
    /// Returns the detector dimensions as (width, height).
    pub fn initialize(&mut self) -> DriverResult<(usize, usize)> {
        Self::check("initialize", self.driver.initialize())?;
        Self::check(
            "set_acquisition_mode",
            self.driver.set_acquisition_mode(AcquisitionMode::Single),
        )?;
        Self::check("set_exposure_time", self.driver.set_exposure_time(0.1))?;

        let (status, dims) = self.driver.get_detector();
        Self::check("get_detector", status)?;
        self.dimensions = dims;

        self.set_full_region()?;
        Self::check(
            "set_shutter",
            self.driver.set_shutter(ShutterState::Closed),
        )?;

        self.initialized = true;
        info!(width = dims.0, height = dims.1, "camera initialized");
        Ok(dims)
    }

    /// Unbinned full-frame readout window.
    fn set_full_region(&mut self) -> DriverResult<()> {
        let (width, height) = self.dimensions;
        Self::check(
            "set_image_region",
            self.driver
                .set_image_region(1, 1, 1, width as u32, 1, height as u32),
        )
    }

    /// Program the driver for one exposure.
    pub fn configure(&mut self, settings: &ExposureSettings) -> DriverResult<()> {
        self.ensure_initialized()?;

        Self::check("set_shutter", self.driver.set_shutter(settings.shutter))?;
        self.set_full_region()?;
        Self::check(
            "set_acquisition_mode",
            self.driver.set_acquisition_mode(settings.mode),
        )?;
        Self::check(
            "set_exposure_time",
            self.driver.set_exposure_time(settings.exposure_secs),
        )?;

        match settings.mode {
            AcquisitionMode::RunTillAbort => {
                // Back-to-back frames with no inter-frame delay.
                Self::check(
                    "set_kinetic_cycle_time",
                    self.driver.set_kinetic_cycle_time(0.0),
                )?;
            }
            AcquisitionMode::Kinetics => {
                Self::check(
                    "set_number_kinetics",
                    self.driver
                        .set_number_kinetics(settings.kinetic_count.unwrap_or(1)),
                )?;
            }
            AcquisitionMode::Single => {}
        }
        Ok(())
    }

    pub fn start_exposure(&mut self) -> DriverResult<()> {
        self.ensure_initialized()?;
        Self::check("start_acquisition", self.driver.start_acquisition())
    }

    pub fn abort_exposure(&mut self) -> DriverResult<()> {
        self.ensure_initialized()?;
        Self::check("abort_acquisition", self.driver.abort_acquisition())
    }

    /// Read out the most recent frame.
    pub fn read_frame(&mut self) -> DriverResult<Array2<u16>> {
        self.ensure_initialized()?;
        let (status, frame) = self.driver.get_acquired_data();
        Self::check("get_acquired_data", status)?;
        Ok(frame)
    }

    pub fn set_shutter(&mut self, shutter: ShutterState) -> DriverResult<()> {
        self.ensure_initialized()?;
        Self::check("set_shutter", self.driver.set_shutter(shutter))
    }

    pub fn status(&self) -> DriverStatus {
        self.driver.get_status()
    }

    /// Sensor temperature in Celsius.
    ///
    /// The cooler-related statuses are informational, not errors.
    pub fn temperature(&self) -> DriverResult<f64> {
        let (status, celsius) = self.driver.get_temperature();
        match status {
            DriverStatus::Success
            | DriverStatus::TemperatureOff
            | DriverStatus::TemperatureStabilized => Ok(celsius),
            DriverStatus::NotInitialized => Err(DriverError::NotInitialized),
            DriverStatus::Acquiring => Err(DriverError::Acquiring),
            other => Err(DriverError::Status {
                operation: "get_temperature",
                code: other.code(),
            }),
        }
    }

    pub fn set_target_temperature(&mut self, celsius: f64) -> DriverResult<()> {
        self.ensure_initialized()?;
        Self::check(
            "set_target_temperature",
            self.driver.set_target_temperature(celsius),
        )
    }

    /// Turn the cooler on and set its target.
    pub fn enable_cooling(&mut self, target_celsius: f64) -> DriverResult<()> {
        self.ensure_initialized()?;
        Self::check("cooler_on", self.driver.cooler_on())?;
        self.set_target_temperature(target_celsius)?;
        info!(target_celsius, "cooling enabled");
        Ok(())
    }

    pub fn disable_cooling(&mut self) -> DriverResult<()> {
        self.ensure_initialized()?;
        Self::check("cooler_off", self.driver.cooler_off())
    }

    pub fn shutdown(&mut self) -> DriverResult<()> {
        if !self.initialized {
            return Ok(());
        }
        Self::check("shutdown", self.driver.shutdown())?;
        self.initialized = false;
        info!("camera shut down");
        Ok(())
    }

    /// Detector dimensions as (width, height); (0, 0) before initialization.
    pub fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedCamera;

    fn session() -> CameraSession<SimulatedCamera> {
        CameraSession::new(SimulatedCamera::with_dimensions(32, 16))
    }

    #[test]
    fn test_refuses_before_initialize() {
        let mut s = session();
        assert!(matches!(
            s.start_exposure(),
            Err(DriverError::NotInitialized)
        ));
        assert!(matches!(s.read_frame(), Err(DriverError::NotInitialized)));
        assert!(matches!(
            s.temperature(),
            Err(DriverError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_reports_dimensions() {
        let mut s = session();
        let dims = s.initialize().unwrap();
        assert_eq!(dims, (32, 16));
        assert_eq!(s.dimensions(), (32, 16));
        assert_eq!(s.status(), DriverStatus::Idle);
    }

    #[test]
    fn test_single_exposure_sequence() {
        let mut s = session();
        s.initialize().unwrap();
        s.configure(&ExposureSettings {
            shutter: ShutterState::Open,
            mode: AcquisitionMode::Single,
            exposure_secs: 0.0,
            kinetic_count: None,
        })
        .unwrap();
        s.start_exposure().unwrap();
        let frame = s.read_frame().unwrap();
        assert_eq!(frame.dim(), (16, 32));
    }

    #[test]
    fn test_cooling_round_trip() {
        let mut s = session();
        s.initialize().unwrap();
        s.enable_cooling(-10.0).unwrap();
        assert_eq!(s.temperature().unwrap(), -10.0);
        s.disable_cooling().unwrap();
    }

    #[test]
    fn test_abort_while_exposing() {
        let mut s = session();
        s.initialize().unwrap();
        s.configure(&ExposureSettings {
            shutter: ShutterState::Closed,
            mode: AcquisitionMode::Single,
            exposure_secs: 10.0,
            kinetic_count: None,
        })
        .unwrap();
        s.start_exposure().unwrap();
        assert_eq!(s.status(), DriverStatus::Acquiring);
        s.abort_exposure().unwrap();
        assert_eq!(s.status(), DriverStatus::Idle);
    }

    #[test]
    fn test_shutdown_resets_initialized() {
        let mut s = session();
        s.initialize().unwrap();
        s.shutdown().unwrap();
        assert!(matches!(
            s.start_exposure(),
            Err(DriverError::NotInitialized)
        ));
        // Idempotent once down.
        s.shutdown().unwrap();
    }
}
