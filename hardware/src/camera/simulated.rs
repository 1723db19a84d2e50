//! Simulated camera for development and tests.
//!
//! Reproduces the observable behavior of the native driver closely enough to
//! exercise the acquisition controller: initialization gating, a timed
//! acquisition window during which most calls report busy, temperature reads
//! of -999.0 while acquiring, and synthetic noise frames on readout.
//!
//! All state lives on the instance; constructing two simulated cameras gives
//! two fully independent devices.

use std::time::Instant;

use ndarray::Array2;
use rand::Rng;

use super::{AcquisitionMode, CameraDriver, DriverStatus, ShutterState};

const DEFAULT_DIMENSIONS: (usize, usize) = (1024, 1024);

/// Synthetic bias level applied to generated frames, in ADU.
const BIAS_LEVEL: u16 = 1000;

/// In-process stand-in for the camera SDK.
pub struct SimulatedCamera {
    initialized: bool,
    cooling: bool,
    temperature_c: f64,
    exposure_secs: f64,
    mode: AcquisitionMode,
    shutter: ShutterState,
    number_kinetics: u32,
    dimensions: (usize, usize),
    /// Set while an emulated acquisition window is open.
    acquisition_started: Option<Instant>,
    acquisition_secs: f64,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS.0, DEFAULT_DIMENSIONS.1)
    }

    /// Create a simulated camera with a non-default detector size.
    ///
    /// Small detectors keep readout cheap in tests.
    pub fn with_dimensions(width: usize, height: usize) -> Self {
        Self {
            initialized: false,
            cooling: false,
            temperature_c: 20.0,
            exposure_secs: 0.1,
            mode: AcquisitionMode::Single,
            shutter: ShutterState::Closed,
            number_kinetics: 1,
            dimensions: (width, height),
            acquisition_started: None,
            acquisition_secs: 0.0,
        }
    }

    pub fn shutter(&self) -> ShutterState {
        self.shutter
    }

    fn is_acquiring(&self) -> bool {
        match self.acquisition_started {
            Some(started) => started.elapsed().as_secs_f64() < self.acquisition_secs,
            None => false,
        }
    }

    /// Common gate shared by every SDK setter: refuse before initialization
    /// and while an acquisition window is open.
    fn gate(&self) -> DriverStatus {
        if !self.initialized {
            DriverStatus::NotInitialized
        } else if self.is_acquiring() {
            DriverStatus::Acquiring
        } else {
            DriverStatus::Success
        }
    }

    fn synthetic_frame(&self) -> Array2<u16> {
        let (width, height) = self.dimensions;
        let mut rng = rand::rng();
        // Readout noise on top of a flat bias level; an open shutter adds a
        // mild illumination gradient so frames are distinguishable.
        Array2::from_shape_fn((height, width), |(row, _col)| {
            let noise: u16 = rng.random_range(0..200);
            let signal = match self.shutter {
                ShutterState::Open => (row * 400 / height.max(1)) as u16,
                ShutterState::Closed => 0,
            };
            BIAS_LEVEL + noise + signal
        })
    }
}

impl CameraDriver for SimulatedCamera {
    fn initialize(&mut self) -> DriverStatus {
        self.initialized = true;
        DriverStatus::Success
    }

    fn shutdown(&mut self) -> DriverStatus {
        if self.is_acquiring() {
            return DriverStatus::Acquiring;
        }
        self.initialized = false;
        DriverStatus::Success
    }

    fn get_detector(&self) -> (DriverStatus, (usize, usize)) {
        if !self.initialized {
            return (DriverStatus::NotInitialized, (0, 0));
        }
        (DriverStatus::Success, self.dimensions)
    }

    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.mode = mode;
        }
        status
    }

    fn set_exposure_time(&mut self, seconds: f64) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.exposure_secs = seconds;
        }
        status
    }

    fn set_kinetic_cycle_time(&mut self, _seconds: f64) -> DriverStatus {
        self.gate()
    }

    fn set_number_kinetics(&mut self, count: u32) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.number_kinetics = count.max(1);
        }
        status
    }

    fn set_shutter(&mut self, shutter: ShutterState) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.shutter = shutter;
        }
        status
    }

    fn set_image_region(
        &mut self,
        _hbin: u32,
        _vbin: u32,
        _hstart: u32,
        _hend: u32,
        _vstart: u32,
        _vend: u32,
    ) -> DriverStatus {
        self.gate()
    }

    fn start_acquisition(&mut self) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.acquisition_secs = match self.mode {
                AcquisitionMode::Kinetics => {
                    self.exposure_secs * f64::from(self.number_kinetics)
                }
                _ => self.exposure_secs,
            };
            self.acquisition_started = Some(Instant::now());
        }
        status
    }

    fn abort_acquisition(&mut self) -> DriverStatus {
        if !self.initialized {
            return DriverStatus::NotInitialized;
        }
        self.acquisition_started = None;
        DriverStatus::Success
    }

    fn get_acquired_data(&mut self) -> (DriverStatus, Array2<u16>) {
        let status = self.gate();
        if !status.is_success() {
            return (status, Array2::zeros((0, 0)));
        }
        (DriverStatus::Success, self.synthetic_frame())
    }

    fn get_status(&self) -> DriverStatus {
        if !self.initialized {
            DriverStatus::NotInitialized
        } else if self.is_acquiring() {
            DriverStatus::Acquiring
        } else {
            DriverStatus::Idle
        }
    }

    fn get_temperature(&self) -> (DriverStatus, f64) {
        if !self.initialized {
            return (DriverStatus::NotInitialized, -999.0);
        }
        if self.is_acquiring() {
            return (DriverStatus::Acquiring, -999.0);
        }
        let status = if self.cooling {
            DriverStatus::TemperatureStabilized
        } else {
            DriverStatus::TemperatureOff
        };
        (status, self.temperature_c)
    }

    fn set_target_temperature(&mut self, celsius: f64) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            // The simulation reaches the setpoint immediately.
            self.temperature_c = celsius;
        }
        status
    }

    fn cooler_on(&mut self) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.cooling = true;
        }
        status
    }

    fn cooler_off(&mut self) -> DriverStatus {
        let status = self.gate();
        if status.is_success() {
            self.cooling = false;
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_everything_gated_before_initialize() {
        let mut camera = SimulatedCamera::with_dimensions(16, 16);
        assert_eq!(camera.get_status(), DriverStatus::NotInitialized);
        assert_eq!(camera.set_exposure_time(1.0), DriverStatus::NotInitialized);
        assert_eq!(camera.start_acquisition(), DriverStatus::NotInitialized);
        let (status, _) = camera.get_temperature();
        assert_eq!(status, DriverStatus::NotInitialized);
    }

    #[test]
    fn test_acquisition_window_lifecycle() {
        let mut camera = SimulatedCamera::with_dimensions(16, 16);
        camera.initialize();
        camera.set_exposure_time(0.05);

        assert_eq!(camera.get_status(), DriverStatus::Idle);
        assert_eq!(camera.start_acquisition(), DriverStatus::Success);
        assert_eq!(camera.get_status(), DriverStatus::Acquiring);

        // Busy for the duration of the exposure.
        assert_eq!(camera.set_exposure_time(1.0), DriverStatus::Acquiring);
        let (status, temp) = camera.get_temperature();
        assert_eq!(status, DriverStatus::Acquiring);
        assert_eq!(temp, -999.0);

        sleep(Duration::from_millis(80));
        assert_eq!(camera.get_status(), DriverStatus::Idle);
    }

    #[test]
    fn test_abort_ends_acquisition_window() {
        let mut camera = SimulatedCamera::with_dimensions(16, 16);
        camera.initialize();
        camera.set_exposure_time(10.0);
        camera.start_acquisition();
        assert_eq!(camera.get_status(), DriverStatus::Acquiring);

        assert_eq!(camera.abort_acquisition(), DriverStatus::Success);
        assert_eq!(camera.get_status(), DriverStatus::Idle);
    }

    #[test]
    fn test_readout_shape_and_bias() {
        let mut camera = SimulatedCamera::with_dimensions(32, 8);
        camera.initialize();
        camera.set_exposure_time(0.0);
        camera.start_acquisition();

        let (status, frame) = camera.get_acquired_data();
        assert!(status.is_success());
        // (rows, cols) = (height, width)
        assert_eq!(frame.dim(), (8, 32));
        assert!(frame.iter().all(|&v| v >= BIAS_LEVEL));
    }

    #[test]
    fn test_kinetics_extends_window() {
        let mut camera = SimulatedCamera::with_dimensions(16, 16);
        camera.initialize();
        camera.set_acquisition_mode(AcquisitionMode::Kinetics);
        camera.set_number_kinetics(3);
        camera.set_exposure_time(0.04);
        camera.start_acquisition();

        sleep(Duration::from_millis(60));
        // One exposure has elapsed but the series has not.
        assert_eq!(camera.get_status(), DriverStatus::Acquiring);
        sleep(Duration::from_millis(80));
        assert_eq!(camera.get_status(), DriverStatus::Idle);
    }

    #[test]
    fn test_instances_are_independent() {
        let mut a = SimulatedCamera::with_dimensions(16, 16);
        let b = SimulatedCamera::with_dimensions(16, 16);
        a.initialize();
        assert_eq!(a.get_status(), DriverStatus::Idle);
        assert_eq!(b.get_status(), DriverStatus::NotInitialized);
    }
}
