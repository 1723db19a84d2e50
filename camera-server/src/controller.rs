//! Acquisition controller.
//!
//! Owns the camera session and serializes access to it: one capture at a
//! time, later requests rejected outright rather than queued. A capture
//! walks the Configuring, Exposing and Reading phases, polling a
//! request-scoped cancellation token between device commands and while
//! waiting out the exposure, and finishes by writing the frame to a
//! sequenced FITS path.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use hardware::camera::{
    AcquisitionMode, CameraDriver, CameraSession, ExposureSettings, ShutterState,
};
use hardware::filter_wheel::FilterWheelClient;

use crate::error::CaptureError;
use crate::fits::{write_fits, FitsHeader};
use crate::request::{ExposureMode, ExposureRequest, ValidatedExposure};
use crate::sequencer::FileSequencer;
use crate::token::CancellationToken;

/// Timing knobs for the capture loop. Tests shrink these.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// How often the wait loop checks the cancellation token.
    pub poll_interval: Duration,
    /// Pause between the exposure ending and readout, letting the device
    /// finish its internal transfer.
    pub settle_delay: Duration,
    /// Driver-level exposure used in Real Time mode; the run-till-abort
    /// hardware path only behaves with a short fixed frame time.
    pub realtime_exposure_secs: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(500),
            realtime_exposure_secs: 1.0,
        }
    }
}

/// Where the controller is in the capture lifecycle.
///
/// Terminal states are reported to the caller and then collapse back to
/// `Idle` before the next request is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionState {
    Idle,
    Configuring,
    Exposing,
    Reading,
    Succeeded,
    Aborted,
    Failed,
}

/// Outcome class of a capture, with its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Success,
    Aborted,
    Failed,
}

impl CaptureStatus {
    pub fn code(&self) -> u8 {
        match self {
            CaptureStatus::Success => 0,
            CaptureStatus::Aborted => 1,
            CaptureStatus::Failed => 2,
        }
    }
}

/// What a finished capture reports back.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub status: CaptureStatus,
    /// File name of the written image, when one was written.
    pub filename: Option<String>,
    /// Server-relative URL the image is served at.
    pub url: Option<String>,
    pub message: String,
}

/// Serializes captures over one camera session.
pub struct AcquisitionController<D: CameraDriver> {
    session: Mutex<CameraSession<D>>,
    state: Mutex<AcquisitionState>,
    /// Token of the in-flight capture, if any.
    abort_token: Mutex<Option<CancellationToken>>,
    wheel: Option<FilterWheelClient>,
    sequencer: FileSequencer,
    config: ControllerConfig,
}

/// A panicked capture thread must not wedge the controller; its locks stay
/// usable after poisoning.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D: CameraDriver> AcquisitionController<D> {
    pub fn new(
        session: CameraSession<D>,
        sequencer: FileSequencer,
        wheel: Option<FilterWheelClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            state: Mutex::new(AcquisitionState::Idle),
            abort_token: Mutex::new(None),
            wheel,
            sequencer,
            config,
        }
    }

    /// Initialize the camera and, when a target is given, start cooling.
    pub fn startup(&self, cooling_target: Option<f64>) -> Result<(), CaptureError> {
        let mut session = lock_recovering(&self.session);
        session.initialize()?;
        if let Some(target) = cooling_target {
            session.enable_cooling(target)?;
        }
        Ok(())
    }

    /// Warm the sensor and release the driver.
    pub fn shutdown(&self) -> Result<(), CaptureError> {
        let mut session = lock_recovering(&self.session);
        if let Err(e) = session.disable_cooling() {
            warn!(error = %e, "could not disable cooling during shutdown");
        }
        session.shutdown()?;
        Ok(())
    }

    pub fn state(&self) -> AcquisitionState {
        *lock_recovering(&self.state)
    }

    fn set_state(&self, state: AcquisitionState) {
        *lock_recovering(&self.state) = state;
    }

    /// Raise the in-flight capture's cancellation token.
    ///
    /// Returns false when nothing is in flight; aborting an idle controller
    /// is not an error.
    pub fn abort(&self) -> bool {
        match lock_recovering(&self.abort_token).as_ref() {
            Some(token) => {
                token.raise();
                info!("abort requested");
                true
            }
            None => false,
        }
    }

    /// Non-blocking session grab; only an actually held lock reads as busy.
    fn try_session(&self) -> Option<MutexGuard<'_, CameraSession<D>>> {
        match self.session.try_lock() {
            Ok(session) => Some(session),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Sensor temperature, or None while a capture holds the session.
    pub fn temperature(&self) -> Option<f64> {
        let session = self.try_session()?;
        session.temperature().ok()
    }

    pub fn set_target_temperature(&self, celsius: f64) -> Result<(), CaptureError> {
        let mut session = self.try_session().ok_or(CaptureError::DeviceBusy)?;
        session.set_target_temperature(celsius)?;
        Ok(())
    }

    /// Run one capture end to end. Blocks for the full exposure; call from a
    /// blocking-capable context.
    pub fn capture(&self, request: &ExposureRequest) -> Result<CaptureResult, CaptureError> {
        // Validation issues no device commands, so a bad request is rejected
        // before the exclusivity claim.
        let validated = request.validate()?;

        // The token is registered inside the claim's critical section, so an
        // abort arriving at any point after the claim finds it raisable.
        let token = CancellationToken::new();
        {
            let mut state = lock_recovering(&self.state);
            if *state != AcquisitionState::Idle {
                return Err(CaptureError::DeviceBusy);
            }
            *state = AcquisitionState::Configuring;
            *lock_recovering(&self.abort_token) = Some(token.clone());
        }

        let mut session = lock_recovering(&self.session);
        let outcome = self.run_acquisition(&mut session, &validated, &token);

        // The shutter is left closed no matter how the capture ended.
        if let Err(e) = session.set_shutter(ShutterState::Closed) {
            warn!(error = %e, "could not close shutter after capture");
        }
        drop(session);
        *lock_recovering(&self.abort_token) = None;

        let result = match outcome {
            Ok(result) => result,
            Err(CaptureError::Aborted) => CaptureResult {
                status: CaptureStatus::Aborted,
                filename: None,
                url: None,
                message: "capture aborted".to_string(),
            },
            Err(e) => {
                warn!(error = %e, "capture failed");
                self.set_state(AcquisitionState::Failed);
                CaptureResult {
                    status: CaptureStatus::Failed,
                    filename: None,
                    url: None,
                    message: format!("capture failed: {e}"),
                }
            }
        };

        self.set_state(AcquisitionState::Idle);
        Ok(result)
    }

    fn run_acquisition(
        &self,
        session: &mut CameraSession<D>,
        exposure: &ValidatedExposure,
        token: &CancellationToken,
    ) -> Result<CaptureResult, CaptureError> {
        info!(
            kind = exposure.kind.label(),
            mode = exposure.mode.label(),
            duration_secs = exposure.duration_secs,
            frames = exposure.series_count,
            filter = %exposure.filter_name,
            "starting capture"
        );

        if let Some(wheel) = &self.wheel {
            if wheel.get_position()? != exposure.filter_position {
                wheel.move_to(exposure.filter_position)?;
            }
        }
        if token.is_raised() {
            self.set_state(AcquisitionState::Aborted);
            return Err(CaptureError::Aborted);
        }

        let shutter = if exposure.kind.needs_light() {
            ShutterState::Open
        } else {
            ShutterState::Closed
        };
        let (mode, driver_exposure) = match exposure.mode {
            ExposureMode::Single => (AcquisitionMode::Single, exposure.duration_secs),
            ExposureMode::RealTime => (
                AcquisitionMode::RunTillAbort,
                self.config.realtime_exposure_secs,
            ),
            ExposureMode::Series => (AcquisitionMode::Kinetics, exposure.duration_secs),
        };
        session.configure(&ExposureSettings {
            shutter,
            mode,
            exposure_secs: driver_exposure,
            kinetic_count: Some(exposure.series_count),
        })?;

        self.set_state(AcquisitionState::Exposing);
        session.start_exposure()?;

        // The requested duration governs the wait even where the driver
        // exposure differs; a series waits out every frame.
        let total = Duration::from_secs_f64(
            exposure.duration_secs * f64::from(exposure.series_count),
        );
        if !self.wait_for_exposure(total, token) {
            session.abort_exposure()?;
            self.set_state(AcquisitionState::Aborted);
            return Err(CaptureError::Aborted);
        }

        std::thread::sleep(self.config.settle_delay);
        if token.is_raised() {
            session.abort_exposure()?;
            self.set_state(AcquisitionState::Aborted);
            return Err(CaptureError::Aborted);
        }

        self.set_state(AcquisitionState::Reading);
        if matches!(exposure.mode, ExposureMode::RealTime) {
            session.abort_exposure()?;
        }
        let frame = session.read_frame()?;
        let temperature = session.temperature().unwrap_or(-999.0);

        self.set_state(AcquisitionState::Succeeded);
        Ok(self.persist(exposure, &frame, temperature))
    }

    /// Sleep out the exposure in short slices, checking the token each time.
    /// Returns false when the capture was cancelled.
    fn wait_for_exposure(&self, total: Duration, token: &CancellationToken) -> bool {
        let started = Instant::now();
        loop {
            if token.is_raised() {
                return false;
            }
            let elapsed = started.elapsed();
            if elapsed >= total {
                return true;
            }
            std::thread::sleep((total - elapsed).min(self.config.poll_interval));
        }
    }

    /// Write the frame out. A write failure does not demote the capture; it
    /// is reported in the message with no filename.
    fn persist(
        &self,
        exposure: &ValidatedExposure,
        frame: &ndarray::Array2<u16>,
        temperature: f64,
    ) -> CaptureResult {
        let date = Utc::now().date_naive();
        let path = match &exposure.requested_name {
            Some(name) => self.sequencer.named_path(date, name),
            None => self.sequencer.next_path(date),
        };

        let written = path.and_then(|path| {
            let header = self.build_header(exposure, temperature);
            write_fits(&path, frame, &header)?;
            Ok(path)
        });

        match written {
            Ok(path) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let url = self.url_for(&path);
                info!(file = %path.display(), "image written");
                CaptureResult {
                    status: CaptureStatus::Success,
                    filename: Some(filename),
                    url: Some(url),
                    message: "success".to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "image write failed");
                CaptureResult {
                    status: CaptureStatus::Success,
                    filename: None,
                    url: None,
                    message: format!("capture succeeded but writing the image failed: {e}"),
                }
            }
        }
    }

    fn build_header(&self, exposure: &ValidatedExposure, temperature: f64) -> FitsHeader {
        let mut header = FitsHeader::new();
        header.set_float("EXPTIME", exposure.duration_secs, "requested exposure [s]");
        header.set_string("EXPTYPE", exposure.mode.label(), "exposure mode");
        header.set_string("IMAGETYP", exposure.kind.label(), "frame type");
        header.set_string("FILTER", &exposure.filter_name, "filter name");
        header.set_float("CCD-TEMP", temperature, "sensor temperature [C]");
        header.set_string(
            "DATE-OBS",
            &Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            "UTC at readout",
        );
        if exposure.series_count > 1 {
            header.set_int("EXPNUM", i64::from(exposure.series_count), "frames in series");
        }
        if let Some(offset) = exposure.focus_offset {
            header.set_float("FOCUSOFF", offset, "focus offset from comment");
        }
        if !exposure.comment.is_empty() {
            header.add_comment(&exposure.comment);
        }
        header
    }

    /// URL the static file layer serves the image at.
    fn url_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(self.sequencer.root()).unwrap_or(path);
        format!("/files/{}", relative.display())
    }
}
