//! Capture request wire types and validation.

use serde::Deserialize;

use hardware::filter_wheel::position_for_name;

use crate::error::CaptureError;

/// Longest exposure accepted, in seconds.
const MAX_EXPOSURE_SECS: f64 = 3600.0;

/// How a capture runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ExposureMode {
    Single,
    #[serde(rename = "Real Time", alias = "RealTime")]
    RealTime,
    Series,
}

/// What kind of frame is being taken. Bias and Dark keep the shutter closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Bias,
    Dark,
    Flat,
    Object,
}

impl ImageKind {
    /// FITS IMAGETYP keyword value.
    pub fn label(&self) -> &'static str {
        match self {
            ImageKind::Bias => "bias",
            ImageKind::Dark => "dark",
            ImageKind::Flat => "flat",
            ImageKind::Object => "object",
        }
    }

    pub fn needs_light(&self) -> bool {
        matches!(self, ImageKind::Flat | ImageKind::Object)
    }
}

impl ExposureMode {
    pub fn label(&self) -> &'static str {
        match self {
            ExposureMode::Single => "Single",
            ExposureMode::RealTime => "Real Time",
            ExposureMode::Series => "Series",
        }
    }
}

/// A capture request as it arrives over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ExposureRequest {
    /// Requested exposure duration in seconds.
    pub exptime: f64,
    pub exptype: ExposureMode,
    pub imgtype: ImageKind,
    /// Filter name; must be one of the mounted filters.
    pub filtype: String,
    /// Free-form observer comment. May embed `focus:<n>` or `focus=<n>`.
    #[serde(default)]
    pub comment: String,
    /// Number of frames; required for Series.
    pub expnum: Option<u32>,
    /// Optional requested file name; unsafe names fall back to the
    /// auto-sequenced default.
    pub filename: Option<String>,
}

/// A request that has passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedExposure {
    pub kind: ImageKind,
    pub mode: ExposureMode,
    pub duration_secs: f64,
    /// Frame count; 1 except for Series.
    pub series_count: u32,
    /// Wheel position of the requested filter.
    pub filter_position: u8,
    pub filter_name: String,
    pub comment: String,
    pub focus_offset: Option<f64>,
    pub requested_name: Option<String>,
}

impl ExposureRequest {
    /// Validate without touching any device.
    pub fn validate(&self) -> Result<ValidatedExposure, CaptureError> {
        if !self.exptime.is_finite() || self.exptime <= 0.0 || self.exptime > MAX_EXPOSURE_SECS {
            return Err(CaptureError::InvalidParameter(format!(
                "exptime must be in (0, {MAX_EXPOSURE_SECS}] seconds, got {}",
                self.exptime
            )));
        }

        let filter_position = position_for_name(&self.filtype).ok_or_else(|| {
            CaptureError::InvalidParameter(format!("unknown filter {:?}", self.filtype))
        })?;

        let series_count = match self.exptype {
            ExposureMode::Series => match self.expnum {
                Some(n) if n >= 1 => n,
                Some(n) => {
                    return Err(CaptureError::InvalidParameter(format!(
                        "expnum must be at least 1, got {n}"
                    )))
                }
                None => {
                    return Err(CaptureError::InvalidParameter(
                        "expnum is required for a Series exposure".to_string(),
                    ))
                }
            },
            // expnum on a non-series request is ignored.
            _ => 1,
        };

        Ok(ValidatedExposure {
            kind: self.imgtype,
            mode: self.exptype,
            duration_secs: self.exptime,
            series_count,
            filter_position,
            filter_name: self.filtype.clone(),
            comment: self.comment.clone(),
            focus_offset: parse_focus_offset(&self.comment),
            requested_name: self.filename.clone(),
        })
    }
}

/// Extract a focus offset embedded in a comment as `focus:<n>` or
/// `focus=<n>`. Returns the first well-formed occurrence.
pub fn parse_focus_offset(comment: &str) -> Option<f64> {
    let lower = comment.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(found) = lower[search_from..].find("focus") {
        let after = search_from + found + "focus".len();
        let rest = comment[after..].trim_start();
        if let Some(rest) = rest.strip_prefix([':', '=']) {
            let rest = rest.trim_start();
            let end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
                .unwrap_or(rest.len());
            if let Ok(value) = rest[..end].parse::<f64>() {
                return Some(value);
            }
        }
        search_from = after;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> ExposureRequest {
        ExposureRequest {
            exptime: 2.0,
            exptype: ExposureMode::Single,
            imgtype: ImageKind::Object,
            filtype: "V".to_string(),
            comment: String::new(),
            expnum: None,
            filename: None,
        }
    }

    #[test]
    fn test_valid_single() {
        let v = base_request().validate().unwrap();
        assert_eq!(v.series_count, 1);
        assert_eq!(v.filter_position, 3);
        assert!(v.focus_offset.is_none());
    }

    #[test]
    fn test_rejects_bad_exptime() {
        for bad in [0.0, -1.0, 3600.1, f64::NAN] {
            let mut r = base_request();
            r.exptime = bad;
            assert!(matches!(
                r.validate(),
                Err(CaptureError::InvalidParameter(_))
            ));
        }
        let mut r = base_request();
        r.exptime = 3600.0;
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_filter() {
        let mut r = base_request();
        r.filtype = "Lum".to_string();
        assert!(matches!(
            r.validate(),
            Err(CaptureError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_series_requires_expnum() {
        let mut r = base_request();
        r.exptype = ExposureMode::Series;
        assert!(r.validate().is_err());
        r.expnum = Some(0);
        assert!(r.validate().is_err());
        r.expnum = Some(5);
        assert_eq!(r.validate().unwrap().series_count, 5);
    }

    #[test]
    fn test_expnum_ignored_outside_series() {
        let mut r = base_request();
        r.expnum = Some(7);
        assert_eq!(r.validate().unwrap().series_count, 1);
    }

    #[test]
    fn test_wire_names() {
        let json = r#"{
            "exptime": 1.5,
            "exptype": "Real Time",
            "imgtype": "dark",
            "filtype": "Ha"
        }"#;
        let r: ExposureRequest = serde_json::from_str(json).unwrap();
        assert_eq!(r.exptype, ExposureMode::RealTime);
        assert_eq!(r.imgtype, ImageKind::Dark);
        assert!(r.comment.is_empty());
    }

    #[test]
    fn test_focus_offset_parsing() {
        assert_eq!(parse_focus_offset("focus:12.5"), Some(12.5));
        assert_eq!(parse_focus_offset("refocused, focus = -3"), Some(-3.0));
        assert_eq!(parse_focus_offset("Focus:100 then clouds"), Some(100.0));
        assert_eq!(parse_focus_offset("focus drifted overnight"), None);
        assert_eq!(parse_focus_offset("focus:"), None);
        assert_eq!(parse_focus_offset(""), None);
    }
}
