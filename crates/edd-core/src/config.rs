//! JSON fit configuration, keyed like the EDD processing tools.

use crate::domain::{ConfigResult, DetectorPair, EddError, ScanId};
use crate::fitting::{BoxLayout, PseudoVoigtFitter};
use crate::numerics::LevMarSettings;
use crate::scan::parse_scan_numbers;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FitEddConfig {
    #[serde(rename = "fileRead")]
    pub file_read: PathBuf,
    #[serde(rename = "fileSave")]
    pub file_save: PathBuf,
    pub sample: String,
    pub dataset: DatasetName,
    #[serde(rename = "scanNumber")]
    pub scan_number: Value,
    #[serde(rename = "nameHorizontalDetector")]
    pub name_horizontal_detector: String,
    #[serde(rename = "nameVerticalDetector")]
    pub name_vertical_detector: String,
    #[serde(default)]
    pub positioners: Vec<String>,
    #[serde(rename = "nbPeaksInBoxes")]
    pub nb_peaks_in_boxes: Vec<usize>,
    #[serde(rename = "nbPeaksInBoxesVD", default)]
    pub nb_peaks_in_boxes_vd: Option<Vec<usize>>,
    #[serde(rename = "rangeFitHD")]
    pub range_fit_hd: Vec<i64>,
    #[serde(rename = "rangeFitVD")]
    pub range_fit_vd: Vec<i64>,
    /// Integer, `null` or `[]`; the last two mean no slicing.
    #[serde(rename = "detectorSliceIndex", default)]
    pub detector_slice_index: Value,
    #[serde(rename = "fitOptions", default)]
    pub fit_options: FitOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetName {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for DatasetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct FitOptions {
    #[serde(rename = "maxIterations", default)]
    pub max_iterations: Option<usize>,
    #[serde(rename = "relativeTolerance", default)]
    pub relative_tolerance: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read fit configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse fit configuration '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ConfigLoadError> for EddError {
    fn from(error: ConfigLoadError) -> Self {
        let code = match &error {
            ConfigLoadError::Read { .. } => "INPUT.CONFIG_READ",
            ConfigLoadError::Parse { .. } => "INPUT.CONFIG_PARSE",
        };
        EddError::configuration(code, error.to_string())
    }
}

impl FitEddConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&source).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates everything that can be checked without reading data.
    pub fn into_job(self) -> ConfigResult<FitJob> {
        let scans = parse_scan_numbers(&self.scan_number)?;

        if let Some(vertical) = &self.nb_peaks_in_boxes_vd {
            if vertical != &self.nb_peaks_in_boxes {
                return Err(EddError::configuration(
                    "INPUT.PEAK_TOPOLOGY_MISMATCH",
                    format!(
                        "nbPeaksInBoxesVD {:?} differs from nbPeaksInBoxes {:?}; both detectors must share one peak index",
                        vertical, self.nb_peaks_in_boxes
                    ),
                ));
            }
        }
        let layout = BoxLayout::new(&self.nb_peaks_in_boxes, &self.range_fit_hd, &self.range_fit_vd)?;
        let slice_index = parse_slice_index(&self.detector_slice_index)?;
        let settings = self.fit_options.settings()?;

        for (key, name) in [
            ("nameHorizontalDetector", &self.name_horizontal_detector),
            ("nameVerticalDetector", &self.name_vertical_detector),
        ] {
            if name.trim().is_empty() {
                return Err(EddError::configuration(
                    "INPUT.DETECTOR_NAME",
                    format!("{key} must not be empty"),
                ));
            }
        }

        Ok(FitJob {
            plan: FitPlan {
                input_file: self.file_read,
                output_file: self.file_save,
                sample: self.sample,
                dataset: self.dataset.to_string(),
                detectors: DetectorPair::new(
                    self.name_horizontal_detector,
                    self.name_vertical_detector,
                ),
                positioners: self.positioners,
                layout,
                slice_index,
                settings,
            },
            scans,
        })
    }
}

impl FitOptions {
    fn settings(&self) -> ConfigResult<LevMarSettings> {
        let mut settings = LevMarSettings::default();
        if let Some(max_iterations) = self.max_iterations {
            if max_iterations == 0 {
                return Err(EddError::configuration(
                    "INPUT.FIT_OPTIONS",
                    "fitOptions.maxIterations must be positive",
                ));
            }
            settings.max_iterations = max_iterations;
        }
        if let Some(tolerance) = self.relative_tolerance {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                return Err(EddError::configuration(
                    "INPUT.FIT_OPTIONS",
                    format!("fitOptions.relativeTolerance {tolerance} must be a positive number"),
                ));
            }
            settings.relative_tolerance = tolerance;
        }
        Ok(settings)
    }
}

fn parse_slice_index(value: &Value) -> ConfigResult<Option<usize>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) if items.is_empty() => Ok(None),
        Value::Number(number) => number
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .map(Some)
            .ok_or_else(|| invalid_slice(value)),
        _ => Err(invalid_slice(value)),
    }
}

fn invalid_slice(value: &Value) -> EddError {
    EddError::configuration(
        "INPUT.DETECTOR_SLICE",
        format!("detectorSliceIndex {value} must be a non-negative integer, null or []"),
    )
}

/// Settings shared by every scan of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitPlan {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub sample: String,
    pub dataset: String,
    pub detectors: DetectorPair<String>,
    pub positioners: Vec<String>,
    pub layout: BoxLayout,
    pub slice_index: Option<usize>,
    pub settings: LevMarSettings,
}

impl FitPlan {
    pub fn scan_id(&self, scan_number: u32) -> ScanId {
        ScanId::new(self.sample.clone(), self.dataset.clone(), scan_number)
    }

    pub fn fitter(&self) -> PseudoVoigtFitter {
        PseudoVoigtFitter::new(self.settings)
    }
}

/// A validated plan and the scans it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct FitJob {
    pub plan: FitPlan,
    pub scans: Vec<u32>,
}
