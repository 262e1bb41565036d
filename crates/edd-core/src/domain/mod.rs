pub mod errors;

pub use errors::{ConfigResult, EddError, EddErrorCategory, EddResult, StoreResult};

use std::fmt::{Display, Formatter};

/// The two EDD detectors. Both see the same sample volume from
/// perpendicular directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Detector {
    Horizontal,
    Vertical,
}

impl Detector {
    pub const ALL: [Detector; 2] = [Detector::Horizontal, Detector::Vertical];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }

    /// Short label used in dataset names (`fitParamsHD`, `rangeFitVD`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Horizontal => "HD",
            Self::Vertical => "VD",
        }
    }

    /// Name of the raw pattern dataset under `rawData_<dataset>_<scan>`.
    pub const fn raw_dataset_name(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontalDetector",
            Self::Vertical => "verticalDetector",
        }
    }

    /// Azimuthal offset of the scattering vector in degrees.
    pub const fn offset_degrees(self) -> f64 {
        match self {
            Self::Horizontal => -90.0,
            Self::Vertical => 0.0,
        }
    }

    /// Row of point `k` inside a peak time-series dataset.
    pub const fn row_for_point(self, point: usize) -> usize {
        match self {
            Self::Horizontal => 2 * point,
            Self::Vertical => 2 * point + 1,
        }
    }
}

impl Display for Detector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// A value held once per detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectorPair<T> {
    pub horizontal: T,
    pub vertical: T,
}

impl<T> DetectorPair<T> {
    pub fn new(horizontal: T, vertical: T) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn get(&self, detector: Detector) -> &T {
        match detector {
            Detector::Horizontal => &self.horizontal,
            Detector::Vertical => &self.vertical,
        }
    }

    pub fn get_mut(&mut self, detector: Detector) -> &mut T {
        match detector {
            Detector::Horizontal => &mut self.horizontal,
            Detector::Vertical => &mut self.vertical,
        }
    }

    pub fn as_ref(&self) -> DetectorPair<&T> {
        DetectorPair {
            horizontal: &self.horizontal,
            vertical: &self.vertical,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Detector, T) -> U) -> DetectorPair<U> {
        DetectorPair {
            horizontal: f(Detector::Horizontal, self.horizontal),
            vertical: f(Detector::Vertical, self.vertical),
        }
    }

    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(Detector, T) -> Result<U, E>,
    ) -> Result<DetectorPair<U>, E> {
        Ok(DetectorPair {
            horizontal: f(Detector::Horizontal, self.horizontal)?,
            vertical: f(Detector::Vertical, self.vertical)?,
        })
    }
}

/// Identity of one processed scan: `<sample>_<dataset>_<scan>.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanId {
    pub sample: String,
    pub dataset: String,
    pub scan_number: u32,
}

impl ScanId {
    pub fn new(sample: impl Into<String>, dataset: impl Into<String>, scan_number: u32) -> Self {
        Self {
            sample: sample.into(),
            dataset: dataset.into(),
            scan_number,
        }
    }

    pub fn group_name(&self) -> String {
        format!("{}_{}_{}.1", self.sample, self.dataset, self.scan_number)
    }

    pub fn raw_data_group_name(&self) -> String {
        format!("rawData_{}_{}", self.dataset, self.scan_number)
    }
}

impl Display for ScanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.group_name())
    }
}
