//! Raw detector patterns and positioner series of a scan.

#[cfg(feature = "hdf5")]
pub mod hdf5;

use crate::domain::{ConfigResult, EddError, EddResult, ScanId};
use std::collections::BTreeMap;

/// Row-major `(points, channels)` block of patterns for one detector.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternBlock {
    points: usize,
    channels: usize,
    data: Vec<f64>,
}

impl PatternBlock {
    pub fn new(points: usize, channels: usize, data: Vec<f64>) -> ConfigResult<Self> {
        if points == 0 || channels == 0 {
            return Err(EddError::configuration(
                "INPUT.PATTERN_SHAPE",
                format!("detector pattern has empty shape ({points}, {channels})"),
            ));
        }
        if data.len() != points * channels {
            return Err(EddError::configuration(
                "INPUT.PATTERN_SHAPE",
                format!(
                    "detector pattern holds {} samples, expected {points} x {channels}",
                    data.len()
                ),
            ));
        }
        Ok(Self {
            points,
            channels,
            data,
        })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> ConfigResult<Self> {
        let channels = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != channels) {
            return Err(EddError::configuration(
                "INPUT.PATTERN_SHAPE",
                "detector pattern rows have different lengths",
            ));
        }
        Self::new(rows.len(), channels, rows.concat())
    }

    /// Interprets an n-dimensional dataset as patterns.
    ///
    /// 1-D data is a single point, 2-D data is `(points, channels)` and 3-D
    /// data `(points, elements, channels)` needs `slice_index` to pick the
    /// element.
    pub fn from_array(
        shape: &[usize],
        data: Vec<f64>,
        slice_index: Option<usize>,
    ) -> ConfigResult<Self> {
        match (shape, slice_index) {
            ([channels], None) => Self::new(1, *channels, data),
            ([points, channels], None) => Self::new(*points, *channels, data),
            ([points, elements, channels], Some(index)) => {
                if index >= *elements {
                    return Err(EddError::configuration(
                        "INPUT.DETECTOR_SLICE",
                        format!("detector slice index {index} is out of range for {elements} elements"),
                    ));
                }
                if data.len() != points * elements * channels {
                    return Err(EddError::configuration(
                        "INPUT.PATTERN_SHAPE",
                        format!("detector dataset holds {} samples, expected {shape:?}", data.len()),
                    ));
                }
                let selected = data
                    .chunks_exact(elements * channels)
                    .flat_map(|point| &point[index * channels..(index + 1) * channels])
                    .copied()
                    .collect();
                Self::new(*points, *channels, selected)
            }
            ([_, _, _], None) => Err(EddError::configuration(
                "INPUT.DETECTOR_SLICE",
                format!("detector dataset of shape {shape:?} requires detectorSliceIndex"),
            )),
            (_, Some(index)) if shape.len() < 3 => Err(EddError::configuration(
                "INPUT.DETECTOR_SLICE",
                format!("detectorSliceIndex {index} given for a dataset of shape {shape:?}"),
            )),
            _ => Err(EddError::configuration(
                "INPUT.PATTERN_SHAPE",
                format!("unsupported detector dataset shape {shape:?}"),
            )),
        }
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn row(&self, point: usize) -> &[f64] {
        &self.data[point * self.channels..(point + 1) * self.channels]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.points, self.channels]
    }
}

/// Reads raw scan data. Detector and positioner names are the configured
/// dataset names.
pub trait PatternSource {
    fn read_pattern(
        &self,
        scan: &ScanId,
        detector: &str,
        slice_index: Option<usize>,
    ) -> EddResult<PatternBlock>;

    /// One value per point, or a single value shared by every point.
    fn read_positioner(&self, scan: &ScanId, name: &str) -> EddResult<Vec<f64>>;
}

#[derive(Debug, Clone, PartialEq)]
struct StoredArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// In-memory [`PatternSource`] keyed by scan group name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    detectors: BTreeMap<(String, String), StoredArray>,
    positioners: BTreeMap<(String, String), Vec<f64>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pattern(&mut self, scan: &ScanId, detector: &str, rows: Vec<Vec<f64>>) {
        let shape = vec![rows.len(), rows.first().map_or(0, Vec::len)];
        self.insert_array(scan, detector, shape, rows.concat());
    }

    pub fn insert_array(&mut self, scan: &ScanId, detector: &str, shape: Vec<usize>, data: Vec<f64>) {
        self.detectors.insert(
            (scan.group_name(), detector.to_string()),
            StoredArray { shape, data },
        );
    }

    pub fn insert_positioner(&mut self, scan: &ScanId, name: &str, values: Vec<f64>) {
        self.positioners
            .insert((scan.group_name(), name.to_string()), values);
    }
}

impl PatternSource for MemorySource {
    fn read_pattern(
        &self,
        scan: &ScanId,
        detector: &str,
        slice_index: Option<usize>,
    ) -> EddResult<PatternBlock> {
        let stored = self
            .detectors
            .get(&(scan.group_name(), detector.to_string()))
            .ok_or_else(|| missing_input(scan, "detector", detector))?;
        PatternBlock::from_array(&stored.shape, stored.data.clone(), slice_index)
    }

    fn read_positioner(&self, scan: &ScanId, name: &str) -> EddResult<Vec<f64>> {
        self.positioners
            .get(&(scan.group_name(), name.to_string()))
            .cloned()
            .ok_or_else(|| missing_input(scan, "positioner", name))
    }
}

pub(crate) fn missing_input(scan: &ScanId, kind: &str, name: &str) -> EddError {
    EddError::configuration(
        "INPUT.MISSING_DATASET",
        format!("{kind} '{name}' not found in scan {scan}"),
    )
}

#[cfg(test)]
mod tests {
    use super::{MemorySource, PatternBlock, PatternSource};
    use crate::domain::ScanId;

    #[test]
    fn one_dimensional_data_is_a_single_point() {
        let block = PatternBlock::from_array(&[4], vec![1.0, 2.0, 3.0, 4.0], None)
            .expect("1-D pattern");
        assert_eq!(block.shape(), [1, 4]);
        assert_eq!(block.row(0), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn slice_index_selects_one_element_of_3d_data() {
        // (points=2, elements=2, channels=3)
        let data = vec![
            0.0, 1.0, 2.0, 10.0, 11.0, 12.0, //
            3.0, 4.0, 5.0, 13.0, 14.0, 15.0,
        ];
        let block = PatternBlock::from_array(&[2, 2, 3], data.clone(), Some(1))
            .expect("sliced pattern");
        assert_eq!(block.row(0), &[10.0, 11.0, 12.0]);
        assert_eq!(block.row(1), &[13.0, 14.0, 15.0]);

        let missing = PatternBlock::from_array(&[2, 2, 3], data.clone(), None)
            .expect_err("3-D data needs a slice");
        assert_eq!(missing.code(), "INPUT.DETECTOR_SLICE");
        let outside = PatternBlock::from_array(&[2, 2, 3], data, Some(2))
            .expect_err("slice out of range");
        assert_eq!(outside.code(), "INPUT.DETECTOR_SLICE");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let error = PatternBlock::from_rows(&[vec![1.0, 2.0], vec![3.0]])
            .expect_err("ragged rows");
        assert_eq!(error.code(), "INPUT.PATTERN_SHAPE");
    }

    #[test]
    fn memory_source_reports_missing_datasets() {
        let scan = ScanId::new("s", "d", 1);
        let mut source = MemorySource::new();
        source.insert_pattern(&scan, "falconx_det0", vec![vec![1.0, 2.0, 3.0]]);
        source.insert_positioner(&scan, "eta", vec![0.5]);

        assert_eq!(
            source
                .read_pattern(&scan, "falconx_det0", None)
                .expect("pattern")
                .channels(),
            3
        );
        assert_eq!(source.read_positioner(&scan, "eta").expect("positioner"), vec![0.5]);
        let error = source
            .read_positioner(&scan, "phi")
            .expect_err("missing positioner");
        assert_eq!(error.code(), "INPUT.MISSING_DATASET");
    }
}
