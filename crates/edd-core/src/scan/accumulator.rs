use super::rows::{PeakRow, ROW_WIDTH, peak_dataset_name, uncertainty_dataset_name};
use crate::domain::{Detector, EddError, EddResult, StoreResult};
use crate::store::{ResultStore, join_path};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
struct PeakBuffers {
    values: Vec<PeakRow>,
    uncertainties: Vec<PeakRow>,
}

/// Per-peak row buffers of one scan, `2 * points` rows each.
///
/// Row `2k` belongs to the horizontal detector and `2k + 1` to the vertical
/// one. Recording the same `(peak, point, detector)` again overwrites.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakAccumulator {
    points: usize,
    peaks: BTreeMap<usize, PeakBuffers>,
}

impl PeakAccumulator {
    pub fn new(points: usize, peak_count: usize) -> Self {
        let peaks = (0..peak_count)
            .map(|peak| {
                let buffers = PeakBuffers {
                    values: vec![[0.0; ROW_WIDTH]; 2 * points],
                    uncertainties: vec![[0.0; ROW_WIDTH]; 2 * points],
                };
                (peak, buffers)
            })
            .collect();
        Self { points, peaks }
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }

    pub fn record(
        &mut self,
        peak: usize,
        point: usize,
        detector: Detector,
        value: PeakRow,
        uncertainty: PeakRow,
    ) -> EddResult<()> {
        if point >= self.points {
            return Err(EddError::internal(
                "RUN.POINT_INDEX",
                format!("point {point} is outside a scan of {} points", self.points),
            ));
        }
        let buffers = self.peaks.get_mut(&peak).ok_or_else(|| {
            EddError::internal("RUN.PEAK_INDEX", format!("peak {peak} has no row buffer"))
        })?;
        let row = detector.row_for_point(point);
        buffers.values[row] = value;
        buffers.uncertainties[row] = uncertainty;
        Ok(())
    }

    pub fn values(&self, peak: usize) -> Option<&[PeakRow]> {
        self.peaks.get(&peak).map(|buffers| buffers.values.as_slice())
    }

    pub fn uncertainties(&self, peak: usize) -> Option<&[PeakRow]> {
        self.peaks
            .get(&peak)
            .map(|buffers| buffers.uncertainties.as_slice())
    }

    /// Writes `peak_XXXX` and `uncertaintyPeak_XXXX` for every peak under
    /// `group`.
    pub fn flush<S: ResultStore + ?Sized>(&self, store: &mut S, group: &str) -> StoreResult<()> {
        store.ensure_group(group)?;
        let shape = [2 * self.points, ROW_WIDTH];
        for (peak, buffers) in &self.peaks {
            store.write_f64(
                &join_path(group, &peak_dataset_name(*peak)),
                &shape,
                buffers.values.as_flattened(),
            )?;
            store.write_f64(
                &join_path(group, &uncertainty_dataset_name(*peak)),
                &shape,
                buffers.uncertainties.as_flattened(),
            )?;
        }
        Ok(())
    }
}
