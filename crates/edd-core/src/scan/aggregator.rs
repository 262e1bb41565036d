use super::accumulator::PeakAccumulator;
use super::diagnostics::StoreDiagnostics;
use super::positioners::{PositionerOverflow, PositionerTable, partition_positioners};
use super::rows::{info_peak_text, peak_row};
use crate::config::FitPlan;
use crate::domain::{Detector, DetectorPair, EddError, EddResult, ScanId, StoreResult};
use crate::fitting::{PeakFitter, fit_all_peaks};
use crate::source::{PatternBlock, PatternSource};
use crate::store::{ResultStore, join_path};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const POSITIONERS_GROUP: &str = "positioners";
pub const FIT_GROUP: &str = "fit";
pub const PEAKS_GROUP: &str = "tthPositionsGroup";
pub const INFO_PEAK: &str = "infoPeak";
pub const FIT_INFO_GROUP: &str = "infos";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFitReport {
    pub scan: String,
    pub scan_number: u32,
    pub points: usize,
    pub channels: [usize; 2],
    pub total_peaks: usize,
    pub box_fits: usize,
    pub failed_box_fits: usize,
    pub positioner_overflow: Option<PositionerOverflow>,
}

/// Inputs of one scan, read and checked before anything is written.
struct ScanInputs {
    patterns: DetectorPair<PatternBlock>,
    positioners: PositionerTable,
    overflow: Option<PositionerOverflow>,
}

fn read_inputs<Src: PatternSource + ?Sized>(
    plan: &FitPlan,
    scan: &ScanId,
    source: &Src,
) -> EddResult<ScanInputs> {
    let patterns = plan
        .detectors
        .as_ref()
        .try_map(|_, name| source.read_pattern(scan, name, plan.slice_index))?;
    let points = patterns.horizontal.points();
    if patterns.vertical.points() != points {
        return Err(EddError::configuration(
            "INPUT.PATTERN_SHAPE",
            format!(
                "horizontal detector has {} points, vertical detector has {}",
                points,
                patterns.vertical.points()
            ),
        ));
    }
    for detector in Detector::ALL {
        plan.layout
            .check_channels(detector, patterns.get(detector).channels())?;
    }

    let (kept, overflow) = partition_positioners(&plan.positioners);
    let mut positioners = PositionerTable::new(points);
    for name in &kept {
        positioners.push(name, source.read_positioner(scan, name)?)?;
    }

    Ok(ScanInputs {
        patterns,
        positioners,
        overflow,
    })
}

/// Fits every point of one scan and writes the results under
/// `<sample>_<dataset>_<scan>.1`.
///
/// All configuration and input checks run before the first write.
pub fn fit_scan<Src, St, F>(
    plan: &FitPlan,
    scan_number: u32,
    source: &Src,
    store: &mut St,
    fitter: &F,
) -> EddResult<ScanFitReport>
where
    Src: PatternSource + ?Sized,
    St: ResultStore + ?Sized,
    F: PeakFitter + ?Sized,
{
    let scan = plan.scan_id(scan_number);
    info!(scan = %scan, "fitting scan");
    let inputs = read_inputs(plan, &scan, source)?;
    let points = inputs.patterns.horizontal.points();

    let root = scan.group_name();
    store.ensure_group(&root)?;
    write_inputs(store, &root, &scan, &inputs)?;

    let fit_group = join_path(&root, FIT_GROUP);
    let mut accumulator = PeakAccumulator::new(points, plan.layout.total_peak_count());
    let mut failed_box_fits = 0;
    for point in 0..points {
        let point_group = join_path(&fit_group, &format!("{point:04}"));
        store.ensure_group(&point_group)?;
        let fits = {
            let mut sink = StoreDiagnostics::new(&mut *store, point_group);
            let rows = inputs.patterns.as_ref().map(|_, block| block.row(point));
            fit_all_peaks(&plan.layout, rows, fitter, &mut sink)?
        };

        let angles = inputs.positioners.angles(point);
        let mut failed_here = 0;
        for detector in Detector::ALL {
            let detector_fits = fits.get(detector);
            failed_here += detector_fits.failed_boxes;
            for (peak, (value, uncertainty)) in detector_fits
                .values
                .iter()
                .zip(&detector_fits.uncertainties)
                .enumerate()
            {
                accumulator.record(
                    peak,
                    point,
                    detector,
                    peak_row(&angles, detector, value),
                    peak_row(&angles, detector, uncertainty),
                )?;
            }
        }
        failed_box_fits += failed_here;
        debug!(scan = %scan, point, failed_boxes = failed_here, "fitted scan point");
    }

    let peaks_group = join_path(&root, PEAKS_GROUP);
    accumulator.flush(store, &peaks_group)?;
    store.write_text(
        &join_path(&peaks_group, INFO_PEAK),
        &info_peak_text(inputs.positioners.names()),
    )?;
    write_fit_info(store, &join_path(&root, FIT_INFO_GROUP), plan, scan_number)?;

    let box_fits = 2 * points * plan.layout.box_count();
    if failed_box_fits > 0 {
        warn!(
            scan = %scan,
            failed = failed_box_fits,
            total = box_fits,
            "some box fits did not converge; their uncertainties are NaN"
        );
    }
    info!(scan = %scan, points, peaks = accumulator.peak_count(), "scan fitted");

    Ok(ScanFitReport {
        scan: root,
        scan_number,
        points,
        channels: [
            inputs.patterns.horizontal.channels(),
            inputs.patterns.vertical.channels(),
        ],
        total_peaks: accumulator.peak_count(),
        box_fits,
        failed_box_fits,
        positioner_overflow: inputs.overflow,
    })
}

fn write_inputs<St: ResultStore + ?Sized>(
    store: &mut St,
    root: &str,
    scan: &ScanId,
    inputs: &ScanInputs,
) -> StoreResult<()> {
    let positioners_group = join_path(root, POSITIONERS_GROUP);
    store.ensure_group(&positioners_group)?;
    for (name, values) in inputs.positioners.series() {
        store.write_f64(&join_path(&positioners_group, name), &[values.len()], values)?;
    }

    let raw_group = join_path(root, &scan.raw_data_group_name());
    for detector in Detector::ALL {
        let block = inputs.patterns.get(detector);
        store.write_f64(
            &join_path(&raw_group, detector.raw_dataset_name()),
            &block.shape(),
            block.as_slice(),
        )?;
    }
    Ok(())
}

fn write_fit_info<St: ResultStore + ?Sized>(
    store: &mut St,
    group: &str,
    plan: &FitPlan,
    scan_number: u32,
) -> StoreResult<()> {
    let path = |name: &str| join_path(group, name);
    store.ensure_group(group)?;
    store.write_text(&path("fileRead"), &plan.input_file.display().to_string())?;
    store.write_text(&path("fileSave"), &plan.output_file.display().to_string())?;
    store.write_text(&path("sample"), &plan.sample)?;
    store.write_text(&path("dataset"), &plan.dataset)?;
    store.write_f64(&path("scanNumber"), &[1], &[f64::from(scan_number)])?;
    store.write_text(&path("nameHorizontalDetector"), &plan.detectors.horizontal)?;
    store.write_text(&path("nameVerticalDetector"), &plan.detectors.vertical)?;

    let peaks: Vec<f64> = plan
        .layout
        .peaks_in_boxes()
        .iter()
        .map(|count| *count as f64)
        .collect();
    store.write_f64(&path("nbPeaksInBoxes"), &[peaks.len()], &peaks)?;
    for (name, detector) in [("rangeFitHD", Detector::Horizontal), ("rangeFitVD", Detector::Vertical)] {
        let bounds: Vec<f64> = plan
            .layout
            .ranges(detector)
            .iter()
            .flat_map(|range| [range.low as f64, range.high as f64])
            .collect();
        store.write_f64(&path(name), &[bounds.len()], &bounds)?;
    }
    store.write_text(&path("positioners"), &plan.positioners.join(", "))
}

#[cfg(test)]
mod tests {
    use super::fit_scan;
    use crate::config::FitEddConfig;
    use crate::domain::ScanId;
    use crate::fitting::PseudoVoigtFitter;
    use crate::source::MemorySource;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn plan(ranges_vd: serde_json::Value) -> crate::config::FitPlan {
        let config: FitEddConfig = serde_json::from_value(json!({
            "fileRead": "raw.h5",
            "fileSave": "fit.h5",
            "sample": "s",
            "dataset": "d",
            "scanNumber": 1,
            "nameHorizontalDetector": "hd",
            "nameVerticalDetector": "vd",
            "positioners": ["eta"],
            "nbPeaksInBoxes": [1],
            "rangeFitHD": [0, 40],
            "rangeFitVD": ranges_vd
        }))
        .expect("config");
        config.into_job().expect("job").plan
    }

    fn source(points: usize, channels: usize) -> MemorySource {
        let scan = ScanId::new("s", "d", 1);
        let mut source = MemorySource::new();
        let rows = vec![vec![1.0; channels]; points];
        source.insert_pattern(&scan, "hd", rows.clone());
        source.insert_pattern(&scan, "vd", rows);
        source.insert_positioner(&scan, "eta", vec![0.0; points]);
        source
    }

    #[test]
    fn range_beyond_pattern_fails_before_any_write() {
        let plan = plan(json!([0, 80]));
        let mut store = MemoryStore::new();
        let error = fit_scan(&plan, 1, &source(2, 50), &mut store, &PseudoVoigtFitter::default())
            .expect_err("vertical range exceeds 50 channels");

        assert_eq!(error.code(), "INPUT.FIT_RANGE");
        assert!(store.children("").is_empty());
    }

    #[test]
    fn missing_positioner_fails_before_any_write() {
        let mut plan = plan(json!([0, 40]));
        plan.positioners.push("phi".to_string());
        let mut store = MemoryStore::new();
        let error = fit_scan(&plan, 1, &source(2, 50), &mut store, &PseudoVoigtFitter::default())
            .expect_err("phi is not recorded");

        assert_eq!(error.code(), "INPUT.MISSING_DATASET");
        assert!(store.children("").is_empty());
    }

    #[test]
    fn flat_patterns_complete_with_failed_boxes() {
        let plan = plan(json!([0, 40]));
        let mut store = MemoryStore::new();
        let report = fit_scan(&plan, 1, &source(2, 50), &mut store, &PseudoVoigtFitter::default())
            .expect("scan completes");

        assert_eq!(report.scan, "s_d_1.1");
        assert_eq!(report.box_fits, 4);
        assert_eq!(report.failed_box_fits, 4);
        let (shape, data) = store
            .dataset("s_d_1.1/tthPositionsGroup/uncertaintyPeak_0000")
            .expect("uncertainty dataset");
        assert_eq!(shape, &[4, 13]);
        assert!(data[8..13].iter().all(|value| value.is_nan()));
        assert_eq!(store.text("s_d_1.1/infos/positioners"), Some("eta"));
    }
}
