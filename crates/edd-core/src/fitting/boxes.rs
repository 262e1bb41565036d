//! Splits each detector pattern into configured boxes, fits them and
//! concatenates the per-peak results.

use super::{BoxFit, FitRange, PeakFitResult, PeakFitter};
use crate::domain::{ConfigResult, Detector, DetectorPair, EddError, EddResult};

/// Box topology shared by both detectors: the number of peaks per box and
/// each detector's `[low, high)` channel windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxLayout {
    peaks_in_boxes: Vec<usize>,
    ranges: DetectorPair<Vec<FitRange>>,
}

impl BoxLayout {
    /// Builds a layout from the flat `[low0, high0, low1, high1, ...]` lists.
    pub fn new(peaks_in_boxes: &[usize], range_hd: &[i64], range_vd: &[i64]) -> ConfigResult<Self> {
        if peaks_in_boxes.is_empty() {
            return Err(EddError::configuration(
                "INPUT.BOX_COUNT",
                "at least one fit box is required",
            ));
        }
        if let Some(position) = peaks_in_boxes.iter().position(|count| *count == 0) {
            return Err(EddError::configuration(
                "INPUT.PEAK_COUNT",
                format!("box {position} must expect at least one peak"),
            ));
        }

        let ranges = DetectorPair::new(range_hd, range_vd)
            .try_map(|detector, flat| parse_ranges(detector, peaks_in_boxes, flat))?;
        Ok(Self {
            peaks_in_boxes: peaks_in_boxes.to_vec(),
            ranges,
        })
    }

    pub fn box_count(&self) -> usize {
        self.peaks_in_boxes.len()
    }

    pub fn peaks_in_boxes(&self) -> &[usize] {
        &self.peaks_in_boxes
    }

    pub fn total_peak_count(&self) -> usize {
        self.peaks_in_boxes.iter().sum()
    }

    pub fn ranges(&self, detector: Detector) -> &[FitRange] {
        self.ranges.get(detector)
    }

    /// Rejects windows that reach past the end of a detector pattern.
    pub fn check_channels(&self, detector: Detector, channels: usize) -> ConfigResult<()> {
        for (index, range) in self.ranges(detector).iter().enumerate() {
            if range.high > channels {
                return Err(EddError::configuration(
                    "INPUT.FIT_RANGE",
                    format!(
                        "{} box {index} [{}, {}) exceeds pattern of {channels} channels",
                        detector.label(),
                        range.low,
                        range.high
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn parse_ranges(
    detector: Detector,
    peaks_in_boxes: &[usize],
    flat: &[i64],
) -> ConfigResult<Vec<FitRange>> {
    if flat.len() != 2 * peaks_in_boxes.len() {
        return Err(EddError::configuration(
            "INPUT.FIT_RANGE",
            format!(
                "{} fit ranges hold {} bounds, expected {} for {} boxes",
                detector.label(),
                flat.len(),
                2 * peaks_in_boxes.len(),
                peaks_in_boxes.len()
            ),
        ));
    }

    flat.chunks_exact(2)
        .zip(peaks_in_boxes)
        .enumerate()
        .map(|(index, (bounds, &peak_count))| {
            let (low, high) = (bounds[0], bounds[1]);
            if low < 0 || high <= low {
                return Err(EddError::configuration(
                    "INPUT.FIT_RANGE",
                    format!(
                        "{} box {index} has invalid range [{low}, {high})",
                        detector.label()
                    ),
                ));
            }
            let range = FitRange::new(low as usize, high as usize, peak_count);
            if range.width() <= range.parameter_count() {
                return Err(EddError::configuration(
                    "INPUT.FIT_RANGE",
                    format!(
                        "{} box {index} [{low}, {high}) is too narrow for {peak_count} peaks",
                        detector.label()
                    ),
                ));
            }
            Ok(range)
        })
        .collect()
}

/// Receives every box fit as it is produced.
pub trait FitDiagnosticsSink {
    fn record(
        &mut self,
        detector: Detector,
        box_index: usize,
        pattern: &[f64],
        fit: &BoxFit,
    ) -> EddResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnosticsSink;

impl FitDiagnosticsSink for NullDiagnosticsSink {
    fn record(&mut self, _: Detector, _: usize, _: &[f64], _: &BoxFit) -> EddResult<()> {
        Ok(())
    }
}

/// Concatenated results of every box of one detector, in box order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectorFits {
    pub values: Vec<PeakFitResult>,
    pub uncertainties: Vec<PeakFitResult>,
    pub failed_boxes: usize,
}

/// Fits every box of both detector patterns.
///
/// Channel bounds are checked for both detectors before any box is fitted,
/// so a bad layout produces no partial diagnostics.
pub fn fit_all_peaks<F, S>(
    layout: &BoxLayout,
    patterns: DetectorPair<&[f64]>,
    fitter: &F,
    sink: &mut S,
) -> EddResult<DetectorPair<DetectorFits>>
where
    F: PeakFitter + ?Sized,
    S: FitDiagnosticsSink + ?Sized,
{
    for detector in Detector::ALL {
        layout.check_channels(detector, patterns.get(detector).len())?;
    }

    patterns.try_map(|detector, pattern| {
        let mut fits = DetectorFits::default();
        for (box_index, range) in layout.ranges(detector).iter().enumerate() {
            let fit = fitter.fit(pattern, *range)?;
            if fit.values.len() != range.peak_count || fit.uncertainties.len() != range.peak_count {
                return Err(EddError::computation(
                    "FIT.PEAK_COUNT",
                    format!(
                        "{} box {box_index} returned {} peaks, expected {}",
                        detector.label(),
                        fit.values.len(),
                        range.peak_count
                    ),
                ));
            }
            if !fit.status.is_converged() {
                fits.failed_boxes += 1;
            }
            sink.record(detector, box_index, pattern, &fit)?;
            fits.values.extend_from_slice(&fit.values);
            fits.uncertainties.extend_from_slice(&fit.uncertainties);
        }
        Ok(fits)
    })
}

#[cfg(test)]
mod tests {
    use super::{BoxLayout, FitDiagnosticsSink, NullDiagnosticsSink, fit_all_peaks};
    use crate::domain::{Detector, DetectorPair, EddResult};
    use crate::fitting::{
        Background, BoxFit, FitRange, FitStatus, PeakFitResult, PeakFitter, PseudoVoigtFitter,
    };
    use crate::numerics::PseudoVoigt;

    /// Returns the box bounds as peak positions so ordering is observable.
    struct EchoFitter;

    impl PeakFitter for EchoFitter {
        fn fit(&self, pattern: &[f64], range: FitRange) -> EddResult<BoxFit> {
            range.validate(pattern.len())?;
            let mut fit = BoxFit::failed(range, FitStatus::Converged, Background::default());
            for (index, value) in fit.values.iter_mut().enumerate() {
                *value = PeakFitResult {
                    position: (range.low + index) as f64,
                    ..PeakFitResult::default()
                };
            }
            fit.uncertainties = vec![PeakFitResult::default(); range.peak_count];
            Ok(fit)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Vec<(Detector, usize)>,
    }

    impl FitDiagnosticsSink for RecordingSink {
        fn record(
            &mut self,
            detector: Detector,
            box_index: usize,
            _: &[f64],
            _: &BoxFit,
        ) -> EddResult<()> {
            self.seen.push((detector, box_index));
            Ok(())
        }
    }

    #[test]
    fn layout_validates_topology() {
        let layout = BoxLayout::new(&[2, 1], &[10, 40, 50, 70], &[12, 42, 52, 72])
            .expect("valid layout");
        assert_eq!(layout.box_count(), 2);
        assert_eq!(layout.total_peak_count(), 3);
        assert_eq!(layout.ranges(Detector::Vertical)[1], FitRange::new(52, 72, 1));

        let short = BoxLayout::new(&[1, 1], &[10, 40], &[10, 40, 50, 70])
            .expect_err("horizontal list too short");
        assert_eq!(short.code(), "INPUT.FIT_RANGE");

        let inverted = BoxLayout::new(&[1], &[40, 10], &[10, 40]).expect_err("inverted");
        assert_eq!(inverted.code(), "INPUT.FIT_RANGE");

        let negative = BoxLayout::new(&[1], &[-5, 40], &[10, 40]).expect_err("negative");
        assert_eq!(negative.code(), "INPUT.FIT_RANGE");

        let narrow = BoxLayout::new(&[2], &[0, 10], &[0, 40]).expect_err("too narrow");
        assert_eq!(narrow.code(), "INPUT.FIT_RANGE");

        let empty = BoxLayout::new(&[0], &[0, 40], &[0, 40]).expect_err("zero peaks");
        assert_eq!(empty.code(), "INPUT.PEAK_COUNT");
    }

    #[test]
    fn concatenates_boxes_in_order_and_reports_each_to_the_sink() {
        let layout = BoxLayout::new(&[2, 1], &[0, 20, 30, 45], &[5, 25, 60, 80])
            .expect("valid layout");
        let horizontal = vec![0.0; 100];
        let vertical = vec![0.0; 100];
        let mut sink = RecordingSink::default();

        let fits = fit_all_peaks(
            &layout,
            DetectorPair::new(horizontal.as_slice(), vertical.as_slice()),
            &EchoFitter,
            &mut sink,
        )
        .expect("fits");

        let hd: Vec<f64> = fits.horizontal.values.iter().map(|v| v.position).collect();
        let vd: Vec<f64> = fits.vertical.values.iter().map(|v| v.position).collect();
        assert_eq!(hd, vec![0.0, 1.0, 30.0]);
        assert_eq!(vd, vec![5.0, 6.0, 60.0]);
        assert_eq!(
            sink.seen,
            vec![
                (Detector::Horizontal, 0),
                (Detector::Horizontal, 1),
                (Detector::Vertical, 0),
                (Detector::Vertical, 1),
            ]
        );
    }

    #[test]
    fn out_of_bounds_range_fails_before_any_fit() {
        let layout = BoxLayout::new(&[1], &[0, 40], &[60, 140]).expect("valid layout");
        let pattern = vec![0.0; 100];
        let mut sink = RecordingSink::default();

        let error = fit_all_peaks(
            &layout,
            DetectorPair::new(pattern.as_slice(), pattern.as_slice()),
            &EchoFitter,
            &mut sink,
        )
        .expect_err("vertical range exceeds pattern");

        assert_eq!(error.code(), "INPUT.FIT_RANGE");
        assert!(sink.seen.is_empty());
    }

    /// Drops the last peak of every box.
    struct ShortFitter;

    impl PeakFitter for ShortFitter {
        fn fit(&self, pattern: &[f64], range: FitRange) -> EddResult<BoxFit> {
            let mut fit = EchoFitter.fit(pattern, range)?;
            fit.values.pop();
            fit.uncertainties.pop();
            Ok(fit)
        }
    }

    #[test]
    fn fitter_returning_too_few_peaks_is_a_computation_error() {
        let layout = BoxLayout::new(&[2], &[0, 40], &[0, 40]).expect("valid layout");
        let pattern = vec![0.0; 50];

        let error = fit_all_peaks(
            &layout,
            DetectorPair::new(pattern.as_slice(), pattern.as_slice()),
            &ShortFitter,
            &mut NullDiagnosticsSink,
        )
        .expect_err("one peak missing");

        assert_eq!(error.code(), "FIT.PEAK_COUNT");
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn real_fitter_counts_failed_boxes() {
        let peak = PseudoVoigt::new(30.0, 100.0, 4.0, 0.5);
        let signal: Vec<f64> = (0..80_i32).map(|x| 5.0 + peak.eval(f64::from(x))).collect();
        let flat = vec![5.0; 80];
        let layout = BoxLayout::new(&[1], &[10, 50], &[10, 50]).expect("valid layout");

        let fits = fit_all_peaks(
            &layout,
            DetectorPair::new(signal.as_slice(), flat.as_slice()),
            &PseudoVoigtFitter::default(),
            &mut NullDiagnosticsSink,
        )
        .expect("fits");

        assert_eq!(fits.horizontal.failed_boxes, 0);
        assert!((fits.horizontal.values[0].position - 30.0).abs() < 1.0e-3);
        assert_eq!(fits.vertical.failed_boxes, 1);
        assert!(fits.vertical.uncertainties[0].is_nan());
    }
}
