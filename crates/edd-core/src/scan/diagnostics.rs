use crate::domain::{Detector, EddResult};
use crate::fitting::{BoxFit, FitDiagnosticsSink, PEAK_RESULT_WIDTH, PeakFitResult};
use crate::store::{ResultStore, join_path};

/// Writes each box fit under `<point_group>/fitLine_<box>`, one dataset set
/// per detector suffixed `HD` or `VD`.
pub struct StoreDiagnostics<'a, S: ResultStore + ?Sized> {
    store: &'a mut S,
    point_group: String,
}

impl<'a, S: ResultStore + ?Sized> StoreDiagnostics<'a, S> {
    pub fn new(store: &'a mut S, point_group: impl Into<String>) -> Self {
        Self {
            store,
            point_group: point_group.into(),
        }
    }
}

pub fn fit_line_group_name(box_index: usize) -> String {
    format!("fitLine_{box_index:04}")
}

fn parameter_table(results: &[PeakFitResult]) -> Vec<f64> {
    results.iter().flat_map(PeakFitResult::to_array).collect()
}

impl<S: ResultStore + ?Sized> FitDiagnosticsSink for StoreDiagnostics<'_, S> {
    fn record(
        &mut self,
        detector: Detector,
        box_index: usize,
        pattern: &[f64],
        fit: &BoxFit,
    ) -> EddResult<()> {
        let group = join_path(&self.point_group, &fit_line_group_name(box_index));
        self.store.ensure_group(&group)?;
        let label = detector.label();
        let path = |name: &str| join_path(&group, &format!("{name}{label}"));
        let width = fit.range.width();
        let peaks = fit.values.len();

        self.store.write_f64(&path("channels"), &[width], &fit.channels())?;
        self.store.write_f64(
            &path("rawData"),
            &[width],
            &pattern[fit.range.low..fit.range.high],
        )?;
        self.store.write_f64(&path("fit"), &[width], &fit.fitted_curve)?;
        self.store.write_f64(&path("background"), &[width], &fit.background_curve())?;
        self.store.write_f64(
            &path("fitParams"),
            &[peaks, PEAK_RESULT_WIDTH],
            &parameter_table(&fit.values),
        )?;
        self.store.write_f64(
            &path("uncertaintyFitParams"),
            &[peaks, PEAK_RESULT_WIDTH],
            &parameter_table(&fit.uncertainties),
        )?;
        let converged = if fit.status.is_converged() { 1.0 } else { 0.0 };
        self.store.write_f64(&path("converged"), &[1], &[converged])?;
        self.store.write_text(&path("status"), fit.status.as_str())
    }
}
