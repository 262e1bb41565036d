use super::aggregator::{ScanFitReport, fit_scan};
use crate::config::FitJob;
use crate::domain::EddResult;
use crate::fitting::PeakFitter;
use crate::source::PatternSource;
use crate::store::ResultStore;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatchReport {
    pub scans: Vec<ScanFitReport>,
}

impl BatchReport {
    pub fn failed_box_fits(&self) -> usize {
        self.scans.iter().map(|scan| scan.failed_box_fits).sum()
    }
}

/// Fits the scans of `job` one after another. The first failing scan stops
/// the batch; scans already written stay in the store.
pub fn run_batch<Src, St, F>(
    job: &FitJob,
    source: &Src,
    store: &mut St,
    fitter: &F,
) -> EddResult<BatchReport>
where
    Src: PatternSource + ?Sized,
    St: ResultStore + ?Sized,
    F: PeakFitter + ?Sized,
{
    let mut report = BatchReport::default();
    for (index, scan_number) in job.scans.iter().enumerate() {
        info!(
            scan_number,
            position = index + 1,
            total = job.scans.len(),
            "starting scan"
        );
        report
            .scans
            .push(fit_scan(&job.plan, *scan_number, source, store, fitter)?);
    }
    Ok(report)
}
