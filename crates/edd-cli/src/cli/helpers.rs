use super::CliError;
use edd_core::config::{FitEddConfig, FitJob};
use edd_core::domain::EddError;
use edd_core::scan::{BatchReport, parse_scan_argument};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub(super) fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Loads and validates the configuration, applying command-line overrides.
pub(super) fn load_job(
    config_path: &Path,
    scan: Option<&str>,
    output: Option<PathBuf>,
) -> Result<FitJob, CliError> {
    let config = FitEddConfig::from_json_file(config_path).map_err(EddError::from)?;
    let mut job = config.into_job()?;
    if let Some(scan) = scan {
        job.scans = parse_scan_argument(scan)?;
    }
    if let Some(output) = output {
        job.plan.output_file = output;
    }
    Ok(job)
}

pub(super) fn render_scan_list(job: &FitJob) -> String {
    let mut summary = String::new();
    let _ = writeln!(
        summary,
        "Configuration OK: {} box(es), {} peak(s) per detector",
        job.plan.layout.box_count(),
        job.plan.layout.total_peak_count()
    );
    let _ = writeln!(summary, "Input:  {}", job.plan.input_file.display());
    let _ = writeln!(summary, "Output: {}", job.plan.output_file.display());
    for scan_number in &job.scans {
        let _ = writeln!(summary, "Scan {}", job.plan.scan_id(*scan_number));
    }
    summary
}

pub(super) fn render_human_summary(report: &BatchReport) -> String {
    let mut summary = String::new();
    for scan in &report.scans {
        let _ = writeln!(
            summary,
            "{}: {} point(s), {} peak(s), {}/{} box fits failed",
            scan.scan, scan.points, scan.total_peaks, scan.failed_box_fits, scan.box_fits
        );
        if let Some(overflow) = &scan.positioner_overflow {
            let _ = writeln!(
                summary,
                "  positioners ignored: {}",
                overflow.dropped.join(", ")
            );
        }
    }
    let _ = write!(
        summary,
        "Fitted {} scan(s); {} box fit(s) did not converge",
        report.scans.len(),
        report.failed_box_fits()
    );
    summary
}
