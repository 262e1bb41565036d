use super::CliError;
use super::helpers::{load_job, render_human_summary, render_scan_list};
use anyhow::Context;
use edd_core::config::FitJob;
use edd_core::scan::BatchReport;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// JSON fit configuration
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Scan selection overriding `scanNumber` (7, 3:6 or [1, 2])
    #[arg(long, value_name = "SPEC")]
    scan: Option<String>,

    /// Output file overriding `fileSave`
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write the batch report as JSON
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ValidateArgs {
    /// JSON fit configuration
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Scan selection overriding `scanNumber`
    #[arg(long, value_name = "SPEC")]
    scan: Option<String>,
}

pub(super) fn run_fit_command(args: FitArgs) -> Result<i32, CliError> {
    let job = load_job(&args.config, args.scan.as_deref(), args.output)?;
    debug!(
        config = %args.config.display(),
        scans = job.scans.len(),
        output = %job.plan.output_file.display(),
        "loaded fit configuration"
    );
    let report = fit_job(&job)?;
    println!("{}", render_human_summary(&report));

    if let Some(report_path) = args.report {
        if let Some(parent) = report_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let rendered = serde_json::to_string_pretty(&report).context("failed to render report")?;
        fs::write(&report_path, rendered)
            .with_context(|| format!("failed to write report '{}'", report_path.display()))?;
        println!("JSON report: {}", report_path.display());
    }
    Ok(0)
}

pub(super) fn run_validate_command(args: ValidateArgs) -> Result<i32, CliError> {
    let job = load_job(&args.config, args.scan.as_deref(), None)?;
    print!("{}", render_scan_list(&job));
    Ok(0)
}

#[cfg(feature = "hdf5")]
fn fit_job(job: &FitJob) -> Result<BatchReport, CliError> {
    use edd_core::scan::run_batch;
    use edd_core::source::hdf5::Hdf5Source;
    use edd_core::store::hdf5::Hdf5Store;

    let source = Hdf5Source::open(&job.plan.input_file)?;
    let mut store = Hdf5Store::open_or_create(&job.plan.output_file)?;
    Ok(run_batch(job, &source, &mut store, &job.plan.fitter())?)
}

#[cfg(not(feature = "hdf5"))]
fn fit_job(_job: &FitJob) -> Result<BatchReport, CliError> {
    Err(edd_core::domain::EddError::storage(
        "STORE.HDF5_UNAVAILABLE",
        "fit-edd was built without HDF5 support; rebuild with `--features hdf5`",
    )
    .into())
}
