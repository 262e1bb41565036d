//! Scan-level processing: scan selection, positioners, per-peak row
//! accumulation and the point-by-point aggregator.

pub mod accumulator;
pub mod aggregator;
pub mod batch;
pub mod diagnostics;
pub mod positioners;
pub mod rows;
pub mod scan_number;

pub use accumulator::PeakAccumulator;
pub use aggregator::{ScanFitReport, fit_scan};
pub use batch::{BatchReport, run_batch};
pub use diagnostics::StoreDiagnostics;
pub use positioners::{MAX_POSITIONERS, PositionerOverflow, PositionerTable, partition_positioners};
pub use rows::{ROW_WIDTH, info_peak_text, peak_dataset_name, peak_row, uncertainty_dataset_name};
pub use scan_number::{parse_scan_argument, parse_scan_numbers};
