//! Reads scans from Bliss-style HDF5 files:
//! `<sample>_<dataset>_<scan>.1/measurement/<detector>` and
//! `<sample>_<dataset>_<scan>.1/instrument/positioners/<name>`.

use super::{PatternBlock, PatternSource, missing_input};
use crate::domain::{EddError, EddResult, ScanId};
use hdf5::{Dataset, File};
use std::path::{Path, PathBuf};

pub struct Hdf5Source {
    file: File,
    path: PathBuf,
}

impl Hdf5Source {
    pub fn open<P: AsRef<Path>>(path: P) -> EddResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| {
            EddError::configuration(
                "INPUT.OPEN",
                format!("failed to open '{}': {}", path.display(), source),
            )
        })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dataset(&self, scan: &ScanId, group: &str, kind: &str, name: &str) -> EddResult<Dataset> {
        let path = format!("{}/{group}/{name}", scan.group_name());
        self.file
            .dataset(&path)
            .map_err(|_| missing_input(scan, kind, name))
    }

    fn read_error(&self, name: &str, source: hdf5::Error) -> EddError {
        EddError::configuration(
            "INPUT.READ",
            format!("failed to read '{}' from '{}': {}", name, self.path.display(), source),
        )
    }
}

impl PatternSource for Hdf5Source {
    fn read_pattern(
        &self,
        scan: &ScanId,
        detector: &str,
        slice_index: Option<usize>,
    ) -> EddResult<PatternBlock> {
        let dataset = self.dataset(scan, "measurement", "detector", detector)?;
        let shape = dataset.shape();
        let data = dataset
            .read_raw::<f64>()
            .map_err(|source| self.read_error(detector, source))?;
        PatternBlock::from_array(&shape, data, slice_index)
    }

    fn read_positioner(&self, scan: &ScanId, name: &str) -> EddResult<Vec<f64>> {
        let dataset = self.dataset(scan, "instrument/positioners", "positioner", name)?;
        dataset
            .read_raw::<f64>()
            .map_err(|source| self.read_error(name, source))
    }
}

#[cfg(test)]
mod tests {
    use super::Hdf5Source;
    use crate::domain::ScanId;
    use crate::source::PatternSource;
    use hdf5::File;

    #[test]
    fn reads_measurement_and_positioner_datasets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.h5");
        {
            let file = File::create(&path).expect("create file");
            let scan = file.create_group("s_d_4.1").expect("scan group");
            let measurement = scan.create_group("measurement").expect("measurement");
            measurement
                .new_dataset::<f64>()
                .shape(vec![2, 3])
                .create("det0")
                .expect("detector dataset")
                .write_raw(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0].as_slice())
                .expect("write detector");
            let positioners = scan
                .create_group("instrument")
                .expect("instrument")
                .create_group("positioners")
                .expect("positioners");
            positioners
                .new_dataset::<f64>()
                .create("eta")
                .expect("scalar positioner")
                .write_scalar(&12.5)
                .expect("write positioner");
        }

        let source = Hdf5Source::open(&path).expect("open source");
        let scan = ScanId::new("s", "d", 4);
        let block = source.read_pattern(&scan, "det0", None).expect("pattern");
        assert_eq!(block.shape(), [2, 3]);
        assert_eq!(block.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(source.read_positioner(&scan, "eta").expect("eta"), vec![12.5]);

        let error = source
            .read_pattern(&scan, "det1", None)
            .expect_err("missing detector");
        assert_eq!(error.code(), "INPUT.MISSING_DATASET");
    }
}
