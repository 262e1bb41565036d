//! HDF5-backed [`ResultStore`].

use super::{ResultStore, check_shape, path_conflict, shape_collision, split_parent};
use crate::domain::{EddError, StoreResult};
use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct Hdf5Store {
    file: File,
    path: PathBuf,
}

impl Hdf5Store {
    /// Opens `path` for appending, creating the file and its parent
    /// directories when missing.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| {
                EddError::storage(
                    "STORE.CREATE",
                    format!("failed to create directory '{}': {}", parent.display(), source),
                )
            })?;
        }
        let file = File::append(&path).map_err(|source| {
            EddError::storage(
                "STORE.CREATE",
                format!("failed to open '{}' for writing: {}", path.display(), source),
            )
        })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn group(&self, path: &str) -> StoreResult<Group> {
        let mut group = self.file.group("/").map_err(|source| self.error(path, source))?;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            group = if group.link_exists(segment) {
                group
                    .group(segment)
                    .map_err(|_| path_conflict(path, "group"))?
            } else {
                group
                    .create_group(segment)
                    .map_err(|source| self.error(path, source))?
            };
        }
        Ok(group)
    }

    fn error(&self, path: &str, source: hdf5::Error) -> EddError {
        EddError::storage(
            "STORE.HDF5",
            format!("'{}' in '{}': {}", path, self.path.display(), source),
        )
    }
}

impl ResultStore for Hdf5Store {
    fn ensure_group(&mut self, path: &str) -> StoreResult<()> {
        self.group(path).map(|_| ())
    }

    fn write_f64(&mut self, path: &str, shape: &[usize], data: &[f64]) -> StoreResult<()> {
        check_shape(path, shape, data.len())?;
        let (parent, name) = split_parent(path);
        let group = self.group(parent)?;
        let dataset = if group.link_exists(name) {
            let dataset = group
                .dataset(name)
                .map_err(|_| path_conflict(path, "float64 dataset"))?;
            let existing = dataset.shape();
            if existing != shape {
                return Err(shape_collision(path, &existing, shape));
            }
            dataset
        } else {
            group
                .new_dataset::<f64>()
                .shape(shape.to_vec())
                .create(name)
                .map_err(|source| self.error(path, source))?
        };
        dataset
            .write_raw(data)
            .map_err(|source| self.error(path, source))
    }

    fn write_text(&mut self, path: &str, text: &str) -> StoreResult<()> {
        let value = VarLenUnicode::from_str(text).map_err(|source| {
            EddError::storage("STORE.TEXT", format!("'{path}' cannot hold text: {source}"))
        })?;
        let (parent, name) = split_parent(path);
        let group = self.group(parent)?;
        let dataset = if group.link_exists(name) {
            group
                .dataset(name)
                .map_err(|_| path_conflict(path, "text dataset"))?
        } else {
            group
                .new_dataset::<VarLenUnicode>()
                .create(name)
                .map_err(|source| self.error(path, source))?
        };
        dataset
            .write_scalar(&value)
            .map_err(|source| self.error(path, source))
    }

    fn contains(&self, path: &str) -> bool {
        let Ok(mut group) = self.file.group("/") else {
            return false;
        };
        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return true;
        };
        for segment in parents {
            match group.group(segment) {
                Ok(child) => group = child,
                Err(_) => return false,
            }
        }
        group.link_exists(last)
    }
}
