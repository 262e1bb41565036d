//! Hierarchical result storage.
//!
//! Paths are `/`-separated and relative to the store root, for example
//! `sample_1_3.1/tthPositionsGroup/peak_0000`. Writers create missing parent
//! groups. Rewriting a dataset with its original shape overwrites it in place;
//! any other shape is a storage error.

#[cfg(feature = "hdf5")]
pub mod hdf5;

use crate::domain::{EddError, StoreResult};
use std::collections::BTreeMap;

pub trait ResultStore {
    fn ensure_group(&mut self, path: &str) -> StoreResult<()>;

    fn write_f64(&mut self, path: &str, shape: &[usize], data: &[f64]) -> StoreResult<()>;

    fn write_text(&mut self, path: &str, text: &str) -> StoreResult<()>;

    fn contains(&self, path: &str) -> bool;
}

/// Joins path segments, skipping empty ones.
pub fn join_path(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}/{child}"),
    }
}

pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

pub(crate) fn check_shape(path: &str, shape: &[usize], len: usize) -> StoreResult<()> {
    let expected: usize = shape.iter().product();
    if expected != len {
        return Err(EddError::internal(
            "STORE.DATA_LENGTH",
            format!("dataset '{path}' of shape {shape:?} cannot hold {len} values"),
        ));
    }
    Ok(())
}

pub(crate) fn shape_collision(path: &str, existing: &[usize], requested: &[usize]) -> EddError {
    EddError::storage(
        "STORE.SHAPE_COLLISION",
        format!("dataset '{path}' exists with shape {existing:?}, cannot write shape {requested:?}"),
    )
}

pub(crate) fn path_conflict(path: &str, expected: &str) -> EddError {
    EddError::storage(
        "STORE.PATH_CONFLICT",
        format!("'{path}' exists and is not a {expected}"),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreNode {
    Group,
    F64 { shape: Vec<usize>, data: Vec<f64> },
    Text(String),
}

/// In-memory tree with deterministic (sorted) iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    nodes: BTreeMap<String, StoreNode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, path: &str) -> Option<&StoreNode> {
        self.nodes.get(path)
    }

    pub fn dataset(&self, path: &str) -> Option<(&[usize], &[f64])> {
        match self.nodes.get(path) {
            Some(StoreNode::F64 { shape, data }) => Some((shape, data)),
            _ => None,
        }
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        match self.nodes.get(path) {
            Some(StoreNode::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn is_group(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(StoreNode::Group))
    }

    /// Names of the direct children of `path`, sorted.
    pub fn children(&self, path: &str) -> Vec<&str> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        self.nodes
            .keys()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .collect()
    }

    fn ensure_parent(&mut self, path: &str) -> StoreResult<()> {
        let (parent, _) = split_parent(path);
        if parent.is_empty() {
            Ok(())
        } else {
            self.ensure_group(parent)
        }
    }
}

impl ResultStore for MemoryStore {
    fn ensure_group(&mut self, path: &str) -> StoreResult<()> {
        let mut prefix = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            prefix = join_path(&prefix, segment);
            match self.nodes.get(&prefix) {
                Some(StoreNode::Group) => {}
                Some(_) => return Err(path_conflict(&prefix, "group")),
                None => {
                    self.nodes.insert(prefix.clone(), StoreNode::Group);
                }
            }
        }
        Ok(())
    }

    fn write_f64(&mut self, path: &str, shape: &[usize], data: &[f64]) -> StoreResult<()> {
        check_shape(path, shape, data.len())?;
        match self.nodes.get(path) {
            Some(StoreNode::F64 { shape: existing, .. }) if existing.as_slice() != shape => {
                return Err(shape_collision(path, existing, shape));
            }
            Some(StoreNode::Group | StoreNode::Text(_)) => {
                return Err(path_conflict(path, "float64 dataset"));
            }
            _ => {}
        }
        self.ensure_parent(path)?;
        self.nodes.insert(
            path.to_string(),
            StoreNode::F64 {
                shape: shape.to_vec(),
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    fn write_text(&mut self, path: &str, text: &str) -> StoreResult<()> {
        if let Some(StoreNode::Group | StoreNode::F64 { .. }) = self.nodes.get(path) {
            return Err(path_conflict(path, "text dataset"));
        }
        self.ensure_parent(path)?;
        self.nodes
            .insert(path.to_string(), StoreNode::Text(text.to_string()));
        Ok(())
    }

    fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }
}
