use crate::domain::{ConfigResult, EddError};
use serde::Serialize;
use tracing::warn;

/// Angle slots available in a peak row.
pub const MAX_POSITIONERS: usize = 6;

/// Positioner names that did not fit in the angle slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PositionerOverflow {
    pub dropped: Vec<String>,
}

/// Splits configured names into the kept slots and the overflow.
pub fn partition_positioners(names: &[String]) -> (Vec<String>, Option<PositionerOverflow>) {
    if names.len() <= MAX_POSITIONERS {
        return (names.to_vec(), None);
    }
    let (kept, dropped) = names.split_at(MAX_POSITIONERS);
    warn!(
        dropped = ?dropped,
        "only {MAX_POSITIONERS} positioners are handled, ignoring the rest"
    );
    (
        kept.to_vec(),
        Some(PositionerOverflow {
            dropped: dropped.to_vec(),
        }),
    )
}

/// Fixed-capacity table of positioner series, one value per scan point.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionerTable {
    points: usize,
    names: Vec<String>,
    series: Vec<Vec<f64>>,
}

impl PositionerTable {
    pub fn new(points: usize) -> Self {
        Self {
            points,
            names: Vec::with_capacity(MAX_POSITIONERS),
            series: Vec::with_capacity(MAX_POSITIONERS),
        }
    }

    /// Appends a series. A single value is broadcast to every point.
    pub fn push(&mut self, name: &str, values: Vec<f64>) -> ConfigResult<()> {
        if self.names.len() == MAX_POSITIONERS {
            return Err(EddError::internal(
                "RUN.POSITIONER_SLOTS",
                format!("no angle slot left for positioner '{name}'"),
            ));
        }
        let values = match values.len() {
            len if len == self.points => values,
            1 => vec![values[0]; self.points],
            len => {
                return Err(EddError::configuration(
                    "INPUT.POSITIONER_LENGTH",
                    format!(
                        "positioner '{name}' has {len} values for {} detector points",
                        self.points
                    ),
                ));
            }
        };
        self.names.push(name.to_string());
        self.series.push(values);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn series(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.series.iter().map(Vec::as_slice))
    }

    /// Angles of `point` with unused slots left at zero.
    pub fn angles(&self, point: usize) -> [f64; MAX_POSITIONERS] {
        let mut angles = [0.0; MAX_POSITIONERS];
        for (slot, values) in angles.iter_mut().zip(&self.series) {
            *slot = values[point];
        }
        angles
    }
}
