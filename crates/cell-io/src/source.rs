//! Storage contract for per-cell time-series files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CellIoError, CellIoResult};

/// Variables that describe the cell structure rather than observations.
pub const RESERVED_VARIABLES: &[&str] = &[
    "location_id",
    "row_size",
    "time",
    "lon",
    "lat",
    "alt",
    "location_description",
];

/// On-disk arrangement of observations inside a cell file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellLayout {
    /// Dense `[location, time]` matrix per variable; one shared time axis.
    #[default]
    OrthoMulti,
    /// Per-location segments concatenated; `row_size` gives segment lengths.
    ContiguousRagged,
}

impl CellLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrthoMulti => "ortho_multi",
            Self::ContiguousRagged => "contiguous_ragged",
        }
    }
}

/// One variable exactly as stored, before fill masking and scaling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawVariable {
    /// Flattened values in storage order.
    pub data: Vec<f64>,
    /// Dimension names in storage order.
    pub dims: Vec<String>,
    /// Dimension lengths in storage order.
    pub shape: Vec<usize>,
    pub fill_value: Option<f64>,
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
}

impl RawVariable {
    /// 1-D variable without attributes.
    pub fn new_1d(dim: &str, data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            dims: vec![dim.to_string()],
            data,
            ..Default::default()
        }
    }

    /// 2-D variable without attributes, `data` in row-major order.
    pub fn new_2d(dims: [&str; 2], shape: [usize; 2], data: Vec<f64>) -> Self {
        Self {
            data,
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_fill_value(mut self, fill: f64) -> Self {
        self.fill_value = Some(fill);
        self
    }

    pub fn with_scaling(mut self, scale_factor: f64, add_offset: f64) -> Self {
        self.scale_factor = Some(scale_factor);
        self.add_offset = Some(add_offset);
        self
    }

    /// Values with fill replaced by `NaN`, then scale/offset applied.
    ///
    /// This is the single place where the on-disk fill value is translated.
    pub fn decoded(&self, fill_override: Option<f64>) -> Vec<f64> {
        let fill = fill_override.or(self.fill_value);
        let scale = self.scale_factor.unwrap_or(1.0);
        let offset = self.add_offset.unwrap_or(0.0);
        self.data
            .iter()
            .map(|&v| match fill {
                Some(f) if v == f => f64::NAN,
                _ if v.is_nan() => f64::NAN,
                _ => v * scale + offset,
            })
            .collect()
    }
}

/// Everything read from one cell file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCell {
    pub cell: u32,
    pub layout: CellLayout,
    /// gpis present in the cell, in storage order.
    pub location_ids: Vec<u64>,
    /// Raw numeric time axis (per observation for ragged cells).
    pub time: Vec<f64>,
    /// The `units` attribute of the time variable.
    pub time_units: String,
    /// Segment lengths, ragged cells only.
    pub row_size: Option<Vec<usize>>,
    pub variables: BTreeMap<String, RawVariable>,
}

impl RawCell {
    pub fn variable(&self, name: &str) -> CellIoResult<&RawVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| CellIoError::VariableMissing {
                cell: self.cell,
                variable: name.to_string(),
            })
    }

    pub fn location_index(&self, gpi: u64) -> Option<usize> {
        self.location_ids.iter().position(|&g| g == gpi)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    /// Keep only the named variables (all of them if `None`).
    pub fn restricted_to(&self, variables: Option<&[String]>) -> CellIoResult<RawCell> {
        let Some(names) = variables else {
            return Ok(self.clone());
        };
        let mut out = self.clone_structure();
        for name in names {
            out.variables
                .insert(name.clone(), self.variable(name)?.clone());
        }
        Ok(out)
    }

    fn clone_structure(&self) -> RawCell {
        RawCell {
            cell: self.cell,
            layout: self.layout,
            location_ids: self.location_ids.clone(),
            time: self.time.clone(),
            time_units: self.time_units.clone(),
            row_size: self.row_size.clone(),
            variables: BTreeMap::new(),
        }
    }
}

/// Cell file name: `<prefix><cell zero-padded to digits><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameTemplate {
    pub prefix: String,
    pub digits: usize,
    pub suffix: String,
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            digits: 4,
            suffix: ".nc".to_string(),
        }
    }
}

impl FilenameTemplate {
    pub fn new(prefix: impl Into<String>, digits: usize, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            digits,
            suffix: suffix.into(),
        }
    }

    pub fn file_name(&self, cell: u32) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            cell,
            self.suffix,
            width = self.digits
        )
    }

    pub fn path_in(&self, dir: &Path, cell: u32) -> PathBuf {
        dir.join(self.file_name(cell))
    }
}

/// Access to per-cell storage.
///
/// Implementations open a cell on each call; caching is layered on top by
/// the reader.
pub trait CellSource: Send + Sync {
    /// Location of the cell on disk, for diagnostics.
    fn cell_path(&self, cell: u32) -> PathBuf;

    /// Whether the cell exists.
    fn exists(&self, cell: u32) -> bool;

    /// Read the cell structure plus the requested variables (all if `None`).
    fn read_cell(&self, cell: u32, variables: Option<&[String]>) -> CellIoResult<RawCell>;

    /// Observation variables stored in the cell.
    fn available_variables(&self, cell: u32) -> CellIoResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_template() {
        let template = FilenameTemplate::default();
        assert_eq!(template.file_name(7), "0007.nc");
        assert_eq!(template.file_name(2244), "2244.nc");

        let template = FilenameTemplate::new("ESACCI-", 5, ".nc4");
        assert_eq!(template.file_name(12), "ESACCI-00012.nc4");
    }

    #[test]
    fn test_decoded_masks_fill_before_scaling() {
        let var = RawVariable::new_1d("obs", vec![10.0, -9999.0, f64::NAN, 20.0])
            .with_fill_value(-9999.0)
            .with_scaling(0.01, 0.0);
        let decoded = var.decoded(None);
        assert!((decoded[0] - 0.1).abs() < 1e-12);
        assert!(decoded[1].is_nan());
        assert!(decoded[2].is_nan());
        assert!((decoded[3] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_fill_override_wins() {
        let var = RawVariable::new_1d("obs", vec![0.0, 1.0]).with_fill_value(-1.0);
        let decoded = var.decoded(Some(0.0));
        assert!(decoded[0].is_nan());
        assert_eq!(decoded[1], 1.0);
    }
}
