//! Cell files on disk, read with the native netcdf library.
//!
//! One NetCDF file per cell. The structure variables are `location_id`,
//! `time` (with a CF `units` attribute) and, for ragged cells, `row_size`.
//! Every other variable is an observation variable.

use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::{debug, instrument};

use crate::error::{CellIoError, CellIoResult};
use crate::source::{
    CellLayout, CellSource, FilenameTemplate, RawCell, RawVariable, RESERVED_VARIABLES,
};

/// Silence HDF5's automatic error printing to stderr.
///
/// Probing for optional attributes makes the C library print diagnostics
/// even though the error is handled here. Safe to call more than once.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and null handlers are a
        // documented way to disable automatic error output.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Directory of cell files named by a [`FilenameTemplate`].
#[derive(Debug, Clone)]
pub struct NetCdfCellSource {
    root: PathBuf,
    template: FilenameTemplate,
}

impl NetCdfCellSource {
    pub fn new(root: impl Into<PathBuf>, template: FilenameTemplate) -> Self {
        Self {
            root: root.into(),
            template,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template(&self) -> &FilenameTemplate {
        &self.template
    }

    fn open(&self, cell: u32) -> CellIoResult<netcdf::File> {
        silence_hdf5_errors();
        let path = self.cell_path(cell);
        if !path.exists() {
            return Err(CellIoError::CellMissing { cell, path });
        }
        netcdf::open(&path).map_err(|e| CellIoError::NetCdf {
            cell,
            message: format!("failed to open {}: {}", path.display(), e),
        })
    }
}

impl CellSource for NetCdfCellSource {
    fn cell_path(&self, cell: u32) -> PathBuf {
        self.template.path_in(&self.root, cell)
    }

    fn exists(&self, cell: u32) -> bool {
        self.cell_path(cell).is_file()
    }

    #[instrument(skip(self, variables))]
    fn read_cell(&self, cell: u32, variables: Option<&[String]>) -> CellIoResult<RawCell> {
        let file = self.open(cell)?;

        let location_var = file
            .variable("location_id")
            .ok_or_else(|| CellIoError::corrupt(cell, "missing location_id variable"))?;
        let location_ids: Vec<i64> = location_var
            .get_values::<i64, _>(..)
            .map_err(|e| netcdf_error(cell, "location_id", e))?;
        let location_ids = location_ids
            .into_iter()
            .map(|id| {
                u64::try_from(id)
                    .map_err(|_| CellIoError::corrupt(cell, format!("negative location_id {}", id)))
            })
            .collect::<CellIoResult<Vec<u64>>>()?;

        let time_var = file
            .variable("time")
            .ok_or_else(|| CellIoError::corrupt(cell, "missing time variable"))?;
        let time: Vec<f64> = time_var
            .get_values::<f64, _>(..)
            .map_err(|e| netcdf_error(cell, "time", e))?;
        let time_units = get_string_attr(&time_var, "units")
            .ok_or_else(|| CellIoError::corrupt(cell, "time variable has no units"))?;

        let (layout, row_size) = match file.variable("row_size") {
            Some(var) => {
                let sizes: Vec<i64> = var
                    .get_values::<i64, _>(..)
                    .map_err(|e| netcdf_error(cell, "row_size", e))?;
                let sizes = sizes
                    .into_iter()
                    .map(|s| {
                        usize::try_from(s).map_err(|_| {
                            CellIoError::corrupt(cell, format!("negative row_size {}", s))
                        })
                    })
                    .collect::<CellIoResult<Vec<usize>>>()?;
                (CellLayout::ContiguousRagged, Some(sizes))
            }
            None => (CellLayout::OrthoMulti, None),
        };

        let names: Vec<String> = match variables {
            Some(names) => names.to_vec(),
            None => observation_variables(&file),
        };

        let mut raw = RawCell {
            cell,
            layout,
            location_ids,
            time,
            time_units,
            row_size,
            variables: Default::default(),
        };

        for name in names {
            let var = file
                .variable(&name)
                .ok_or_else(|| CellIoError::VariableMissing {
                    cell,
                    variable: name.clone(),
                })?;
            let data: Vec<f64> = var
                .get_values::<f64, _>(..)
                .map_err(|e| netcdf_error(cell, &name, e))?;
            let dims = var.dimensions();
            raw.variables.insert(
                name.clone(),
                RawVariable {
                    data,
                    dims: dims.iter().map(|d| d.name()).collect(),
                    shape: dims.iter().map(|d| d.len()).collect(),
                    fill_value: get_f64_attr(&var, "_FillValue"),
                    scale_factor: get_f64_attr(&var, "scale_factor"),
                    add_offset: get_f64_attr(&var, "add_offset"),
                },
            );
        }

        debug!(
            cell = cell,
            layout = layout.as_str(),
            locations = raw.location_ids.len(),
            observations = raw.time.len(),
            variables = raw.variables.len(),
            "Read cell file"
        );

        Ok(raw)
    }

    fn available_variables(&self, cell: u32) -> CellIoResult<Vec<String>> {
        let file = self.open(cell)?;
        Ok(observation_variables(&file))
    }
}

fn observation_variables(file: &netcdf::File) -> Vec<String> {
    let mut names: Vec<String> = file
        .variables()
        .map(|v| v.name())
        .filter(|n| !RESERVED_VARIABLES.contains(&n.as_str()))
        .collect();
    names.sort();
    names
}

fn netcdf_error(cell: u32, variable: &str, e: netcdf::Error) -> CellIoError {
    CellIoError::NetCdf {
        cell,
        message: format!("failed to read '{}': {}", variable, e),
    }
}

// =============================================================================
// Attribute helpers
// =============================================================================

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cell_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = NetCdfCellSource::new(dir.path(), FilenameTemplate::default());
        assert!(!source.exists(42));
        let err = source.read_cell(42, None).unwrap_err();
        match err {
            CellIoError::CellMissing { cell, path } => {
                assert_eq!(cell, 42);
                assert!(path.ends_with("0042.nc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
