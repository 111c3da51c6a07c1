//! Turning raw cell contents into frames.
//!
//! Both layouts decode through here so fill masking, scaling and time
//! reconstruction happen once, at the storage boundary.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use smio_common::{Column, Frame, TimeUnits};
use tracing::debug;

use crate::error::{CellIoError, CellIoResult};
use crate::source::{CellLayout, RawCell, RawVariable};

/// Parse the cell's time units and convert raw offsets to timestamps.
pub fn decode_times(raw: &RawCell, values: &[f64]) -> CellIoResult<Vec<NaiveDateTime>> {
    let units = TimeUnits::parse(&raw.time_units)
        .map_err(|e| CellIoError::corrupt(raw.cell, format!("time units: {}", e)))?;
    values
        .iter()
        .map(|&v| {
            units
                .to_datetime(v)
                .map_err(|e| CellIoError::corrupt(raw.cell, format!("time value: {}", e)))
        })
        .collect()
}

/// Check the structural invariants of a cell.
pub fn validate(raw: &RawCell) -> CellIoResult<()> {
    match raw.layout {
        CellLayout::OrthoMulti => {
            for (name, var) in &raw.variables {
                ortho_orientation(raw, name, var)?;
            }
        }
        CellLayout::ContiguousRagged => {
            let row_size = raw
                .row_size
                .as_ref()
                .ok_or_else(|| CellIoError::corrupt(raw.cell, "ragged cell without row_size"))?;
            if row_size.len() != raw.location_ids.len() {
                return Err(CellIoError::corrupt(
                    raw.cell,
                    format!(
                        "row_size has {} entries for {} locations",
                        row_size.len(),
                        raw.location_ids.len()
                    ),
                ));
            }
            let total: usize = row_size.iter().sum();
            if total != raw.time.len() {
                return Err(CellIoError::corrupt(
                    raw.cell,
                    format!("row_size sums to {}, time has {} values", total, raw.time.len()),
                ));
            }
            for (name, var) in &raw.variables {
                if var.data.len() != total {
                    return Err(CellIoError::corrupt(
                        raw.cell,
                        format!(
                            "variable '{}' has {} values, row_size sums to {}",
                            name,
                            var.data.len(),
                            total
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Whether an orthogonal variable is stored location-major.
fn ortho_orientation(raw: &RawCell, name: &str, var: &RawVariable) -> CellIoResult<bool> {
    let n_loc = raw.location_ids.len();
    let n_time = raw.time.len();

    if var.data.len() != n_loc * n_time {
        return Err(CellIoError::corrupt(
            raw.cell,
            format!(
                "variable '{}' has {} values, expected {} locations x {} times",
                name,
                var.data.len(),
                n_loc,
                n_time
            ),
        ));
    }

    match var.shape.as_slice() {
        [_] => Ok(true),
        [a, b] => {
            if let Some(pos) = var.dims.iter().position(|d| d == "time" || d == "obs") {
                return Ok(pos == 1);
            }
            if *a == n_loc && *b == n_time {
                Ok(true)
            } else if *a == n_time && *b == n_loc {
                Ok(false)
            } else {
                Err(CellIoError::corrupt(
                    raw.cell,
                    format!("variable '{}' has shape {:?}", name, var.shape),
                ))
            }
        }
        other => Err(CellIoError::corrupt(
            raw.cell,
            format!("variable '{}' has {} dimensions", name, other.len()),
        )),
    }
}

/// Wide frame for one variable: rows are timestamps, one column per location
/// (labelled by gpi).
pub fn read_cell_wide(
    raw: &RawCell,
    variable: &str,
    fill_override: Option<f64>,
) -> CellIoResult<Frame> {
    validate(raw)?;
    let var = raw.variable(variable)?;
    let values = var.decoded(fill_override);
    let n_loc = raw.location_ids.len();

    let frame = match raw.layout {
        CellLayout::OrthoMulti => {
            let location_major = ortho_orientation(raw, variable, var)?;
            let n_time = raw.time.len();
            let index = decode_times(raw, &raw.time)?;
            let mut frame = Frame::new(index);
            for (loc, gpi) in raw.location_ids.iter().enumerate() {
                let column: Vec<f64> = (0..n_time)
                    .map(|t| {
                        if location_major {
                            values[loc * n_time + t]
                        } else {
                            values[t * n_loc + loc]
                        }
                    })
                    .collect();
                frame
                    .insert_column(gpi.to_string(), Column::Float(column))
                    .map_err(|e| CellIoError::corrupt(raw.cell, e.to_string()))?;
            }
            frame
        }
        CellLayout::ContiguousRagged => {
            let row_size = raw.row_size.as_deref().unwrap_or_default();

            // Shared index: sort-unique union of all observation times.
            let mut unique: Vec<f64> = raw.time.clone();
            unique.sort_by(|a, b| a.total_cmp(b));
            unique.dedup();

            let mut matrix = vec![vec![f64::NAN; unique.len()]; n_loc];
            let mut start = 0;
            for (loc, len) in row_size.iter().enumerate() {
                for obs in start..start + len {
                    let row = unique
                        .binary_search_by(|probe| probe.total_cmp(&raw.time[obs]))
                        .map_err(|_| CellIoError::corrupt(raw.cell, "time index mismatch"))?;
                    matrix[loc][row] = values[obs];
                }
                start += len;
            }

            let index = decode_times(raw, &unique)?;
            let mut frame = Frame::new(index);
            for (gpi, column) in raw.location_ids.iter().zip(matrix) {
                frame
                    .insert_column(gpi.to_string(), Column::Float(column))
                    .map_err(|e| CellIoError::corrupt(raw.cell, e.to_string()))?;
            }
            frame
        }
    };

    debug!(
        cell = raw.cell,
        variable = variable,
        rows = frame.len(),
        locations = n_loc,
        "Decoded cell variable"
    );

    if frame.is_strictly_increasing() {
        Ok(frame)
    } else {
        Ok(frame.sort_index())
    }
}

/// Time series of one location: rows are that location's timestamps, one
/// column per requested variable.
///
/// A gpi that is not stored in the cell yields an empty frame with the
/// requested columns.
pub fn location_series(
    raw: &RawCell,
    gpi: u64,
    variables: &[String],
    fill_overrides: &BTreeMap<String, f64>,
) -> CellIoResult<Frame> {
    validate(raw)?;
    for name in variables {
        raw.variable(name)?;
    }

    let Some(loc) = raw.location_index(gpi) else {
        return Ok(Frame::empty_with_columns(variables));
    };

    let (times, rows): (Vec<f64>, Vec<usize>) = match raw.layout {
        CellLayout::OrthoMulti => (raw.time.clone(), (0..raw.time.len()).collect()),
        CellLayout::ContiguousRagged => {
            let row_size = raw.row_size.as_deref().unwrap_or_default();
            let start: usize = row_size[..loc].iter().sum();
            let end = start + row_size[loc];
            (raw.time[start..end].to_vec(), (start..end).collect())
        }
    };

    let index = decode_times(raw, &times)?;
    let n_loc = raw.location_ids.len();
    let n_time = raw.time.len();
    let mut frame = Frame::new(index);

    for name in variables {
        let var = raw.variable(name)?;
        let values = var.decoded(fill_overrides.get(name).copied());
        let column: Vec<f64> = match raw.layout {
            CellLayout::OrthoMulti => {
                let location_major = ortho_orientation(raw, name, var)?;
                rows.iter()
                    .map(|&t| {
                        if location_major {
                            values[loc * n_time + t]
                        } else {
                            values[t * n_loc + loc]
                        }
                    })
                    .collect()
            }
            CellLayout::ContiguousRagged => rows.iter().map(|&r| values[r]).collect(),
        };
        frame
            .insert_column(name.clone(), Column::Float(column))
            .map_err(|e| CellIoError::corrupt(raw.cell, e.to_string()))?;
    }

    if frame.is_strictly_increasing() {
        Ok(frame)
    } else {
        Ok(frame.sort_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ortho_cell() -> RawCell {
        let mut variables = BTreeMap::new();
        // 2 locations x 3 times, location-major
        variables.insert(
            "sm".to_string(),
            RawVariable::new_2d(
                ["locations", "time"],
                [2, 3],
                vec![0.1, -999.0, 0.3, 0.4, 0.5, 0.6],
            )
            .with_fill_value(-999.0),
        );
        RawCell {
            cell: 1,
            layout: CellLayout::OrthoMulti,
            location_ids: vec![10, 11],
            time: vec![0.0, 1.0, 2.0],
            time_units: "days since 2000-01-01".to_string(),
            row_size: None,
            variables,
        }
    }

    fn ragged_cell() -> RawCell {
        let mut variables = BTreeMap::new();
        variables.insert(
            "sm".to_string(),
            RawVariable::new_1d("obs", vec![0.1, 0.2, 0.3, -1.0, 0.5]).with_fill_value(-1.0),
        );
        RawCell {
            cell: 2,
            layout: CellLayout::ContiguousRagged,
            location_ids: vec![20, 21],
            time: vec![0.0, 2.0, 1.0, 2.0, 3.0],
            time_units: "days since 2000-01-01".to_string(),
            row_size: Some(vec![2, 3]),
            variables,
        }
    }

    #[test]
    fn test_ortho_wide() {
        let frame = read_cell_wide(&ortho_cell(), "sm", None).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.column_names(), vec!["10", "11"]);
        let col = frame.float_column("10").unwrap();
        assert_eq!(col[0], 0.1);
        assert!(col[1].is_nan());
        assert_eq!(frame.float_column("11").unwrap(), &[0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_ortho_time_major() {
        let mut cell = ortho_cell();
        cell.variables.insert(
            "sm".to_string(),
            RawVariable::new_2d(["time", "locations"], [3, 2], vec![0.1, 0.4, 0.2, 0.5, 0.3, 0.6]),
        );
        let frame = read_cell_wide(&cell, "sm", None).unwrap();
        assert_eq!(frame.float_column("10").unwrap(), &[0.1, 0.2, 0.3]);
        assert_eq!(frame.float_column("11").unwrap(), &[0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_ragged_wide_scatters_into_union_index() {
        let frame = read_cell_wide(&ragged_cell(), "sm", None).unwrap();
        assert_eq!(frame.len(), 4);
        assert!(frame.is_strictly_increasing());

        let a = frame.float_column("20").unwrap();
        assert_eq!(a[0], 0.1);
        assert!(a[1].is_nan());
        assert_eq!(a[2], 0.2);
        assert!(a[3].is_nan());

        let b = frame.float_column("21").unwrap();
        assert!(b[0].is_nan());
        assert_eq!(b[1], 0.3);
        assert!(b[2].is_nan()); // fill value
        assert_eq!(b[3], 0.5);
    }

    #[test]
    fn test_ragged_size_mismatch_is_corrupt() {
        let mut cell = ragged_cell();
        cell.row_size = Some(vec![2, 2]);
        let err = read_cell_wide(&cell, "sm", None).unwrap_err();
        assert!(matches!(err, CellIoError::CellCorrupt { .. }));
    }

    #[test]
    fn test_bad_units_are_corrupt() {
        let mut cell = ortho_cell();
        cell.time_units = "days".to_string();
        let err = read_cell_wide(&cell, "sm", None).unwrap_err();
        assert!(matches!(err, CellIoError::CellCorrupt { .. }));
    }

    #[test]
    fn test_missing_variable() {
        let err = read_cell_wide(&ortho_cell(), "flag", None).unwrap_err();
        assert!(matches!(err, CellIoError::VariableMissing { .. }));
    }

    #[test]
    fn test_location_series_ragged() {
        let frame =
            location_series(&ragged_cell(), 21, &["sm".to_string()], &BTreeMap::new()).unwrap();
        assert_eq!(frame.len(), 3);
        let sm = frame.float_column("sm").unwrap();
        assert_eq!(sm[0], 0.3);
        assert!(sm[1].is_nan());
        assert_eq!(sm[2], 0.5);
    }

    #[test]
    fn test_location_series_unknown_gpi_is_empty() {
        let frame =
            location_series(&ortho_cell(), 99, &["sm".to_string()], &BTreeMap::new()).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.column_names(), vec!["sm"]);
    }
}
