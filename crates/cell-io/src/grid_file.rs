//! Grid definition files.
//!
//! A time-series directory ships a `grid.nc` listing every grid point it
//! covers: `gpi` (or `location_id`), `lon`, `lat` and optionally `cell`.

use std::path::Path;

use smio_common::{GridPoint, PointGrid};
use tracing::debug;

use crate::error::{CellIoError, CellIoResult};
use crate::native::silence_hdf5_errors;

/// Read a grid file. Cells are taken from the file when present, otherwise
/// computed from the coordinates with `cell_size`.
pub fn read_grid_file(path: &Path, cell_size: f64) -> CellIoResult<PointGrid> {
    silence_hdf5_errors();
    let invalid = |reason: String| CellIoError::InvalidGrid {
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_file() {
        return Err(invalid("file not found".to_string()));
    }
    let file = netcdf::open(path).map_err(|e| invalid(e.to_string()))?;

    let gpi_var = file
        .variable("gpi")
        .or_else(|| file.variable("location_id"))
        .ok_or_else(|| invalid("no gpi variable".to_string()))?;
    let gpis: Vec<i64> = gpi_var
        .get_values::<i64, _>(..)
        .map_err(|e| invalid(format!("gpi: {}", e)))?;

    let read_f64 = |name: &str| -> CellIoResult<Vec<f64>> {
        let var = file
            .variable(name)
            .ok_or_else(|| invalid(format!("no {} variable", name)))?;
        var.get_values::<f64, _>(..)
            .map_err(|e| invalid(format!("{}: {}", name, e)))
    };
    let lons = read_f64("lon")?;
    let lats = read_f64("lat")?;

    let gpis = gpis
        .into_iter()
        .map(|g| u64::try_from(g).map_err(|_| invalid(format!("negative gpi {}", g))))
        .collect::<CellIoResult<Vec<u64>>>()?;

    let grid = match file.variable("cell") {
        Some(cell_var) => {
            let cells: Vec<i64> = cell_var
                .get_values::<i64, _>(..)
                .map_err(|e| invalid(format!("cell: {}", e)))?;
            if cells.len() != gpis.len() || lons.len() != gpis.len() || lats.len() != gpis.len()
            {
                return Err(invalid("grid arrays differ in length".to_string()));
            }
            let points = gpis
                .iter()
                .zip(lons.iter().zip(lats.iter().zip(cells)))
                .map(|(&gpi, (&lon, (&lat, cell)))| {
                    u32::try_from(cell)
                        .map(|cell| GridPoint { gpi, lon, lat, cell })
                        .map_err(|_| invalid(format!("invalid cell {}", cell)))
                })
                .collect::<CellIoResult<Vec<GridPoint>>>()?;
            PointGrid::from_grid_points(points, cell_size).map_err(|e| invalid(e.to_string()))?
        }
        None => {
            PointGrid::new(&gpis, &lons, &lats, cell_size).map_err(|e| invalid(e.to_string()))?
        }
    };

    debug!(
        path = %path.display(),
        points = grid.len(),
        "Loaded grid file"
    );
    Ok(grid)
}
