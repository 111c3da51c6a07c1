//! Grid point lookup for cell-partitioned datasets.
//!
//! Readers only need a handful of operations from a grid: mapping a gpi to
//! its cell and coordinates, finding the nearest gpi to a coordinate, and
//! listing the gpis of a cell. [`CellGrid`] captures that contract and
//! [`PointGrid`] is the concrete implementation used throughout the workspace.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{SmioError, SmioResult};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default cell edge length in degrees.
pub const DEFAULT_CELL_SIZE: f64 = 5.0;

/// Grid operations consumed by readers. Lookups must be deterministic.
pub trait CellGrid: Send + Sync {
    /// Whether the gpi is part of this grid.
    fn contains(&self, gpi: u64) -> bool;

    /// Cell that owns the gpi.
    fn gpi_to_cell(&self, gpi: u64) -> Option<u32>;

    /// Coordinates of the gpi as `(lon, lat)`.
    fn gpi_to_lonlat(&self, gpi: u64) -> Option<(f64, f64)>;

    /// Nearest gpi and its distance in metres, optionally bounded.
    fn find_nearest_gpi(&self, lon: f64, lat: f64, max_dist_m: Option<f64>) -> Option<(u64, f64)>;

    /// All gpis in a cell, ascending.
    fn grid_points_for_cell(&self, cell: u32) -> Vec<u64>;

    /// All cells, ascending.
    fn cells(&self) -> Vec<u32>;

    /// All gpis, ascending.
    fn gpis(&self) -> Vec<u64>;
}

/// Compute the cell number for a coordinate.
///
/// Cells are numbered column-major starting at (-180, -90):
/// `floor((lon + 180) / size) * (180 / size) + floor((lat + 90) / size)`.
pub fn lonlat_to_cell(lon: f64, lat: f64, cell_size: f64) -> u32 {
    let rows = (180.0 / cell_size).round() as u32;
    let cols = (360.0 / cell_size).round() as u32;
    let x = (((lon + 180.0) / cell_size).floor() as i64).clamp(0, cols as i64 - 1) as u32;
    let y = (((lat + 90.0) / cell_size).floor() as i64).clamp(0, rows as i64 - 1) as u32;
    x * rows + y
}

/// Great-circle distance in metres.
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// A single grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub gpi: u64,
    pub lon: f64,
    pub lat: f64,
    pub cell: u32,
}

/// Irregular point grid partitioned into square cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGrid {
    cell_size: f64,
    points: BTreeMap<u64, GridPoint>,
    #[serde(skip)]
    by_cell: BTreeMap<u32, Vec<u64>>,
}

impl PointGrid {
    /// Build from parallel gpi/lon/lat arrays; cells are computed.
    pub fn new(gpis: &[u64], lons: &[f64], lats: &[f64], cell_size: f64) -> SmioResult<Self> {
        if gpis.len() != lons.len() || gpis.len() != lats.len() {
            return Err(SmioError::configuration(format!(
                "grid arrays differ in length: {} gpis, {} lons, {} lats",
                gpis.len(),
                lons.len(),
                lats.len()
            )));
        }
        if cell_size <= 0.0 || (180.0 / cell_size).fract().abs() > 1e-9 {
            return Err(SmioError::configuration(format!(
                "cell size {} must evenly divide 180 degrees",
                cell_size
            )));
        }

        let points = gpis
            .iter()
            .zip(lons.iter().zip(lats))
            .map(|(&gpi, (&lon, &lat))| {
                (
                    gpi,
                    GridPoint {
                        gpi,
                        lon,
                        lat,
                        cell: lonlat_to_cell(lon, lat, cell_size),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        if points.len() != gpis.len() {
            return Err(SmioError::configuration("grid contains duplicate gpis"));
        }

        Ok(Self::from_points(points, cell_size))
    }

    /// Build from points that already carry a cell number (e.g. read from a grid file).
    pub fn from_grid_points(points: Vec<GridPoint>, cell_size: f64) -> SmioResult<Self> {
        let mut by_gpi = BTreeMap::new();
        for p in points {
            if by_gpi.insert(p.gpi, p).is_some() {
                return Err(SmioError::configuration(format!(
                    "grid contains duplicate gpi {}",
                    p.gpi
                )));
            }
        }
        Ok(Self::from_points(by_gpi, cell_size))
    }

    fn from_points(points: BTreeMap<u64, GridPoint>, cell_size: f64) -> Self {
        let mut by_cell: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
        for p in points.values() {
            by_cell.entry(p.cell).or_default().push(p.gpi);
        }
        Self {
            cell_size,
            points,
            by_cell,
        }
    }

    /// Regular global lon/lat grid with points at cell centres of `resolution`.
    ///
    /// gpis are assigned row by row starting at the south-west corner.
    pub fn regular(resolution: f64, cell_size: f64) -> SmioResult<Self> {
        let nlon = (360.0 / resolution).round() as usize;
        let nlat = (180.0 / resolution).round() as usize;
        let mut gpis = Vec::with_capacity(nlon * nlat);
        let mut lons = Vec::with_capacity(nlon * nlat);
        let mut lats = Vec::with_capacity(nlon * nlat);
        for j in 0..nlat {
            for i in 0..nlon {
                gpis.push((j * nlon + i) as u64);
                lons.push(-180.0 + (i as f64 + 0.5) * resolution);
                lats.push(-90.0 + (j as f64 + 0.5) * resolution);
            }
        }
        Self::new(&gpis, &lons, &lats, cell_size)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, gpi: u64) -> Option<&GridPoint> {
        self.points.get(&gpi)
    }

    /// Subgrid restricted to the given cells.
    pub fn subgrid_from_cells(&self, cells: &[u32]) -> Self {
        let wanted: BTreeSet<u32> = cells.iter().copied().collect();
        let points = self
            .points
            .iter()
            .filter(|(_, p)| wanted.contains(&p.cell))
            .map(|(g, p)| (*g, *p))
            .collect();
        Self::from_points(points, self.cell_size)
    }

    /// Subgrid restricted to the given gpis (unknown gpis are ignored).
    pub fn subgrid_from_gpis(&self, gpis: &[u64]) -> Self {
        let points = gpis
            .iter()
            .filter_map(|g| self.points.get(g).map(|p| (*g, *p)))
            .collect();
        Self::from_points(points, self.cell_size)
    }

    /// Group gpis by owning cell; unknown gpis are returned separately.
    pub fn group_by_cell(&self, gpis: &[u64]) -> (BTreeMap<u32, Vec<u64>>, Vec<u64>) {
        let mut grouped: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
        let mut unknown = Vec::new();
        for gpi in gpis {
            match self.points.get(gpi) {
                Some(p) => grouped.entry(p.cell).or_default().push(*gpi),
                None => unknown.push(*gpi),
            }
        }
        (grouped, unknown)
    }

    fn ensure_index(&self) -> HashMap<u32, Vec<u64>> {
        let mut by_cell: HashMap<u32, Vec<u64>> = HashMap::new();
        for p in self.points.values() {
            by_cell.entry(p.cell).or_default().push(p.gpi);
        }
        by_cell
    }
}

impl CellGrid for PointGrid {
    fn contains(&self, gpi: u64) -> bool {
        self.points.contains_key(&gpi)
    }

    fn gpi_to_cell(&self, gpi: u64) -> Option<u32> {
        self.points.get(&gpi).map(|p| p.cell)
    }

    fn gpi_to_lonlat(&self, gpi: u64) -> Option<(f64, f64)> {
        self.points.get(&gpi).map(|p| (p.lon, p.lat))
    }

    fn find_nearest_gpi(&self, lon: f64, lat: f64, max_dist_m: Option<f64>) -> Option<(u64, f64)> {
        let mut best: Option<(u64, f64)> = None;
        // BTreeMap iteration is ascending, so strict `<` keeps the lowest gpi on ties.
        for p in self.points.values() {
            let d = haversine_m(lon, lat, p.lon, p.lat);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((p.gpi, d));
            }
        }
        match (best, max_dist_m) {
            (Some((_, d)), Some(max)) if d > max => None,
            (b, _) => b,
        }
    }

    fn grid_points_for_cell(&self, cell: u32) -> Vec<u64> {
        if self.by_cell.is_empty() && !self.points.is_empty() {
            // Deserialized grids skip the cell index.
            return self.ensure_index().remove(&cell).unwrap_or_default();
        }
        self.by_cell.get(&cell).cloned().unwrap_or_default()
    }

    fn cells(&self) -> Vec<u32> {
        if self.by_cell.is_empty() {
            let set: BTreeSet<u32> = self.points.values().map(|p| p.cell).collect();
            return set.into_iter().collect();
        }
        self.by_cell.keys().copied().collect()
    }

    fn gpis(&self) -> Vec<u64> {
        self.points.keys().copied().collect()
    }
}
