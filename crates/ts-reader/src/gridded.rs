//! Reader over a directory of cell files on a point grid.
//!
//! Point reads slice one location out of its owning cell; cell reads return
//! wide frames (one column per gpi). Both layouts share the decoding in
//! `cell_io` and the post-processing in [`crate::postprocess`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use cell_io::{location_series, read_cell_wide, CacheStats, CellCache, CellSource, RawCell};
use chrono::NaiveDateTime;
use smio_common::{
    CellGrid, Column, Frame, Key, Location, MultiColumnFrame, SmioError, SmioResult,
};
use tracing::{debug, info, instrument};

use crate::aggregate::{reshape, AggregationShape, CellAggregate};
use crate::config::ReaderConfig;
use crate::postprocess::{apply_scale_factors, finish_series, storage_parameters};
use crate::reader::{Located, ReaderState, TimeSeriesReader};

/// Time-series reader for cell-based gridded datasets.
pub struct GriddedReader {
    name: String,
    source: Arc<dyn CellSource>,
    grid: Arc<dyn CellGrid>,
    config: ReaderConfig,
    cache: Option<CellCache>,
    state: ReaderState,
}

impl GriddedReader {
    /// Create a reader. No file is opened until the first read.
    pub fn new(
        source: Arc<dyn CellSource>,
        grid: Arc<dyn CellGrid>,
        config: ReaderConfig,
    ) -> SmioResult<Self> {
        config.validate().map_err(SmioError::configuration)?;
        let cache = config
            .read_bulk
            .then(|| CellCache::new(config.cache_capacity));
        Ok(Self {
            name: "gridded".to_string(),
            source,
            grid,
            config,
            cache,
            state: ReaderState::Created,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn grid(&self) -> &dyn CellGrid {
        self.grid.as_ref()
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Cell cache statistics, when `read_bulk` is on.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(CellCache::stats)
    }

    /// Every gpi of the grid, ascending.
    pub fn iter_gpis(&self) -> impl Iterator<Item = u64> {
        self.grid.gpis().into_iter()
    }

    /// Every cell of the grid, ascending.
    pub fn cells(&self) -> Vec<u32> {
        self.grid.cells()
    }

    /// Drop cached cell data. Later reads open files again.
    pub fn release(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            let stats = cache.stats();
            cache.clear();
            debug!(
                reader = %self.name,
                entries = stats.entries,
                hits = stats.hits,
                misses = stats.misses,
                "Released cell cache"
            );
        }
        self.state = ReaderState::Released;
    }

    /// Map a location to a gpi on this reader's grid.
    pub fn resolve_gpi(&self, location: &Location) -> SmioResult<u64> {
        match location {
            Location::Gpi(gpi) => {
                if self.grid.contains(*gpi) {
                    Ok(*gpi)
                } else {
                    Err(SmioError::unknown_location(format!("gpi {} is not on the grid", gpi)))
                }
            }
            Location::LonLat(lon, lat) => self
                .grid
                .find_nearest_gpi(*lon, *lat, self.config.max_dist_m)
                .map(|(gpi, _)| gpi)
                .ok_or_else(|| {
                    SmioError::unknown_location(format!(
                        "no grid point near ({}, {}) within {:?} m",
                        lon, lat, self.config.max_dist_m
                    ))
                }),
            Location::Station(id) => Err(SmioError::unknown_location(format!(
                "station '{}' cannot be read from a gridded dataset",
                id
            ))),
        }
    }

    fn cell_of(&self, gpi: u64) -> SmioResult<u32> {
        self.grid
            .gpi_to_cell(gpi)
            .ok_or_else(|| SmioError::unknown_location(format!("gpi {} has no cell", gpi)))
    }

    /// Read a cell through the cache (if enabled) and check its layout.
    fn load_cell(&mut self, cell: u32, variables: &[String]) -> SmioResult<Arc<RawCell>> {
        let raw = match self.cache.as_mut() {
            Some(cache) => match cache.get(cell) {
                Some(raw) => {
                    debug!(cell = cell, "Cell cache hit");
                    raw
                }
                None => {
                    let raw = self.source.read_cell(cell, None)?;
                    cache.insert(raw)
                }
            },
            None => Arc::new(self.source.read_cell(cell, Some(variables))?),
        };

        if let Some(expected) = self.config.layout {
            if raw.layout != expected {
                return Err(SmioError::cell_corrupt(
                    cell,
                    format!(
                        "expected {} layout, found {}",
                        expected.as_str(),
                        raw.layout.as_str()
                    ),
                ));
            }
        }

        self.state = ReaderState::Opened;
        Ok(raw)
    }

    /// Time series of one grid point with one column per parameter.
    ///
    /// A missing cell file or a point without any sample yields an empty
    /// frame rather than an error.
    #[instrument(skip(self), fields(reader = %self.name))]
    pub fn read_gpi(&mut self, gpi: u64) -> SmioResult<Frame> {
        if !self.grid.contains(gpi) {
            return Err(SmioError::unknown_location(format!("gpi {} is not on the grid", gpi)));
        }
        let cell = self.cell_of(gpi)?;
        let params = storage_parameters(&self.config);

        let raw = match self.load_cell(cell, &params) {
            Ok(raw) => raw,
            Err(SmioError::CellMissing { path, .. }) => {
                debug!(gpi = gpi, cell = cell, path = %path, "Cell file missing, empty series");
                return Ok(Frame::empty_with_columns(&self.config.parameters));
            }
            Err(e) => return Err(e),
        };

        let series = location_series(&raw, gpi, &params, &self.config.fill_overrides)?;
        if series.all_absent_rows().iter().all(|absent| *absent) {
            debug!(gpi = gpi, cell = cell, "No samples at grid point");
            return Ok(Frame::empty_with_columns(&self.config.parameters));
        }
        finish_series(series, &self.config)
    }

    /// Wide frame of one variable: rows are timestamps, columns are the
    /// gpis stored in the cell.
    #[instrument(skip(self), fields(reader = %self.name))]
    pub fn read_cell(&mut self, cell: u32, variable: &str) -> SmioResult<Frame> {
        let variables = [variable.to_string()];
        let raw = self.load_cell(cell, &variables)?;
        let fill = self.config.fill_overrides.get(variable).copied();
        let wide = read_cell_wide(&raw, variable, fill)?;

        let wide = match self.config.scale_factors.get(variable) {
            Some(factor) => {
                let mut scaled = wide.clone();
                for (name, column) in wide.columns() {
                    if let Some(values) = column.as_float() {
                        scaled.insert_column(
                            name,
                            Column::Float(values.iter().map(|v| v * factor).collect()),
                        )?;
                    }
                }
                scaled
            }
            None => wide,
        };

        Ok(match &self.config.clip_dates {
            Some(range) => wide.clip(range),
            None => wide,
        })
    }

    /// Point series of every location in `cells`, columns keyed
    /// `(gpi, variable)`.
    pub fn read_cells(
        &mut self,
        cells: &[u32],
        parameters: Option<&[String]>,
    ) -> SmioResult<MultiColumnFrame> {
        let mut config = self.config.clone();
        if let Some(params) = parameters {
            config.parameters = params.to_vec();
        }
        let params = storage_parameters(&config);

        let mut series: Vec<(u64, Frame)> = Vec::new();
        for &cell in cells {
            let raw = self.load_cell(cell, &params)?;
            for &gpi in &raw.location_ids {
                let frame = location_series(&raw, gpi, &params, &config.fill_overrides)?;
                series.push((gpi, finish_series(frame, &config)?));
            }
            debug!(cell = cell, locations = raw.location_ids.len(), "Read cell series");
        }

        let index: Vec<NaiveDateTime> = series
            .iter()
            .flat_map(|(_, f)| f.index().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let position: HashMap<NaiveDateTime, usize> =
            index.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let mut out = MultiColumnFrame::new(["gpi", "variable"], index);
        for (gpi, frame) in series {
            for (name, column) in frame.columns() {
                let Some(values) = column.as_float() else {
                    continue;
                };
                let mut aligned = vec![f64::NAN; out.index.len()];
                for (t, v) in frame.index().iter().zip(values) {
                    if let Some(&row) = position.get(t) {
                        aligned[row] = *v;
                    }
                }
                out.columns
                    .push(((Key::Gpi(gpi), Key::Text(name.to_string())), aligned));
            }
        }
        Ok(out.sort())
    }

    /// Read `parameters` of one cell and reshape into `shape`.
    pub fn read_agg_cell(
        &mut self,
        cell: u32,
        parameters: &[String],
        shape: AggregationShape,
        swap_levels: bool,
    ) -> SmioResult<CellAggregate> {
        let mut wide = BTreeMap::new();
        for variable in parameters {
            wide.insert(variable.clone(), self.read_cell(cell, variable)?);
        }
        let aggregate = reshape(&wide, shape, swap_levels)?;
        info!(
            reader = %self.name,
            cell = cell,
            variables = parameters.len(),
            shape = shape.as_str(),
            swap_levels = swap_levels,
            "Aggregated cell"
        );
        Ok(aggregate)
    }

    /// Scale an already-read frame with this reader's factors.
    pub fn scale(&self, frame: &Frame) -> SmioResult<Frame> {
        apply_scale_factors(frame, &self.config)
    }
}

impl TimeSeriesReader for GriddedReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, location: &Location) -> SmioResult<Frame> {
        let gpi = self.resolve_gpi(location)?;
        self.read_gpi(gpi)
    }

    fn locate(&self, location: &Location) -> SmioResult<Located> {
        let gpi = self.resolve_gpi(location)?;
        Ok(Located {
            label: gpi.to_string(),
            group: self.grid.gpi_to_cell(gpi),
            location: Location::Gpi(gpi),
        })
    }
}

impl std::fmt::Debug for GriddedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GriddedReader")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("cache", &self.cache_stats())
            .finish()
    }
}
