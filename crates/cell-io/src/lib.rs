//! Per-cell time-series file access.
//!
//! A cell file stores the observations of every grid point in one
//! `cell_size` x `cell_size` degree tile. Two layouts are supported:
//!
//! - **Orthogonal multi**: one shared time axis, variables stored as dense
//!   `[location, time]` (or `[time, location]`) matrices.
//! - **Contiguous ragged**: per-location observation segments laid end to
//!   end, with `row_size` giving each location's segment length.
//!
//! [`CellSource`] is the storage seam; [`NetCdfCellSource`] reads NetCDF
//! files with the native library and [`MemoryCellSource`] serves cells held
//! in memory. [`decode`] turns raw cells into [`smio_common::Frame`]s.

pub mod cache;
pub mod decode;
pub mod error;
pub mod grid_file;
pub mod memory;
pub mod native;
pub mod source;

pub use cache::{CacheStats, CellCache, DEFAULT_CACHE_CELLS};
pub use decode::{location_series, read_cell_wide};
pub use error::{CellIoError, CellIoResult};
pub use grid_file::read_grid_file;
pub use memory::MemoryCellSource;
pub use native::{silence_hdf5_errors, NetCdfCellSource};
pub use source::{
    CellLayout, CellSource, FilenameTemplate, RawCell, RawVariable, RESERVED_VARIABLES,
};
