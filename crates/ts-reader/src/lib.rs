//! Time-series readers for gridded and in-situ soil-moisture data.
//!
//! [`GriddedReader`] serves point series, wide cell frames and aggregated
//! cell shapes from cell files on a point grid. [`InsituReader`] serves
//! station series from ISMN-style station trees. Both implement
//! [`TimeSeriesReader`], the seam the adapter chain and the facade build on.
//! [`ReaderFactory`] opens the right reader for a catalogued dataset.

pub mod aggregate;
pub mod config;
pub mod factory;
pub mod gridded;
pub mod insitu;
pub mod postprocess;
pub mod reader;

pub use aggregate::{reshape, AggregationShape, CellAggregate};
pub use config::{ReaderConfig, DEFAULT_T0_UNITS};
pub use factory::{open_dataset, DatasetReader, OpenedDataset, ReaderFactory};
pub use gridded::GriddedReader;
pub use insitu::{DepthRange, InsituReader, StationIndex, StationMatch};
pub use reader::{unsupported, Located, ReadMethod, ReadOptions, ReaderState, TimeSeriesReader};
