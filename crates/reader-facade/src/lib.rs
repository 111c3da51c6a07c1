//! Reader facade: one configured object that opens a dataset reader, wraps it
//! in an adapter chain and post-processes every frame it returns.
//!
//! ```ignore
//! use reader_facade::{FacadeConfig, ReaderFacade};
//! use smio_common::Location;
//!
//! let config = FacadeConfig::from_yaml_file("facade.yaml".as_ref())?;
//! let mut facade = ReaderFacade::new(config)?;
//! let frame = facade.read(&Location::LonLat(15.0, 45.0))?;
//! ```

pub mod config;
pub mod facade;
pub mod nans;
pub mod resample;

pub use config::{FacadeConfig, ResampleConfig};
pub use facade::{filter_months, MultiRead, ReadOutcome, ReadReport, ReaderFacade};
pub use nans::NanPolicy;
pub use resample::{resample, ResampleRule};
