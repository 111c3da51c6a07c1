//! Common types shared by the soil-moisture time-series reader crates.

pub mod error;
pub mod frame;
pub mod grid;
pub mod location;
pub mod time;

pub use error::{SmioError, SmioResult};
pub use frame::{Column, Frame, Key, MultiColumnFrame, MultiIndexFrame, Record, Value};
pub use grid::{CellGrid, GridPoint, PointGrid, DEFAULT_CELL_SIZE};
pub use location::Location;
pub use time::{leap_doy, parse_datetime, DateRange, TimeParseError, TimeUnit, TimeUnits};
