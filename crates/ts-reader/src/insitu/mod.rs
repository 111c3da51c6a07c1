//! In-situ station data in the ISMN "header + values" layout.
//!
//! Files live under `<root>/<network>/<station>/*.stm`, one file per
//! sensor and variable. A JSON index of all sensors is kept at the root so
//! that nearest-station lookups do not need to open every file.

mod index;
mod parse;
mod reader;

use serde::{Deserialize, Serialize};

pub use index::{SensorEntry, StationIndex, INDEX_FILE_NAME};
pub use parse::{parse_header, read_station_file, variable_name, StationFile, StationHeader};
pub use reader::{InsituReader, StationMatch, DEFAULT_VARIABLE, VALID_FLAG};

/// Sensor depth interval in metres below the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    pub from: f64,
    pub to: f64,
}

impl DepthRange {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &DepthRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

impl std::fmt::Display for DepthRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}-{:.2} m", self.from, self.to)
    }
}
