//! Read targets.

use serde::{Deserialize, Serialize};

/// Where to read a time series from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    /// Grid point index.
    Gpi(u64),
    /// Coordinate pair, resolved to the nearest grid point or station.
    LonLat(f64, f64),
    /// In-situ station identifier.
    Station(String),
}

impl Location {
    pub fn lonlat(lon: f64, lat: f64) -> Self {
        Location::LonLat(lon, lat)
    }

    pub fn station(id: impl Into<String>) -> Self {
        Location::Station(id.into())
    }
}

impl From<u64> for Location {
    fn from(gpi: u64) -> Self {
        Location::Gpi(gpi)
    }
}

impl From<(f64, f64)> for Location {
    fn from((lon, lat): (f64, f64)) -> Self {
        Location::LonLat(lon, lat)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Gpi(gpi) => write!(f, "gpi {}", gpi),
            Location::LonLat(lon, lat) => write!(f, "({:.4}, {:.4})", lon, lat),
            Location::Station(id) => write!(f, "station {}", id),
        }
    }
}
