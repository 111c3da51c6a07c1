//! Metadata index of all sensors below a station root.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smio_common::{SmioError, SmioResult};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::parse::{parse_header, StationHeader};
use super::DepthRange;

/// File name of the index, written to the station root.
pub const INDEX_FILE_NAME: &str = ".station_index.json";

/// One sensor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub network: String,
    pub station: String,
    pub lon: f64,
    pub lat: f64,
    pub elevation: f64,
    pub variable: String,
    pub depth: DepthRange,
    pub sensor: String,
    /// Relative to the index root.
    pub path: PathBuf,
}

impl SensorEntry {
    /// `NETWORK/station`.
    pub fn station_id(&self) -> String {
        format!("{}/{}", self.network, self.station)
    }

    fn from_header(header: StationHeader, variable: String, path: PathBuf) -> Self {
        Self {
            network: header.network,
            station: header.station,
            lon: header.lon,
            lat: header.lat,
            elevation: header.elevation,
            variable,
            depth: header.depth,
            sensor: header.sensor,
            path,
        }
    }
}

/// Sensors sorted by network, station, variable and depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationIndex {
    pub sensors: Vec<SensorEntry>,
}

impl StationIndex {
    /// Scan `root` for `*.stm` files. Only the header line of each file is read.
    pub fn build(root: &Path) -> SmioResult<Self> {
        let mut sensors = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| SmioError::Io(e.to_string()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("stm")
            {
                continue;
            }

            let mut first = String::new();
            BufReader::new(fs::File::open(path)?).read_line(&mut first)?;
            let header = match parse_header(&first) {
                Ok(h) => h,
                Err(reason) => {
                    warn!(path = %path.display(), reason = %reason, "Skipping unreadable station file");
                    continue;
                }
            };
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(variable) = super::parse::variable_from_file_name(&file_name, &header) else {
                warn!(path = %path.display(), "Skipping station file without variable in name");
                continue;
            };
            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            sensors.push(SensorEntry::from_header(header, variable, relative));
        }

        sensors.sort_by(|a, b| {
            (&a.network, &a.station, &a.variable)
                .cmp(&(&b.network, &b.station, &b.variable))
                .then(a.depth.from.total_cmp(&b.depth.from))
                .then(a.depth.to.total_cmp(&b.depth.to))
                .then(a.path.cmp(&b.path))
        });
        info!(root = %root.display(), sensors = sensors.len(), "Built station index");
        Ok(Self { sensors })
    }

    pub fn load(path: &Path) -> SmioResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> SmioResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load `<root>/.station_index.json`, building it when absent,
    /// unreadable or when `rebuild` is set. Failing to write the index
    /// back is not an error.
    pub fn load_or_build(root: &Path, rebuild: bool) -> SmioResult<Self> {
        let index_path = root.join(INDEX_FILE_NAME);
        if !rebuild && index_path.exists() {
            match Self::load(&index_path) {
                Ok(index) => {
                    debug!(path = %index_path.display(), sensors = index.sensors.len(), "Loaded station index");
                    return Ok(index);
                }
                Err(e) => {
                    warn!(path = %index_path.display(), error = %e, "Station index unreadable, rebuilding");
                }
            }
        }

        let index = Self::build(root)?;
        if let Err(e) = index.save(&index_path) {
            warn!(path = %index_path.display(), error = %e, "Failed to write station index");
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Sensors measuring `variable`.
    pub fn sensors_for_variable<'a>(
        &'a self,
        variable: &'a str,
    ) -> impl Iterator<Item = &'a SensorEntry> + 'a {
        self.sensors.iter().filter(move |s| s.variable == variable)
    }

    /// Sensors of one station.
    pub fn sensors_at<'a: 'b, 'b>(
        &'a self,
        network: Option<&'b str>,
        station: &'b str,
    ) -> impl Iterator<Item = &'a SensorEntry> + 'b {
        self.sensors
            .iter()
            .filter(move |s| s.station == station && network.map_or(true, |n| s.network == n))
    }
}
