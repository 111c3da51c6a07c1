//! Reader over a tree of station files.

use std::path::{Path, PathBuf};

use smio_common::grid::haversine_m;
use smio_common::{Column, Frame, Location, SmioError, SmioResult};
use tracing::{debug, info, instrument};

use super::index::{SensorEntry, StationIndex};
use super::parse::read_station_file;
use super::DepthRange;
use crate::config::ReaderConfig;
use crate::reader::{Located, ReadMethod, ReadOptions, ReaderState, TimeSeriesReader};

/// Variable read when neither the call nor the configuration names one.
pub const DEFAULT_VARIABLE: &str = "soil_moisture";

/// Quality flag of a good observation.
pub const VALID_FLAG: &str = "G";

/// Result of a nearest-station search.
#[derive(Debug, Clone, PartialEq)]
pub struct StationMatch {
    pub network: String,
    pub station: String,
    pub lon: f64,
    pub lat: f64,
    pub distance_m: f64,
}

impl StationMatch {
    pub fn station_id(&self) -> String {
        format!("{}/{}", self.network, self.station)
    }
}

/// Time-series reader for in-situ stations.
pub struct InsituReader {
    name: String,
    root: PathBuf,
    index: StationIndex,
    config: ReaderConfig,
    state: ReaderState,
}

impl InsituReader {
    /// Open a station root, loading or building its index.
    pub fn open(root: impl Into<PathBuf>, config: ReaderConfig) -> SmioResult<Self> {
        config.validate().map_err(SmioError::configuration)?;
        let root = root.into();
        if !root.is_dir() {
            return Err(SmioError::configuration(format!(
                "station root {} is not a directory",
                root.display()
            )));
        }
        let index = StationIndex::load_or_build(&root, config.rebuild_index)?;
        info!(root = %root.display(), sensors = index.len(), "Opened station root");
        Ok(Self {
            name: "insitu".to_string(),
            root,
            index,
            config,
            state: ReaderState::Created,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &StationIndex {
        &self.index
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn release(&mut self) {
        self.state = ReaderState::Released;
    }

    fn default_variable(&self) -> &str {
        self.config
            .parameters
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_VARIABLE)
    }

    fn nearest(
        &self,
        lon: f64,
        lat: f64,
        max_dist_m: Option<f64>,
        mut accept: impl FnMut(&SensorEntry) -> bool,
    ) -> Option<StationMatch> {
        let mut best: Option<(&SensorEntry, f64)> = None;
        for sensor in self.index.sensors.iter().filter(|s| accept(s)) {
            let d = haversine_m(lon, lat, sensor.lon, sensor.lat);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((sensor, d));
            }
        }
        let (sensor, distance_m) = best?;
        if max_dist_m.is_some_and(|max| distance_m > max) {
            return None;
        }
        Some(StationMatch {
            network: sensor.network.clone(),
            station: sensor.station.clone(),
            lon: sensor.lon,
            lat: sensor.lat,
            distance_m,
        })
    }

    /// Closest station to a coordinate, optionally within `max_dist_m`.
    pub fn find_nearest_station(
        &self,
        lon: f64,
        lat: f64,
        max_dist_m: Option<f64>,
    ) -> Option<StationMatch> {
        self.nearest(lon, lat, max_dist_m, |_| true)
    }

    /// Distinct sensor depths available for `variable`, shallowest first.
    pub fn get_depths(&self, variable: &str) -> Vec<DepthRange> {
        let mut depths: Vec<DepthRange> = Vec::new();
        for sensor in self.index.sensors_for_variable(variable) {
            if !depths.contains(&sensor.depth) {
                depths.push(sensor.depth);
            }
        }
        depths.sort_by(|a, b| a.from.total_cmp(&b.from).then(a.to.total_cmp(&b.to)));
        depths
    }

    /// Pick the shallowest sensor of a station matching variable and depth.
    fn select_sensor(
        &self,
        station_id: &str,
        variable: &str,
        depth: Option<&DepthRange>,
    ) -> SmioResult<&SensorEntry> {
        let (network, station) = match station_id.split_once('/') {
            Some((n, s)) => (Some(n), s),
            None => (None, station_id),
        };
        let mut candidates: Vec<&SensorEntry> = self
            .index
            .sensors_at(network, station)
            .filter(|s| s.variable == variable)
            .filter(|s| depth.map_or(true, |d| d.contains(&s.depth)))
            .collect();
        if candidates.is_empty() {
            return Err(SmioError::unknown_location(format!(
                "no '{}' sensor at station '{}'{}",
                variable,
                station_id,
                depth.map(|d| format!(" within {}", d)).unwrap_or_default()
            )));
        }
        candidates.sort_by(|a, b| {
            a.depth
                .from
                .total_cmp(&b.depth.from)
                .then(a.depth.to.total_cmp(&b.depth.to))
        });
        Ok(candidates[0])
    }

    fn read_sensor(&mut self, sensor: &SensorEntry, only_valid_flag: bool) -> SmioResult<Frame> {
        let path = self.root.join(&sensor.path);
        let file = read_station_file(&path)?;
        self.state = ReaderState::Opened;

        let mut frame = Frame::from_columns(
            file.times,
            vec![
                (file.variable.clone(), Column::Float(file.values)),
                ("flag".to_string(), Column::Text(file.flags)),
                ("orig_flag".to_string(), Column::Text(file.orig_flags)),
            ],
        )?;
        if !frame.is_strictly_increasing() {
            frame = frame.sort_index();
        }

        if only_valid_flag {
            let mask: Vec<bool> = match frame.column("flag").and_then(Column::as_text) {
                Some(flags) => flags
                    .iter()
                    .map(|f| f.as_deref() == Some(VALID_FLAG))
                    .collect(),
                None => vec![false; frame.len()],
            };
            frame = frame.filter_rows(&mask);
        }
        if let Some(range) = &self.config.clip_dates {
            frame = frame.clip(range);
        }

        debug!(
            station = %sensor.station_id(),
            variable = %sensor.variable,
            depth = %sensor.depth,
            rows = frame.len(),
            "Read station sensor"
        );
        Ok(frame)
    }

    /// Series of `variable` at one station, from the shallowest sensor
    /// inside `depth` (any depth when `None`).
    pub fn read_station(
        &mut self,
        station_id: &str,
        variable: &str,
        depth: Option<&DepthRange>,
        only_valid_flag: bool,
    ) -> SmioResult<Frame> {
        let sensor = self.select_sensor(station_id, variable, depth)?.clone();
        self.read_sensor(&sensor, only_valid_flag)
    }

    /// Default variable of a station (`NETWORK/station` or `station`).
    pub fn read(&mut self, station_id: &str) -> SmioResult<Frame> {
        let variable = self.default_variable().to_string();
        self.read_station(station_id, &variable, None, false)
    }

    /// Series from the nearest station carrying `variable` inside `depth`.
    #[instrument(skip(self), fields(reader = %self.name))]
    pub fn read_nearest(
        &mut self,
        lon: f64,
        lat: f64,
        variable: &str,
        depth: Option<DepthRange>,
        only_valid_flag: bool,
    ) -> SmioResult<Frame> {
        let found = self
            .nearest(lon, lat, self.config.max_dist_m, |s| {
                s.variable == variable && depth.map_or(true, |d| d.contains(&s.depth))
            })
            .ok_or_else(|| {
                SmioError::unknown_location(format!(
                    "no station with '{}' near ({}, {})",
                    variable, lon, lat
                ))
            })?;
        debug!(
            station = %found.station_id(),
            distance_m = found.distance_m,
            "Nearest station"
        );
        self.read_station(&found.station_id(), variable, depth.as_ref(), only_valid_flag)
    }
}

impl TimeSeriesReader for InsituReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, location: &Location) -> SmioResult<Frame> {
        self.read_with(ReadMethod::Read, location, &ReadOptions::default())
    }

    fn read_with(
        &mut self,
        method: ReadMethod,
        location: &Location,
        options: &ReadOptions,
    ) -> SmioResult<Frame> {
        let variable = options
            .variable
            .clone()
            .unwrap_or_else(|| self.default_variable().to_string());
        match (method, location) {
            (ReadMethod::Read | ReadMethod::ReadTs, Location::Station(id)) => {
                self.read_station(id, &variable, options.depth.as_ref(), options.only_valid_flag)
            }
            (_, Location::LonLat(lon, lat)) => {
                self.read_nearest(*lon, *lat, &variable, options.depth, options.only_valid_flag)
            }
            (ReadMethod::ReadNearest, other) => Err(SmioError::unknown_location(format!(
                "read_nearest needs a coordinate, got {}",
                other
            ))),
            (_, Location::Gpi(gpi)) => Err(SmioError::unknown_location(format!(
                "gpi {} cannot be read from station data",
                gpi
            ))),
        }
    }

    fn supported_methods(&self) -> &'static [ReadMethod] {
        &[ReadMethod::Read, ReadMethod::ReadTs, ReadMethod::ReadNearest]
    }

    fn locate(&self, location: &Location) -> SmioResult<Located> {
        match location {
            Location::Station(id) => {
                let sensor = self.select_sensor(id, self.default_variable(), None)?;
                Ok(Located {
                    label: sensor.station_id(),
                    group: None,
                    location: Location::Station(sensor.station_id()),
                })
            }
            Location::LonLat(lon, lat) => {
                let found = self
                    .find_nearest_station(*lon, *lat, self.config.max_dist_m)
                    .ok_or_else(|| {
                        SmioError::unknown_location(format!("no station near ({}, {})", lon, lat))
                    })?;
                Ok(Located {
                    label: found.station_id(),
                    group: None,
                    location: location.clone(),
                })
            }
            Location::Gpi(gpi) => Err(SmioError::unknown_location(format!(
                "gpi {} cannot be read from station data",
                gpi
            ))),
        }
    }
}

impl std::fmt::Debug for InsituReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsituReader")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("sensors", &self.index.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_utils::{ismn_stations, points, write_station_file};

    fn reader(config: ReaderConfig) -> (tempfile::TempDir, InsituReader) {
        let dir = tempfile::tempdir().unwrap();
        for fixture in ismn_stations(NaiveDate::from_ymd_opt(2010, 3, 1).unwrap()) {
            write_station_file(dir.path(), &fixture).unwrap();
        }
        let reader = InsituReader::open(dir.path(), config).unwrap();
        (dir, reader)
    }

    #[test]
    fn test_find_nearest_station() {
        let (_dir, r) = reader(ReaderConfig::default());
        let (lon, lat) = points::SILVERSWORD_QUERY;
        let found = r.find_nearest_station(lon, lat, None).unwrap();
        assert_eq!(found.station_id(), "SCAN/SilverSword");
        assert!(found.distance_m < 20_000.0);
        assert!(r.find_nearest_station(lon, lat, Some(1_000.0)).is_none());
    }

    #[test]
    fn test_get_depths() {
        let (_dir, r) = reader(ReaderConfig::default());
        assert_eq!(
            r.get_depths("soil_moisture"),
            vec![
                DepthRange::new(0.0, 0.05),
                DepthRange::new(0.05, 0.05),
                DepthRange::new(0.2, 0.2)
            ]
        );
        assert_eq!(r.get_depths("soil_temperature").len(), 1);
        assert!(r.get_depths("precipitation").is_empty());
    }

    #[test]
    fn test_read_station_shallowest_sensor() {
        let (_dir, mut r) = reader(ReaderConfig::default());
        let frame = r.read("SCAN/SilverSword").unwrap();
        assert_eq!(frame.column_names(), vec!["soil_moisture", "flag", "orig_flag"]);
        assert_eq!(frame.len(), 240);
        // Offset 0.30 marks the 0.05 m sensor, 0.35 the 0.2 m one
        let sm = frame.float_column("soil_moisture").unwrap();
        assert!((sm[0] - 0.30).abs() < 1e-9);
        assert_eq!(r.state(), ReaderState::Opened);
    }

    #[test]
    fn test_read_nearest_valid_only() {
        let (_dir, mut r) = reader(ReaderConfig::default());
        let (lon, lat) = points::SILVERSWORD_QUERY;
        let frame = r
            .read_nearest(lon, lat, "soil_moisture", Some(DepthRange::new(0.0, 0.1)), true)
            .unwrap();
        assert!(!frame.is_empty());
        let flags = frame.column("flag").unwrap().as_text().unwrap();
        assert!(flags.iter().all(|f| f.as_deref() == Some("G")));
    }

    #[test]
    fn test_read_nearest_respects_depth() {
        let (_dir, mut r) = reader(ReaderConfig::default());
        let frame = r
            .read_nearest(-155.5, 19.9, "soil_moisture", Some(DepthRange::new(0.1, 0.3)), false)
            .unwrap();
        let sm = frame.float_column("soil_moisture").unwrap();
        assert!((sm[0] - 0.35).abs() < 1e-9);

        let err = r
            .read_nearest(-155.5, 19.9, "soil_moisture", Some(DepthRange::new(1.0, 2.0)), false)
            .unwrap_err();
        assert!(matches!(err, SmioError::UnknownLocation(_)));
    }

    #[test]
    fn test_read_with_methods() {
        let (_dir, mut r) = reader(ReaderConfig::default());
        assert!(r.supports_method(ReadMethod::ReadNearest));
        let options = ReadOptions {
            variable: Some("soil_temperature".to_string()),
            ..Default::default()
        };
        let frame = r
            .read_with(ReadMethod::ReadNearest, &Location::LonLat(-155.5, 19.9), &options)
            .unwrap();
        assert!(frame.has_column("soil_temperature"));

        let err = r
            .read_with(ReadMethod::ReadNearest, &Location::Gpi(4), &options)
            .unwrap_err();
        assert!(matches!(err, SmioError::UnknownLocation(_)));
    }

    #[test]
    fn test_unknown_station() {
        let (_dir, mut r) = reader(ReaderConfig::default());
        let err = r.read("SCAN/Nowhere").unwrap_err();
        assert!(matches!(err, SmioError::UnknownLocation(_)));
    }
}
