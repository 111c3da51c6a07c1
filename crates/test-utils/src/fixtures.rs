//! Fixture writers for cell files, grid files and in-situ station files.
//!
//! [`write_testdata`] lays out the directory tree the dataset catalog's
//! `__test` path group points at, so end-to-end tests can resolve datasets
//! through the real resolver.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::generators::{
    daily_span, day_number, days_since, observation_offsets, quality_flags,
    seasonal_soil_moisture, FIXTURE_FILL,
};

pub type FixtureResult<T> = Result<T, Box<dyn Error>>;

/// Fill value for packed 16-bit variables.
pub const PACKED_FILL: i16 = i16::MIN;

/// Units of every fixture time axis.
pub const FIXTURE_TIME_UNITS: &str = "days since 1970-01-01 00:00:00";

/// Well-known coordinates used by the fixtures.
pub mod points {
    /// Read target of the single-point scenarios (inside cell 1431).
    pub const CCI_POINT: (f64, f64) = (15.0, 45.0);

    /// Cell holding [`CCI_POINT`].
    pub const CCI_POINT_CELL: u32 = 1431;

    /// Second fixture cell (south-east Australia).
    pub const DUMP_CELL: u32 = 2244;

    /// Near the SCAN SilverSword station on Hawaii.
    pub const SILVERSWORD_QUERY: (f64, f64) = (-155.5, 19.9);
}

/// A grid point written to a fixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixturePoint {
    pub gpi: u64,
    pub lon: f64,
    pub lat: f64,
}

impl FixturePoint {
    /// Point of a regular global grid, gpis numbered row by row from the
    /// south-west corner.
    pub fn regular(lon: f64, lat: f64, resolution: f64) -> Self {
        let ncols = (360.0 / resolution).round() as u64;
        let col = ((lon + 180.0) / resolution).floor() as u64;
        let row = ((lat + 90.0) / resolution).floor() as u64;
        Self {
            gpi: row * ncols + col,
            lon,
            lat,
        }
    }
}

/// Cell number of a coordinate for square cells of `cell_size` degrees.
pub fn cell_of(lon: f64, lat: f64, cell_size: f64) -> u32 {
    let rows = (180.0 / cell_size).round() as u32;
    let x = ((lon + 180.0) / cell_size).floor() as u32;
    let y = ((lat + 90.0) / cell_size).floor() as u32;
    x * rows + y
}

/// On-disk encoding of a fixture variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    /// 64-bit floats, missing values stored as [`FIXTURE_FILL`].
    Float64,
    /// 16-bit integers with a `scale_factor`, missing stored as [`PACKED_FILL`].
    PackedI16 { scale_factor: f64 },
}

/// One variable, one series per location. `NaN` marks a missing value.
#[derive(Debug, Clone)]
pub struct FixtureVariable {
    pub name: String,
    pub series: Vec<Vec<f64>>,
    pub encoding: Encoding,
}

impl FixtureVariable {
    pub fn float(name: &str, series: Vec<Vec<f64>>) -> Self {
        Self {
            name: name.to_string(),
            series,
            encoding: Encoding::Float64,
        }
    }

    pub fn packed(name: &str, series: Vec<Vec<f64>>, scale_factor: f64) -> Self {
        Self {
            name: name.to_string(),
            series,
            encoding: Encoding::PackedI16 { scale_factor },
        }
    }
}

/// Write a grid file with `gpi`, `lon` and `lat` variables.
pub fn write_grid_file(path: &Path, points: &[FixturePoint]) -> FixtureResult<()> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("gp", points.len())?;

    let gpis: Vec<i64> = points.iter().map(|p| p.gpi as i64).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.lon).collect();
    let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();

    {
        let mut var = file.add_variable::<i64>("gpi", &["gp"])?;
        var.put_values(&gpis, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>("lon", &["gp"])?;
        var.put_attribute("units", "degrees_east")?;
        var.put_values(&lons, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>("lat", &["gp"])?;
        var.put_attribute("units", "degrees_north")?;
        var.put_values(&lats, ..)?;
    }
    Ok(())
}

/// Write an orthogonal-multi cell: every location shares `times`, variables
/// are stored `[locations, time]`.
pub fn write_ortho_cell(
    path: &Path,
    points: &[FixturePoint],
    times: &[f64],
    variables: &[FixtureVariable],
) -> FixtureResult<()> {
    for var in variables {
        if var.series.len() != points.len() || var.series.iter().any(|s| s.len() != times.len()) {
            return Err(format!("variable '{}' does not match the cell shape", var.name).into());
        }
    }

    let mut file = netcdf::create(path)?;
    file.add_dimension("locations", points.len())?;
    file.add_dimension("time", times.len())?;
    write_locations(&mut file, points)?;

    {
        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        time_var.put_attribute("units", FIXTURE_TIME_UNITS)?;
        time_var.put_values(times, ..)?;
    }

    for var in variables {
        let flat: Vec<f64> = var.series.iter().flatten().copied().collect();
        write_variable(&mut file, var, &["locations", "time"], &flat)?;
    }
    Ok(())
}

/// Write a contiguous-ragged cell: each location has its own `times`
/// segment, `row_size` gives the segment lengths.
pub fn write_ragged_cell(
    path: &Path,
    points: &[FixturePoint],
    times: &[Vec<f64>],
    variables: &[FixtureVariable],
) -> FixtureResult<()> {
    if times.len() != points.len() {
        return Err("one time series per location required".into());
    }
    for var in variables {
        let shape_ok = var.series.len() == points.len()
            && var.series.iter().zip(times).all(|(s, t)| s.len() == t.len());
        if !shape_ok {
            return Err(format!("variable '{}' does not match the cell shape", var.name).into());
        }
    }

    let n_obs: usize = times.iter().map(Vec::len).sum();
    let mut file = netcdf::create(path)?;
    file.add_dimension("locations", points.len())?;
    file.add_dimension("obs", n_obs)?;
    write_locations(&mut file, points)?;

    let row_size: Vec<i32> = times.iter().map(|t| t.len() as i32).collect();
    {
        let mut var = file.add_variable::<i32>("row_size", &["locations"])?;
        var.put_values(&row_size, ..)?;
    }

    let flat_times: Vec<f64> = times.iter().flatten().copied().collect();
    {
        let mut time_var = file.add_variable::<f64>("time", &["obs"])?;
        time_var.put_attribute("units", FIXTURE_TIME_UNITS)?;
        time_var.put_values(&flat_times, ..)?;
    }

    for var in variables {
        let flat: Vec<f64> = var.series.iter().flatten().copied().collect();
        write_variable(&mut file, var, &["obs"], &flat)?;
    }
    Ok(())
}

fn write_locations(file: &mut netcdf::FileMut, points: &[FixturePoint]) -> FixtureResult<()> {
    let ids: Vec<i64> = points.iter().map(|p| p.gpi as i64).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.lon).collect();
    let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();

    {
        let mut var = file.add_variable::<i64>("location_id", &["locations"])?;
        var.put_values(&ids, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>("lon", &["locations"])?;
        var.put_values(&lons, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>("lat", &["locations"])?;
        var.put_values(&lats, ..)?;
    }
    Ok(())
}

fn write_variable(
    file: &mut netcdf::FileMut,
    var: &FixtureVariable,
    dims: &[&str],
    values: &[f64],
) -> FixtureResult<()> {
    match var.encoding {
        Encoding::Float64 => {
            let data: Vec<f64> = values
                .iter()
                .map(|v| if v.is_nan() { FIXTURE_FILL } else { *v })
                .collect();
            let mut nc_var = file.add_variable::<f64>(&var.name, dims)?;
            nc_var.put_attribute("_FillValue", FIXTURE_FILL)?;
            nc_var.put_values(&data, ..)?;
        }
        Encoding::PackedI16 { scale_factor } => {
            let data: Vec<i16> = values
                .iter()
                .map(|v| {
                    if v.is_nan() {
                        PACKED_FILL
                    } else {
                        (v / scale_factor).round() as i16
                    }
                })
                .collect();
            let mut nc_var = file.add_variable::<i16>(&var.name, dims)?;
            nc_var.put_attribute("_FillValue", PACKED_FILL)?;
            nc_var.put_attribute("scale_factor", scale_factor)?;
            nc_var.put_attribute("add_offset", 0.0f64)?;
            nc_var.put_values(&data, ..)?;
        }
    }
    Ok(())
}

// =============================================================================
// In-situ station files
// =============================================================================

/// One sensor of one station, written as an ISMN "header + values" file.
#[derive(Debug, Clone)]
pub struct StationFixture {
    pub network: String,
    pub station: String,
    pub lon: f64,
    pub lat: f64,
    pub elevation: f64,
    pub depth_from: f64,
    pub depth_to: f64,
    pub sensor: String,
    /// Short variable code used in the file name (`sm`, `ts`, ...).
    pub variable: String,
    /// `(time, value, flag)` rows.
    pub observations: Vec<(NaiveDateTime, f64, String)>,
}

impl StationFixture {
    pub fn file_name(&self) -> String {
        let start = self.observations.first().map(|o| o.0);
        let end = self.observations.last().map(|o| o.0);
        let fmt = |t: Option<NaiveDateTime>| {
            t.map(|t| t.format("%Y%m%d").to_string())
                .unwrap_or_else(|| "00000000".to_string())
        };
        format!(
            "{net}_{net}_{station}_{var}_{from:.6}_{to:.6}_{sensor}_{start}_{end}.stm",
            net = self.network,
            station = self.station,
            var = self.variable,
            from = self.depth_from,
            to = self.depth_to,
            sensor = self.sensor,
            start = fmt(start),
            end = fmt(end),
        )
    }
}

/// Write a station file under `<root>/<network>/<station>/`.
pub fn write_station_file(root: &Path, fixture: &StationFixture) -> FixtureResult<PathBuf> {
    let dir = root.join(&fixture.network).join(&fixture.station);
    fs::create_dir_all(&dir)?;
    let path = dir.join(fixture.file_name());

    let mut file = fs::File::create(&path)?;
    writeln!(
        file,
        "{} {} {} {:.5} {:.5} {:.2} {:.2} {:.2} {}",
        fixture.network,
        fixture.network,
        fixture.station,
        fixture.lat,
        fixture.lon,
        fixture.elevation,
        fixture.depth_from,
        fixture.depth_to,
        fixture.sensor
    )?;
    for (t, value, flag) in &fixture.observations {
        writeln!(file, "{} {:.4} {} M", t.format("%Y/%m/%d %H:%M"), value, flag)?;
    }
    Ok(path)
}

/// Six-hourly observations over `days` days with a repeating flag pattern:
/// `D01` every 7th row, `C03` every 13th, `G` otherwise.
pub fn station_observations(
    start: NaiveDate,
    days: usize,
    offset: f64,
) -> Vec<(NaiveDateTime, f64, String)> {
    let start = start.and_hms_opt(0, 0, 0).unwrap_or_default();
    (0..days * 4)
        .map(|i| {
            let t = start + Duration::hours(6 * i as i64);
            let value = offset + 0.05 * ((i as f64) / 20.0).sin();
            let flag = if i % 7 == 3 {
                "D01"
            } else if i % 13 == 5 {
                "C03"
            } else {
                "G"
            };
            (t, value, flag.to_string())
        })
        .collect()
}

// =============================================================================
// Standard test data tree
// =============================================================================

/// Layout of the tree written by [`write_testdata`].
#[derive(Debug, Clone)]
pub struct TestData {
    pub root: PathBuf,
    /// ESA CCI SM v06.1 COMBINED, orthogonal-multi cells 1431 and 2244.
    pub cci_dir: PathBuf,
    /// C3S SM v202212 COMBINED DAILY TCDR, contiguous-ragged cell 1431.
    pub c3s_dir: PathBuf,
    /// ISMN station files.
    pub ismn_dir: PathBuf,
    pub cci_points: Vec<FixturePoint>,
    pub c3s_points: Vec<FixturePoint>,
    pub cci_times: Vec<NaiveDateTime>,
}

impl TestData {
    pub fn cci_points_in_cell(&self, cell: u32) -> Vec<FixturePoint> {
        self.cci_points
            .iter()
            .filter(|p| cell_of(p.lon, p.lat, 5.0) == cell)
            .copied()
            .collect()
    }
}

/// Relative location of the ESA CCI fixture below the test data root.
pub const CCI_SUBDIR: &str = "esa_cci_sm/v061/combined";
/// Relative location of the C3S fixture below the test data root.
pub const C3S_SUBDIR: &str = "c3s_sm/v202212/combined/daily/tcdr";
/// Relative location of the ISMN fixture below the test data root.
pub const ISMN_SUBDIR: &str = "ismn";

/// Write the complete fixture tree below `root`.
pub fn write_testdata(root: &Path) -> FixtureResult<TestData> {
    let cci_dir = root.join(CCI_SUBDIR);
    let c3s_dir = root.join(C3S_SUBDIR);
    let ismn_dir = root.join(ISMN_SUBDIR);
    fs::create_dir_all(&cci_dir)?;
    fs::create_dir_all(&c3s_dir)?;
    fs::create_dir_all(&ismn_dir)?;

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or("bad epoch")?;

    // ESA CCI: daily 1990..2012, orthogonal-multi
    let cci_points = vec![
        FixturePoint::regular(15.125, 45.125, 0.25),
        FixturePoint::regular(15.375, 45.125, 0.25),
        FixturePoint::regular(15.125, 45.375, 0.25),
        FixturePoint::regular(15.375, 45.375, 0.25),
        FixturePoint::regular(130.125, -29.875, 0.25),
        FixturePoint::regular(130.375, -29.875, 0.25),
        FixturePoint::regular(130.125, -29.625, 0.25),
    ];
    let cci_times = daily_span(
        NaiveDate::from_ymd_opt(1990, 1, 1).ok_or("bad date")?,
        NaiveDate::from_ymd_opt(2012, 12, 31).ok_or("bad date")?,
    );
    let cci_offsets = days_since(&cci_times, epoch);
    write_grid_file(&cci_dir.join("grid.nc"), &cci_points)?;

    for cell in [points::CCI_POINT_CELL, points::DUMP_CELL] {
        let in_cell: Vec<FixturePoint> = cci_points
            .iter()
            .filter(|p| cell_of(p.lon, p.lat, 5.0) == cell)
            .copied()
            .collect();
        let variables = vec![
            FixtureVariable::float(
                "sm",
                in_cell
                    .iter()
                    .map(|p| seasonal_soil_moisture(&cci_times, p.gpi))
                    .collect(),
            ),
            FixtureVariable::packed(
                "flag",
                in_cell.iter().map(|_| quality_flags(&cci_times)).collect(),
                1.0,
            ),
            FixtureVariable::float(
                "t0",
                in_cell
                    .iter()
                    .map(|p| observation_offsets(&cci_times, p.gpi))
                    .collect(),
            ),
        ];
        write_ortho_cell(
            &cci_dir.join(format!("{:04}.nc", cell)),
            &in_cell,
            &cci_offsets,
            &variables,
        )?;
    }

    // C3S: daily 2000..2005, contiguous-ragged with per-location gaps
    let c3s_points: Vec<FixturePoint> = cci_points[..4].to_vec();
    let c3s_all = daily_span(
        NaiveDate::from_ymd_opt(2000, 1, 1).ok_or("bad date")?,
        NaiveDate::from_ymd_opt(2005, 12, 31).ok_or("bad date")?,
    );
    let mut times = Vec::new();
    let mut sm = Vec::new();
    let mut flag = Vec::new();
    let mut t0 = Vec::new();
    for (i, p) in c3s_points.iter().enumerate() {
        let own: Vec<NaiveDateTime> = c3s_all
            .iter()
            .filter(|t| (day_number(t) + i as i64) % 3 != 0)
            .copied()
            .collect();
        times.push(days_since(&own, epoch));
        sm.push(seasonal_soil_moisture(&own, p.gpi));
        flag.push(quality_flags(&own));
        t0.push(observation_offsets(&own, p.gpi));
    }
    write_grid_file(&c3s_dir.join("grid.nc"), &c3s_points)?;
    write_ragged_cell(
        &c3s_dir.join(format!("{:04}.nc", points::CCI_POINT_CELL)),
        &c3s_points,
        &times,
        &[
            FixtureVariable::packed("sm", sm, 1e-4),
            FixtureVariable::packed("flag", flag, 1.0),
            FixtureVariable::float("t0", t0),
        ],
    )?;

    // ISMN
    let start = NaiveDate::from_ymd_opt(2010, 3, 1).ok_or("bad date")?;
    for fixture in ismn_stations(start) {
        write_station_file(&ismn_dir, &fixture)?;
    }

    Ok(TestData {
        root: root.to_path_buf(),
        cci_dir,
        c3s_dir,
        ismn_dir,
        cci_points,
        c3s_points,
        cci_times,
    })
}

/// Station sensors of the ISMN fixture.
pub fn ismn_stations(start: NaiveDate) -> Vec<StationFixture> {
    let sensor = |network: &str,
                  station: &str,
                  (lon, lat): (f64, f64),
                  variable: &str,
                  depth: (f64, f64),
                  name: &str,
                  offset: f64| StationFixture {
        network: network.to_string(),
        station: station.to_string(),
        lon,
        lat,
        elevation: 1000.0,
        depth_from: depth.0,
        depth_to: depth.1,
        sensor: name.to_string(),
        variable: variable.to_string(),
        observations: station_observations(start, 60, offset),
    };

    vec![
        sensor("SCAN", "SilverSword", (-155.4175, 19.7961), "sm", (0.05, 0.05), "Hydraprobe", 0.30),
        sensor("SCAN", "SilverSword", (-155.4175, 19.7961), "sm", (0.2, 0.2), "Hydraprobe", 0.35),
        sensor("SCAN", "SilverSword", (-155.4175, 19.7961), "ts", (0.05, 0.05), "Hydraprobe", 18.0),
        sensor("SCAN", "Kukuihaele", (-155.5600, 20.1200), "sm", (0.05, 0.05), "Hydraprobe", 0.25),
        sensor("REMEDHUS", "Zamarron", (-5.5430, 41.2410), "sm", (0.0, 0.05), "ThetaProbe", 0.20),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_point_gpi() {
        let p = FixturePoint::regular(-179.875, -89.875, 0.25);
        assert_eq!(p.gpi, 0);
        let p = FixturePoint::regular(-179.625, -89.875, 0.25);
        assert_eq!(p.gpi, 1);
        let p = FixturePoint::regular(-179.875, -89.625, 0.25);
        assert_eq!(p.gpi, 1440);
    }

    #[test]
    fn test_cell_numbers() {
        assert_eq!(cell_of(15.125, 45.125, 5.0), points::CCI_POINT_CELL);
        assert_eq!(cell_of(130.125, -29.875, 5.0), points::DUMP_CELL);
    }

    #[test]
    fn test_station_file_name() {
        let fixture = &ismn_stations(NaiveDate::from_ymd_opt(2010, 3, 1).unwrap())[0];
        assert_eq!(
            fixture.file_name(),
            "SCAN_SCAN_SilverSword_sm_0.050000_0.050000_Hydraprobe_20100301_20100429.stm"
        );
    }

    #[test]
    fn test_station_flags_pattern() {
        let obs = station_observations(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(), 10, 0.3);
        assert_eq!(obs.len(), 40);
        assert_eq!(obs[3].2, "D01");
        assert_eq!(obs[5].2, "C03");
        assert_eq!(obs[0].2, "G");
    }
}
