//! Parsing of single station files.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use smio_common::{SmioError, SmioResult};

use super::DepthRange;

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

/// First line of a station file.
#[derive(Debug, Clone, PartialEq)]
pub struct StationHeader {
    pub network: String,
    pub station: String,
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
    pub depth: DepthRange,
    pub sensor: String,
}

/// A parsed station file.
#[derive(Debug, Clone)]
pub struct StationFile {
    pub header: StationHeader,
    pub variable: String,
    pub times: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
    pub flags: Vec<Option<String>>,
    pub orig_flags: Vec<Option<String>>,
}

/// Long variable name for the short codes used in file names.
/// Unknown codes are returned unchanged.
pub fn variable_name(code: &str) -> &str {
    match code {
        "sm" => "soil_moisture",
        "ts" => "soil_temperature",
        "p" => "precipitation",
        "ta" => "air_temperature",
        "su" => "surface_temperature",
        "sd" => "snow_depth",
        "sweq" => "snow_water_equivalent",
        other => other,
    }
}

/// Parse `network network station lat lon elevation depth_from depth_to sensor`.
/// Sensor names may contain spaces.
pub fn parse_header(line: &str) -> Result<StationHeader, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 9 {
        return Err(format!("expected at least 9 header fields, found {}", tokens.len()));
    }
    let number = |i: usize, what: &str| -> Result<f64, String> {
        tokens[i]
            .parse::<f64>()
            .map_err(|_| format!("{} '{}' is not a number", what, tokens[i]))
    };
    Ok(StationHeader {
        network: tokens[1].to_string(),
        station: tokens[2].to_string(),
        lat: number(3, "latitude")?,
        lon: number(4, "longitude")?,
        elevation: number(5, "elevation")?,
        depth: DepthRange::new(number(6, "depth_from")?, number(7, "depth_to")?),
        sensor: tokens[8..].join(" "),
    })
}

/// Variable stored in a file, from the name segment following the station.
pub(super) fn variable_from_file_name(file_name: &str, header: &StationHeader) -> Option<String> {
    let prefix = format!("{0}_{0}_{1}_", header.network, header.station);
    let rest = file_name.strip_prefix(&prefix)?;
    let segments: Vec<&str> = rest
        .split('_')
        .take_while(|s| s.parse::<f64>().is_err())
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(variable_name(&segments.join("_")).to_string())
}

fn parse_line(line: &str) -> Result<(NaiveDateTime, f64, Option<String>, Option<String>), String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(format!("expected at least 3 fields, found {}", tokens.len()));
    }
    let time = NaiveDateTime::parse_from_str(&format!("{} {}", tokens[0], tokens[1]), TIME_FORMAT)
        .map_err(|e| format!("bad timestamp '{} {}': {}", tokens[0], tokens[1], e))?;
    let value = tokens
        .get(2)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(f64::NAN);
    let flag = tokens.get(3).map(|s| s.to_string());
    let orig_flag = tokens.get(4).map(|s| s.to_string());
    Ok((time, value, flag, orig_flag))
}

/// Read one `.stm` file.
pub fn read_station_file(path: &Path) -> SmioResult<StationFile> {
    let content = fs::read_to_string(path)?;
    let malformed = |line: usize, reason: String| SmioError::StationCorrupt {
        path: path.display().to_string(),
        reason: format!("line {}: {}", line, reason),
    };

    let mut lines = content.lines();
    let header = parse_header(lines.next().unwrap_or_default()).map_err(|r| malformed(1, r))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let variable = variable_from_file_name(&file_name, &header)
        .ok_or_else(|| malformed(0, format!("no variable in file name '{}'", file_name)))?;

    let mut file = StationFile {
        header,
        variable,
        times: Vec::new(),
        values: Vec::new(),
        flags: Vec::new(),
        orig_flags: Vec::new(),
    };
    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (time, value, flag, orig_flag) = parse_line(line).map_err(|r| malformed(i + 2, r))?;
        file.times.push(time);
        file.values.push(value);
        file.flags.push(flag);
        file.orig_flags.push(orig_flag);
    }
    Ok(file)
}
