//! Steps applied to every point series before it leaves a reader:
//! unit scaling, the exact observation-time index and date clipping.

use chrono::NaiveDateTime;
use smio_common::{Column, Frame, SmioError, SmioResult, TimeUnits};
use tracing::debug;

use crate::config::ReaderConfig;

/// Parameters actually read from storage: the requested ones plus the `t0`
/// column when an exact index is wanted.
pub fn storage_parameters(config: &ReaderConfig) -> Vec<String> {
    let mut params = config.parameters.clone();
    if config.exact_index {
        if let Some(t0) = &config.t0_column {
            if !params.contains(t0) {
                params.push(t0.clone());
            }
        }
    }
    params
}

/// Multiply columns by their configured factors.
pub fn apply_scale_factors(frame: &Frame, config: &ReaderConfig) -> SmioResult<Frame> {
    let mut out = frame.clone();
    for (name, factor) in &config.scale_factors {
        if let Some(values) = frame.float_column(name) {
            let scaled: Vec<f64> = values.iter().map(|v| v * factor).collect();
            out.insert_column(name.clone(), Column::Float(scaled))?;
        }
    }
    Ok(out)
}

/// Replace the nominal index by the decoded `t0` column. Rows without a
/// usable `t0` are dropped. `t0` stays a column only if it was requested.
pub fn apply_exact_index(frame: &Frame, config: &ReaderConfig) -> SmioResult<Frame> {
    let Some(t0_name) = config.t0_column.as_deref() else {
        return Ok(frame.clone());
    };
    let units = TimeUnits::parse(config.t0_units()).map_err(|e| {
        SmioError::configuration(format!("t0 units '{}': {}", config.t0_units(), e))
    })?;
    let Some(t0) = frame.float_column(t0_name) else {
        return Err(SmioError::configuration(format!(
            "exact_index needs column '{}' which was not read",
            t0_name
        )));
    };

    let decoded: Vec<Option<NaiveDateTime>> =
        t0.iter().map(|v| units.to_datetime(*v).ok()).collect();
    let keep: Vec<usize> = decoded
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|_| i))
        .collect();
    let index: Vec<NaiveDateTime> = decoded.iter().flatten().copied().collect();

    let mut out = frame.take_rows(&keep).with_index(index)?;
    if !config.parameters.iter().any(|p| p == t0_name) {
        out.drop_column(t0_name);
    }

    debug!(
        rows = frame.len(),
        kept = out.len(),
        column = t0_name,
        "Applied exact observation index"
    );

    if out.is_strictly_increasing() {
        Ok(out)
    } else {
        Ok(out.sort_index())
    }
}

/// Scale, re-index and clip a point series.
pub fn finish_series(frame: Frame, config: &ReaderConfig) -> SmioResult<Frame> {
    let mut frame = apply_scale_factors(&frame, config)?;
    if config.exact_index {
        frame = apply_exact_index(&frame, config)?;
    }
    if let Some(range) = &config.clip_dates {
        frame = frame.clip(range);
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use smio_common::DateRange;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1970, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn frame() -> Frame {
        Frame::from_columns(
            vec![day(1), day(2), day(3)],
            vec![
                ("sm".to_string(), Column::Float(vec![0.1, 0.2, 0.3])),
                // Days since 1970-01-01: 06:00 on day 1, missing, 12:00 on day 3
                ("t0".to_string(), Column::Float(vec![0.25, f64::NAN, 2.5])),
            ],
        )
        .unwrap()
    }

    fn exact_config(parameters: &[&str]) -> ReaderConfig {
        ReaderConfig {
            exact_index: true,
            t0_column: Some("t0".to_string()),
            ..Default::default()
        }
        .with_parameters(parameters)
    }

    #[test]
    fn test_storage_parameters_append_t0() {
        assert_eq!(
            storage_parameters(&exact_config(&["sm"])),
            vec!["sm".to_string(), "t0".to_string()]
        );
        assert_eq!(
            storage_parameters(&exact_config(&["t0", "sm"])),
            vec!["t0".to_string(), "sm".to_string()]
        );
    }

    #[test]
    fn test_exact_index_drops_missing_t0() {
        let out = apply_exact_index(&frame(), &exact_config(&["sm"])).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.index()[0], day(1) + chrono::Duration::hours(6));
        assert_eq!(out.index()[1], day(3) + chrono::Duration::hours(12));
        assert!(!out.has_column("t0"));
        assert_eq!(out.float_column("sm").unwrap(), &[0.1, 0.3]);
    }

    #[test]
    fn test_exact_index_keeps_requested_t0() {
        let out = apply_exact_index(&frame(), &exact_config(&["sm", "t0"])).unwrap();
        assert!(out.has_column("t0"));
    }

    #[test]
    fn test_scale_and_clip() {
        let mut config = ReaderConfig::default().with_clip_dates(DateRange::new(day(2), day(3)));
        config.scale_factors.insert("sm".to_string(), 100.0);
        let out = finish_series(frame(), &config).unwrap();
        assert_eq!(out.index(), &[day(2), day(3)]);
        assert_eq!(out.float_column("sm").unwrap(), &[20.0, 30.0]);
    }
}
