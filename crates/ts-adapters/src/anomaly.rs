//! Anomalies from a day-of-year climatology.
//!
//! The climatology of a column is built in three steps: the series is
//! smoothed with a centered moving average over `moving_avg_orig` days,
//! averaged per day of year (leap-year calendar, Feb 29 = 60), and the
//! resulting 366 values are smoothed again over `moving_avg_clim` days,
//! across the year boundary when `wraparound` is set. The anomaly of an
//! observation is its raw value minus the climatology of its day of year.

use chrono::{Duration, NaiveDateTime};
use smio_common::{leap_doy, Column, Frame, SmioError, SmioResult};
use tracing::{debug, warn};

use crate::combine::median;
use crate::descriptor::AnomalyClimParams;
use crate::Adapter;

/// Days in the leap-year calendar.
pub const CLIM_DAYS: usize = 366;

const LEAP_DAY: usize = 59;

/// Centered moving average over a time window of `window_days`.
///
/// `index` must be sorted. Absent values are skipped and stay absent.
pub fn moving_average(index: &[NaiveDateTime], values: &[f64], window_days: f64) -> Vec<f64> {
    if window_days <= 0.0 {
        return values.to_vec();
    }
    let half = Duration::milliseconds((window_days * 86_400_000.0 / 2.0).round() as i64);
    let mut out = vec![f64::NAN; values.len()];
    let (mut lo, mut hi) = (0usize, 0usize);
    let (mut sum, mut count) = (0.0, 0usize);

    for (i, t) in index.iter().enumerate() {
        let end = t.checked_add_signed(half);
        while hi < index.len() && end.map_or(true, |end| index[hi] <= end) {
            if !values[hi].is_nan() {
                sum += values[hi];
                count += 1;
            }
            hi += 1;
        }
        let start = t.checked_sub_signed(half);
        while start.is_some_and(|start| index[lo] < start) {
            if !values[lo].is_nan() {
                sum -= values[lo];
                count -= 1;
            }
            lo += 1;
        }
        if !values[i].is_nan() && count > 0 {
            out[i] = sum / count as f64;
        }
    }
    out
}

/// Smooth a 366-day climatology with a centered window of `window` days.
fn smooth_doy(raw: &[f64], window: f64, wraparound: bool) -> Vec<f64> {
    let half = ((window.round() as usize) / 2).min(raw.len() / 2);
    if half == 0 {
        return raw.to_vec();
    }
    let n = raw.len() as i64;
    (0..n)
        .map(|d| {
            let (mut sum, mut count) = (0.0, 0usize);
            for k in -(half as i64)..=(half as i64) {
                let j = d + k;
                let j = if wraparound {
                    j.rem_euclid(n)
                } else if j < 0 || j >= n {
                    continue;
                } else {
                    j
                };
                let v = raw[j as usize];
                if !v.is_nan() {
                    sum += v;
                    count += 1;
                }
            }
            if count > 0 {
                sum / count as f64
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Climatology of one series: 366 values, element `d` for day of year `d + 1`.
pub fn climatology(
    index: &[NaiveDateTime],
    values: &[f64],
    params: &AnomalyClimParams,
) -> Vec<f64> {
    let smoothed = moving_average(index, values, params.moving_avg_orig);

    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); CLIM_DAYS];
    for (t, v) in index.iter().zip(&smoothed) {
        if v.is_nan() || params.timespan.is_some_and(|span| !span.contains(t)) {
            continue;
        }
        buckets[leap_doy(t) as usize - 1].push(*v);
    }

    let mut raw: Vec<f64> = buckets
        .iter()
        .map(|b| {
            if b.is_empty() || b.len() < params.min_obs_clim {
                f64::NAN
            } else if params.median {
                median(b)
            } else {
                b.iter().sum::<f64>() / b.len() as f64
            }
        })
        .collect();

    // Feb 29 is rare; fill it from its neighbours
    if raw[LEAP_DAY].is_nan() {
        raw[LEAP_DAY] = (raw[LEAP_DAY - 1] + raw[LEAP_DAY + 1]) / 2.0;
    }

    smooth_doy(&raw, params.moving_avg_clim, params.wraparound)
}

/// Replaces columns by anomalies from their own climatology.
#[derive(Debug, Clone)]
pub struct AnomalyClimAdapter {
    params: AnomalyClimParams,
}

impl AnomalyClimAdapter {
    pub fn new(params: AnomalyClimParams) -> Self {
        Self { params }
    }

    fn clim_name(column: &str) -> String {
        format!("{}_climatology", column)
    }
}

impl Adapter for AnomalyClimAdapter {
    fn kind(&self) -> &'static str {
        "anomaly_clim"
    }

    fn apply(&self, frame: &Frame) -> SmioResult<Frame> {
        let mut out = frame.clone();
        if frame.is_empty() {
            if self.params.return_clim {
                for name in &self.params.columns {
                    out.insert_column(Self::clim_name(name), Column::Float(Vec::new()))?;
                }
            }
            return Ok(out);
        }

        for name in &self.params.columns {
            let values = frame
                .column(name)
                .ok_or_else(|| {
                    SmioError::adapter_precondition(self.kind(), format!("column '{}' not present", name))
                })?
                .as_float()
                .ok_or_else(|| {
                    SmioError::adapter_precondition(
                        self.kind(),
                        format!("column '{}' is not numeric", name),
                    )
                })?;

            if values.iter().all(|v| v.is_nan()) {
                warn!(column = %name, "All values absent, anomaly not computed");
                if self.params.return_clim {
                    out.insert_column(
                        Self::clim_name(name),
                        Column::Float(vec![f64::NAN; values.len()]),
                    )?;
                }
                continue;
            }

            let clim = climatology(frame.index(), values, &self.params);
            let reference: Vec<f64> = frame
                .index()
                .iter()
                .map(|t| clim[leap_doy(t) as usize - 1])
                .collect();

            if self.params.return_clim {
                out.insert_column(Self::clim_name(name), Column::Float(reference))?;
            } else {
                let anomaly = values.iter().zip(&reference).map(|(v, c)| v - c).collect();
                out.insert_column(name.clone(), Column::Float(anomaly))?;
            }
            debug!(
                column = %name,
                clim_days = clim.iter().filter(|v| !v.is_nan()).count(),
                "Computed climatology anomaly"
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use smio_common::DateRange;

    fn daily(start: (i32, u32, u32), days: i64) -> Vec<NaiveDateTime> {
        let t0 = NaiveDate::from_ymd_opt(start.0, start.1, start.2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..days).map(|d| t0 + Duration::days(d)).collect()
    }

    fn seasonal(index: &[NaiveDateTime]) -> Vec<f64> {
        index
            .iter()
            .map(|t| (2.0 * std::f64::consts::PI * leap_doy(t) as f64 / 366.0).sin())
            .collect()
    }

    fn unsmoothed(columns: &[&str]) -> AnomalyClimParams {
        AnomalyClimParams {
            moving_avg_orig: 0.0,
            moving_avg_clim: 0.0,
            ..AnomalyClimParams::new(columns)
        }
    }

    fn frame(index: Vec<NaiveDateTime>, sm: Vec<f64>) -> Frame {
        Frame::from_columns(index, vec![("sm".to_string(), Column::Float(sm))]).unwrap()
    }

    #[test]
    fn test_moving_average_window() {
        let index = daily((2000, 1, 1), 5);
        let values = vec![1.0, 2.0, f64::NAN, 4.0, 5.0];
        let out = moving_average(&index, &values, 2.0);
        assert_eq!(out[0], 1.5);
        assert_eq!(out[1], 1.5);
        assert!(out[2].is_nan());
        assert_eq!(out[3], 4.5);
    }

    #[test]
    fn test_moving_average_window_wider_than_range() {
        let index = daily((2000, 1, 1), 3);
        let out = moving_average(&index, &[0.1, 0.2, 0.3], 1.0e9);
        for v in out {
            assert!((v - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pure_seasonal_signal_has_zero_anomaly() {
        let index = daily((2000, 1, 1), 4 * 366);
        let sm = seasonal(&index);
        let out = AnomalyClimAdapter::new(unsmoothed(&["sm"]))
            .apply(&frame(index, sm))
            .unwrap();
        assert!(out.float_column("sm").unwrap().iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_timespan_limits_climatology() {
        let index = daily((2000, 1, 1), 4 * 366);
        let cut = NaiveDate::from_ymd_opt(2003, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let sm: Vec<f64> = index
            .iter()
            .zip(seasonal(&index))
            .map(|(t, v)| if *t >= cut { v + 0.1 } else { v })
            .collect();
        let params = AnomalyClimParams {
            timespan: Some(DateRange::new(index[0], cut - Duration::days(1))),
            ..unsmoothed(&["sm"])
        };
        let out = AnomalyClimAdapter::new(params)
            .apply(&frame(index.clone(), sm))
            .unwrap();
        let anomalies = out.float_column("sm").unwrap();
        for (t, a) in index.iter().zip(anomalies) {
            let expected = if *t >= cut { 0.1 } else { 0.0 };
            assert!((a - expected).abs() < 1e-9, "{} {}", t, a);
        }
    }

    #[test]
    fn test_median_ignores_outlier() {
        let index = daily((2001, 1, 1), 3 * 365);
        let mut sm = vec![1.0; index.len()];
        sm[10] = 100.0;
        let params = AnomalyClimParams {
            median: true,
            ..unsmoothed(&["sm"])
        };
        let out = AnomalyClimAdapter::new(params)
            .apply(&frame(index, sm))
            .unwrap();
        let anomalies = out.float_column("sm").unwrap();
        assert_eq!(anomalies[10], 99.0);
        assert_eq!(anomalies[10 + 365], 0.0);
    }

    #[test]
    fn test_min_obs_and_leap_day() {
        let index = daily((2001, 1, 1), 3 * 365);
        let sm = vec![0.5; index.len()];
        let clim = climatology(&index, &sm, &unsmoothed(&["sm"]));
        // No Feb 29 in 2001-2003; it is filled from Feb 28 and Mar 1
        assert_eq!(clim[LEAP_DAY], 0.5);

        let strict = AnomalyClimParams {
            min_obs_clim: 4,
            ..unsmoothed(&["sm"])
        };
        let clim = climatology(&index, &sm, &strict);
        assert!(clim.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_wraparound_smoothing() {
        let mut raw = vec![0.0; CLIM_DAYS];
        raw[0] = 3.0;
        let wrapped = smooth_doy(&raw, 3.0, true);
        assert_eq!(wrapped[CLIM_DAYS - 1], 1.0);
        let clipped = smooth_doy(&raw, 3.0, false);
        assert_eq!(clipped[CLIM_DAYS - 1], 0.0);
        assert_eq!(clipped[0], 1.5);
    }

    #[test]
    fn test_return_clim_keeps_original() {
        let index = daily((2000, 1, 1), 2 * 366);
        let sm = seasonal(&index);
        let params = AnomalyClimParams {
            return_clim: true,
            ..unsmoothed(&["sm"])
        };
        let out = AnomalyClimAdapter::new(params)
            .apply(&frame(index, sm.clone()))
            .unwrap();
        assert_eq!(out.float_column("sm").unwrap(), sm.as_slice());
        let clim = out.float_column("sm_climatology").unwrap();
        assert!((clim[100] - sm[100]).abs() < 1e-12);
    }

    #[test]
    fn test_all_absent_column_unchanged() {
        let index = daily((2000, 1, 1), 10);
        let out = AnomalyClimAdapter::new(AnomalyClimParams::new(&["sm"]))
            .apply(&frame(index, vec![f64::NAN; 10]))
            .unwrap();
        assert!(out.float_column("sm").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_missing_column() {
        let index = daily((2000, 1, 1), 10);
        let err = AnomalyClimAdapter::new(AnomalyClimParams::new(&["ssm"]))
            .apply(&frame(index, vec![0.1; 10]))
            .unwrap_err();
        assert!(matches!(err, SmioError::AdapterPreconditionFailed { .. }));
    }
}
