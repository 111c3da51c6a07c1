//! Synthetic soil-moisture-like series.
//!
//! Values are deterministic functions of the date and location so tests can
//! recompute the expected value for any observation.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// Fill value used by the fixture writers.
pub const FIXTURE_FILL: f64 = -9999.0;

/// Every `MISSING_EVERY`-th day has no soil-moisture value.
pub const MISSING_EVERY: i64 = 11;

/// Every `FLAGGED_EVERY`-th day carries a non-zero quality flag.
pub const FLAGGED_EVERY: i64 = 5;

/// Daily timestamps at midnight, starting at `start`.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use test_utils::daily_times;
///
/// let times = daily_times(NaiveDate::from_ymd_opt(2020, 1, 30).unwrap(), 3);
/// assert_eq!(times.len(), 3);
/// assert_eq!(times[2].date(), NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
/// ```
pub fn daily_times(start: NaiveDate, days: usize) -> Vec<NaiveDateTime> {
    let start = start.and_hms_opt(0, 0, 0).unwrap_or_default();
    (0..days as i64).map(|d| start + Duration::days(d)).collect()
}

/// Daily timestamps for an inclusive date span.
pub fn daily_span(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDateTime> {
    let days = (end - start).num_days() + 1;
    daily_times(start, days.max(0) as usize)
}

/// Offsets of `times` from `epoch` in fractional days.
pub fn days_since(times: &[NaiveDateTime], epoch: NaiveDate) -> Vec<f64> {
    let epoch = epoch.and_hms_opt(0, 0, 0).unwrap_or_default();
    times
        .iter()
        .map(|t| (*t - epoch).num_milliseconds() as f64 / 86_400_000.0)
        .collect()
}

/// Day number since 1970-01-01, used to pick missing and flagged days.
pub fn day_number(t: &NaiveDateTime) -> i64 {
    (t.date() - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()).num_days()
}

/// Seasonal soil moisture in m3/m3 for one location.
///
/// An annual cycle peaking in spring around a location-specific mean, plus a
/// small deterministic wobble. Days where `day_number % MISSING_EVERY == 0`
/// are absent (`NaN`).
pub fn seasonal_soil_moisture(times: &[NaiveDateTime], gpi: u64) -> Vec<f64> {
    let base = 0.20 + (gpi % 7) as f64 * 0.01;
    times
        .iter()
        .map(|t| {
            let day = day_number(t);
            if day % MISSING_EVERY == 0 {
                return f64::NAN;
            }
            let phase = 2.0 * std::f64::consts::PI * (t.ordinal() as f64 - 80.0) / 365.25;
            let wobble = 0.01 * ((day as f64) * 0.7 + gpi as f64).sin();
            base + 0.08 * phase.sin() + wobble
        })
        .collect()
}

/// Quality flags: `1` on every `FLAGGED_EVERY`-th day, `0` otherwise.
pub fn quality_flags(times: &[NaiveDateTime]) -> Vec<f64> {
    times
        .iter()
        .map(|t| if day_number(t) % FLAGGED_EVERY == 0 { 1.0 } else { 0.0 })
        .collect()
}

/// Exact observation times in days since 1970-01-01.
///
/// Each observation happens during its nominal day, shifted by a location
/// dependent number of hours. Days without soil moisture have no `t0`.
pub fn observation_offsets(times: &[NaiveDateTime], gpi: u64) -> Vec<f64> {
    let shift_hours = 6.0 + (gpi % 12) as f64;
    times
        .iter()
        .map(|t| {
            let day = day_number(t);
            if day % MISSING_EVERY == 0 {
                f64::NAN
            } else {
                day as f64 + shift_hours / 24.0
            }
        })
        .collect()
}

/// Replace `NaN` with [`FIXTURE_FILL`], as a writer would before storing.
pub fn with_fill(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|v| if v.is_nan() { FIXTURE_FILL } else { *v })
        .collect()
}
